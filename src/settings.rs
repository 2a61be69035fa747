use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::util::{absolute_path, write_json_pretty};

/// Sub-rectangle in source-image pixels. Not scaled to the image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        let right = u64::from(self.x) + u64::from(self.width);
        let bottom = u64::from(self.y) + u64::from(self.height);
        self.width > 0 && self.height > 0 && right <= u64::from(width) && bottom <= u64::from(height)
    }
}

impl Default for Region {
    fn default() -> Self {
        Self {
            x: 1130,
            y: 170,
            width: 50,
            height: 160,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MalformedRowPolicy {
    /// Log the row and keep going with the rest of the file.
    #[default]
    Skip,
    /// Roll back the file and leave it unmarked for the next run.
    Abort,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub screenshot_root: PathBuf,
    pub csv_root: PathBuf,
    pub db_path: Option<PathBuf>,
    pub tessdata_dir: Option<PathBuf>,
    pub ocr_lang: String,
    pub ocr_marker: String,
    pub ocr_region: Region,
    pub ocr_timeout_secs: Option<u64>,
    pub source_marker: String,
    pub pass_marker: String,
    pub fail_marker: String,
    pub lot_code_len: usize,
    pub image_extensions: Vec<String>,
    pub malformed_rows: MalformedRowPolicy,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screenshot_root: PathBuf::new(),
            csv_root: PathBuf::new(),
            db_path: None,
            tessdata_dir: None,
            ocr_lang: "jpn".to_string(),
            ocr_marker: "NG".to_string(),
            ocr_region: Region::default(),
            ocr_timeout_secs: None,
            source_marker: "AOI".to_string(),
            pass_marker: "合格".to_string(),
            fail_marker: "不合格".to_string(),
            lot_code_len: "910963".len(),
            image_extensions: vec!["jpeg".to_string()],
            malformed_rows: MalformedRowPolicy::default(),
        }
    }
}

impl Settings {
    /// `Ok(None)` when the file does not exist.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }

        let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
        let settings = serde_json::from_slice(&raw)
            .with_context(|| format!("failed to parse {}", path.display()))?;
        Ok(Some(settings))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        write_json_pretty(path, self)
    }

    /// Makes both scan roots absolute, so tracker keys and stored paths do not
    /// depend on the working directory.
    pub fn resolve_roots(&mut self) -> Result<()> {
        self.screenshot_root = absolute_path(&self.screenshot_root)?;
        self.csv_root = absolute_path(&self.csv_root)?;
        Ok(())
    }

    pub fn resolved_db_path(&self, data_root: &Path) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| data_root.join("aoi.sqlite"))
    }

    pub fn resolved_tessdata_dir(&self, data_root: &Path) -> PathBuf {
        self.tessdata_dir
            .clone()
            .unwrap_or_else(|| data_root.join("tessdata"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "screenshot_root": "/mnt/aoi/shots", "malformed_rows": "abort" }"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap().unwrap();
        assert_eq!(settings.screenshot_root, PathBuf::from("/mnt/aoi/shots"));
        assert_eq!(settings.malformed_rows, MalformedRowPolicy::Abort);
        assert_eq!(settings.ocr_region, Region::default());
        assert_eq!(settings.lot_code_len, 6);
        assert_eq!(settings.ocr_marker, "NG");
    }

    #[test]
    fn missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(&dir.path().join("settings.json")).unwrap().is_none());
    }

    #[test]
    fn region_bounds_check() {
        let region = Region::default();
        assert!(region.fits_within(1280, 1024));
        assert!(region.fits_within(1180, 330));
        assert!(!region.fits_within(1179, 330));
        assert!(!region.fits_within(1280, 329));
    }
}
