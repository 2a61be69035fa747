use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One inspection lot's screenshot directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LotFolder {
    pub path: PathBuf,
    pub lot: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Verdict {
    Pass,
    Fail,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Judgement {
    Ok,
    Ng,
}

impl Judgement {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "OK",
            Self::Ng => "NG",
        }
    }
}

impl fmt::Display for Judgement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Row appended to `screenshot_list`; never updated once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenshotRecord {
    pub title: String,
    pub timestamp: DateTime<Utc>,
    pub lot: String,
    pub pass_fail: String,
    pub judgement: String,
    pub width: u32,
    pub height: u32,
    pub full_path: String,
}

pub fn combined_judgement(aoi: Judgement, ocr: Judgement) -> String {
    format!("{aoi}|{ocr}")
}

/// Row keyed by (lot, slot) in `result_aoi`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CsvResultRow {
    pub lot: String,
    pub slot: String,
    pub class020: i64,
    pub class025: i64,
    pub class029: i64,
    pub class050: i64,
    pub class104: i64,
    pub class300: i64,
    pub class500: i64,
    pub total: i64,
    pub judge: String,
    pub comment: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TrackerEntry {
    pub item_path: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCounts {
    pub folders_seen: usize,
    pub folders_up_to_date: usize,
    pub folders_processed: usize,
    /// Scanned, but left unmarked because at least one image failed.
    pub folders_incomplete: usize,
    pub images_inserted: usize,
    pub images_already_present: usize,
    pub images_filtered: usize,
    pub images_failed: usize,
    pub csv_files_seen: usize,
    pub csv_files_up_to_date: usize,
    pub csv_files_processed: usize,
    pub csv_files_failed: usize,
    pub csv_rows_inserted: usize,
    pub csv_rows_updated: usize,
    pub csv_rows_malformed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunPaths {
    pub data_root: String,
    pub settings_path: String,
    pub screenshot_root: String,
    pub csv_root: String,
    pub db_path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunManifest {
    pub manifest_version: u32,
    pub run_id: String,
    pub status: RunStatus,
    pub started_at: String,
    pub finished_at: String,
    pub paths: RunPaths,
    pub counts: RunCounts,
    pub warnings: Vec<String>,
}

/// Subset of a run manifest read back by `status`.
#[derive(Debug, Clone, Deserialize)]
pub struct RunManifestSummary {
    pub run_id: String,
    pub status: String,
    pub finished_at: String,
    pub counts: RunCounts,
}
