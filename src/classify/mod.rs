//! Pass/fail classification of inspection screenshots.
//!
//! The filename carries the machine's verdict; a second judgement comes from
//! OCR over a fixed region of the image, counting a marker token.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::{Judgement, Verdict};
use crate::settings::{Region, Settings};

mod tesseract;

pub use tesseract::TesseractInspector;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("image not found: {}", .0.display())]
    ImageNotFound(PathBuf),

    #[error("unsupported on this host: {0}")]
    UnsupportedPlatform(String),

    #[error("region {region:?} lies outside {width}x{height} image {}", .path.display())]
    RegionOutOfBounds {
        path: PathBuf,
        region: Region,
        width: u32,
        height: u32,
    },

    #[error("failed to decode {}: {reason}", .path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("text recognition failed for {}: {reason}", .path.display())]
    Ocr { path: PathBuf, reason: String },

    #[error("text recognition timed out after {secs}s for {}", .path.display())]
    Timeout { path: PathBuf, secs: u64 },
}

/// Image decoding and text recognition, kept behind a trait so the
/// pipeline does not depend on a particular OCR engine.
pub trait ImageInspector {
    fn dimensions(&self, image_path: &Path) -> Result<(u32, u32), ClassifyError>;

    fn recognize_region(&self, image_path: &Path, region: Region) -> Result<String, ClassifyError>;
}

pub struct ImageClassifier<I> {
    inspector: I,
    pass_marker: String,
    fail_marker: String,
    ocr_marker: String,
    region: Region,
}

impl<I: ImageInspector> ImageClassifier<I> {
    pub fn new(inspector: I, settings: &Settings) -> Self {
        Self {
            inspector,
            pass_marker: settings.pass_marker.clone(),
            fail_marker: settings.fail_marker.clone(),
            ocr_marker: settings.ocr_marker.clone(),
            region: settings.ocr_region,
        }
    }

    pub fn classify_filename(&self, path: &str) -> Verdict {
        classify_filename(path, &self.pass_marker, &self.fail_marker)
    }

    /// Marker text stored in the `pass_fail` column.
    pub fn verdict_label(&self, verdict: Verdict) -> &str {
        match verdict {
            Verdict::Pass => &self.pass_marker,
            Verdict::Fail => &self.fail_marker,
            Verdict::Unknown => "",
        }
    }

    pub fn count_marker_in_region(
        &self,
        marker: &str,
        image_path: &Path,
        region: Region,
    ) -> Result<usize, ClassifyError> {
        if !image_path.is_file() {
            return Err(ClassifyError::ImageNotFound(image_path.to_path_buf()));
        }
        let text = self.inspector.recognize_region(image_path, region)?;
        Ok(count_marker(&text, marker))
    }

    /// `OK` when the configured marker never appears in the configured region.
    pub fn ocr_judgement(&self, image_path: &Path) -> Result<Judgement, ClassifyError> {
        let count = self.count_marker_in_region(&self.ocr_marker, image_path, self.region)?;
        Ok(if count == 0 { Judgement::Ok } else { Judgement::Ng })
    }

    pub fn image_dimensions(&self, image_path: &Path) -> Result<(u32, u32), ClassifyError> {
        if !image_path.is_file() {
            return Err(ClassifyError::ImageNotFound(image_path.to_path_buf()));
        }
        self.inspector.dimensions(image_path)
    }
}

/// Pass is checked first. When the fail marker contains the pass marker
/// (合格 inside 不合格), occurrences inside a fail marker do not count as pass.
pub fn classify_filename(path: &str, pass_marker: &str, fail_marker: &str) -> Verdict {
    let pass_source = if !fail_marker.is_empty() && fail_marker.contains(pass_marker) {
        path.replace(fail_marker, "\u{0}")
    } else {
        path.to_string()
    };

    if !pass_marker.is_empty() && pass_source.contains(pass_marker) {
        Verdict::Pass
    } else if !fail_marker.is_empty() && path.contains(fail_marker) {
        Verdict::Fail
    } else {
        Verdict::Unknown
    }
}

/// Non-overlapping occurrences of `marker` in `text`.
pub fn count_marker(text: &str, marker: &str) -> usize {
    if marker.is_empty() {
        return 0;
    }
    text.split(marker).count() - 1
}
