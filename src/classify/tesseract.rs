use std::fs;
use std::io::{ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use image::ImageError;
use tracing::debug;

use super::{ClassifyError, ImageInspector};
use crate::settings::Region;

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Crops with the `image` crate and reads text with the `tesseract` executable.
#[derive(Debug, Clone)]
pub struct TesseractInspector {
    tessdata_dir: PathBuf,
    lang: String,
    timeout: Option<Duration>,
}

impl TesseractInspector {
    pub fn new(tessdata_dir: PathBuf, lang: String, timeout: Option<Duration>) -> Self {
        Self {
            tessdata_dir,
            lang,
            timeout,
        }
    }

    fn run_tesseract(&self, image_path: &Path, png_path: &Path, out_base: &Path) -> Result<String, ClassifyError> {
        let mut command = Command::new("tesseract");
        command
            .arg(png_path)
            .arg(out_base)
            .arg("-l")
            .arg(&self.lang)
            .arg("--tessdata-dir")
            .arg(&self.tessdata_dir);

        let (status, stderr) = run_captured(command, self.timeout, image_path)?;

        if !status.success() {
            return Err(ClassifyError::Ocr {
                path: image_path.to_path_buf(),
                reason: format!("tesseract exited with {status}: {}", stderr.trim()),
            });
        }

        let text_path = PathBuf::from(format!("{}.txt", out_base.display()));
        let text = fs::read(&text_path).map_err(|err| ClassifyError::Ocr {
            path: image_path.to_path_buf(),
            reason: format!("missing tesseract output {}: {err}", text_path.display()),
        })?;
        let _ = fs::remove_file(&text_path);

        Ok(String::from_utf8_lossy(&text).replace('\u{0000}', ""))
    }
}

/// Runs `command` to completion and returns its exit status with everything it
/// wrote to stderr. Stderr is drained on its own thread so a chatty child never
/// stalls on a full pipe.
fn run_captured(
    mut command: Command,
    timeout: Option<Duration>,
    image_path: &Path,
) -> Result<(ExitStatus, String), ClassifyError> {
    let program = command.get_program().to_string_lossy().into_owned();
    let mut child = command
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|err| {
            if err.kind() == ErrorKind::NotFound {
                ClassifyError::UnsupportedPlatform(format!("{program} executable not found"))
            } else {
                ClassifyError::Ocr {
                    path: image_path.to_path_buf(),
                    reason: format!("failed to execute {program}: {err}"),
                }
            }
        })?;

    let drain = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut captured = String::new();
            let _ = pipe.read_to_string(&mut captured);
            captured
        })
    });

    let status = wait_for(&mut child, timeout, image_path)?;
    let stderr = drain
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default();

    Ok((status, stderr))
}

fn wait_for(child: &mut Child, timeout: Option<Duration>, image_path: &Path) -> Result<ExitStatus, ClassifyError> {
    let wait_error = |err: std::io::Error| ClassifyError::Ocr {
        path: image_path.to_path_buf(),
        reason: format!("failed waiting for child process: {err}"),
    };

    let Some(timeout) = timeout else {
        return child.wait().map_err(wait_error);
    };

    let started = Instant::now();
    loop {
        if let Some(status) = child.try_wait().map_err(wait_error)? {
            return Ok(status);
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ClassifyError::Timeout {
                path: image_path.to_path_buf(),
                secs: timeout.as_secs(),
            });
        }
        thread::sleep(POLL_INTERVAL);
    }
}

impl ImageInspector for TesseractInspector {
    fn dimensions(&self, image_path: &Path) -> Result<(u32, u32), ClassifyError> {
        image::image_dimensions(image_path).map_err(|err| image_error(image_path, err))
    }

    fn recognize_region(&self, image_path: &Path, region: Region) -> Result<String, ClassifyError> {
        let decoded = image::open(image_path).map_err(|err| image_error(image_path, err))?;

        if !region.fits_within(decoded.width(), decoded.height()) {
            return Err(ClassifyError::RegionOutOfBounds {
                path: image_path.to_path_buf(),
                region,
                width: decoded.width(),
                height: decoded.height(),
            });
        }

        let cropped = decoded.crop_imm(region.x, region.y, region.width, region.height);

        let stamp = Utc::now().timestamp_nanos_opt().unwrap_or_default();
        let out_base = std::env::temp_dir().join(format!(
            "aoi_tracker_ocr_{}_{}",
            std::process::id(),
            stamp
        ));
        let png_path = PathBuf::from(format!("{}.png", out_base.display()));

        cropped.save(&png_path).map_err(|err| ClassifyError::Decode {
            path: image_path.to_path_buf(),
            reason: format!("failed to write crop {}: {err}", png_path.display()),
        })?;

        let result = self.run_tesseract(image_path, &png_path, &out_base);
        let _ = fs::remove_file(&png_path);

        if let Ok(text) = &result {
            debug!(path = %image_path.display(), chars = text.chars().count(), "recognized region");
        }
        result
    }
}

fn image_error(image_path: &Path, err: ImageError) -> ClassifyError {
    match err {
        ImageError::IoError(io) if io.kind() == ErrorKind::NotFound => {
            ClassifyError::ImageNotFound(image_path.to_path_buf())
        }
        ImageError::Unsupported(unsupported) => {
            ClassifyError::UnsupportedPlatform(format!("{}: {unsupported}", image_path.display()))
        }
        other => ClassifyError::Decode {
            path: image_path.to_path_buf(),
            reason: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use image::{Rgb, RgbImage};

    use super::*;

    fn inspector() -> TesseractInspector {
        TesseractInspector::new(PathBuf::from("/nonexistent/tessdata"), "jpn".to_string(), None)
    }

    #[test]
    fn dimensions_reads_image_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("AOI_合格.png");
        RgbImage::from_pixel(64, 48, Rgb([255, 255, 255])).save(&path).unwrap();

        assert_eq!(inspector().dimensions(&path).unwrap(), (64, 48));
    }

    #[test]
    fn missing_file_maps_to_image_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = inspector().dimensions(&dir.path().join("none.jpeg")).unwrap_err();
        assert!(matches!(err, ClassifyError::ImageNotFound(_)));
    }

    #[cfg(unix)]
    #[test]
    fn stderr_larger_than_a_pipe_buffer_does_not_stall() {
        let mut command = Command::new("sh");
        command.args(["-c", "head -c 200000 /dev/zero | tr '\\0' x >&2; exit 3"]);

        let (status, stderr) = run_captured(command, Some(Duration::from_secs(30)), Path::new("a.jpeg")).unwrap();

        assert_eq!(status.code(), Some(3));
        assert_eq!(stderr.len(), 200_000);
    }

    #[cfg(unix)]
    #[test]
    fn slow_child_is_killed_after_timeout() {
        let mut command = Command::new("sh");
        command.args(["-c", "exec sleep 10"]);

        let err = run_captured(command, Some(Duration::from_millis(100)), Path::new("a.jpeg")).unwrap_err();
        assert!(matches!(err, ClassifyError::Timeout { .. }));
    }

    #[test]
    fn missing_executable_is_unsupported_platform() {
        let command = Command::new("aoi-tracker-no-such-ocr-binary");
        let err = run_captured(command, None, Path::new("a.jpeg")).unwrap_err();
        assert!(matches!(err, ClassifyError::UnsupportedPlatform(_)));
    }

    #[test]
    fn region_outside_image_is_rejected_before_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("small.png");
        RgbImage::from_pixel(640, 480, Rgb([0, 0, 0])).save(&path).unwrap();

        let err = inspector().recognize_region(&path, Region::default()).unwrap_err();
        assert!(matches!(
            err,
            ClassifyError::RegionOutOfBounds { width: 640, height: 480, .. }
        ));
    }
}
