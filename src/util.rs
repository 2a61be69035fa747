use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

pub fn now_utc_string() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

pub fn utc_compact_string(ts: DateTime<Utc>) -> String {
    ts.format("%Y%m%dT%H%M%SZ").to_string()
}

pub fn ensure_directory(path: &Path) -> Result<()> {
    fs::create_dir_all(path)
        .with_context(|| format!("failed to create directory: {}", path.display()))
}

/// Full-precision conversion; tracker equality depends on keeping the nanoseconds.
pub fn system_time_utc(time: SystemTime) -> DateTime<Utc> {
    DateTime::<Utc>::from(time)
}

pub fn modified_utc(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to read metadata: {}", path.display()))?;
    let modified = metadata
        .modified()
        .with_context(|| format!("failed to read modification time: {}", path.display()))?;
    Ok(system_time_utc(modified))
}

/// Creation time, or the modification time on filesystems that do not record birth time.
pub fn created_utc(path: &Path) -> Result<DateTime<Utc>> {
    let metadata = fs::metadata(path)
        .with_context(|| format!("failed to read metadata: {}", path.display()))?;
    let time = match metadata.created() {
        Ok(created) => created,
        Err(_) => metadata
            .modified()
            .with_context(|| format!("failed to read file times: {}", path.display()))?,
    };
    Ok(system_time_utc(time))
}

/// Absolute form of `path` against the working directory; an empty path stays empty.
pub fn absolute_path(path: &Path) -> Result<PathBuf> {
    if path.as_os_str().is_empty() {
        return Ok(PathBuf::new());
    }
    std::path::absolute(path)
        .with_context(|| format!("failed to resolve absolute path: {}", path.display()))
}

/// Final path component with trailing separators ignored.
pub fn deepest_name(path: &Path) -> String {
    path.components()
        .next_back()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .unwrap_or_default()
}

pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            extensions
                .iter()
                .any(|wanted| ext.eq_ignore_ascii_case(wanted.trim_start_matches('.')))
        })
        .unwrap_or(false)
}

pub fn write_json_pretty<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            ensure_directory(parent)?;
        }
    }

    let data = serde_json::to_vec_pretty(value)
        .with_context(|| format!("failed to serialize json: {}", path.display()))?;

    // write beside the target then rename, so an interrupted write never truncates it
    let staging = staging_path(path);
    {
        let mut file = File::create(&staging)
            .with_context(|| format!("failed to create json file: {}", staging.display()))?;
        file.write_all(&data)
            .with_context(|| format!("failed to write json file: {}", staging.display()))?;
        file.write_all(b"\n")
            .with_context(|| format!("failed to finalize json file: {}", staging.display()))?;
        file.sync_all()
            .with_context(|| format!("failed to flush json file: {}", staging.display()))?;
    }

    fs::rename(&staging, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            staging.display(),
            path.display()
        )
    })?;

    Ok(())
}

fn staging_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
