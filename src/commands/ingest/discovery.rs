use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;
use walkdir::WalkDir;

use crate::model::LotFolder;
use crate::util::{deepest_name, has_extension};

/// Immediate sub-directories of `root` whose name has exactly `lot_code_len` characters.
pub fn discover_lot_folders(root: &Path, lot_code_len: usize) -> Result<Vec<LotFolder>> {
    if root.as_os_str().is_empty() || !root.is_dir() {
        warn!(path = %root.display(), "screenshot root does not exist");
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))?;

    let mut folders = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", root.display()))?;
        let path = entry.path();

        if !entry
            .file_type()
            .with_context(|| format!("failed to inspect file type: {}", path.display()))?
            .is_dir()
        {
            continue;
        }

        let lot = deepest_name(&path);
        if lot.chars().count() == lot_code_len {
            folders.push(LotFolder { path, lot });
        }
    }

    folders.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(folders)
}

/// Every `*.csv` file below `root`, sorted by path.
pub fn discover_csv_files(root: &Path) -> Vec<PathBuf> {
    if root.as_os_str().is_empty() || !root.is_dir() {
        warn!(path = %root.display(), "csv root does not exist");
        return Vec::new();
    }

    let csv = ["csv".to_string()];
    walk_files(root)
        .into_iter()
        .filter(|path| has_extension(path, &csv))
        .collect()
}

/// Files below `dir` with one of `extensions`, in stable name order.
pub fn list_images(dir: &Path, extensions: &[String]) -> Vec<PathBuf> {
    walk_files(dir)
        .into_iter()
        .filter(|path| has_extension(path, extensions))
        .collect()
}

/// True when `dir` itself (not its children) holds a CSV file.
pub fn has_csv_sibling(dir: &Path) -> Result<bool> {
    let csv = ["csv".to_string()];
    let entries = fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))?;

    for entry in entries {
        let entry = entry.with_context(|| format!("failed to read entry in {}", dir.display()))?;
        let path = entry.path();
        if has_extension(&path, &csv) && path.is_file() {
            return Ok(true);
        }
    }

    Ok(false)
}

fn walk_files(root: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(root).follow_links(false).sort_by_file_name() {
        match entry {
            Ok(entry) => {
                if entry.file_type().is_file() {
                    files.push(entry.into_path());
                }
            }
            Err(err) => {
                let path = err
                    .path()
                    .map(|p| p.display().to_string())
                    .unwrap_or_else(|| "unknown path".to_string());
                warn!(path = %path, error = %err, "skipping unreadable entry");
            }
        }
    }

    files
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lot_folders_are_filtered_by_name_length() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["910963", "910964", "91096", "9109630", "archive"] {
            fs::create_dir(dir.path().join(name)).unwrap();
        }
        fs::write(dir.path().join("123456"), b"not a folder").unwrap();

        let folders = discover_lot_folders(dir.path(), 6).unwrap();
        let lots: Vec<_> = folders.iter().map(|f| f.lot.as_str()).collect();
        assert_eq!(lots, vec!["910963", "910964"]);
    }

    #[test]
    fn missing_roots_yield_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let absent = dir.path().join("absent");
        assert!(discover_lot_folders(&absent, 6).unwrap().is_empty());
        assert!(discover_csv_files(&absent).is_empty());
    }

    #[test]
    fn csv_files_are_found_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("2024").join("05")).unwrap();
        fs::write(dir.path().join("2024").join("05").join("b.csv"), b"").unwrap();
        fs::write(dir.path().join("a.CSV"), b"").unwrap();
        fs::write(dir.path().join("notes.txt"), b"").unwrap();

        let files = discover_csv_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|p| p.extension().is_some()));
    }

    #[test]
    fn csv_sibling_check_ignores_subdirectories() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("r.csv"), b"").unwrap();
        assert!(!has_csv_sibling(dir.path()).unwrap());

        fs::write(dir.path().join("r.csv"), b"").unwrap();
        assert!(has_csv_sibling(dir.path()).unwrap());
    }
}
