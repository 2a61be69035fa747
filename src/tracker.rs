//! Persistent record of which folders and files have been fully processed.
//!
//! An item is up to date when its stored timestamp equals the modification
//! time observed now. Entries are updated in place keyed by path and written
//! through to disk on every change, so an interrupted run only loses the item
//! that was in flight.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::model::TrackerEntry;
use crate::util::write_json_pretty;

#[derive(Debug)]
pub struct ChangeTracker {
    path: PathBuf,
    entries: Vec<TrackerEntry>,
    index: HashMap<String, usize>,
}

impl ChangeTracker {
    /// A missing file is an empty tracker.
    pub fn load(path: &Path) -> Result<Self> {
        let entries: Vec<TrackerEntry> = if path.exists() {
            let raw = fs::read(path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", path.display()))?
        } else {
            debug!(path = %path.display(), "tracker file missing, starting empty");
            Vec::new()
        };

        let mut tracker = Self {
            path: path.to_path_buf(),
            entries: Vec::with_capacity(entries.len()),
            index: HashMap::new(),
        };

        // older files may hold repeated paths; the last one wins
        for entry in entries {
            tracker.upsert(entry);
        }

        Ok(tracker)
    }

    pub fn save(&self) -> Result<()> {
        write_json_pretty(&self.path, &self.entries)
    }

    pub fn is_up_to_date(&self, item_path: &str, current: DateTime<Utc>) -> bool {
        self.index
            .get(item_path)
            .map(|&slot| self.entries[slot].timestamp == current)
            .unwrap_or(false)
    }

    /// Records `item_path` as processed at `current` and flushes to disk.
    pub fn mark_processed(&mut self, item_path: &str, current: DateTime<Utc>) -> Result<()> {
        self.upsert(TrackerEntry {
            item_path: item_path.to_string(),
            timestamp: current,
        });
        self.save()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn upsert(&mut self, entry: TrackerEntry) {
        match self.index.get(&entry.item_path) {
            Some(&slot) => self.entries[slot].timestamp = entry.timestamp,
            None => {
                self.index
                    .insert(entry.item_path.clone(), self.entries.len());
                self.entries.push(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn precise(nanos: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap() + chrono::Duration::nanoseconds(nanos as i64)
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = ChangeTracker::load(&dir.path().join("absent.json")).unwrap();
        assert!(tracker.is_empty());
        assert!(!tracker.is_up_to_date("/shots/910963", precise(0)));
    }

    #[test]
    fn up_to_date_requires_exact_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::load(&dir.path().join("folders.json")).unwrap();

        tracker.mark_processed("/shots/910963", precise(123_456_789)).unwrap();

        assert!(tracker.is_up_to_date("/shots/910963", precise(123_456_789)));
        assert!(!tracker.is_up_to_date("/shots/910963", precise(123_456_788)));
        assert!(!tracker.is_up_to_date("/shots/910964", precise(123_456_789)));
    }

    #[test]
    fn mark_processed_updates_in_place() {
        let dir = tempfile::tempdir().unwrap();
        let mut tracker = ChangeTracker::load(&dir.path().join("folders.json")).unwrap();

        tracker.mark_processed("/shots/910963", precise(1)).unwrap();
        tracker.mark_processed("/shots/910964", precise(1)).unwrap();
        tracker.mark_processed("/shots/910963", precise(2)).unwrap();

        assert_eq!(tracker.len(), 2);
        assert!(tracker.is_up_to_date("/shots/910963", precise(2)));
        assert!(!tracker.is_up_to_date("/shots/910963", precise(1)));
    }

    #[test]
    fn persisted_form_round_trips_sub_second_precision() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("files.json");

        let mut tracker = ChangeTracker::load(&path).unwrap();
        tracker.mark_processed("/csv/a.csv", precise(987_654_321)).unwrap();
        tracker.mark_processed("/csv/b.csv", precise(5)).unwrap();

        let reloaded = ChangeTracker::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.is_up_to_date("/csv/a.csv", precise(987_654_321)));
        assert!(reloaded.is_up_to_date("/csv/b.csv", precise(5)));

        let raw: Vec<TrackerEntry> =
            serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(raw[0].item_path, "/csv/a.csv");
        assert_eq!(raw[1].item_path, "/csv/b.csv");
    }

    #[test]
    fn duplicate_entries_in_file_collapse_to_last() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folders.json");
        let entries = vec![
            TrackerEntry { item_path: "/shots/910963".into(), timestamp: precise(1) },
            TrackerEntry { item_path: "/shots/910963".into(), timestamp: precise(9) },
        ];
        write_json_pretty(&path, &entries).unwrap();

        let tracker = ChangeTracker::load(&path).unwrap();
        assert_eq!(tracker.len(), 1);
        assert!(tracker.is_up_to_date("/shots/910963", precise(9)));
    }
}
