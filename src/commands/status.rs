use std::fs;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::cli::StatusArgs;
use crate::commands::ingest::{FILE_TRACKER_FILE, FOLDER_TRACKER_FILE, latest_manifest};
use crate::model::RunManifestSummary;
use crate::settings::Settings;
use crate::store::Store;
use crate::tracker::ChangeTracker;

pub fn run(args: StatusArgs) -> Result<()> {
    let data_root = args.data_root;
    let settings_path = args
        .settings_path
        .unwrap_or_else(|| data_root.join("settings.json"));

    info!(data_root = %data_root.display(), "status requested");

    let settings = match Settings::load(&settings_path)? {
        Some(settings) => {
            info!(
                path = %settings_path.display(),
                screenshot_root = %settings.screenshot_root.display(),
                csv_root = %settings.csv_root.display(),
                "loaded settings"
            );
            settings
        }
        None => {
            warn!(path = %settings_path.display(), "settings file missing, using defaults");
            Settings::default()
        }
    };

    for name in [FOLDER_TRACKER_FILE, FILE_TRACKER_FILE] {
        let tracker = ChangeTracker::load(&data_root.join(name))?;
        info!(path = %tracker.path().display(), entries = tracker.len(), "tracker");
    }

    match latest_manifest(&data_root.join("manifests")) {
        Some(manifest_path) => {
            let raw = fs::read(&manifest_path)
                .with_context(|| format!("failed to read {}", manifest_path.display()))?;
            let summary: RunManifestSummary = serde_json::from_slice(&raw)
                .with_context(|| format!("failed to parse {}", manifest_path.display()))?;

            info!(
                run_id = %summary.run_id,
                status = %summary.status,
                finished_at = %summary.finished_at,
                folders_processed = summary.counts.folders_processed,
                folders_incomplete = summary.counts.folders_incomplete,
                images_inserted = summary.counts.images_inserted,
                images_failed = summary.counts.images_failed,
                csv_rows_inserted = summary.counts.csv_rows_inserted,
                csv_rows_updated = summary.counts.csv_rows_updated,
                csv_rows_malformed = summary.counts.csv_rows_malformed,
                "latest run"
            );
        }
        None => warn!("no run manifest found"),
    }

    let db_path = settings.resolved_db_path(&data_root);
    if db_path.exists() {
        let store = Store::open(&db_path)?;
        info!(
            path = %db_path.display(),
            screenshots = store.screenshot_count()?,
            results = store.result_count()?,
            "database status"
        );
    } else {
        warn!(path = %db_path.display(), "database file missing");
    }

    Ok(())
}
