use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Result, bail};
use chrono::Utc;
use tracing::{info, warn};

use super::csv_results::reconcile_csv;
use super::discovery::{discover_csv_files, discover_lot_folders};
use super::screenshots::ingest_screenshots;
use super::session::{Flow, Session};
use crate::cancel::CancelToken;
use crate::classify::{ImageInspector, TesseractInspector};
use crate::cli::IngestArgs;
use crate::model::{RunManifest, RunPaths, RunStatus};
use crate::settings::Settings;
use crate::store::Store;
use crate::tracker::ChangeTracker;
use crate::util::{ensure_directory, now_utc_string, utc_compact_string, write_json_pretty};

pub const FOLDER_TRACKER_FILE: &str = "completed_folders.json";
pub const FILE_TRACKER_FILE: &str = "completed_files.json";

pub fn run(args: IngestArgs) -> Result<()> {
    let started_ts = Utc::now();
    let started_at = now_utc_string();
    let run_id = format!("run-{}", utc_compact_string(started_ts));

    let data_root = args.data_root.clone();
    ensure_directory(&data_root)?;
    let manifest_dir = data_root.join("manifests");

    let settings_path = args
        .settings_path
        .clone()
        .unwrap_or_else(|| data_root.join("settings.json"));

    let Some(settings) = Settings::load(&settings_path)? else {
        Settings::default().save(&settings_path)?;
        warn!(
            path = %settings_path.display(),
            "no settings found; wrote defaults, review them and rerun"
        );
        return Ok(());
    };

    let tessdata_dir = settings.resolved_tessdata_dir(&data_root);
    if !args.skip_screenshots && !tessdata_dir.is_dir() {
        bail!(
            "required OCR data directory is missing: {}",
            tessdata_dir.display()
        );
    }

    let db_path = settings.resolved_db_path(&data_root);
    let store = Store::open(&db_path)?;

    let folder_tracker = ChangeTracker::load(&data_root.join(FOLDER_TRACKER_FILE))?;
    let file_tracker = ChangeTracker::load(&data_root.join(FILE_TRACKER_FILE))?;

    let inspector = TesseractInspector::new(
        tessdata_dir,
        settings.ocr_lang.clone(),
        settings.ocr_timeout_secs.map(Duration::from_secs),
    );

    let cancel = CancelToken::new();
    cancel.watch_stdin();

    info!(data_root = %data_root.display(), run_id = %run_id, "starting ingest");

    let mut session = Session::new(settings, store, inspector, folder_tracker, file_tracker, cancel);
    let status = run_pipelines(&mut session, args.skip_screenshots, args.skip_csv)?;

    let paths = RunPaths {
        data_root: data_root.display().to_string(),
        settings_path: settings_path.display().to_string(),
        screenshot_root: session.settings.screenshot_root.display().to_string(),
        csv_root: session.settings.csv_root.display().to_string(),
        db_path: db_path.display().to_string(),
    };

    let manifest = RunManifest {
        manifest_version: 1,
        run_id: run_id.clone(),
        status,
        started_at,
        finished_at: now_utc_string(),
        paths,
        counts: session.counts.clone(),
        warnings: session.warnings.clone(),
    };
    let manifest_path = manifest_dir.join(format!("run_{}.json", utc_compact_string(started_ts)));
    write_json_pretty(&manifest_path, &manifest)?;

    info!(path = %manifest_path.display(), "wrote run manifest");
    info!(
        status = ?status,
        folders_processed = session.counts.folders_processed,
        folders_incomplete = session.counts.folders_incomplete,
        images_inserted = session.counts.images_inserted,
        csv_rows_inserted = session.counts.csv_rows_inserted,
        csv_rows_updated = session.counts.csv_rows_updated,
        "ingest finished"
    );

    Ok(())
}

/// Screenshots first, then CSV results; a cancellation stops both.
pub fn run_pipelines<I: ImageInspector>(
    session: &mut Session<I>,
    skip_screenshots: bool,
    skip_csv: bool,
) -> Result<RunStatus> {
    session.settings.resolve_roots()?;

    if !skip_screenshots {
        let folders = discover_lot_folders(
            &session.settings.screenshot_root,
            session.settings.lot_code_len,
        )?;
        info!(count = folders.len(), "discovered lot folders");

        if ingest_screenshots(session, &folders)? == Flow::Cancelled {
            return Ok(RunStatus::Cancelled);
        }
    }

    if !skip_csv {
        let files = discover_csv_files(&session.settings.csv_root);
        info!(count = files.len(), "discovered csv files");

        if reconcile_csv(session, &files)? == Flow::Cancelled {
            return Ok(RunStatus::Cancelled);
        }
    }

    Ok(RunStatus::Completed)
}

pub fn latest_manifest(manifest_dir: &Path) -> Option<PathBuf> {
    let entries = fs::read_dir(manifest_dir).ok()?;
    entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .map(|name| name.starts_with("run_") && name.ends_with(".json"))
                .unwrap_or(false)
        })
        .max()
}
