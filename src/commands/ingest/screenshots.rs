use std::collections::HashSet;
use std::path::{Path, PathBuf};

use anyhow::Result;
use tracing::{debug, info, warn};

use super::discovery::{has_csv_sibling, list_images};
use super::session::{Flow, Session};
use crate::classify::{ImageClassifier, ImageInspector};
use crate::model::{Judgement, LotFolder, ScreenshotRecord, Verdict, combined_judgement};
use crate::util::{created_utc, deepest_name, modified_utc};

/// Scans every lot folder that changed since it was last marked and inserts
/// records for qualifying screenshots not yet in the store.
pub fn ingest_screenshots<I: ImageInspector>(
    session: &mut Session<I>,
    folders: &[LotFolder],
) -> Result<Flow> {
    for folder in folders {
        if session.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }

        session.counts.folders_seen += 1;
        let folder_key = folder.path.to_string_lossy().into_owned();

        // captured once; reused for the tracker write so changes during the scan trigger a rescan
        let folder_time = match modified_utc(&folder.path) {
            Ok(time) => time,
            Err(err) => {
                warn!(folder = %folder.path.display(), error = %err, "lot folder vanished, skipping");
                session.warnings.push(format!("{err:#}"));
                continue;
            }
        };

        if session.folder_tracker.is_up_to_date(&folder_key, folder_time) {
            debug!(folder = %folder.path.display(), "lot folder already processed");
            session.counts.folders_up_to_date += 1;
            continue;
        }

        info!(folder = %folder.path.display(), lot = %folder.lot, "scanning lot folder");

        let failed_before = session.counts.images_failed;
        if ingest_folder(session, folder)? == Flow::Cancelled {
            info!(folder = %folder.path.display(), "stopped mid-folder, left unmarked");
            return Ok(Flow::Cancelled);
        }

        let failed = session.counts.images_failed - failed_before;
        if failed > 0 {
            warn!(
                folder = %folder.path.display(),
                failed,
                "lot folder left unmarked; failed images are retried next run"
            );
            session.counts.folders_incomplete += 1;
            continue;
        }

        session.folder_tracker.mark_processed(&folder_key, folder_time)?;
        session.counts.folders_processed += 1;
    }

    Ok(Flow::Finished)
}

fn ingest_folder<I: ImageInspector>(session: &mut Session<I>, folder: &LotFolder) -> Result<Flow> {
    let images = list_images(&folder.path, &session.settings.image_extensions);
    let title = deepest_name(&folder.path);

    let mut current_dir: Option<PathBuf> = None;
    let mut known_paths: HashSet<String> = HashSet::new();
    let mut aoi_judgement = Judgement::Ng;

    for image in images {
        if session.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }

        let full_path = image.to_string_lossy().into_owned();

        if !full_path.contains(session.settings.source_marker.as_str()) {
            session.counts.images_filtered += 1;
            continue;
        }

        let verdict = session.classifier.classify_filename(&full_path);
        if verdict == Verdict::Unknown {
            session.counts.images_filtered += 1;
            continue;
        }

        let image_dir = image.parent().unwrap_or(&folder.path).to_path_buf();
        if current_dir.as_ref() != Some(&image_dir) {
            aoi_judgement = if has_csv_sibling(&image_dir)? {
                Judgement::Ok
            } else {
                Judgement::Ng
            };
            known_paths = session.store.screenshot_paths_for_lot(&folder.lot)?;
            current_dir = Some(image_dir);
        }

        if known_paths.contains(&full_path) {
            debug!(path = %full_path, "already recorded");
            session.counts.images_already_present += 1;
            continue;
        }

        let record = match build_record(
            &session.classifier,
            &image,
            &title,
            &folder.lot,
            verdict,
            aoi_judgement,
        ) {
            Ok(record) => record,
            Err(err) => {
                warn!(path = %full_path, error = %err, "skipping image");
                session.counts.images_failed += 1;
                session.warnings.push(format!("{full_path}: {err:#}"));
                continue;
            }
        };

        session.store.insert_screenshot(&record)?;
        info!(
            path = %full_path,
            pass_fail = %record.pass_fail,
            judgement = %record.judgement,
            "recorded screenshot"
        );

        known_paths.insert(full_path);
        session.counts.images_inserted += 1;
    }

    Ok(Flow::Finished)
}

fn build_record<I: ImageInspector>(
    classifier: &ImageClassifier<I>,
    image: &Path,
    title: &str,
    lot: &str,
    verdict: Verdict,
    aoi_judgement: Judgement,
) -> Result<ScreenshotRecord> {
    let ocr_judgement = classifier.ocr_judgement(image)?;
    let (width, height) = classifier.image_dimensions(image)?;
    let timestamp = created_utc(image)?;

    Ok(ScreenshotRecord {
        title: title.to_string(),
        timestamp,
        lot: lot.to_string(),
        pass_fail: classifier.verdict_label(verdict).to_string(),
        judgement: combined_judgement(aoi_judgement, ocr_judgement),
        width,
        height,
        full_path: image.to_string_lossy().into_owned(),
    })
}
