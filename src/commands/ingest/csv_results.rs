use std::borrow::Cow;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::session::{Flow, Session};
use crate::classify::ImageInspector;
use crate::model::CsvResultRow;
use crate::settings::MalformedRowPolicy;
use crate::store::{Store, UpsertOutcome, upsert_result};
use crate::util::modified_utc;

const LOT_FIELD: usize = 4;
const SLOT_FIELD: usize = 5;
const FIRST_CLASS_FIELD: usize = 6;
const TOTAL_FIELD: usize = 13;
const JUDGE_FIELD: usize = 14;
const COMMENT_FIELD: usize = 15;
const MIN_FIELDS: usize = COMMENT_FIELD + 1;

const CLASS_NAMES: [&str; 7] = [
    "class020", "class025", "class029", "class050", "class104", "class300", "class500",
];

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MalformedRow {
    #[error("line {line}: expected at least {expected} fields, found {found}")]
    TooFewFields {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: {name} (column {index}) is not an integer: {value:?}")]
    NotInteger {
        line: usize,
        index: usize,
        name: &'static str,
        value: String,
    },

    #[error("line {line}: empty {name}")]
    EmptyKey { line: usize, name: &'static str },
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FileStats {
    pub inserted: usize,
    pub updated: usize,
    pub malformed: usize,
    /// Bytes that were not valid UTF-8 were replaced while reading.
    pub lossy_text: bool,
}

#[derive(Debug)]
pub enum FileOutcome {
    Applied(FileStats),
    /// A malformed row under the abort policy; nothing from the file was kept.
    Rejected(MalformedRow),
}

/// Upserts rows from every CSV file that changed since it was last marked.
pub fn reconcile_csv<I: ImageInspector>(session: &mut Session<I>, files: &[PathBuf]) -> Result<Flow> {
    let policy = session.settings.malformed_rows;

    for file in files {
        if session.cancel.is_cancelled() {
            return Ok(Flow::Cancelled);
        }

        session.counts.csv_files_seen += 1;
        let file_key = file.to_string_lossy().into_owned();

        let current = match modified_utc(file) {
            Ok(time) => time,
            Err(err) => {
                warn!(path = %file.display(), error = %err, "csv file vanished, skipping");
                session.warnings.push(format!("{err:#}"));
                continue;
            }
        };

        if session.file_tracker.is_up_to_date(&file_key, current) {
            debug!(path = %file.display(), "csv file already processed");
            session.counts.csv_files_up_to_date += 1;
            continue;
        }

        match reconcile_file(&mut session.store, file, policy)? {
            FileOutcome::Applied(stats) => {
                session.counts.csv_rows_inserted += stats.inserted;
                session.counts.csv_rows_updated += stats.updated;
                session.counts.csv_rows_malformed += stats.malformed;
                session.counts.csv_files_processed += 1;
                if stats.lossy_text {
                    session
                        .warnings
                        .push(format!("{}: not valid UTF-8, text fields decoded lossily", file.display()));
                }

                // the CSV stream records the time observed after processing
                let processed_time = modified_utc(file)?;
                session.file_tracker.mark_processed(&file_key, processed_time)?;

                info!(
                    path = %file.display(),
                    inserted = stats.inserted,
                    updated = stats.updated,
                    malformed = stats.malformed,
                    "reconciled csv file"
                );
            }
            FileOutcome::Rejected(row_error) => {
                warn!(path = %file.display(), error = %row_error, "csv file rolled back");
                session.counts.csv_rows_malformed += 1;
                session.counts.csv_files_failed += 1;
                session
                    .warnings
                    .push(format!("{}: {row_error}", file.display()));
            }
        }
    }

    Ok(Flow::Finished)
}

/// Applies one file inside a single transaction.
pub fn reconcile_file(store: &mut Store, path: &Path, policy: MalformedRowPolicy) -> Result<FileOutcome> {
    let raw = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let content = String::from_utf8_lossy(&raw);

    let tx = store.transaction()?;
    let mut stats = FileStats::default();

    if let Cow::Owned(_) = content {
        warn!(
            path = %path.display(),
            "csv file is not valid UTF-8; undecodable bytes replaced with U+FFFD"
        );
        stats.lossy_text = true;
    }

    for (index, line) in content.lines().enumerate().skip(1) {
        if line.trim().is_empty() {
            continue;
        }
        let line_number = index + 1;

        let row = match parse_row(line, line_number) {
            Ok(row) => row,
            Err(err) => match policy {
                MalformedRowPolicy::Skip => {
                    warn!(path = %path.display(), error = %err, "skipping malformed row");
                    stats.malformed += 1;
                    continue;
                }
                MalformedRowPolicy::Abort => return Ok(FileOutcome::Rejected(err)),
            },
        };

        match upsert_result(&tx, &row)? {
            UpsertOutcome::Inserted => stats.inserted += 1,
            UpsertOutcome::Updated => stats.updated += 1,
        }
    }

    tx.commit()
        .with_context(|| format!("failed to commit rows from {}", path.display()))?;

    Ok(FileOutcome::Applied(stats))
}

/// Splits on commas and reads the fixed column positions.
pub fn parse_row(line: &str, line_number: usize) -> Result<CsvResultRow, MalformedRow> {
    let fields: Vec<&str> = line.split(',').map(str::trim).collect();

    if fields.len() < MIN_FIELDS {
        return Err(MalformedRow::TooFewFields {
            line: line_number,
            expected: MIN_FIELDS,
            found: fields.len(),
        });
    }

    let lot = fields[LOT_FIELD];
    if lot.is_empty() {
        return Err(MalformedRow::EmptyKey { line: line_number, name: "lot" });
    }
    let slot = fields[SLOT_FIELD];
    if slot.is_empty() {
        return Err(MalformedRow::EmptyKey { line: line_number, name: "slot" });
    }

    let integer = |index: usize, name: &'static str| -> Result<i64, MalformedRow> {
        fields[index].parse::<i64>().map_err(|_| MalformedRow::NotInteger {
            line: line_number,
            index,
            name,
            value: fields[index].to_string(),
        })
    };

    let mut classes = [0_i64; 7];
    for (offset, &name) in CLASS_NAMES.iter().enumerate() {
        classes[offset] = integer(FIRST_CLASS_FIELD + offset, name)?;
    }

    Ok(CsvResultRow {
        lot: lot.to_string(),
        slot: slot.to_string(),
        class020: classes[0],
        class025: classes[1],
        class029: classes[2],
        class050: classes[3],
        class104: classes[4],
        class300: classes[5],
        class500: classes[6],
        total: integer(TOTAL_FIELD, "total")?,
        judge: fields[JUDGE_FIELD].to_string(),
        comment: fields[COMMENT_FIELD].to_string(),
    })
}
