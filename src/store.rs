//! SQLite store for screenshot records and CSV result rows.
//!
//! Two tables:
//! - screenshot_list: append-only, deduplicated by full_path within a lot
//! - result_aoi: one row per (lot, slot), updated in place

use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, Transaction, params};

use crate::model::{CsvResultRow, ScreenshotRecord};
use crate::util::now_utc_string;

const DB_SCHEMA_VERSION: &str = "1.0.0";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(db_path: &Path) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&conn)?;
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        ensure_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Full paths already recorded for `lot`; the screenshot dedup key set.
    pub fn screenshot_paths_for_lot(&self, lot: &str) -> Result<HashSet<String>> {
        let mut statement = self
            .conn
            .prepare_cached("SELECT full_path FROM screenshot_list WHERE lot = ?1")?;
        let paths = statement
            .query_map(params![lot], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()
            .with_context(|| format!("failed to load screenshot paths for lot {lot}"))?;
        Ok(paths)
    }

    pub fn insert_screenshot(&self, record: &ScreenshotRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO screenshot_list
                   (title, timestamp, lot, pass_fail, aoi_judgement, width, height, full_path)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    record.title,
                    record.timestamp,
                    record.lot,
                    record.pass_fail,
                    record.judgement,
                    record.width,
                    record.height,
                    record.full_path,
                ],
            )
            .with_context(|| format!("failed to insert screenshot {}", record.full_path))?;
        Ok(())
    }

    pub fn transaction(&mut self) -> Result<Transaction<'_>> {
        self.conn
            .transaction()
            .context("failed to begin transaction")
    }

    #[cfg(test)]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn screenshot_count(&self) -> Result<i64> {
        count_rows(&self.conn, "SELECT COUNT(*) FROM screenshot_list")
    }

    pub fn result_count(&self) -> Result<i64> {
        count_rows(&self.conn, "SELECT COUNT(*) FROM result_aoi")
    }

    #[cfg(test)]
    pub fn find_result(&self, lot: &str, slot: &str) -> Result<Option<CsvResultRow>> {
        use rusqlite::OptionalExtension;

        let row = self
            .conn
            .query_row(
                "SELECT lot, slot, class020, class025, class029, class050, class104,
                        class300, class500, total, judge, comment
                 FROM result_aoi WHERE lot = ?1 AND slot = ?2",
                params![lot, slot],
                |row| {
                    Ok(CsvResultRow {
                        lot: row.get(0)?,
                        slot: row.get(1)?,
                        class020: row.get(2)?,
                        class025: row.get(3)?,
                        class029: row.get(4)?,
                        class050: row.get(5)?,
                        class104: row.get(6)?,
                        class300: row.get(7)?,
                        class500: row.get(8)?,
                        total: row.get(9)?,
                        judge: row.get(10)?,
                        comment: row.get(11)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    }
}

pub fn result_exists(conn: &Connection, lot: &str, slot: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM result_aoi WHERE lot = ?1 AND slot = ?2",
        params![lot, slot],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub fn insert_result(conn: &Connection, row: &CsvResultRow) -> Result<()> {
    conn.execute(
        "INSERT INTO result_aoi
           (lot, slot, class020, class025, class029, class050, class104,
            class300, class500, total, judge, comment)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            row.lot,
            row.slot,
            row.class020,
            row.class025,
            row.class029,
            row.class050,
            row.class104,
            row.class300,
            row.class500,
            row.total,
            row.judge,
            row.comment,
        ],
    )
    .with_context(|| format!("failed to insert result {}/{}", row.lot, row.slot))?;
    Ok(())
}

pub fn update_result(conn: &Connection, row: &CsvResultRow) -> Result<()> {
    conn.execute(
        "UPDATE result_aoi SET
           class020 = ?3, class025 = ?4, class029 = ?5, class050 = ?6, class104 = ?7,
           class300 = ?8, class500 = ?9, total = ?10, judge = ?11, comment = ?12
         WHERE lot = ?1 AND slot = ?2",
        params![
            row.lot,
            row.slot,
            row.class020,
            row.class025,
            row.class029,
            row.class050,
            row.class104,
            row.class300,
            row.class500,
            row.total,
            row.judge,
            row.comment,
        ],
    )
    .with_context(|| format!("failed to update result {}/{}", row.lot, row.slot))?;
    Ok(())
}

/// Update when (lot, slot) exists, insert otherwise.
pub fn upsert_result(conn: &Connection, row: &CsvResultRow) -> Result<UpsertOutcome> {
    if result_exists(conn, &row.lot, &row.slot)? {
        update_result(conn, row)?;
        Ok(UpsertOutcome::Updated)
    } else {
        insert_result(conn, row)?;
        Ok(UpsertOutcome::Inserted)
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS metadata (
          key TEXT PRIMARY KEY,
          value TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS screenshot_list (
          id INTEGER PRIMARY KEY AUTOINCREMENT,
          title TEXT NOT NULL,
          timestamp TEXT NOT NULL,
          lot TEXT NOT NULL,
          pass_fail TEXT NOT NULL,
          aoi_judgement TEXT NOT NULL,
          width INTEGER NOT NULL,
          height INTEGER NOT NULL,
          full_path TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS result_aoi (
          lot TEXT NOT NULL,
          slot TEXT NOT NULL,
          class020 INTEGER NOT NULL,
          class025 INTEGER NOT NULL,
          class029 INTEGER NOT NULL,
          class050 INTEGER NOT NULL,
          class104 INTEGER NOT NULL,
          class300 INTEGER NOT NULL,
          class500 INTEGER NOT NULL,
          total INTEGER NOT NULL,
          judge TEXT NOT NULL,
          comment TEXT NOT NULL,
          PRIMARY KEY (lot, slot)
        );

        CREATE INDEX IF NOT EXISTS idx_screenshot_list_lot ON screenshot_list(lot);
        ",
    )
    .context("failed to initialize schema")?;

    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_schema_version', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [DB_SCHEMA_VERSION],
    )?;
    connection.execute(
        "INSERT INTO metadata(key, value) VALUES('db_opened_at', ?1)
         ON CONFLICT(key) DO UPDATE SET value=excluded.value",
        [now_utc_string()],
    )?;

    Ok(())
}

fn count_rows(connection: &Connection, sql: &str) -> Result<i64> {
    let count = connection.query_row(sql, [], |row| row.get(0))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;

    fn result_row(total: i64, judge: &str) -> CsvResultRow {
        CsvResultRow {
            lot: "910963".to_string(),
            slot: "S1".to_string(),
            class020: 1,
            class025: 2,
            class029: 3,
            class050: 4,
            class104: 5,
            class300: 6,
            class500: 7,
            total,
            judge: judge.to_string(),
            comment: String::new(),
        }
    }

    #[test]
    fn screenshot_paths_are_scoped_to_lot() {
        let store = Store::open_in_memory().unwrap();
        let record = ScreenshotRecord {
            title: "910963".to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap(),
            lot: "910963".to_string(),
            pass_fail: "合格".to_string(),
            judgement: "OK|OK".to_string(),
            width: 1280,
            height: 1024,
            full_path: "/shots/910963/AOI/合格/1.jpeg".to_string(),
        };
        store.insert_screenshot(&record).unwrap();

        let paths = store.screenshot_paths_for_lot("910963").unwrap();
        assert!(paths.contains("/shots/910963/AOI/合格/1.jpeg"));
        assert!(store.screenshot_paths_for_lot("910964").unwrap().is_empty());
        assert_eq!(store.screenshot_count().unwrap(), 1);
    }

    #[test]
    fn upsert_inserts_then_updates_same_key() {
        let mut store = Store::open_in_memory().unwrap();

        {
            let tx = store.transaction().unwrap();
            assert_eq!(upsert_result(&tx, &result_row(28, "OK")).unwrap(), UpsertOutcome::Inserted);
            tx.commit().unwrap();
        }
        {
            let tx = store.transaction().unwrap();
            assert_eq!(upsert_result(&tx, &result_row(30, "NG")).unwrap(), UpsertOutcome::Updated);
            tx.commit().unwrap();
        }

        assert_eq!(store.result_count().unwrap(), 1);
        let stored = store.find_result("910963", "S1").unwrap().unwrap();
        assert_eq!(stored.total, 30);
        assert_eq!(stored.judge, "NG");
    }
}
