//! Detection persistence.
//!
//! The capture loop only appends through [`RecordStore`]; the dashboard reads
//! through [`SqliteRecordStore::open_read_only`]. Rows are keyed by an integer
//! id and stamped in epoch milliseconds.

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::snapshot::remove_snapshot_file;
use crate::{epoch_millis, open_db_connection, DetectionEvent};

/// Write side of the record store, as seen by the capture loop.
pub trait RecordStore {
    /// Persist one detection and return its surrogate id.
    fn append(&mut self, event: &DetectionEvent) -> Result<i64>;

    /// Delete detections older than `retention` relative to `now`, along with
    /// their snapshot files. Returns rows removed.
    fn enforce_retention(&mut self, _retention: Duration, _now: SystemTime) -> Result<usize> {
        Ok(0)
    }
}

/// A detection row read back from the store.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct StoredDetection {
    pub id: i64,
    pub plate_text: String,
    pub confidence: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: i64,
    /// UTC, `YYYY-MM-DD HH:MM:SS`.
    pub timestamp: String,
    pub image_path: Option<String>,
}

/// Totals plus the newest rows, for the dashboard.
#[derive(Clone, Debug, Default, Serialize)]
pub struct DetectionSummary {
    pub total_detections: u64,
    pub last_detection_time: Option<String>,
    pub detections: Vec<StoredDetection>,
}

// ----------------------------------------------------------------------------
// SQLite
// ----------------------------------------------------------------------------

const SELECT_COLUMNS: &str = "id, plate_text, confidence, timestamp, \
     strftime('%Y-%m-%d %H:%M:%S', timestamp / 1000, 'unixepoch'), image_path";

pub struct SqliteRecordStore {
    conn: Connection,
}

impl SqliteRecordStore {
    /// Open (or create) the database for writing.
    pub fn open(db_path: &str) -> Result<Self> {
        ensure_parent_dir(db_path)?;
        let conn = open_db_connection(db_path, false)
            .with_context(|| format!("open record store {}", db_path))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    /// Open an existing database for reading only. The schema is not touched.
    pub fn open_read_only(db_path: &str) -> Result<Self> {
        let conn = open_db_connection(db_path, true)
            .with_context(|| format!("open record store {} read-only", db_path))?;
        Ok(Self { conn })
    }

    fn ensure_schema(&mut self) -> Result<()> {
        // WAL lets the dashboard read while the capture loop appends.
        let _mode: String = self
            .conn
            .query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS detections (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              timestamp INTEGER NOT NULL,
              plate_text TEXT NOT NULL,
              confidence REAL NOT NULL,
              image_path TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_detections_timestamp ON detections(timestamp);
            CREATE INDEX IF NOT EXISTS idx_detections_plate ON detections(plate_text);
            "#,
        )?;
        Ok(())
    }

    pub fn count(&self) -> Result<u64> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        Ok(n.max(0) as u64)
    }

    pub fn count_for_plate(&self, plate_text: &str) -> Result<u64> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM detections WHERE plate_text = ?1",
            params![plate_text],
            |row| row.get(0),
        )?;
        Ok(n.max(0) as u64)
    }

    pub fn latest(&self) -> Result<Option<StoredDetection>> {
        let sql = format!(
            "SELECT {} FROM detections ORDER BY timestamp DESC, id DESC LIMIT 1",
            SELECT_COLUMNS
        );
        Ok(self.conn.query_row(&sql, [], map_row).optional()?)
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<StoredDetection>> {
        let sql = format!(
            "SELECT {} FROM detections ORDER BY timestamp DESC, id DESC LIMIT ?1",
            SELECT_COLUMNS
        );
        let limit = i64::try_from(limit).map_err(|_| anyhow!("limit exceeds i64 range"))?;
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![limit], map_row)?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }

    pub fn summary(&self, limit: usize) -> Result<DetectionSummary> {
        let detections = self.recent(limit)?;
        let total_detections = self.count()?;
        let last_detection_time = match detections.first() {
            Some(first) => Some(first.timestamp.clone()),
            None => self.latest()?.map(|d| d.timestamp),
        };
        Ok(DetectionSummary {
            total_detections,
            last_detection_time,
            detections,
        })
    }
}

impl RecordStore for SqliteRecordStore {
    fn append(&mut self, event: &DetectionEvent) -> Result<i64> {
        let timestamp = epoch_millis(event.timestamp())?;
        self.conn.execute(
            r#"
            INSERT INTO detections(timestamp, plate_text, confidence, image_path)
            VALUES (?1, ?2, ?3, ?4)
            "#,
            params![
                timestamp,
                event.plate_text(),
                event.confidence() as f64,
                event.image_path()
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    fn enforce_retention(&mut self, retention: Duration, now: SystemTime) -> Result<usize> {
        let now_ms = epoch_millis(now)?;
        let retention_ms =
            i64::try_from(retention.as_millis()).map_err(|_| anyhow!("retention too large"))?;
        let cutoff = now_ms.saturating_sub(retention_ms);

        let tx = self.conn.transaction()?;
        let snapshots = {
            let mut stmt = tx.prepare(
                "SELECT image_path FROM detections WHERE timestamp < ?1 AND image_path IS NOT NULL",
            )?;
            let rows = stmt.query_map(params![cutoff], |row| row.get::<_, String>(0))?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        let removed = tx.execute("DELETE FROM detections WHERE timestamp < ?1", params![cutoff])?;
        tx.commit()?;

        for path in &snapshots {
            remove_snapshot_file(Path::new(path));
        }
        Ok(removed)
    }
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<StoredDetection> {
    Ok(StoredDetection {
        id: row.get(0)?,
        plate_text: row.get(1)?,
        confidence: row.get(2)?,
        timestamp_ms: row.get(3)?,
        timestamp: row.get(4)?,
        image_path: row.get(5)?,
    })
}

fn ensure_parent_dir(db_path: &str) -> Result<()> {
    if db_path.starts_with("file:") || db_path == ":memory:" {
        return Ok(());
    }
    if let Some(parent) = Path::new(db_path).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create database directory {}", parent.display()))?;
        }
    }
    Ok(())
}

// ----------------------------------------------------------------------------
// In-memory
// ----------------------------------------------------------------------------

/// Vec-backed store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    events: Vec<DetectionEvent>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> &[DetectionEvent] {
        &self.events
    }

    pub fn count_for_plate(&self, plate_text: &str) -> usize {
        self.events
            .iter()
            .filter(|e| e.plate_text() == plate_text)
            .count()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn append(&mut self, event: &DetectionEvent) -> Result<i64> {
        self.events.push(event.clone());
        Ok(self.events.len() as i64)
    }

    fn enforce_retention(&mut self, retention: Duration, now: SystemTime) -> Result<usize> {
        let before = self.events.len();
        self.events.retain(|e| {
            let keep = match now.duration_since(e.timestamp()) {
                Ok(age) => age <= retention,
                Err(_) => true,
            };
            if !keep {
                if let Some(path) = e.image_path() {
                    remove_snapshot_file(Path::new(path));
                }
            }
            keep
        });
        Ok(before - self.events.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::UNIX_EPOCH;
    use tempfile::tempdir;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn append_and_read_back() -> Result<()> {
        let dir = tempdir()?;
        let db_path = dir.path().join("nested").join("lpr.db");
        let mut store = SqliteRecordStore::open(&db_path.to_string_lossy())?;

        let id1 = store.append(&DetectionEvent::new("ABC1234", 0.91, at(1_700_000_000)))?;
        let id2 = store.append(
            &DetectionEvent::new("XYZ9A87", 0.75, at(1_700_000_060)).with_image_path("snap.jpg"),
        )?;
        assert!(id2 > id1);

        assert_eq!(store.count()?, 2);
        assert_eq!(store.count_for_plate("ABC1234")?, 1);

        let recent = store.recent(10)?;
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].plate_text, "XYZ9A87");
        assert_eq!(recent[0].image_path.as_deref(), Some("snap.jpg"));
        assert_eq!(recent[0].timestamp, "2023-11-14 22:14:20");
        assert_eq!(recent[1].timestamp_ms, 1_700_000_000_000);
        assert!((recent[1].confidence - 0.91).abs() < 1e-6);

        let latest = store.latest()?.expect("latest row");
        assert_eq!(latest.id, id2);
        Ok(())
    }

    #[test]
    fn read_only_connection_sees_writes() -> Result<()> {
        let dir = tempdir()?;
        let db_path = dir.path().join("lpr.db").to_string_lossy().to_string();
        let mut writer = SqliteRecordStore::open(&db_path)?;
        writer.append(&DetectionEvent::new("ABC1234", 0.9, at(1_700_000_000)))?;

        let reader = SqliteRecordStore::open_read_only(&db_path)?;
        let summary = reader.summary(5)?;
        assert_eq!(summary.total_detections, 1);
        assert_eq!(
            summary.last_detection_time.as_deref(),
            Some("2023-11-14 22:13:20")
        );

        writer.append(&DetectionEvent::new("XYZ9A87", 0.8, at(1_700_000_100)))?;
        assert_eq!(reader.count()?, 2);
        Ok(())
    }

    #[test]
    fn read_only_open_of_missing_db_fails() -> Result<()> {
        let dir = tempdir()?;
        let db_path = dir.path().join("missing.db");
        assert!(SqliteRecordStore::open_read_only(&db_path.to_string_lossy()).is_err());
        Ok(())
    }

    #[test]
    fn retention_removes_old_rows() -> Result<()> {
        let dir = tempdir()?;
        let db_path = dir.path().join("lpr.db");
        let mut store = SqliteRecordStore::open(&db_path.to_string_lossy())?;
        store.append(&DetectionEvent::new("OLD0001", 0.9, at(1_000)))?;
        store.append(&DetectionEvent::new("NEW0001", 0.9, at(9_000)))?;

        let removed = store.enforce_retention(Duration::from_secs(3_600), at(10_000))?;
        assert_eq!(removed, 1);
        assert_eq!(store.count()?, 1);
        assert_eq!(store.count_for_plate("NEW0001")?, 1);
        Ok(())
    }

    #[test]
    fn retention_deletes_snapshot_files_of_removed_rows() -> Result<()> {
        let dir = tempdir()?;
        let db_path = dir.path().join("lpr.db");
        let old_snap = dir.path().join("old.jpg");
        let new_snap = dir.path().join("new.jpg");
        std::fs::write(&old_snap, b"jpeg")?;
        std::fs::write(&new_snap, b"jpeg")?;

        let mut store = SqliteRecordStore::open(&db_path.to_string_lossy())?;
        store.append(
            &DetectionEvent::new("OLD0001", 0.9, at(1_000))
                .with_image_path(old_snap.to_string_lossy()),
        )?;
        store.append(
            &DetectionEvent::new("NEW0001", 0.9, at(9_000))
                .with_image_path(new_snap.to_string_lossy()),
        )?;
        store.append(&DetectionEvent::new("OLD0002", 0.9, at(1_500)))?;

        assert_eq!(store.enforce_retention(Duration::from_secs(3_600), at(10_000))?, 2);
        assert!(!old_snap.exists());
        assert!(new_snap.exists());
        Ok(())
    }

    #[test]
    fn in_memory_store_counts_per_plate() -> Result<()> {
        let mut store = InMemoryRecordStore::new();
        store.append(&DetectionEvent::new("ABC1234", 0.9, at(0)))?;
        store.append(&DetectionEvent::new("ABC1234", 0.9, at(70)))?;
        store.append(&DetectionEvent::new("XYZ9A87", 0.9, at(80)))?;
        assert_eq!(store.count_for_plate("ABC1234"), 2);
        assert_eq!(store.enforce_retention(Duration::from_secs(30), at(100))?, 2);
        assert_eq!(store.events().len(), 1);
        Ok(())
    }
}
