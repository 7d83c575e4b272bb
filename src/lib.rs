//! OpenParking LPR
//!
//! License plate recognition for a single camera feed.
//!
//! # Architecture
//!
//! The capture process runs one synchronous loop:
//!
//! 1. A `FrameSource` yields RGB frames (camera, HTTP snapshot, image files, stub).
//! 2. A `PlateDetector` proposes plate regions.
//! 3. Each region is cropped, equalized and passed to a `TextRecognizer`.
//! 4. The `PlateValidator` normalizes the text and checks it against the plate pattern.
//! 5. The `DedupGate` suppresses repeats of the same plate inside the window.
//! 6. Accepted detections are appended to the `RecordStore`.
//!
//! The dashboard is a separate process that reads the same SQLite database.
//!
//! # Module Structure
//!
//! - `frame`: frames, bounding boxes, crop and equalization helpers
//! - `ingest`: frame sources
//! - `detect` / `ocr`: model backends behind traits
//! - `validate` / `dedup`: plate normalization and repeat suppression
//! - `storage`: the `detections` table
//! - `snapshot`: optional JPEG crops of accepted plates
//! - `config`: file and `LPR_*` environment settings
//! - `pipeline`: the capture loop
//! - `dashboard`: read-only HTTP view of the store

use anyhow::{anyhow, Result};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub mod config;
pub mod dashboard;
pub mod dedup;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod ocr;
pub mod pipeline;
pub mod snapshot;
pub mod storage;
pub mod validate;

pub use config::LprConfig;
pub use dedup::{DedupGate, GateDecision, DEFAULT_DEDUP_WINDOW};
pub use detect::{PlateDetector, PlateRegion};
pub use frame::{BoundingBox, Frame};
pub use ingest::{FrameSource, SourceStats};
pub use ocr::{Recognition, TextRecognizer};
pub use pipeline::{CapturePipeline, FrameReport, PipelineStats, RunOptions};
pub use snapshot::SnapshotWriter;
pub use storage::{InMemoryRecordStore, RecordStore, SqliteRecordStore, StoredDetection};
pub use validate::{CharCorrection, PlateValidator, Rejection};

/// One accepted, validated, non-duplicate plate reading.
///
/// Events are immutable once created; the record store owns them after `append`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionEvent {
    plate_text: String,
    confidence: f32,
    timestamp: SystemTime,
    image_path: Option<String>,
}

impl DetectionEvent {
    pub fn new(plate_text: impl Into<String>, confidence: f32, timestamp: SystemTime) -> Self {
        Self {
            plate_text: plate_text.into(),
            confidence,
            timestamp,
            image_path: None,
        }
    }

    /// Attach the path of a saved plate snapshot.
    pub fn with_image_path(mut self, path: impl Into<String>) -> Self {
        self.image_path = Some(path.into());
        self
    }

    pub fn plate_text(&self) -> &str {
        &self.plate_text
    }

    pub fn confidence(&self) -> f32 {
        self.confidence
    }

    pub fn timestamp(&self) -> SystemTime {
        self.timestamp
    }

    pub fn image_path(&self) -> Option<&str> {
        self.image_path.as_deref()
    }
}

// -------------------- Time --------------------

/// Milliseconds since the Unix epoch.
pub fn epoch_millis(time: SystemTime) -> Result<i64> {
    let since = time
        .duration_since(UNIX_EPOCH)
        .map_err(|_| anyhow!("timestamp predates the Unix epoch"))?;
    i64::try_from(since.as_millis()).map_err(|_| anyhow!("timestamp exceeds i64 milliseconds"))
}

// -------------------- SQLite --------------------

pub(crate) fn open_db_connection(db_path: &str, read_only: bool) -> Result<Connection> {
    let mut flags = if read_only {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE
    };
    flags |= OpenFlags::SQLITE_OPEN_NO_MUTEX;
    if db_path.starts_with("file:") {
        flags |= OpenFlags::SQLITE_OPEN_URI;
    }
    Ok(Connection::open_with_flags(db_path, flags)?)
}
