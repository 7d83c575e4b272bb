use std::collections::VecDeque;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Result};
use image::RgbImage;
use tempfile::tempdir;

use openparking_lpr::detect::StubDetector;
use openparking_lpr::ocr::StubRecognizer;
use openparking_lpr::{
    CapturePipeline, DedupGate, DetectionEvent, Frame, FrameSource, InMemoryRecordStore,
    PlateDetector, PlateRegion, PlateValidator, RecordStore, RunOptions, SnapshotWriter,
    SourceStats, SqliteRecordStore,
};

const T0: u64 = 1_700_000_000;

fn at(secs: u64) -> SystemTime {
    UNIX_EPOCH + Duration::from_secs(T0 + secs)
}

/// Replays frames stamped at fixed offsets, optionally failing at one position.
struct ScriptedSource {
    frames: VecDeque<Option<u64>>,
    produced: u64,
}

impl ScriptedSource {
    /// `None` entries are acquisition failures.
    fn new(offsets: &[Option<u64>]) -> Self {
        Self {
            frames: offsets.iter().copied().collect(),
            produced: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn connect(&mut self) -> Result<()> {
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match self.frames.pop_front() {
            None => Ok(None),
            Some(None) => Err(anyhow!("camera unplugged")),
            Some(Some(offset)) => {
                self.produced += 1;
                Ok(Some(Frame::new(
                    RgbImage::new(320, 240),
                    at(offset),
                    self.produced,
                )))
            }
        }
    }

    fn is_healthy(&self) -> bool {
        true
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.produced,
            source: "scripted".to_string(),
        }
    }
}

/// Fails on the listed frame sequence numbers, otherwise defers to the stub.
struct FlakyDetector {
    fail_on: Vec<u64>,
    inner: StubDetector,
}

impl PlateDetector for FlakyDetector {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn detect(&mut self, frame: &Frame) -> Result<Vec<PlateRegion>> {
        if self.fail_on.contains(&frame.sequence()) {
            return Err(anyhow!("inference timeout"));
        }
        self.inner.detect(frame)
    }
}

/// Store whose first `failures` appends fail.
struct BrokenStore {
    failures: usize,
    inner: InMemoryRecordStore,
}

impl RecordStore for BrokenStore {
    fn append(&mut self, event: &DetectionEvent) -> Result<i64> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(anyhow!("database is locked"));
        }
        self.inner.append(event)
    }
}

fn recognizer(plates: &[&str]) -> Box<StubRecognizer> {
    Box::new(StubRecognizer::new(
        plates.iter().map(|p| p.to_string()).collect(),
    ))
}

#[test]
fn repeated_plate_is_stored_once_per_window() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("lpr.db").to_string_lossy().to_string();
    let store = SqliteRecordStore::open(&db_path)?;
    let mut pipeline = CapturePipeline::new(
        Box::new(StubDetector::new()),
        recognizer(&["ABC1234"]),
        PlateValidator::default(),
        DedupGate::new(Duration::from_secs(60)),
        store,
    );

    let mut source = ScriptedSource::new(&[Some(0), Some(30), Some(65)]);
    let stop = AtomicBool::new(false);
    let stats = pipeline.run(&mut source, &stop, &RunOptions::default())?;

    assert_eq!(stats.frames, 3);
    assert_eq!(stats.accepted, 2);
    assert_eq!(stats.duplicates, 1);

    let store = pipeline.into_store();
    assert_eq!(store.count_for_plate("ABC1234")?, 2);
    let rows = store.recent(10)?;
    assert_eq!(rows[0].timestamp_ms, ((T0 + 65) * 1000) as i64);
    assert_eq!(rows[1].timestamp_ms, (T0 * 1000) as i64);
    Ok(())
}

#[test]
fn store_failure_does_not_stop_the_loop() -> Result<()> {
    let mut pipeline = CapturePipeline::new(
        Box::new(StubDetector::new()),
        recognizer(&["ABC1234", "XYZ9A87"]),
        PlateValidator::default(),
        DedupGate::default(),
        BrokenStore {
            failures: 1,
            inner: InMemoryRecordStore::new(),
        },
    );

    let mut source = ScriptedSource::new(&[Some(0), Some(1)]);
    let stop = AtomicBool::new(false);
    let stats = pipeline.run(&mut source, &stop, &RunOptions::default())?;

    assert_eq!(stats.frames, 2);
    assert_eq!(stats.store_errors, 1);
    let events = pipeline.store().inner.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].plate_text(), "XYZ9A87");
    Ok(())
}

#[test]
fn detection_failure_skips_only_that_frame() -> Result<()> {
    let mut pipeline = CapturePipeline::new(
        Box::new(FlakyDetector {
            fail_on: vec![1],
            inner: StubDetector::new(),
        }),
        recognizer(&["ABC1234"]),
        PlateValidator::default(),
        DedupGate::default(),
        InMemoryRecordStore::new(),
    );

    let mut source = ScriptedSource::new(&[Some(0), Some(1)]);
    let stop = AtomicBool::new(false);
    let stats = pipeline.run(&mut source, &stop, &RunOptions::default())?;

    assert_eq!(stats.skipped_frames, 1);
    assert_eq!(stats.accepted, 1);
    assert_eq!(pipeline.store().events()[0].timestamp(), at(1));
    Ok(())
}

#[test]
fn acquisition_failure_ends_the_run_with_an_error() {
    let mut pipeline = CapturePipeline::new(
        Box::new(StubDetector::new()),
        recognizer(&["ABC1234"]),
        PlateValidator::default(),
        DedupGate::default(),
        InMemoryRecordStore::new(),
    );

    let mut source = ScriptedSource::new(&[Some(0), None, Some(2)]);
    let stop = AtomicBool::new(false);
    assert!(pipeline
        .run(&mut source, &stop, &RunOptions::default())
        .is_err());
    assert_eq!(pipeline.stats().frames, 1);
    assert_eq!(pipeline.store().events().len(), 1);
}

#[test]
fn max_frames_and_stop_flag_end_the_run() -> Result<()> {
    let offsets: Vec<Option<u64>> = (0..10).map(Some).collect();
    let mut pipeline = CapturePipeline::new(
        Box::new(StubDetector::new()),
        recognizer(&[]),
        PlateValidator::default(),
        DedupGate::default(),
        InMemoryRecordStore::new(),
    );

    let mut source = ScriptedSource::new(&offsets);
    let options = RunOptions {
        max_frames: Some(4),
        ..RunOptions::default()
    };
    let stats = pipeline.run(&mut source, &AtomicBool::new(false), &options)?;
    assert_eq!(stats.frames, 4);

    let stats = pipeline.run(&mut source, &AtomicBool::new(true), &RunOptions::default())?;
    assert_eq!(stats.frames, 4);
    Ok(())
}

#[test]
fn snapshots_are_linked_from_stored_rows() -> Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("lpr.db").to_string_lossy().to_string();
    let mut pipeline = CapturePipeline::new(
        Box::new(StubDetector::new()),
        recognizer(&["ABC4E67"]),
        PlateValidator::default(),
        DedupGate::default(),
        SqliteRecordStore::open(&db_path)?,
    )
    .with_snapshots(SnapshotWriter::new(dir.path().join("snapshots")));

    let mut source = ScriptedSource::new(&[Some(0)]);
    pipeline.run(&mut source, &AtomicBool::new(false), &RunOptions::default())?;

    let row = pipeline.store().latest()?.expect("stored row");
    let image_path = row.image_path.expect("snapshot path");
    assert!(image_path.ends_with(&format!("{}_ABC4E67.jpg", T0 * 1000)));
    assert!(std::path::Path::new(&image_path).is_file());
    Ok(())
}

#[test]
fn snapshot_is_removed_when_the_row_is_not_stored() -> Result<()> {
    let dir = tempdir()?;
    let snapshot_dir = dir.path().join("snapshots");
    let mut pipeline = CapturePipeline::new(
        Box::new(StubDetector::new()),
        recognizer(&["ABC4E67"]),
        PlateValidator::default(),
        DedupGate::default(),
        BrokenStore {
            failures: 1,
            inner: InMemoryRecordStore::new(),
        },
    )
    .with_snapshots(SnapshotWriter::new(snapshot_dir.clone()));

    let report = pipeline.process_frame(&Frame::new(RgbImage::new(320, 240), at(0), 1));
    assert_eq!(report.store_failures, 1);
    assert_eq!(pipeline.stats().snapshot_errors, 0);

    let left = std::fs::read_dir(&snapshot_dir)?.count();
    assert_eq!(left, 0);
    Ok(())
}
