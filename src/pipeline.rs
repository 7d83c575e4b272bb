//! The capture loop.
//!
//! `CapturePipeline` owns the models, the validator, the dedup gate and the
//! record store. Each frame goes through detect → crop/equalize → recognize →
//! validate → dedup → (snapshot) → append. Only a failed frame acquisition
//! stops the loop; every per-frame failure is logged and counted.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crate::dedup::{DedupGate, GateDecision};
use crate::detect::PlateDetector;
use crate::frame::{preprocess_plate, Frame};
use crate::ingest::FrameSource;
use crate::ocr::TextRecognizer;
use crate::snapshot::SnapshotWriter;
use crate::storage::RecordStore;
use crate::validate::PlateValidator;
use crate::DetectionEvent;

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);
const RETENTION_INTERVAL: Duration = Duration::from_secs(60);

/// Loop controls for [`CapturePipeline::run`].
#[derive(Clone, Debug)]
pub struct RunOptions {
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    /// Minimum time between frame starts. Zero runs as fast as the source allows.
    pub frame_interval: Duration,
    /// Delete stored detections older than this, checked once a minute.
    pub retention: Option<Duration>,
    pub health_interval: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_frames: None,
            frame_interval: Duration::ZERO,
            retention: None,
            health_interval: HEALTH_LOG_INTERVAL,
        }
    }
}

/// Running totals for one pipeline.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub frames: u64,
    pub regions: u64,
    pub accepted: u64,
    pub duplicates: u64,
    pub rejected: u64,
    /// Frames skipped because detection or recognition failed.
    pub skipped_frames: u64,
    pub store_errors: u64,
    pub snapshot_errors: u64,
}

/// What happened to one frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    pub regions: usize,
    /// Plates persisted from this frame, in region order.
    pub accepted: Vec<String>,
    pub duplicates: usize,
    pub rejected: usize,
    pub skipped: bool,
    pub store_failures: usize,
}

pub struct CapturePipeline<S: RecordStore> {
    detector: Box<dyn PlateDetector>,
    recognizer: Box<dyn TextRecognizer>,
    validator: PlateValidator,
    gate: DedupGate,
    store: S,
    snapshots: Option<SnapshotWriter>,
    min_confidence: f32,
    stats: PipelineStats,
}

impl<S: RecordStore> CapturePipeline<S> {
    pub fn new(
        detector: Box<dyn PlateDetector>,
        recognizer: Box<dyn TextRecognizer>,
        validator: PlateValidator,
        gate: DedupGate,
        store: S,
    ) -> Self {
        Self {
            detector,
            recognizer,
            validator,
            gate,
            store,
            snapshots: None,
            min_confidence: 0.0,
            stats: PipelineStats::default(),
        }
    }

    /// Save the plate crop of every accepted detection.
    pub fn with_snapshots(mut self, writer: SnapshotWriter) -> Self {
        self.snapshots = Some(writer);
        self
    }

    /// Drop readings below `min_confidence` before validation.
    pub fn with_min_confidence(mut self, min_confidence: f32) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    pub fn stats(&self) -> &PipelineStats {
        &self.stats
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// Run one frame through the pipeline. The frame's capture time is the
    /// event time for dedup and storage.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameReport {
        let mut report = FrameReport::default();
        self.stats.frames += 1;

        let regions = match self.detector.detect(frame) {
            Ok(regions) => regions,
            Err(e) => {
                log::warn!(
                    "frame {}: detector {} failed: {:#}",
                    frame.sequence(),
                    self.detector.name(),
                    e
                );
                self.stats.skipped_frames += 1;
                report.skipped = true;
                return report;
            }
        };
        report.regions = regions.len();
        self.stats.regions += regions.len() as u64;

        let now = frame.captured_at();
        for region in regions {
            let Some(crop) = frame.crop_with_margin(&region.bbox) else {
                log::debug!("frame {}: empty crop for {:?}", frame.sequence(), region.bbox);
                continue;
            };
            let plate_image = preprocess_plate(&crop);

            let reading = match self.recognizer.recognize(&plate_image) {
                Ok(Some(reading)) => reading,
                Ok(None) => continue,
                Err(e) => {
                    log::warn!(
                        "frame {}: recognizer {} failed: {:#}",
                        frame.sequence(),
                        self.recognizer.name(),
                        e
                    );
                    self.stats.skipped_frames += 1;
                    report.skipped = true;
                    return report;
                }
            };

            if reading.confidence < self.min_confidence {
                log::debug!(
                    "reading '{}' below confidence floor ({:.2} < {:.2})",
                    reading.text,
                    reading.confidence,
                    self.min_confidence
                );
                self.stats.rejected += 1;
                report.rejected += 1;
                continue;
            }

            let plate = match self.validator.validate(&reading.text) {
                Ok(plate) => plate,
                Err(rejection) => {
                    log::debug!("reading '{}' rejected: {}", reading.text, rejection);
                    self.stats.rejected += 1;
                    report.rejected += 1;
                    continue;
                }
            };

            if let GateDecision::Duplicate { since_last } = self.gate.check(&plate, now) {
                log::debug!(
                    "plate {} suppressed, last accepted {:.1}s ago",
                    plate,
                    since_last.as_secs_f32()
                );
                self.stats.duplicates += 1;
                report.duplicates += 1;
                continue;
            }

            let mut event = DetectionEvent::new(plate.clone(), reading.confidence, now);
            let mut snapshot = None;
            if let Some(writer) = &self.snapshots {
                match writer.save(&plate, now, &crop) {
                    Ok(path) => {
                        event = event.with_image_path(path.to_string_lossy());
                        snapshot = Some(path);
                    }
                    Err(e) => {
                        log::warn!("snapshot for {} not saved: {:#}", plate, e);
                        self.stats.snapshot_errors += 1;
                    }
                }
            }

            match self.store.append(&event) {
                Ok(id) => {
                    log::info!(
                        "plate {} recorded (id={} conf={:.2})",
                        plate,
                        id,
                        event.confidence()
                    );
                    self.stats.accepted += 1;
                    report.accepted.push(plate);
                }
                Err(e) => {
                    log::error!("failed to store detection of {}: {:#}", plate, e);
                    self.stats.store_errors += 1;
                    report.store_failures += 1;
                    if let (Some(writer), Some(path)) = (&self.snapshots, snapshot) {
                        writer.discard(&path);
                    }
                }
            }
        }
        report
    }

    /// Pull frames from `source` until `stop` is set, the source ends or
    /// `options.max_frames` is reached.
    ///
    /// Returns an error only when the source fails to deliver a frame.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        stop: &AtomicBool,
        options: &RunOptions,
    ) -> Result<PipelineStats> {
        let mut processed = 0u64;
        let mut last_health_log = Instant::now();
        let mut last_retention: Option<Instant> = None;

        while !stop.load(Ordering::SeqCst) {
            if options.max_frames.is_some_and(|max| processed >= max) {
                log::info!("frame limit reached ({})", processed);
                break;
            }
            let started = Instant::now();

            let frame = source
                .next_frame()
                .context("frame acquisition failed")?;
            let Some(frame) = frame else {
                log::info!("frame source exhausted");
                break;
            };
            processed += 1;
            self.process_frame(&frame);

            if last_health_log.elapsed() >= options.health_interval {
                let source_stats = source.stats();
                log::info!(
                    "source health={} frames={} source={} accepted={} duplicates={} rejected={} store_errors={}",
                    source.is_healthy(),
                    source_stats.frames_captured,
                    source_stats.source,
                    self.stats.accepted,
                    self.stats.duplicates,
                    self.stats.rejected,
                    self.stats.store_errors
                );
                last_health_log = Instant::now();
            }

            if let Some(retention) = options.retention {
                if last_retention.map_or(true, |at| at.elapsed() >= RETENTION_INTERVAL) {
                    match self.store.enforce_retention(retention, SystemTime::now()) {
                        Ok(0) => {}
                        Ok(removed) => log::info!("retention removed {} detection(s)", removed),
                        Err(e) => log::warn!("retention enforcement failed: {:#}", e),
                    }
                    last_retention = Some(Instant::now());
                }
            }

            let elapsed = started.elapsed();
            if elapsed < options.frame_interval {
                std::thread::sleep(options.frame_interval - elapsed);
            }
        }
        Ok(self.stats.clone())
    }
}

/// Set `stop` when a line reading `q` arrives on `reader`.
///
/// The watcher ends quietly at end of input.
pub fn watch_for_quit_key<R>(reader: R, stop: Arc<AtomicBool>) -> JoinHandle<()>
where
    R: BufRead + Send + 'static,
{
    std::thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else {
                return;
            };
            if line.trim().eq_ignore_ascii_case("q") {
                log::info!("quit requested from keyboard");
                stop.store(true, Ordering::SeqCst);
                return;
            }
        }
    })
}
