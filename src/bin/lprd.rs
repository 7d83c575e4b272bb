//! lprd - license plate capture daemon
//!
//! This daemon:
//! 1. Loads configuration (file, then `LPR_*` environment overrides)
//! 2. Opens the detections database
//! 3. Loads the plate detector and text recognizer
//! 4. Reads frames until Ctrl-C, `q` + Enter, end of stream or `--max-frames`
//! 5. Records every validated, non-duplicate plate

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use openparking_lpr::{
    detect, ingest, ocr, pipeline, CapturePipeline, DedupGate, LprConfig, RunOptions,
    SnapshotWriter, SqliteRecordStore,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Recognize license plates from a camera feed")]
struct Args {
    /// Config file (.toml or .json). Falls back to LPR_CONFIG.
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Stop after this many frames.
    #[arg(long, value_name = "N")]
    max_frames: Option<u64>,

    /// UI mode for stderr progress
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto)]
    ui: ui::UiMode,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());

    let cfg = LprConfig::load(args.config.as_deref()).context("load configuration")?;

    let stage = ui.stage("Open record store");
    let store = SqliteRecordStore::open(&cfg.db_path)?;
    stage.done();

    let stage = ui.stage("Load plate detector");
    let mut detector = detect::open_detector(&cfg.detector)?;
    detector.warm_up()?;
    stage.done();

    let stage = ui.stage("Load text recognizer");
    let recognizer = ocr::open_recognizer(&cfg.recognizer)?;
    stage.done();

    let stage = ui.stage("Connect camera");
    let mut source = ingest::open_source(&cfg.camera)?;
    source.connect()?;
    stage.done();

    let mut capture = CapturePipeline::new(
        detector,
        recognizer,
        cfg.validation.build_validator()?,
        DedupGate::new(cfg.dedup_window),
        store,
    )
    .with_min_confidence(cfg.recognizer.min_confidence);
    if let Some(dir) = &cfg.snapshot_dir {
        capture = capture.with_snapshots(SnapshotWriter::new(dir));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let ctrlc_stop = stop.clone();
    ctrlc::set_handler(move || {
        ctrlc_stop.store(true, Ordering::SeqCst);
    })
    .context("install Ctrl-C handler")?;
    if std::io::stdin().is_terminal() {
        pipeline::watch_for_quit_key(std::io::BufReader::new(std::io::stdin()), stop.clone());
        log::info!("press q + Enter or Ctrl-C to stop");
    }

    log::info!(
        "lprd running. camera={} db={} dedup_window={}s",
        cfg.camera.source,
        cfg.db_path,
        cfg.dedup_window.as_secs()
    );

    let options = RunOptions {
        max_frames: args.max_frames,
        frame_interval: ingest::frame_interval(cfg.camera.target_fps),
        retention: cfg.retention,
        ..RunOptions::default()
    };
    let result = capture.run(source.as_mut(), &stop, &options);

    let stats = capture.stats();
    ui.summary(
        "lprd summary",
        &[
            ("frames", stats.frames.to_string()),
            ("plates recorded", stats.accepted.to_string()),
            ("duplicates suppressed", stats.duplicates.to_string()),
            ("readings rejected", stats.rejected.to_string()),
            ("frames skipped", stats.skipped_frames.to_string()),
            ("store errors", stats.store_errors.to_string()),
        ],
    );

    if let Err(err) = result {
        log::error!("capture stopped: {:#}", err);
        std::process::exit(1);
    }
    Ok(())
}
