use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::dedup::DEFAULT_DEDUP_WINDOW;
use crate::ingest::SourceConfig;
use crate::validate::{CharCorrection, PlateValidator, DEFAULT_MAX_LEN, DEFAULT_PLATE_PATTERN};

const DEFAULT_DB_PATH: &str = "data/openparking.db";
const DEFAULT_DETECTOR_MODEL: &str = "lpr_model.onnx";
const DEFAULT_DETECTION_THRESHOLD: f32 = 0.5;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const DEFAULT_DETECTOR_INPUT: u32 = 640;
const DEFAULT_RECOGNIZER_MODEL: &str = "plate_ocr.onnx";
const DEFAULT_ALPHABET: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const DEFAULT_RECOGNIZER_WIDTH: u32 = 128;
const DEFAULT_RECOGNIZER_HEIGHT: u32 = 32;
const DEFAULT_DASHBOARD_ADDR: &str = "0.0.0.0:5001";
const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Deserialize, Default)]
struct LprConfigFile {
    db_path: Option<String>,
    retention_days: Option<u64>,
    camera: Option<CameraConfigFile>,
    detector: Option<DetectorConfigFile>,
    recognizer: Option<RecognizerConfigFile>,
    validation: Option<ValidationConfigFile>,
    dedup: Option<DedupConfigFile>,
    snapshots: Option<SnapshotConfigFile>,
    dashboard: Option<DashboardConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    source: Option<String>,
    target_fps: Option<u32>,
    width: Option<u32>,
    height: Option<u32>,
    loop_files: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    input_size: Option<u32>,
    plate_class: Option<usize>,
}

#[derive(Debug, Deserialize, Default)]
struct RecognizerConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    alphabet: Option<String>,
    input_width: Option<u32>,
    input_height: Option<u32>,
    min_confidence: Option<f32>,
    stub_plates: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ValidationConfigFile {
    pattern: Option<String>,
    max_len: Option<usize>,
    correction: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct DedupConfigFile {
    window_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct SnapshotConfigFile {
    dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Default)]
struct DashboardConfigFile {
    addr: Option<String>,
    page_size: Option<usize>,
}

/// Which implementation runs behind a model trait.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendKind {
    Stub,
    Tract,
}

impl BackendKind {
    pub fn parse(name: &str) -> Result<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "stub" => Ok(Self::Stub),
            "tract" | "onnx" => Ok(Self::Tract),
            other => Err(anyhow!(
                "unknown model backend '{}'; expected 'stub' or 'tract'",
                other
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LprConfig {
    pub db_path: String,
    /// Rows older than this are deleted by the capture process. `None` keeps everything.
    pub retention: Option<Duration>,
    pub camera: SourceConfig,
    pub detector: DetectorSettings,
    pub recognizer: RecognizerSettings,
    pub validation: ValidationSettings,
    pub dedup_window: Duration,
    pub snapshot_dir: Option<PathBuf>,
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    pub model_path: PathBuf,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub input_size: u32,
    pub plate_class: usize,
}

#[derive(Debug, Clone)]
pub struct RecognizerSettings {
    pub backend: BackendKind,
    pub model_path: PathBuf,
    pub alphabet: String,
    pub input_width: u32,
    pub input_height: u32,
    /// Readings below this confidence are dropped before validation.
    pub min_confidence: f32,
    /// Readings returned in turn by the stub backend.
    pub stub_plates: Vec<String>,
}

/// Plate format settings.
///
/// Truncation and look-alike correction are tuned for the default Brazilian
/// layout. When they are left unset they only apply while the pattern is the
/// default one; a custom pattern gets the normalized text untouched.
#[derive(Debug, Clone)]
pub struct ValidationSettings {
    pub pattern: String,
    /// Truncation length as configured. `Some(0)` disables truncation.
    pub max_len: Option<usize>,
    pub correction: Option<CharCorrection>,
}

impl ValidationSettings {
    fn uses_default_layout(&self) -> bool {
        self.pattern == DEFAULT_PLATE_PATTERN
    }

    pub fn effective_max_len(&self) -> Option<usize> {
        match self.max_len {
            Some(0) => None,
            Some(n) => Some(n),
            None if self.uses_default_layout() => Some(DEFAULT_MAX_LEN),
            None => None,
        }
    }

    pub fn effective_correction(&self) -> CharCorrection {
        match self.correction {
            Some(correction) => correction,
            None if self.uses_default_layout() => CharCorrection::Mercosul,
            None => CharCorrection::None,
        }
    }

    pub fn build_validator(&self) -> Result<PlateValidator> {
        PlateValidator::new(
            &self.pattern,
            self.effective_max_len(),
            self.effective_correction(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub addr: String,
    pub page_size: usize,
}

impl LprConfig {
    /// Load configuration: file (`path`, else `LPR_CONFIG`), then `LPR_*`
    /// environment overrides, then validation.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var("LPR_CONFIG").ok().map(PathBuf::from));
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: LprConfigFile) -> Result<Self> {
        let camera = file.camera.unwrap_or_default();
        let defaults = SourceConfig::default();
        let camera = SourceConfig {
            source: camera.source.unwrap_or(defaults.source),
            target_fps: camera.target_fps.unwrap_or(defaults.target_fps),
            width: camera.width.unwrap_or(defaults.width),
            height: camera.height.unwrap_or(defaults.height),
            loop_files: camera.loop_files.unwrap_or(defaults.loop_files),
        };

        let detector = file.detector.unwrap_or_default();
        let detector = DetectorSettings {
            backend: BackendKind::parse(detector.backend.as_deref().unwrap_or("stub"))?,
            model_path: detector
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DETECTOR_MODEL)),
            confidence_threshold: detector
                .confidence_threshold
                .unwrap_or(DEFAULT_DETECTION_THRESHOLD),
            iou_threshold: detector.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            input_size: detector.input_size.unwrap_or(DEFAULT_DETECTOR_INPUT),
            plate_class: detector.plate_class.unwrap_or(0),
        };

        let recognizer = file.recognizer.unwrap_or_default();
        let recognizer = RecognizerSettings {
            backend: BackendKind::parse(recognizer.backend.as_deref().unwrap_or("stub"))?,
            model_path: recognizer
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_RECOGNIZER_MODEL)),
            alphabet: recognizer
                .alphabet
                .unwrap_or_else(|| DEFAULT_ALPHABET.to_string()),
            input_width: recognizer.input_width.unwrap_or(DEFAULT_RECOGNIZER_WIDTH),
            input_height: recognizer.input_height.unwrap_or(DEFAULT_RECOGNIZER_HEIGHT),
            min_confidence: recognizer.min_confidence.unwrap_or(0.0),
            stub_plates: recognizer.stub_plates.unwrap_or_default(),
        };

        let validation = file.validation.unwrap_or_default();
        let validation = ValidationSettings {
            pattern: validation
                .pattern
                .unwrap_or_else(|| DEFAULT_PLATE_PATTERN.to_string()),
            max_len: validation.max_len,
            correction: validation
                .correction
                .as_deref()
                .map(CharCorrection::parse)
                .transpose()?,
        };

        let dedup_window = file
            .dedup
            .and_then(|dedup| dedup.window_secs)
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_DEDUP_WINDOW);

        let dashboard = file.dashboard.unwrap_or_default();
        let dashboard = DashboardSettings {
            addr: dashboard
                .addr
                .unwrap_or_else(|| DEFAULT_DASHBOARD_ADDR.to_string()),
            page_size: dashboard.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        };

        Ok(Self {
            db_path: file
                .db_path
                .unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            retention: file
                .retention_days
                .map(|days| Duration::from_secs(days.saturating_mul(24 * 60 * 60))),
            camera,
            detector,
            recognizer,
            validation,
            dedup_window,
            snapshot_dir: file.snapshots.and_then(|snapshots| snapshots.dir),
            dashboard,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(path) = non_empty_env("LPR_DB_PATH") {
            self.db_path = path;
        }
        if let Some(source) = non_empty_env("LPR_CAMERA_SOURCE") {
            self.camera.source = source;
        }
        if let Some(path) = non_empty_env("LPR_DETECTOR_MODEL") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(path) = non_empty_env("LPR_RECOGNIZER_MODEL") {
            self.recognizer.model_path = PathBuf::from(path);
        }
        if let Some(pattern) = non_empty_env("LPR_PLATE_PATTERN") {
            self.validation.pattern = pattern;
        }
        if let Some(max_len) = non_empty_env("LPR_PLATE_MAX_LEN") {
            let max_len: usize = max_len
                .trim()
                .parse()
                .map_err(|_| anyhow!("LPR_PLATE_MAX_LEN must be a non-negative integer"))?;
            self.validation.max_len = Some(max_len);
        }
        if let Some(correction) = non_empty_env("LPR_PLATE_CORRECTION") {
            self.validation.correction = Some(CharCorrection::parse(&correction)?);
        }
        if let Some(window) = non_empty_env("LPR_DEDUP_WINDOW_SECS") {
            let seconds: u64 = window.trim().parse().map_err(|_| {
                anyhow!("LPR_DEDUP_WINDOW_SECS must be an integer number of seconds")
            })?;
            self.dedup_window = Duration::from_secs(seconds);
        }
        if let Some(addr) = non_empty_env("LPR_DASHBOARD_ADDR") {
            self.dashboard.addr = addr;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.trim().is_empty() {
            return Err(anyhow!("db_path must not be empty"));
        }
        if self.camera.source.trim().is_empty() {
            return Err(anyhow!("camera.source must not be empty"));
        }
        if self.camera.width == 0 || self.camera.height == 0 {
            return Err(anyhow!("camera.width and camera.height must be greater than zero"));
        }
        if self.retention.is_some_and(|r| r.is_zero()) {
            return Err(anyhow!("retention_days must be greater than zero"));
        }
        check_unit_range("detector.confidence_threshold", self.detector.confidence_threshold)?;
        check_unit_range("detector.iou_threshold", self.detector.iou_threshold)?;
        check_unit_range("recognizer.min_confidence", self.recognizer.min_confidence)?;
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector.input_size must be greater than zero"));
        }
        if self.recognizer.input_width == 0 || self.recognizer.input_height == 0 {
            return Err(anyhow!("recognizer input size must be greater than zero"));
        }
        if self.recognizer.alphabet.is_empty() {
            return Err(anyhow!("recognizer.alphabet must not be empty"));
        }
        self.validation.build_validator()?;
        if self.dedup_window.is_zero() {
            return Err(anyhow!("dedup window must be greater than zero"));
        }
        if self.dashboard.addr.trim().is_empty() {
            return Err(anyhow!("dashboard.addr must not be empty"));
        }
        if self.dashboard.page_size == 0 {
            return Err(anyhow!("dashboard.page_size must be greater than zero"));
        }
        Ok(())
    }
}

fn read_config_file(path: &Path) -> Result<LprConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn check_unit_range(name: &str, value: f32) -> Result<()> {
    if !(0.0..=1.0).contains(&value) {
        return Err(anyhow!("{} must be within 0..=1, got {}", name, value));
    }
    Ok(())
}
