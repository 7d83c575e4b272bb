use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::{Builder, NamedTempFile};

use openparking_lpr::config::{BackendKind, LprConfig};
use openparking_lpr::CharCorrection;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "LPR_CONFIG",
        "LPR_DB_PATH",
        "LPR_CAMERA_SOURCE",
        "LPR_DETECTOR_MODEL",
        "LPR_RECOGNIZER_MODEL",
        "LPR_PLATE_PATTERN",
        "LPR_PLATE_MAX_LEN",
        "LPR_PLATE_CORRECTION",
        "LPR_DEDUP_WINDOW_SECS",
        "LPR_DASHBOARD_ADDR",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_json_config_from_env_path_with_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        ".json",
        r#"{
            "db_path": "/var/lib/lpr/plates.db",
            "retention_days": 14,
            "camera": { "source": "http://cam.local/video.mjpg", "target_fps": 5 },
            "detector": { "backend": "tract", "confidence_threshold": 0.6 },
            "recognizer": { "stub_plates": ["ABC1234"], "min_confidence": 0.4 },
            "validation": { "correction": "none" },
            "dedup": { "window_secs": 120 },
            "snapshots": { "dir": "/var/lib/lpr/snapshots" },
            "dashboard": { "page_size": 25 }
        }"#,
    );

    std::env::set_var("LPR_CONFIG", file.path());
    std::env::set_var("LPR_CAMERA_SOURCE", "stub://gate");
    std::env::set_var("LPR_DEDUP_WINDOW_SECS", "30");
    std::env::set_var("LPR_DASHBOARD_ADDR", "127.0.0.1:8080");

    let cfg = LprConfig::load(None).expect("load config");

    assert_eq!(cfg.db_path, "/var/lib/lpr/plates.db");
    assert_eq!(cfg.retention, Some(Duration::from_secs(14 * 86_400)));
    assert_eq!(cfg.camera.source, "stub://gate");
    assert_eq!(cfg.camera.target_fps, 5);
    assert_eq!(cfg.detector.backend, BackendKind::Tract);
    assert_eq!(cfg.detector.confidence_threshold, 0.6);
    assert_eq!(cfg.recognizer.backend, BackendKind::Stub);
    assert_eq!(cfg.recognizer.stub_plates, vec!["ABC1234"]);
    assert_eq!(cfg.validation.correction, Some(CharCorrection::None));
    assert_eq!(cfg.dedup_window, Duration::from_secs(30));
    assert_eq!(
        cfg.snapshot_dir.as_deref(),
        Some(std::path::Path::new("/var/lib/lpr/snapshots"))
    );
    assert_eq!(cfg.dashboard.addr, "127.0.0.1:8080");
    assert_eq!(cfg.dashboard.page_size, 25);

    clear_env();
}

#[test]
fn explicit_toml_path_wins_over_env_path() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let env_file = write_config(".json", r#"{ "db_path": "from-env.db" }"#);
    let toml_file = write_config(
        ".toml",
        r#"
        db_path = "from-arg.db"

        [validation]
        pattern = "^[A-Z]{2}[0-9]{4}$"
        max_len = 6
        "#,
    );
    std::env::set_var("LPR_CONFIG", env_file.path());
    std::env::set_var("LPR_DB_PATH", "  ");

    let cfg = LprConfig::load(Some(toml_file.path())).expect("load config");
    assert_eq!(cfg.db_path, "from-arg.db");
    assert_eq!(cfg.validation.max_len, Some(6));
    let validator = cfg.validation.build_validator().expect("validator");
    assert_eq!(validator.validate("ab-1234"), Ok("AB1234".to_string()));

    clear_env();
}

#[test]
fn custom_plate_pattern_keeps_valid_plates_unchanged() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    for (pattern, plate) in [
        (r"^[0-9][A-Z]{3}[0-9]{3}$", "5ABC123"),
        (r"^[A-Z]{2}[0-9]{2}[A-Z]{3}$", "AB12CDE"),
        (r"^[A-Z]{2}[0-9]{4}[A-Z]{2}$", "AB1234CD"),
    ] {
        std::env::set_var("LPR_PLATE_PATTERN", pattern);
        let cfg = LprConfig::load(None).expect("load config");
        let validator = cfg.validation.build_validator().expect("validator");
        assert_eq!(validator.validate(plate), Ok(plate.to_string()), "{pattern}");
    }

    std::env::set_var("LPR_PLATE_MAX_LEN", "7");
    std::env::set_var("LPR_PLATE_CORRECTION", "mercosul");
    std::env::set_var("LPR_PLATE_PATTERN", r"^[A-Z]{3}[0-9]{4}$");
    let cfg = LprConfig::load(None).expect("load config");
    assert_eq!(cfg.validation.effective_max_len(), Some(7));
    assert_eq!(cfg.validation.effective_correction(), CharCorrection::Mercosul);
    let validator = cfg.validation.build_validator().expect("validator");
    assert_eq!(validator.validate("ABC12345"), Ok("ABC1234".to_string()));

    std::env::set_var("LPR_PLATE_MAX_LEN", "seven");
    assert!(LprConfig::load(None).is_err());

    clear_env();
}

#[test]
fn defaults_apply_without_a_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = LprConfig::load(None).expect("load defaults");
    assert_eq!(cfg.db_path, "data/openparking.db");
    assert_eq!(cfg.dashboard.addr, "0.0.0.0:5001");
    assert_eq!(cfg.dedup_window, Duration::from_secs(60));

    clear_env();
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("LPR_DEDUP_WINDOW_SECS", "0");
    assert!(LprConfig::load(None).is_err());

    std::env::set_var("LPR_DEDUP_WINDOW_SECS", "soon");
    assert!(LprConfig::load(None).is_err());
    clear_env();

    std::env::set_var("LPR_PLATE_PATTERN", "[A-Z");
    assert!(LprConfig::load(None).is_err());
    clear_env();

    for contents in [
        r#"{ "detector": { "confidence_threshold": 1.5 } }"#,
        r#"{ "detector": { "backend": "torch" } }"#,
        r#"{ "recognizer": { "alphabet": "" } }"#,
        r#"{ "validation": { "correction": "klingon" } }"#,
        r#"{ "dashboard": { "page_size": 0 } }"#,
        r#"{ "retention_days": 0 }"#,
        r#"not json"#,
    ] {
        let file = write_config(".json", contents);
        assert!(
            LprConfig::load(Some(file.path())).is_err(),
            "accepted {contents}"
        );
    }

    clear_env();
}
