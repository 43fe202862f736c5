use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use overlay_client::config::ClientConfig;
use overlay_client::ProcessingMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "OVERLAY_CONFIG",
        "OVERLAY_BACKEND_URL",
        "OVERLAY_MODE",
        "OVERLAY_SOURCE",
        "OVERLAY_PACING_MS",
        "OVERLAY_TIMEOUT_MS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_without_file_or_env() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = ClientConfig::load().expect("load defaults");
    assert_eq!(cfg.backend_url, "http://localhost:8000");
    assert_eq!(cfg.mode, ProcessingMode::Fpga);
    assert_eq!(cfg.stream.pacing, Duration::from_millis(100));
    assert_eq!((cfg.overlay.width, cfg.overlay.height), (640, 480));
    assert_eq!(cfg.stream.log_capacity, 200);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "backend_url": "https://board.example.test",
        "mode": "cpu",
        "stream": {
            "source": "stub://bench",
            "pacing_ms": 250,
            "timeout_ms": 3000,
            "jpeg_quality": 70
        },
        "overlay": {
            "width": 320,
            "height": 240,
            "output": "/tmp/overlay.png"
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("OVERLAY_CONFIG", file.path());
    std::env::set_var("OVERLAY_MODE", "fpga");
    std::env::set_var("OVERLAY_PACING_MS", "150");

    let cfg = ClientConfig::load().expect("load config");

    assert_eq!(cfg.backend_url, "https://board.example.test");
    assert_eq!(cfg.mode, ProcessingMode::Fpga);
    assert_eq!(cfg.stream.source, "stub://bench");
    assert_eq!(cfg.stream.pacing, Duration::from_millis(150));
    assert_eq!(cfg.stream.timeout, Duration::from_millis(3000));
    assert_eq!(cfg.stream.jpeg_quality, 70);
    assert_eq!((cfg.overlay.width, cfg.overlay.height), (320, 240));
    assert_eq!(
        cfg.overlay.output.as_deref(),
        Some(std::path::Path::new("/tmp/overlay.png"))
    );

    let controller = cfg.controller_config();
    assert_eq!(controller.pacing, Duration::from_millis(150));
    assert_eq!(controller.surface_size, (320, 240));

    clear_env();
}

#[test]
fn rejects_zero_pacing() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("OVERLAY_PACING_MS", "0");
    let err = ClientConfig::load().unwrap_err();
    assert!(err.to_string().contains("pacing"));

    clear_env();
}

#[test]
fn rejects_non_numeric_timeout() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("OVERLAY_TIMEOUT_MS", "soon");
    assert!(ClientConfig::load().is_err());

    clear_env();
}

#[test]
fn rejects_unknown_backend_scheme_and_mode() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("OVERLAY_BACKEND_URL", "ftp://board");
    assert!(ClientConfig::load().is_err());
    std::env::remove_var("OVERLAY_BACKEND_URL");

    std::env::set_var("OVERLAY_MODE", "gpu");
    assert!(ClientConfig::load().is_err());

    clear_env();
}

#[test]
fn accepts_stub_backend_and_arm_alias() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("OVERLAY_BACKEND_URL", "stub://backend");
    std::env::set_var("OVERLAY_MODE", "ARM");
    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.backend_url, "stub://backend");
    assert_eq!(cfg.mode, ProcessingMode::Cpu);

    clear_env();
}

#[test]
fn rejects_zero_surface_from_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"overlay": {"width": 0}}"#).expect("write config");
    std::env::set_var("OVERLAY_CONFIG", file.path());
    let err = ClientConfig::load().unwrap_err();
    assert!(err.to_string().contains("non-zero"));

    clear_env();
}

#[test]
fn input_type_is_not_a_config_setting() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    // The binary picks the input; a leftover key or variable changes nothing.
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"input": "live", "mode": "cpu"}"#)
        .expect("write config");
    std::env::set_var("OVERLAY_CONFIG", file.path());
    std::env::set_var("OVERLAY_INPUT", "nonsense");
    let cfg = ClientConfig::load().expect("load config");
    assert_eq!(cfg.mode, ProcessingMode::Cpu);
    std::env::remove_var("OVERLAY_INPUT");

    clear_env();
}
