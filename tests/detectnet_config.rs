use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use detect_stream::config::{ConfigOverrides, DetectConfig};
use detect_stream::overlay::OverlayFlags;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "DETECTNET_CONFIG",
        "DETECTNET_INPUT",
        "DETECTNET_OUTPUT",
        "DETECTNET_NETWORK",
        "DETECTNET_OVERLAY",
        "DETECTNET_THRESHOLD",
        "DETECTNET_MODEL_DIR",
    ] {
        std::env::remove_var(key);
    }
}

fn temp_config(suffix: &str, contents: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(suffix)
        .tempfile()
        .expect("temp config");
    std::io::Write::write_all(&mut file, contents.as_bytes()).expect("write config");
    file
}

#[test]
fn loads_toml_config_with_env_and_cli_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = temp_config(
        ".toml",
        r#"
            input = "rtsp://camera-1/stream"
            output = "out/"
            overlay = "box"
            profile = true

            [network]
            name = "pednet"
            threshold = 0.7
            model_dir = "/opt/networks"

            [capture]
            width = 640
            height = 360
            scale = 1.0
            timeout_ms = 250
            rate = 15
            loop = 2
            zero_copy = true
        "#,
    );

    std::env::set_var("DETECTNET_CONFIG", file.path());
    std::env::set_var("DETECTNET_NETWORK", "facenet");
    std::env::set_var("DETECTNET_THRESHOLD", "0.6");

    let overrides = ConfigOverrides {
        threshold: Some(0.4),
        overlay: Some("labels,conf".to_string()),
        ..ConfigOverrides::default()
    };
    let cfg = DetectConfig::load(None, &overrides).expect("load config");

    assert_eq!(cfg.input, "rtsp://camera-1/stream");
    assert_eq!(cfg.output, "out/");
    assert_eq!(cfg.network, "facenet");
    assert_eq!(cfg.threshold, 0.4);
    assert_eq!(
        cfg.overlay,
        OverlayFlags {
            boxes: false,
            labels: true,
            confidence: true,
        }
    );
    assert_eq!(cfg.model_dir, std::path::PathBuf::from("/opt/networks"));
    assert_eq!((cfg.input_width, cfg.input_height), (640, 360));
    assert_eq!(cfg.scale, 1.0);
    assert_eq!(cfg.input_timeout, Some(Duration::from_millis(250)));
    assert_eq!(cfg.input_rate, Some(15));
    assert_eq!(cfg.input_loop, 2);
    assert!(cfg.source_options().zero_copy);
    assert!(cfg.profile);
    assert_eq!(cfg.loop_settings().scratch_spec().width, 640);

    clear_env();
}

#[test]
fn explicit_path_loads_json_config() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = temp_config(
        ".json",
        r#"{
            "input": "synthetic://lab?frames=10",
            "output": "null://",
            "network": { "name": "synthetic" },
            "overlay": "none"
        }"#,
    );

    let cfg = DetectConfig::load(Some(file.path()), &ConfigOverrides::default())
        .expect("load config");
    assert_eq!(cfg.input, "synthetic://lab?frames=10");
    assert_eq!(cfg.output, "null://");
    assert_eq!(cfg.network, "synthetic");
    assert!(cfg.overlay.is_none());
    assert_eq!(cfg.threshold, 0.5);

    clear_env();
}

#[test]
fn defaults_apply_without_any_layer() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = DetectConfig::load(None, &ConfigOverrides::default()).expect("load config");
    assert_eq!(cfg.input, "");
    assert_eq!(cfg.output, "");
    assert_eq!(cfg.network, "ssd-mobilenet-v2");
    assert_eq!(cfg.overlay, OverlayFlags::ALL);
    assert_eq!((cfg.input_width, cfg.input_height), (1280, 960));
    assert_eq!(cfg.scale, 0.5);
    assert_eq!(cfg.input_loop, 0);
    assert!(!cfg.zero_copy);
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("DETECTNET_THRESHOLD", "often");
    assert!(DetectConfig::load(None, &ConfigOverrides::default()).is_err());
    clear_env();

    std::env::set_var("DETECTNET_OVERLAY", "box,glow");
    assert!(DetectConfig::load(None, &ConfigOverrides::default()).is_err());
    clear_env();

    let overrides = ConfigOverrides {
        scale: Some(1.5),
        ..ConfigOverrides::default()
    };
    assert!(DetectConfig::load(None, &overrides).is_err());

    let file = temp_config(".toml", "unknown_key = 1\n");
    assert!(DetectConfig::load(Some(file.path()), &ConfigOverrides::default()).is_err());

    clear_env();
}
