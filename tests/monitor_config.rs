use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use exam_monitor::config::{ModelSource, MonitorConfig};
use exam_monitor::ModelProvider;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "EXAM_MONITOR_CONFIG",
        "EXAM_MONITOR_CAMERA",
        "EXAM_MONITOR_TICK_MS",
        "EXAM_MONITOR_MODEL",
        "EXAM_MONITOR_MODEL_LATENCY_MS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(json: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");
    file
}

#[test]
fn defaults_without_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.camera.uri, "stub://front_camera");
    assert_eq!((cfg.camera.width, cfg.camera.height), (320, 240));
    assert_eq!(cfg.tick_interval, Duration::from_millis(200));
    assert_eq!(cfg.model.source, ModelSource::Stub);
    assert_eq!(cfg.model.load_latency, Duration::ZERO);
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(
        r#"{
            "camera": { "uri": "stub://lab_camera" },
            "detection": { "tick_ms": 250 },
            "model": {
                "source": "models/ssd_mobilenet.onnx",
                "inference_latency_ms": 15,
                "labels": ["person", "", "cell phone"]
            }
        }"#,
    );

    std::env::set_var("EXAM_MONITOR_CONFIG", file.path());
    std::env::set_var("EXAM_MONITOR_TICK_MS", "400");
    std::env::set_var("EXAM_MONITOR_MODEL_LATENCY_MS", "1200");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.camera.uri, "stub://lab_camera");
    assert_eq!(cfg.tick_interval, Duration::from_millis(400));
    assert_eq!(
        cfg.model.source,
        ModelSource::Onnx(PathBuf::from("models/ssd_mobilenet.onnx"))
    );
    assert_eq!(cfg.model.inference_latency, Duration::from_millis(15));
    assert_eq!(cfg.model.load_latency, Duration::from_millis(1200));
    assert_eq!(cfg.model.labels, vec!["person", "cell phone"]);

    std::env::set_var("EXAM_MONITOR_CAMERA", "stub://denied");
    std::env::set_var("EXAM_MONITOR_MODEL", "stub");
    let cfg = MonitorConfig::load().expect("load config");
    assert_eq!(cfg.camera.uri, "stub://denied");
    assert_eq!(cfg.model.source, ModelSource::Stub);

    clear_env();
}

#[test]
fn rejects_invalid_settings() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let file = write_config(r#"{ "camera": { "width": 640, "height": 480 } }"#);
    std::env::set_var("EXAM_MONITOR_CONFIG", file.path());
    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("320x240"), "{}", err);
    clear_env();

    std::env::set_var("EXAM_MONITOR_TICK_MS", "0");
    assert!(MonitorConfig::load().is_err());
    std::env::set_var("EXAM_MONITOR_TICK_MS", "fast");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("EXAM_MONITOR_MODEL", "coco-ssd");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    let file = write_config("{ not json");
    std::env::set_var("EXAM_MONITOR_CONFIG", file.path());
    let err = MonitorConfig::load().unwrap_err();
    assert!(err.to_string().contains("invalid config file"), "{}", err);

    clear_env();
}

#[test]
fn stub_model_source_builds_a_provider() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load().expect("load config");
    let provider = exam_monitor::model_provider(&cfg).expect("provider");
    assert_eq!(provider.name(), "stub");
}
