use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::frame::{CAPTURE_HEIGHT, CAPTURE_WIDTH};

const DEFAULT_CAMERA_URI: &str = "stub://front_camera";
const DEFAULT_TICK_MS: u64 = 200;
const DEFAULT_MODEL: &str = "stub";
const DEFAULT_LABELS: &[&str] = &["person", "cell phone", "book", "laptop"];

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    camera: Option<CameraConfigFile>,
    detection: Option<DetectionConfigFile>,
    model: Option<ModelConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct CameraConfigFile {
    uri: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectionConfigFile {
    tick_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct ModelConfigFile {
    source: Option<String>,
    load_latency_ms: Option<u64>,
    inference_latency_ms: Option<u64>,
    labels: Option<Vec<String>>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub camera: CameraSettings,
    pub tick_interval: Duration,
    pub model: ModelSettings,
}

#[derive(Debug, Clone)]
pub struct CameraSettings {
    pub uri: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelSource {
    /// Built-in bright-region detector.
    Stub,
    /// ONNX file, requires the `backend-tract` feature.
    Onnx(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub source: ModelSource,
    /// Artificial load delay for the stub model.
    pub load_latency: Duration,
    /// Artificial per-frame delay for the stub model.
    pub inference_latency: Duration,
    /// Class names indexed by the model's class id.
    pub labels: Vec<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            camera: CameraSettings {
                uri: DEFAULT_CAMERA_URI.to_string(),
                width: CAPTURE_WIDTH,
                height: CAPTURE_HEIGHT,
            },
            tick_interval: Duration::from_millis(DEFAULT_TICK_MS),
            model: ModelSettings {
                source: ModelSource::Stub,
                load_latency: Duration::ZERO,
                inference_latency: Duration::ZERO,
                labels: default_labels(),
            },
        }
    }
}

impl MonitorConfig {
    /// Load from `EXAM_MONITOR_CONFIG` (optional JSON file), then env overrides.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("EXAM_MONITOR_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => Some(read_config_file(Path::new(path))?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let defaults = Self::default();
        let camera = CameraSettings {
            uri: file
                .camera
                .as_ref()
                .and_then(|camera| camera.uri.clone())
                .unwrap_or(defaults.camera.uri),
            width: file
                .camera
                .as_ref()
                .and_then(|camera| camera.width)
                .unwrap_or(defaults.camera.width),
            height: file
                .camera
                .as_ref()
                .and_then(|camera| camera.height)
                .unwrap_or(defaults.camera.height),
        };
        let tick_interval = file
            .detection
            .and_then(|detection| detection.tick_ms)
            .map(Duration::from_millis)
            .unwrap_or(defaults.tick_interval);
        let model_file = file.model.unwrap_or_default();
        let model = ModelSettings {
            source: match model_file.source {
                Some(source) => parse_model_source(&source)?,
                None => defaults.model.source,
            },
            load_latency: model_file
                .load_latency_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.model.load_latency),
            inference_latency: model_file
                .inference_latency_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.model.inference_latency),
            labels: model_file.labels.unwrap_or(defaults.model.labels),
        };
        Ok(Self {
            camera,
            tick_interval,
            model,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(uri) = std::env::var("EXAM_MONITOR_CAMERA") {
            if !uri.trim().is_empty() {
                self.camera.uri = uri;
            }
        }
        if let Ok(tick) = std::env::var("EXAM_MONITOR_TICK_MS") {
            let millis: u64 = tick.parse().map_err(|_| {
                anyhow!("EXAM_MONITOR_TICK_MS must be an integer number of milliseconds")
            })?;
            self.tick_interval = Duration::from_millis(millis);
        }
        if let Ok(model) = std::env::var("EXAM_MONITOR_MODEL") {
            if !model.trim().is_empty() {
                self.model.source = parse_model_source(&model)?;
            }
        }
        if let Ok(latency) = std::env::var("EXAM_MONITOR_MODEL_LATENCY_MS") {
            let millis: u64 = latency.parse().map_err(|_| {
                anyhow!("EXAM_MONITOR_MODEL_LATENCY_MS must be an integer number of milliseconds")
            })?;
            self.model.load_latency = Duration::from_millis(millis);
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if self.tick_interval.is_zero() {
            return Err(anyhow!("detection tick interval must be greater than zero"));
        }
        if (self.camera.width, self.camera.height) != (CAPTURE_WIDTH, CAPTURE_HEIGHT) {
            return Err(anyhow!(
                "capture size must be {}x{}, got {}x{}",
                CAPTURE_WIDTH,
                CAPTURE_HEIGHT,
                self.camera.width,
                self.camera.height
            ));
        }
        if !self.camera.uri.contains("://") {
            return Err(anyhow!("camera uri {:?} has no scheme", self.camera.uri));
        }
        self.model.labels.retain(|label| !label.trim().is_empty());
        if self.model.labels.is_empty() {
            self.model.labels = default_labels();
        }
        Ok(())
    }
}

fn parse_model_source(value: &str) -> Result<ModelSource> {
    let value = value.trim();
    if value.is_empty() {
        return Err(anyhow!("model source must not be empty"));
    }
    if value.eq_ignore_ascii_case(DEFAULT_MODEL) {
        return Ok(ModelSource::Stub);
    }
    if !value.ends_with(".onnx") {
        return Err(anyhow!(
            "model source {:?} must be \"stub\" or a path to an .onnx file",
            value
        ));
    }
    Ok(ModelSource::Onnx(PathBuf::from(value)))
}

fn default_labels() -> Vec<String> {
    DEFAULT_LABELS.iter().map(|label| label.to_string()).collect()
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
