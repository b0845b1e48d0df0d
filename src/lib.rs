//! Exam proctoring visual monitor
//!
//! This crate implements the camera monitor shown while a candidate takes an
//! online exam: a live camera feed with an object-detection overlay that runs
//! until the exam is submitted or the monitor is unmounted.
//!
//! # Architecture
//!
//! The monitor upholds a small set of rules by construction:
//!
//! 1. **No camera after submission**: a monitor mounted after submission never
//!    asks for the camera.
//! 2. **Single release**: camera hardware is released exactly once per session,
//!    from whichever trigger arrives first.
//! 3. **Serial inference**: at most one inference is in flight, and no overlay
//!    draw happens after a stop.
//! 4. **Fail closed**: camera or model failures hide the monitor and raise one
//!    notification; they never abort the exam flow.
//!
//! # Module Structure
//!
//! - `stream`: camera acquisition and release (StreamController, MediaDevices)
//! - `detect`: detection models, backends and the shared ModelLoader
//! - `detection_loop`: the periodic capture → infer → draw loop
//! - `overlay`: box and label rendering on a DrawingSurface
//! - `lifecycle`: the session state machine tying it all together
//! - `notify`, `config`, `error`, `frame`: supporting types

pub mod config;
pub mod detect;
pub mod detection_loop;
pub mod error;
pub mod frame;
pub mod lifecycle;
pub mod notify;
pub mod overlay;
pub mod stream;

pub use config::{MonitorConfig, ModelSource};
pub use detect::{BoundingBox, DetectionModel, ModelLoader, ModelProvider, Prediction};
pub use detection_loop::{DetectionLoop, LoopStats, TickOutcome, DEFAULT_TICK_INTERVAL};
pub use error::MonitorError;
pub use frame::{CaptureConstraints, FacingMode, VideoFrame, CAPTURE_HEIGHT, CAPTURE_WIDTH};
pub use lifecycle::{
    LifecycleCoordinator, MonitorHandle, SessionReport, SessionState, StopReason, TransitionHook,
};
pub use notify::{LogNotifier, Notification, Notifier, Severity};
pub use overlay::{Canvas, CanvasSnapshot, DrawingSurface, OverlayRenderer};
pub use stream::{
    open_devices, CameraStream, MediaDevices, MediaTrack, StreamController, StreamStats,
    TrackKind,
};

use std::sync::Arc;

/// Build the model provider selected by `config`.
pub fn model_provider(config: &MonitorConfig) -> anyhow::Result<Arc<dyn ModelProvider>> {
    match &config.model.source {
        ModelSource::Stub => Ok(Arc::new(
            detect::StubModelProvider::new()
                .with_load_latency(config.model.load_latency)
                .with_inference_latency(config.model.inference_latency),
        )),
        #[cfg(feature = "backend-tract")]
        ModelSource::Onnx(path) => Ok(Arc::new(detect::backends::TractModelProvider::new(
            path,
            config.model.labels.clone(),
            config.camera.width,
            config.camera.height,
        ))),
        #[cfg(not(feature = "backend-tract"))]
        ModelSource::Onnx(path) => Err(anyhow::anyhow!(
            "model {} requires the backend-tract feature",
            path.display()
        )),
    }
}
