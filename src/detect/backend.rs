use async_trait::async_trait;
use std::sync::Arc;

use crate::detect::result::Prediction;
use crate::error::MonitorError;
use crate::frame::VideoFrame;

/// A loaded, ready detection model.
///
/// The instance is shared read-only by every inference call. `detect` takes
/// `&self`; implementations must not rely on the caller for locking beyond the
/// detection loop running ticks one at a time.
///
/// # Boundary
///
/// Implementations receive the frame for the duration of the call only. They
/// must not retain pixels, write them to disk, or send them over the network.
#[async_trait]
pub trait DetectionModel: Send + Sync {
    /// Model identifier for logs.
    fn name(&self) -> &str;

    /// Run detection on one frame.
    ///
    /// Errors are reported as `MonitorError::InferenceTransient`; the caller
    /// skips the tick and carries on.
    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Prediction>, MonitorError>;
}

/// Fetches and initialises a detection model.
///
/// Called at most once per successful load by `ModelLoader`.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider identifier for logs.
    fn name(&self) -> &str;

    /// Load the model. Failures surface as `MonitorError::ModelLoadFailure`.
    async fn load(&self) -> Result<Arc<dyn DetectionModel>, MonitorError>;
}
