use thiserror::Error;

/// Failures surfaced by the proctoring monitor.
///
/// `PermissionDenied`, `DeviceUnavailable` and `ModelLoadFailure` end a session.
/// `InferenceTransient` and `CaptureFailed` only cost a single tick.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MonitorError {
    #[error("camera permission denied: {0}")]
    PermissionDenied(String),

    #[error("camera device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("detection model failed to load: {0}")]
    ModelLoadFailure(String),

    #[error("inference failed: {0}")]
    InferenceTransient(String),

    #[error("frame capture failed: {0}")]
    CaptureFailed(String),
}

impl MonitorError {
    /// True for failures that terminate the session.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            MonitorError::PermissionDenied(_)
                | MonitorError::DeviceUnavailable(_)
                | MonitorError::ModelLoadFailure(_)
        )
    }

    /// True for failures raised while acquiring the camera.
    pub fn is_camera_failure(&self) -> bool {
        matches!(
            self,
            MonitorError::PermissionDenied(_) | MonitorError::DeviceUnavailable(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = MonitorError::PermissionDenied("user dismissed prompt".to_string());
        assert_eq!(
            err.to_string(),
            "camera permission denied: user dismissed prompt"
        );

        let err = MonitorError::InferenceTransient("backend busy".to_string());
        assert_eq!(err.to_string(), "inference failed: backend busy");
    }

    #[test]
    fn classifies_terminal_failures() {
        assert!(MonitorError::DeviceUnavailable("gone".into()).is_terminal());
        assert!(MonitorError::ModelLoadFailure("404".into()).is_terminal());
        assert!(!MonitorError::InferenceTransient("x".into()).is_terminal());
        assert!(!MonitorError::CaptureFailed("x".into()).is_terminal());

        assert!(MonitorError::PermissionDenied("x".into()).is_camera_failure());
        assert!(!MonitorError::ModelLoadFailure("x".into()).is_camera_failure());
    }
}
