//! User-facing notification port.
//!
//! The monitor never talks to a UI toolkit directly. Terminal failures are
//! handed to a `Notifier` supplied by the host, once per failure.

use crate::error::MonitorError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Destructive,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub title: String,
    pub description: String,
    pub severity: Severity,
}

impl Notification {
    /// Notification shown for a terminal session failure.
    pub fn for_error(err: &MonitorError) -> Self {
        if err.is_camera_failure() {
            Self {
                title: "Camera Error".to_string(),
                description: "Please enable camera access to continue with the test".to_string(),
                severity: Severity::Destructive,
            }
        } else {
            Self {
                title: "Proctoring Error".to_string(),
                description: "The proctoring model could not be loaded".to_string(),
                severity: Severity::Destructive,
            }
        }
    }
}

/// Alert sink provided by the host.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Notifier that writes alerts to the log. Used by the demo binary and by
/// hosts without an alert surface.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, notification: Notification) {
        match notification.severity {
            Severity::Destructive => log::error!(
                "{}: {}",
                notification.title,
                notification.description
            ),
            Severity::Info => log::info!("{}: {}", notification.title, notification.description),
        }
    }
}
