//! Session lifecycle coordination.
//!
//! One `LifecycleCoordinator` drives one monitor session through
//! `Idle → Starting → Active → Stopping → Stopped`, with `Errored` reachable
//! from `Starting` or `Active`. Every trigger (mount, submission flag,
//! unmount, failure) funnels into this single state machine, which owns the
//! one authoritative hardware release.
//!
//! The coordinator is a single future. It owns the session's stream
//! controller, overlay renderer and detection loop for the whole session;
//! nothing is rebuilt between scheduling passes, so the loop and the
//! coordinator always see the same handles.
//!
//! Guarantees:
//! - A session mounted after submission never requests the camera.
//! - Hardware is released at most once per session, before the session is
//!   reported as `Stopping`, `Stopped` or `Errored`.
//! - At most one notification is raised per session.
//! - No overlay draw happens after a stop has been processed.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::MonitorConfig;
use crate::detect::{DetectionModel, ModelLoader};
use crate::detection_loop::{DetectionLoop, LoopStats, DEFAULT_TICK_INTERVAL};
use crate::error::MonitorError;
use crate::frame::CaptureConstraints;
use crate::notify::{Notification, Notifier};
use crate::overlay::{DrawingSurface, OverlayRenderer};
use crate::stream::{MediaDevices, StreamController, StreamStats};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Active,
    Stopping,
    Stopped,
    Errored,
}

impl SessionState {
    /// No further camera or loop activity can happen.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Errored)
    }

    /// States in which the camera must not be held.
    pub fn forbids_hardware(self) -> bool {
        matches!(
            self,
            SessionState::Stopping | SessionState::Stopped | SessionState::Errored
        )
    }

    /// Whether the host should show the monitor at all.
    pub fn is_visible(self) -> bool {
        matches!(self, SessionState::Starting | SessionState::Active)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Starting => "starting",
            SessionState::Active => "active",
            SessionState::Stopping => "stopping",
            SessionState::Stopped => "stopped",
            SessionState::Errored => "errored",
        };
        f.write_str(name)
    }
}

/// Why a session left `Starting` or `Active` without failing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    /// The exam was submitted.
    Submitted,
    /// The host unmounted the monitor.
    Unmounted,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Submitted => f.write_str("exam submitted"),
            StopReason::Unmounted => f.write_str("monitor unmounted"),
        }
    }
}

/// Summary returned when a session ends.
#[derive(Clone, Debug)]
pub struct SessionReport {
    pub final_state: SessionState,
    /// Every state the session published, in order, starting with `Idle`.
    pub transitions: Vec<SessionState>,
    pub stop_reason: Option<StopReason>,
    pub error: Option<MonitorError>,
    pub notifications: u32,
    pub loop_stats: LoopStats,
    pub stream_stats: StreamStats,
}

impl SessionReport {
    /// Inline status text for hosts that show an error panel.
    pub fn status_message(&self) -> Option<&'static str> {
        match &self.error {
            Some(err) if err.is_camera_failure() => Some("Could not access camera"),
            Some(_) => Some("Proctoring monitor unavailable"),
            None => None,
        }
    }
}

/// Host-side handle to a running session.
#[derive(Clone)]
pub struct MonitorHandle {
    state: watch::Receiver<SessionState>,
    unmount: Arc<watch::Sender<bool>>,
}

impl MonitorHandle {
    /// Ask the session to stop. Idempotent.
    pub fn unmount(&self) {
        self.unmount.send_replace(true);
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Receiver for state changes.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }
}

/// Callback run synchronously on every published state change.
pub type TransitionHook = Box<dyn Fn(SessionState) + Send + Sync>;

pub struct LifecycleCoordinator {
    stream: StreamController,
    loader: Arc<ModelLoader>,
    renderer: OverlayRenderer,
    notifier: Arc<dyn Notifier>,
    constraints: CaptureConstraints,
    tick_interval: Duration,
    state_tx: watch::Sender<SessionState>,
    state_rx: watch::Receiver<SessionState>,
    unmount_tx: Arc<watch::Sender<bool>>,
    on_transition: Option<TransitionHook>,
    transitions: Vec<SessionState>,
    released: bool,
    notifications: u32,
    stop_reason: Option<StopReason>,
    error: Option<MonitorError>,
    loop_stats: LoopStats,
}

impl LifecycleCoordinator {
    pub fn new(
        devices: Arc<dyn MediaDevices>,
        loader: Arc<ModelLoader>,
        surface: Box<dyn DrawingSurface>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        let (unmount_tx, _) = watch::channel(false);
        Self {
            stream: StreamController::new(devices),
            loader,
            renderer: OverlayRenderer::new(surface),
            notifier,
            constraints: CaptureConstraints::proctoring(),
            tick_interval: DEFAULT_TICK_INTERVAL,
            state_tx,
            state_rx,
            unmount_tx: Arc::new(unmount_tx),
            on_transition: None,
            transitions: vec![SessionState::Idle],
            released: false,
            notifications: 0,
            stop_reason: None,
            error: None,
            loop_stats: LoopStats::default(),
        }
    }

    /// Build a coordinator using the tick interval from `config`.
    pub fn from_config(
        config: &MonitorConfig,
        devices: Arc<dyn MediaDevices>,
        loader: Arc<ModelLoader>,
        surface: Box<dyn DrawingSurface>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self::new(devices, loader, surface, notifier).with_tick_interval(config.tick_interval)
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Run `hook` on every state change, before the coordinator does anything
    /// else. Unlike `MonitorHandle::subscribe`, no intermediate state is
    /// coalesced away. Hosts use it to hide the monitor in the same poll.
    pub fn on_transition<F>(mut self, hook: F) -> Self
    where
        F: Fn(SessionState) + Send + Sync + 'static,
    {
        self.on_transition = Some(Box::new(hook));
        self
    }

    pub fn handle(&self) -> MonitorHandle {
        MonitorHandle {
            state: self.state_rx.clone(),
            unmount: Arc::clone(&self.unmount_tx),
        }
    }

    /// Mount the monitor and drive the session to a terminal state.
    ///
    /// `submitted` is the exam flow's submission flag. It is only read. The
    /// returned future never fails: every error ends in `Errored` and is
    /// described in the report.
    pub async fn run(mut self, mut submitted: watch::Receiver<bool>) -> SessionReport {
        let mut unmount = self.unmount_tx.subscribe();

        if *submitted.borrow_and_update() || *unmount.borrow_and_update() {
            log::info!("monitor: mounted after submission or unmount; camera not requested");
            self.stop_reason = Some(if *unmount.borrow() {
                StopReason::Unmounted
            } else {
                StopReason::Submitted
            });
            self.set_state(SessionState::Stopped);
            return self.report();
        }

        self.set_state(SessionState::Starting);
        let started = tokio::select! {
            biased;
            reason = stop_requested(&mut submitted, &mut unmount) => Err(reason),
            result = self.start() => Ok(result),
        };

        let model = match started {
            Err(reason) => {
                log::info!("monitor: {} while starting; start abandoned", reason);
                self.stop(reason);
                return self.report();
            }
            Ok(Err(err)) => {
                self.fail(err);
                return self.report();
            }
            Ok(Ok(model)) => model,
        };

        self.set_state(SessionState::Active);
        let mut detection = DetectionLoop::new(model, self.tick_interval);
        let reason = tokio::select! {
            biased;
            reason = stop_requested(&mut submitted, &mut unmount) => Some(reason),
            _ = detection.run(&mut self.stream, &mut self.renderer) => None,
        };
        // The loop future is gone; nothing it had pending can reach the overlay.
        detection.discard_in_flight();
        self.loop_stats = detection.stats();

        match reason {
            Some(reason) => self.stop(reason),
            None => self.fail(MonitorError::DeviceUnavailable(
                "camera stream ended while monitoring".to_string(),
            )),
        }
        self.report()
    }

    /// Load the model, then open the camera.
    ///
    /// The camera is only requested once a model is ready, so a session that
    /// cannot run inference never prompts for camera access. The cost is
    /// latency: on a cold start the camera prompt waits for the whole model
    /// load instead of overlapping with it. Later sessions get the cached
    /// model and prompt immediately.
    async fn start(&mut self) -> Result<Arc<dyn DetectionModel>, MonitorError> {
        let model = self.loader.load().await?;
        self.stream.acquire(&self.constraints).await?;
        Ok(model)
    }

    fn stop(&mut self, reason: StopReason) {
        log::info!("monitor: stopping ({})", reason);
        self.stop_reason = Some(reason);
        self.release_hardware();
        self.set_state(SessionState::Stopping);
        self.renderer.clear();
        self.set_state(SessionState::Stopped);
    }

    fn fail(&mut self, err: MonitorError) {
        log::error!("monitor: session failed: {}", err);
        self.release_hardware();
        self.renderer.clear();
        self.set_state(SessionState::Errored);
        if self.notifications == 0 {
            self.notifications += 1;
            self.notifier.notify(Notification::for_error(&err));
        }
        self.error = Some(err);
    }

    /// The single hardware release of the session.
    fn release_hardware(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        if !self.stream.release() {
            log::debug!("monitor: no camera held at release");
        }
    }

    fn set_state(&mut self, state: SessionState) {
        let previous = self.state_tx.send_replace(state);
        if previous != state {
            log::info!("monitor: {} -> {}", previous, state);
            self.transitions.push(state);
            if let Some(hook) = &self.on_transition {
                hook(state);
            }
        }
    }

    fn report(&self) -> SessionReport {
        SessionReport {
            final_state: *self.state_rx.borrow(),
            transitions: self.transitions.clone(),
            stop_reason: self.stop_reason,
            error: self.error.clone(),
            notifications: self.notifications,
            loop_stats: self.loop_stats.clone(),
            stream_stats: self.stream.stats(),
        }
    }
}

/// Resolve once the exam is submitted or the host unmounts.
async fn stop_requested(
    submitted: &mut watch::Receiver<bool>,
    unmount: &mut watch::Receiver<bool>,
) -> StopReason {
    tokio::select! {
        biased;
        _ = wait_until_set(unmount) => StopReason::Unmounted,
        _ = wait_until_set(submitted) => StopReason::Submitted,
    }
}

async fn wait_until_set(flag: &mut watch::Receiver<bool>) {
    let closed = flag.wait_for(|set| *set).await.is_err();
    if closed {
        // The owner went away without ever raising the flag.
        std::future::pending::<()>().await;
    }
}
