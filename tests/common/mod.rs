#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use exam_monitor::{
    BoundingBox, CaptureConstraints, Canvas, DetectionModel, LifecycleCoordinator, MediaDevices,
    MediaTrack, ModelLoader, ModelProvider, MonitorError, MonitorHandle, Notification, Notifier,
    Prediction, TrackKind, VideoFrame,
};

pub const TICK: Duration = Duration::from_millis(200);

// ----------------------------------------------------------------------------
// Media devices
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grant {
    Allow,
    Deny,
    Unavailable,
}

/// Camera double that counts requests and tracks liveness.
pub struct FakeMediaDevices {
    grant: Grant,
    latency: Duration,
    requests: AtomicU64,
    granted: AtomicU64,
    live: Mutex<Vec<Arc<AtomicBool>>>,
}

impl FakeMediaDevices {
    pub fn new(grant: Grant) -> Arc<Self> {
        Self::with_latency(grant, Duration::ZERO)
    }

    /// Grants resolve only after `latency`.
    pub fn with_latency(grant: Grant, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            grant,
            latency,
            requests: AtomicU64::new(0),
            granted: AtomicU64::new(0),
            live: Mutex::new(Vec::new()),
        })
    }

    /// `get_user_media` calls, including ones that were abandoned.
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::SeqCst)
    }

    /// Tracks handed out.
    pub fn granted(&self) -> u64 {
        self.granted.load(Ordering::SeqCst)
    }

    pub fn live_tracks(&self) -> usize {
        self.live
            .lock()
            .unwrap()
            .iter()
            .filter(|flag| flag.load(Ordering::SeqCst))
            .count()
    }

    /// Simulate the camera being unplugged.
    pub fn end_all_tracks(&self) {
        for flag in self.live.lock().unwrap().iter() {
            flag.store(false, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl MediaDevices for FakeMediaDevices {
    async fn get_user_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Vec<Box<dyn MediaTrack>>, MonitorError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        match self.grant {
            Grant::Deny => return Err(MonitorError::PermissionDenied("denied by user".into())),
            Grant::Unavailable => {
                return Err(MonitorError::DeviceUnavailable("no camera".into()))
            }
            Grant::Allow => {}
        }
        let live = Arc::new(AtomicBool::new(true));
        {
            let mut flags = self.live.lock().unwrap();
            flags.retain(|flag| flag.load(Ordering::SeqCst));
            flags.push(Arc::clone(&live));
        }
        self.granted.fetch_add(1, Ordering::SeqCst);
        Ok(vec![Box::new(FakeTrack {
            width: constraints.width,
            height: constraints.height,
            frames: 0,
            live,
        })])
    }
}

struct FakeTrack {
    width: u32,
    height: u32,
    frames: u64,
    live: Arc<AtomicBool>,
}

impl MediaTrack for FakeTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        "fake camera"
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        self.live.store(false, Ordering::SeqCst);
    }

    fn grab_frame(&mut self) -> Result<VideoFrame, MonitorError> {
        self.frames += 1;
        VideoFrame::from_rgba(
            vec![0; (self.width * self.height * 4) as usize],
            self.width,
            self.height,
            self.frames,
        )
        .map_err(|e| MonitorError::CaptureFailed(e.to_string()))
    }
}

impl Drop for FakeTrack {
    fn drop(&mut self) {
        self.stop();
    }
}

// ----------------------------------------------------------------------------
// Models
// ----------------------------------------------------------------------------

pub fn person(score: f32) -> Prediction {
    Prediction::new("person", score, BoundingBox::new(40.0, 60.0, 80.0, 100.0))
}

/// Model whose answers are queued up front. Once the script runs out it
/// keeps answering with a single `person 90%`.
pub struct ScriptedModel {
    latency: Duration,
    script: Mutex<VecDeque<Result<Vec<Prediction>, MonitorError>>>,
    calls: AtomicU64,
    completed: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            latency,
            script: Mutex::new(VecDeque::new()),
            calls: AtomicU64::new(0),
            completed: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, answer: Result<Vec<Prediction>, MonitorError>) {
        self.script.lock().unwrap().push_back(answer);
    }

    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Calls that ran to completion (not cancelled).
    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl DetectionModel for ScriptedModel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn detect(&self, _frame: &VideoFrame) -> Result<Vec<Prediction>, MonitorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let answer = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(vec![person(0.9)]));
        self.completed.fetch_add(1, Ordering::SeqCst);
        answer
    }
}

/// Provider handing out a shared `ScriptedModel`, or failing.
pub struct ScriptedProvider {
    model: Arc<ScriptedModel>,
    fail: AtomicBool,
    latency: Duration,
    loads: AtomicU64,
}

impl ScriptedProvider {
    pub fn new(model: Arc<ScriptedModel>) -> Arc<Self> {
        Self::with_latency(model, Duration::ZERO)
    }

    pub fn with_latency(model: Arc<ScriptedModel>, latency: Duration) -> Arc<Self> {
        Arc::new(Self {
            model,
            fail: AtomicBool::new(false),
            latency,
            loads: AtomicU64::new(0),
        })
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn loads(&self) -> u64 {
        self.loads.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ModelProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn load(&self) -> Result<Arc<dyn DetectionModel>, MonitorError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(MonitorError::ModelLoadFailure("weights missing".into()));
        }
        let model: Arc<dyn DetectionModel> = self.model.clone();
        Ok(model)
    }
}

// ----------------------------------------------------------------------------
// Notifier
// ----------------------------------------------------------------------------

#[derive(Default)]
pub struct RecordingNotifier {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, notification: Notification) {
        self.seen.lock().unwrap().push(notification);
    }
}

// ----------------------------------------------------------------------------
// Session harness
// ----------------------------------------------------------------------------

pub struct Session {
    pub coordinator: LifecycleCoordinator,
    pub handle: MonitorHandle,
    pub devices: Arc<FakeMediaDevices>,
    pub model: Arc<ScriptedModel>,
    pub provider: Arc<ScriptedProvider>,
    pub loader: Arc<ModelLoader>,
    pub notifier: Arc<RecordingNotifier>,
    pub canvas: Canvas,
    pub submitted: watch::Sender<bool>,
    pub submitted_rx: watch::Receiver<bool>,
}

pub fn session(devices: Arc<FakeMediaDevices>, provider: Arc<ScriptedProvider>) -> Session {
    let model = Arc::clone(&provider.model);
    let loader = Arc::new(ModelLoader::new(provider.clone()));
    session_with_loader(devices, provider, model, loader)
}

pub fn session_with_loader(
    devices: Arc<FakeMediaDevices>,
    provider: Arc<ScriptedProvider>,
    model: Arc<ScriptedModel>,
    loader: Arc<ModelLoader>,
) -> Session {
    let notifier = Arc::new(RecordingNotifier::default());
    let canvas = Canvas::default();
    let coordinator = LifecycleCoordinator::new(
        devices.clone(),
        loader.clone(),
        Box::new(canvas.clone()),
        notifier.clone(),
    )
    .with_tick_interval(TICK);
    let handle = coordinator.handle();
    let (submitted, submitted_rx) = watch::channel(false);
    Session {
        coordinator,
        handle,
        devices,
        model,
        provider,
        loader,
        notifier,
        canvas,
        submitted,
        submitted_rx,
    }
}

/// Session with an instantly granting camera and an instant model.
pub fn default_session() -> Session {
    session(
        FakeMediaDevices::new(Grant::Allow),
        ScriptedProvider::new(ScriptedModel::new(Duration::ZERO)),
    )
}
