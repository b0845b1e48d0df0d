//! Camera acquisition and release.
//!
//! `StreamController` owns the single live `CameraStream` of a session. It is
//! the only component that talks to the media boundary (`MediaDevices`), and
//! the only one that stops tracks.
//!
//! The controller is responsible for:
//! - Requesting a video stream at the fixed capture resolution
//! - Releasing any previous stream before a new acquisition
//! - Stopping every track on release, idempotently
//! - Grabbing the current frame for the detection loop
//!
//! The controller MUST NOT:
//! - Hold more than one active stream
//! - Buffer frames beyond the tick that requested them

mod synthetic;

use async_trait::async_trait;
use std::sync::Arc;

use anyhow::{anyhow, Result};

use crate::error::MonitorError;
use crate::frame::{CaptureConstraints, VideoFrame};

pub use synthetic::{SyntheticCamera, SyntheticTrack};

// ----------------------------------------------------------------------------
// Media boundary
// ----------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrackKind {
    Video,
    Audio,
}

/// One live media track handed out by the platform.
///
/// `stop` must be idempotent: stopping an ended track is a no-op.
pub trait MediaTrack: Send {
    fn kind(&self) -> TrackKind;

    fn label(&self) -> &str;

    fn is_live(&self) -> bool;

    fn stop(&mut self);

    /// Grab the most recent frame. Only meaningful for video tracks.
    fn grab_frame(&mut self) -> Result<VideoFrame, MonitorError>;
}

/// Platform capability to open camera tracks.
///
/// If the returned future is dropped before it resolves, implementations must
/// not leave any track live.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    /// Request tracks matching `constraints`.
    ///
    /// Failures surface as `PermissionDenied` or `DeviceUnavailable`.
    async fn get_user_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Vec<Box<dyn MediaTrack>>, MonitorError>;
}

/// Select a media backend from a camera URI.
///
/// Only `stub://` URIs are built in; hosts with a real camera plug their own
/// `MediaDevices` into the coordinator.
pub fn open_devices(uri: &str) -> Result<Arc<dyn MediaDevices>> {
    if uri.starts_with("stub://") {
        Ok(Arc::new(SyntheticCamera::new(uri)))
    } else {
        Err(anyhow!(
            "no built-in media backend for {:?} (expected a stub:// URI)",
            uri
        ))
    }
}

// ----------------------------------------------------------------------------
// CameraStream
// ----------------------------------------------------------------------------

/// Live camera stream. Owned by `StreamController`.
///
/// Dropping the stream stops its tracks, so hardware is released even when a
/// session future is abandoned mid-flight.
pub struct CameraStream {
    id: u64,
    tracks: Vec<Box<dyn MediaTrack>>,
}

impl CameraStream {
    fn new(id: u64, tracks: Vec<Box<dyn MediaTrack>>) -> Self {
        Self { id, tracks }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// True while any track is live.
    pub fn active(&self) -> bool {
        self.tracks.iter().any(|track| track.is_live())
    }

    pub fn track_labels(&self) -> Vec<String> {
        self.tracks
            .iter()
            .map(|track| track.label().to_string())
            .collect()
    }

    /// Stop every live track. Returns how many were live.
    fn stop_all(&mut self) -> usize {
        let mut stopped = 0;
        for track in self.tracks.iter_mut().filter(|track| track.is_live()) {
            track.stop();
            stopped += 1;
        }
        stopped
    }

    fn capture_frame(&mut self) -> Result<VideoFrame, MonitorError> {
        let track = self
            .tracks
            .iter_mut()
            .find(|track| track.kind() == TrackKind::Video && track.is_live())
            .ok_or_else(|| MonitorError::CaptureFailed("no live video track".to_string()))?;
        track.grab_frame()
    }
}

impl Drop for CameraStream {
    fn drop(&mut self) {
        self.stop_all();
    }
}

// ----------------------------------------------------------------------------
// StreamController
// ----------------------------------------------------------------------------

/// Counters for one controller.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StreamStats {
    pub acquisitions: u64,
    pub releases: u64,
    pub frames_captured: u64,
    pub capture_failures: u64,
}

pub struct StreamController {
    devices: Arc<dyn MediaDevices>,
    stream: Option<CameraStream>,
    next_id: u64,
    stats: StreamStats,
}

impl StreamController {
    pub fn new(devices: Arc<dyn MediaDevices>) -> Self {
        Self {
            devices,
            stream: None,
            next_id: 1,
            stats: StreamStats::default(),
        }
    }

    /// Acquire the camera.
    ///
    /// A stream already held is released first. A grant without any video
    /// track is treated as `DeviceUnavailable` and its tracks are stopped.
    pub async fn acquire(
        &mut self,
        constraints: &CaptureConstraints,
    ) -> Result<&CameraStream, MonitorError> {
        if self.release() {
            log::warn!("stream controller: released previous stream before re-acquiring");
        }

        self.stats.acquisitions += 1;
        log::info!(
            "stream controller: requesting camera {}x{}",
            constraints.width,
            constraints.height
        );
        let tracks = self.devices.get_user_media(constraints).await?;

        let id = self.next_id;
        self.next_id += 1;
        let mut stream = CameraStream::new(id, tracks);

        let has_video = stream
            .tracks
            .iter()
            .any(|track| track.kind() == TrackKind::Video && track.is_live());
        if !has_video {
            stream.stop_all();
            return Err(MonitorError::DeviceUnavailable(
                "grant contained no live video track".to_string(),
            ));
        }

        log::info!(
            "stream controller: stream {} acquired ({})",
            id,
            stream.track_labels().join(", ")
        );
        let stream = self.stream.insert(stream);
        Ok(&*stream)
    }

    /// Stop every track of the held stream.
    ///
    /// Safe to call any number of times; returns true only when a stream was
    /// actually released by this call.
    pub fn release(&mut self) -> bool {
        let Some(mut stream) = self.stream.take() else {
            return false;
        };
        let stopped = stream.stop_all();
        self.stats.releases += 1;
        log::info!(
            "stream controller: stream {} released ({} track(s) stopped)",
            stream.id(),
            stopped
        );
        true
    }

    /// Grab the current frame from the live stream.
    pub fn capture_frame(&mut self) -> Result<VideoFrame, MonitorError> {
        let result = match self.stream.as_mut() {
            Some(stream) => stream.capture_frame(),
            None => Err(MonitorError::CaptureFailed("no stream held".to_string())),
        };
        match &result {
            Ok(_) => self.stats.frames_captured += 1,
            Err(_) => self.stats.capture_failures += 1,
        }
        result
    }

    /// True while a held stream has a live track.
    pub fn is_active(&self) -> bool {
        self.stream.as_ref().is_some_and(CameraStream::active)
    }

    pub fn stream(&self) -> Option<&CameraStream> {
        self.stream.as_ref()
    }

    pub fn stats(&self) -> StreamStats {
        self.stats.clone()
    }
}
