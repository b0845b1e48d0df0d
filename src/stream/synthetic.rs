//! Synthetic camera for `stub://` URIs.
//!
//! Generates a dark gradient scene with a bright subject drifting left and
//! right, so the stub detector has something to find. Two URIs simulate the
//! acquisition failures:
//! - `stub://denied` fails with `PermissionDenied`
//! - `stub://unavailable` fails with `DeviceUnavailable`

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use super::{MediaDevices, MediaTrack, TrackKind};
use crate::error::MonitorError;
use crate::frame::{CaptureConstraints, VideoFrame};

const SUBJECT_SIZE: u32 = 48;
const SUBJECT_STEP: u32 = 6;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Grant {
    Allow,
    Deny,
    Unavailable,
}

/// Synthetic media devices.
pub struct SyntheticCamera {
    uri: String,
    grant: Grant,
    opened: AtomicU64,
    live_flags: Mutex<Vec<Arc<AtomicBool>>>,
}

impl SyntheticCamera {
    pub fn new(uri: &str) -> Self {
        let grant = match uri.trim_start_matches("stub://") {
            "denied" => Grant::Deny,
            "unavailable" => Grant::Unavailable,
            _ => Grant::Allow,
        };
        Self {
            uri: uri.to_string(),
            grant,
            opened: AtomicU64::new(0),
            live_flags: Mutex::new(Vec::new()),
        }
    }

    /// Number of tracks handed out so far.
    pub fn tracks_opened(&self) -> u64 {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of handed-out tracks that are still live.
    pub fn live_tracks(&self) -> usize {
        match self.live_flags.lock() {
            Ok(flags) => flags.iter().filter(|flag| flag.load(Ordering::SeqCst)).count(),
            Err(_) => 0,
        }
    }

    /// End every live track, as if the camera were unplugged.
    pub fn end_all_tracks(&self) {
        if let Ok(flags) = self.live_flags.lock() {
            for flag in flags.iter() {
                flag.store(false, Ordering::SeqCst);
            }
        }
    }
}

#[async_trait]
impl MediaDevices for SyntheticCamera {
    async fn get_user_media(
        &self,
        constraints: &CaptureConstraints,
    ) -> Result<Vec<Box<dyn MediaTrack>>, MonitorError> {
        match self.grant {
            Grant::Deny => {
                return Err(MonitorError::PermissionDenied(format!(
                    "{} refused camera access",
                    self.uri
                )))
            }
            Grant::Unavailable => {
                return Err(MonitorError::DeviceUnavailable(format!(
                    "{} has no camera attached",
                    self.uri
                )))
            }
            Grant::Allow => {}
        }

        let live = Arc::new(AtomicBool::new(true));
        {
            let mut flags = self
                .live_flags
                .lock()
                .map_err(|_| MonitorError::DeviceUnavailable("camera registry poisoned".into()))?;
            flags.retain(|flag| flag.load(Ordering::SeqCst));
            flags.push(Arc::clone(&live));
        }
        self.opened.fetch_add(1, Ordering::SeqCst);

        log::info!(
            "SyntheticCamera: granted {} at {}x{}",
            self.uri,
            constraints.width,
            constraints.height
        );
        Ok(vec![Box::new(SyntheticTrack {
            label: format!("Synthetic Camera ({})", self.uri),
            width: constraints.width,
            height: constraints.height,
            frame_count: 0,
            live,
        })])
    }
}

/// Video track of the synthetic camera.
pub struct SyntheticTrack {
    label: String,
    width: u32,
    height: u32,
    frame_count: u64,
    live: Arc<AtomicBool>,
}

impl SyntheticTrack {
    /// Left edge of the subject for the current frame, bouncing between walls.
    fn subject_x(&self) -> u32 {
        let travel = self.width.saturating_sub(SUBJECT_SIZE).max(1);
        let pos = (self.frame_count * SUBJECT_STEP as u64) % (2 * travel as u64);
        if pos < travel as u64 {
            pos as u32
        } else {
            (2 * travel as u64 - pos) as u32
        }
    }

    fn generate_pixels(&self) -> Vec<u8> {
        let (w, h) = (self.width, self.height);
        let mut pixels = vec![0u8; (w * h * 4) as usize];
        let subject_x = self.subject_x();
        let subject_y = h.saturating_sub(SUBJECT_SIZE) / 2;

        for y in 0..h {
            for x in 0..w {
                let idx = ((y * w + x) * 4) as usize;
                let in_subject = x >= subject_x
                    && x < subject_x + SUBJECT_SIZE
                    && y >= subject_y
                    && y < subject_y + SUBJECT_SIZE;
                let value = if in_subject {
                    240
                } else {
                    // Background stays well below the stub detector's threshold.
                    ((x + y + self.frame_count as u32) % 96) as u8
                };
                pixels[idx..idx + 4].copy_from_slice(&[value, value, value, 255]);
            }
        }
        pixels
    }
}

impl MediaTrack for SyntheticTrack {
    fn kind(&self) -> TrackKind {
        TrackKind::Video
    }

    fn label(&self) -> &str {
        &self.label
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::SeqCst)
    }

    fn stop(&mut self) {
        if self.live.swap(false, Ordering::SeqCst) {
            log::debug!("SyntheticCamera: stopped {}", self.label);
        }
    }

    fn grab_frame(&mut self) -> Result<VideoFrame, MonitorError> {
        if !self.is_live() {
            return Err(MonitorError::CaptureFailed(format!(
                "{} has ended",
                self.label
            )));
        }
        self.frame_count += 1;
        VideoFrame::from_rgba(self.generate_pixels(), self.width, self.height, self.frame_count)
            .map_err(|e| MonitorError::CaptureFailed(e.to_string()))
    }
}

impl Drop for SyntheticTrack {
    fn drop(&mut self) {
        self.stop();
    }
}
