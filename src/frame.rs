//! Captured video frames and capture constraints.
//!
//! - `VideoFrame`: one RGBA frame grabbed from a live camera track.
//! - `CaptureConstraints`: what the monitor asks the media boundary for.
//!
//! The monitor works at a single fixed resolution. The video element, the
//! overlay surface and the detector all share the same pixel space, so no
//! coordinate scaling happens anywhere in the pipeline.

use anyhow::{anyhow, Result};
use image::RgbaImage;
use std::time::Instant;

/// Fixed capture width in pixels.
pub const CAPTURE_WIDTH: u32 = 320;

/// Fixed capture height in pixels.
pub const CAPTURE_HEIGHT: u32 = 240;

const BYTES_PER_PIXEL: usize = 4;

// ----------------------------------------------------------------------------
// CaptureConstraints
// ----------------------------------------------------------------------------

/// Which camera to prefer on devices with more than one.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FacingMode {
    #[default]
    User,
    Environment,
}

/// Constraints passed to `MediaDevices::get_user_media`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureConstraints {
    pub width: u32,
    pub height: u32,
    pub facing: FacingMode,
    pub audio: bool,
}

impl CaptureConstraints {
    /// Video-only request at the fixed proctoring resolution.
    pub fn proctoring() -> Self {
        Self {
            width: CAPTURE_WIDTH,
            height: CAPTURE_HEIGHT,
            facing: FacingMode::User,
            audio: false,
        }
    }
}

impl Default for CaptureConstraints {
    fn default() -> Self {
        Self::proctoring()
    }
}

// ----------------------------------------------------------------------------
// VideoFrame
// ----------------------------------------------------------------------------

/// One RGBA frame captured from a video track.
///
/// Frames are produced per tick and dropped once inference resolves. They are
/// never buffered beyond the tick that captured them.
#[derive(Clone, Debug)]
pub struct VideoFrame {
    data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Per-track capture sequence number, starting at 1.
    pub sequence: u64,
    pub captured_at: Instant,
}

impl VideoFrame {
    /// Wrap an RGBA buffer. The buffer length must match the dimensions.
    pub fn from_rgba(data: Vec<u8>, width: u32, height: u32, sequence: u64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(BYTES_PER_PIXEL))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if data.len() != expected {
            return Err(anyhow!(
                "expected {} RGBA bytes for {}x{}, received {}",
                expected,
                width,
                height,
                data.len()
            ));
        }
        Ok(Self {
            data,
            width,
            height,
            sequence,
            captured_at: Instant::now(),
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.data
    }

    /// RGBA value at (x, y), or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * BYTES_PER_PIXEL;
        let px = self.data.get(idx..idx + BYTES_PER_PIXEL)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Luma approximation (ITU-R BT.601 weights) at (x, y).
    pub fn luma(&self, x: u32, y: u32) -> Option<u8> {
        self.pixel(x, y).map(|[r, g, b, _]| {
            ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
        })
    }

    /// True when the frame matches the fixed capture resolution.
    pub fn is_capture_size(&self) -> bool {
        self.width == CAPTURE_WIDTH && self.height == CAPTURE_HEIGHT
    }

    pub fn into_image(self) -> Option<RgbaImage> {
        RgbaImage::from_raw(self.width, self.height, self.data)
    }
}
