use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use crate::detect::backend::{DetectionModel, ModelProvider};
use crate::detect::result::{BoundingBox, Prediction};
use crate::error::MonitorError;
use crate::frame::VideoFrame;

const DEFAULT_LUMA_THRESHOLD: u8 = 200;
const SAMPLE_STEP: u32 = 2;

/// Provider for the stub detector. Loads instantly unless a latency is set.
#[derive(Clone, Debug, Default)]
pub struct StubModelProvider {
    load_latency: Duration,
    inference_latency: Duration,
}

impl StubModelProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay model load, to exercise the `Starting` state.
    pub fn with_load_latency(mut self, latency: Duration) -> Self {
        self.load_latency = latency;
        self
    }

    /// Delay every inference call.
    pub fn with_inference_latency(mut self, latency: Duration) -> Self {
        self.inference_latency = latency;
        self
    }
}

#[async_trait]
impl ModelProvider for StubModelProvider {
    fn name(&self) -> &str {
        "stub"
    }

    async fn load(&self) -> Result<Arc<dyn DetectionModel>, MonitorError> {
        if !self.load_latency.is_zero() {
            tokio::time::sleep(self.load_latency).await;
        }
        Ok(Arc::new(StubDetector {
            luma_threshold: DEFAULT_LUMA_THRESHOLD,
            latency: self.inference_latency,
        }))
    }
}

/// Stub detector for testing and demos.
///
/// Reports the bounding box of bright pixels as a single `person`. The score is
/// the fraction of sampled pixels inside that box which are bright, so a solid
/// subject scores close to 1.0 and scattered noise scores low.
pub struct StubDetector {
    luma_threshold: u8,
    latency: Duration,
}

impl StubDetector {
    fn bright_region(&self, frame: &VideoFrame) -> Option<Prediction> {
        let mut min = (u32::MAX, u32::MAX);
        let mut max = (0u32, 0u32);
        let mut bright = 0u32;

        for y in (0..frame.height).step_by(SAMPLE_STEP as usize) {
            for x in (0..frame.width).step_by(SAMPLE_STEP as usize) {
                if frame.luma(x, y)? >= self.luma_threshold {
                    bright += 1;
                    min = (min.0.min(x), min.1.min(y));
                    max = (max.0.max(x), max.1.max(y));
                }
            }
        }

        if bright == 0 {
            return None;
        }

        let cols = (max.0 - min.0) / SAMPLE_STEP + 1;
        let rows = (max.1 - min.1) / SAMPLE_STEP + 1;
        let score = bright as f32 / (cols * rows) as f32;
        let bbox = BoundingBox::new(
            min.0 as f32,
            min.1 as f32,
            (max.0 - min.0 + SAMPLE_STEP) as f32,
            (max.1 - min.1 + SAMPLE_STEP) as f32,
        );
        Some(Prediction::new("person", score, bbox))
    }
}

#[async_trait]
impl DetectionModel for StubDetector {
    fn name(&self) -> &str {
        "stub"
    }

    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Prediction>, MonitorError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        Ok(self.bright_region(frame).into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with_square(x0: u32, y0: u32, size: u32) -> VideoFrame {
        let (w, h) = (64u32, 48u32);
        let mut data = vec![0u8; (w * h * 4) as usize];
        for y in y0..y0 + size {
            for x in x0..x0 + size {
                let idx = ((y * w + x) * 4) as usize;
                data[idx..idx + 4].copy_from_slice(&[255, 255, 255, 255]);
            }
        }
        VideoFrame::from_rgba(data, w, h, 1).unwrap()
    }

    #[tokio::test]
    async fn stub_detector_boxes_bright_subject() {
        let model = StubModelProvider::new().load().await.unwrap();

        let predictions = model.detect(&frame_with_square(10, 8, 16)).await.unwrap();
        assert_eq!(predictions.len(), 1);
        let p = &predictions[0];
        assert_eq!(p.label, "person");
        assert_eq!(p.bbox, BoundingBox::new(10.0, 8.0, 16.0, 16.0));
        assert_eq!(p.score, 1.0);
    }

    #[tokio::test]
    async fn stub_detector_reports_nothing_on_dark_frame() {
        let model = StubModelProvider::new().load().await.unwrap();
        let dark = VideoFrame::from_rgba(vec![0; 8 * 8 * 4], 8, 8, 1).unwrap();
        assert!(model.detect(&dark).await.unwrap().is_empty());
    }
}
