#![cfg(feature = "backend-tract")]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionModel, ModelProvider};
use crate::detect::result::{BoundingBox, Prediction};
use crate::error::MonitorError;
use crate::frame::VideoFrame;

type Plan = TypedRunnableModel<TypedModel>;

/// Loads a local ONNX detector with `tract`.
///
/// The model must take a `1x3xHxW` float input in `[0, 1]` and produce rows of
/// `[x1, y1, x2, y2, score, class]` in input-pixel coordinates (the layout of
/// detectors exported with NMS folded in).
pub struct TractModelProvider {
    model_path: PathBuf,
    labels: Vec<String>,
    width: u32,
    height: u32,
}

impl TractModelProvider {
    pub fn new<P: AsRef<Path>>(model_path: P, labels: Vec<String>, width: u32, height: u32) -> Self {
        Self {
            model_path: model_path.as_ref().to_path_buf(),
            labels,
            width,
            height,
        }
    }
}

#[async_trait]
impl ModelProvider for TractModelProvider {
    fn name(&self) -> &str {
        "tract"
    }

    async fn load(&self) -> Result<Arc<dyn DetectionModel>, MonitorError> {
        let path = self.model_path.clone();
        let labels = self.labels.clone();
        let (width, height) = (self.width, self.height);
        // ONNX parsing and optimisation is CPU bound; keep it off the monitor's thread.
        let model = tokio::task::spawn_blocking(move || TractModel::load(&path, labels, width, height))
            .await
            .map_err(|e| MonitorError::ModelLoadFailure(e.to_string()))?
            .map_err(|e| MonitorError::ModelLoadFailure(format!("{:#}", e)))?;
        Ok(Arc::new(model))
    }
}

/// Tract-backed detection model.
pub struct TractModel {
    plan: Plan,
    labels: Vec<String>,
    width: u32,
    height: u32,
}

impl TractModel {
    fn load(model_path: &Path, labels: Vec<String>, width: u32, height: u32) -> Result<Self> {
        let plan = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(
                    f32::datum_type(),
                    tvec!(1, 3, height as usize, width as usize),
                ),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            plan,
            labels,
            width,
            height,
        })
    }

    fn build_input(&self, frame: &VideoFrame) -> Result<Tensor> {
        if frame.width != self.width || frame.height != self.height {
            return Err(anyhow!(
                "frame size {}x{} does not match model input {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            ));
        }

        let pixels = frame.pixels();
        let width = frame.width as usize;
        let input = tract_ndarray::Array4::from_shape_fn(
            (1, 3, frame.height as usize, width),
            |(_, channel, y, x)| {
                let idx = (y * width + x) * 4 + channel;
                pixels[idx] as f32 / 255.0
            },
        );

        Ok(input.into_tensor())
    }

    fn decode(&self, outputs: TVec<TValue>) -> Result<Vec<Prediction>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let values: Vec<f32> = view.iter().copied().collect();
        if values.len() % 6 != 0 {
            return Err(anyhow!(
                "expected rows of 6 values, got {} values",
                values.len()
            ));
        }

        Ok(values
            .chunks_exact(6)
            .map(|row| {
                let class = row[5].max(0.0) as usize;
                let label = self
                    .labels
                    .get(class)
                    .cloned()
                    .unwrap_or_else(|| format!("class_{}", class));
                Prediction::new(
                    label,
                    row[4],
                    BoundingBox::from_corners(row[0], row[1], row[2], row[3]),
                )
            })
            .filter(|prediction| prediction.bbox.is_finite() && prediction.score.is_finite())
            .collect())
    }
}

#[async_trait]
impl DetectionModel for TractModel {
    fn name(&self) -> &str {
        "tract"
    }

    async fn detect(&self, frame: &VideoFrame) -> Result<Vec<Prediction>, MonitorError> {
        let input = self
            .build_input(frame)
            .map_err(|e| MonitorError::InferenceTransient(e.to_string()))?;
        let outputs = self
            .plan
            .run(tvec!(input.into()))
            .map_err(|e| MonitorError::InferenceTransient(format!("ONNX inference failed: {}", e)))?;
        self.decode(outputs)
            .map_err(|e| MonitorError::InferenceTransient(e.to_string()))
    }
}
