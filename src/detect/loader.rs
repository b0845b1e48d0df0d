use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::detect::backend::{DetectionModel, ModelProvider};
use crate::error::MonitorError;

/// Loads the detection model once and hands the ready instance to every caller.
///
/// Share one loader per process (behind an `Arc`) so that sessions created
/// after the first reuse the model. Concurrent callers during the first load
/// all await the same in-flight load; the provider is never called twice at
/// once. A failed load leaves the loader empty.
pub struct ModelLoader {
    provider: Arc<dyn ModelProvider>,
    model: OnceCell<Arc<dyn DetectionModel>>,
    attempts: AtomicU64,
}

impl ModelLoader {
    pub fn new(provider: Arc<dyn ModelProvider>) -> Self {
        Self {
            provider,
            model: OnceCell::new(),
            attempts: AtomicU64::new(0),
        }
    }

    /// Resolve the model, loading it on first use.
    pub async fn load(&self) -> Result<Arc<dyn DetectionModel>, MonitorError> {
        let model = self
            .model
            .get_or_try_init(|| async {
                self.attempts.fetch_add(1, Ordering::SeqCst);
                log::info!("loading detection model via {}", self.provider.name());
                match self.provider.load().await {
                    Ok(model) => {
                        log::info!("detection model {} ready", model.name());
                        Ok(model)
                    }
                    Err(err) => {
                        log::error!("detection model load failed: {}", err);
                        Err(into_load_failure(err))
                    }
                }
            })
            .await?;
        Ok(Arc::clone(model))
    }

    /// True once a model has been loaded.
    pub fn is_ready(&self) -> bool {
        self.model.initialized()
    }

    /// Number of times the provider has been asked to load.
    pub fn load_attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

fn into_load_failure(err: MonitorError) -> MonitorError {
    match err {
        MonitorError::ModelLoadFailure(_) => err,
        other => MonitorError::ModelLoadFailure(other.to_string()),
    }
}
