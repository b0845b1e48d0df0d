//! Polling detection loop.
//!
//! Once a session is `Active`, the loop wakes on a fixed period, grabs the
//! current frame, awaits one inference and redraws the overlay. Ticks are
//! strictly serial: the next tick cannot start while an inference is pending,
//! because the loop awaits it before asking the timer for the next tick.
//!
//! Cancellation is by drop. The coordinator polls `run` alongside its stop
//! signals and simply stops polling it; a pending inference is dropped with
//! the future and its result is never drawn.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;

use crate::detect::{DetectionModel, Prediction};
use crate::overlay::OverlayRenderer;
use crate::stream::StreamController;

/// Default polling period.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(200);

/// Counters for one loop.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks started.
    pub ticks: u64,
    /// Inferences that resolved successfully.
    pub inferences: u64,
    pub failed_inferences: u64,
    /// Ticks skipped because no frame could be captured.
    pub skipped_captures: u64,
    pub draws: u64,
    /// Inference results thrown away: still pending when the loop was
    /// cancelled, or resolved after the camera stream ended.
    pub discarded: u64,
}

/// What a single tick did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    /// Inference succeeded; the overlay now shows this many predictions.
    Drawn(usize),
    InferenceFailed,
    CaptureSkipped,
    /// Inference resolved after the camera stream ended; nothing was drawn.
    Discarded,
}

pub struct DetectionLoop {
    model: Arc<dyn DetectionModel>,
    period: Duration,
    predictions: Vec<Prediction>,
    in_flight: Option<u64>,
    stats: LoopStats,
}

impl DetectionLoop {
    pub fn new(model: Arc<dyn DetectionModel>, period: Duration) -> Self {
        Self {
            model,
            period,
            predictions: Vec::new(),
            in_flight: None,
            stats: LoopStats::default(),
        }
    }

    /// Tick until the camera stream stops being active.
    ///
    /// Normally the caller drops this future long before that happens.
    pub async fn run(&mut self, stream: &mut StreamController, renderer: &mut OverlayRenderer) {
        let mut ticker = tokio::time::interval(self.period);
        // A slow inference pushes the schedule back instead of causing a burst.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        log::info!(
            "detection loop: started with {} every {:?}",
            self.model.name(),
            self.period
        );
        loop {
            ticker.tick().await;
            if !stream.is_active() {
                log::warn!("detection loop: camera stream is no longer active");
                return;
            }
            self.tick(stream, renderer).await;
        }
    }

    /// Run one capture → inference → draw cycle.
    pub async fn tick(
        &mut self,
        stream: &mut StreamController,
        renderer: &mut OverlayRenderer,
    ) -> TickOutcome {
        self.stats.ticks += 1;
        let tick = self.stats.ticks;

        let frame = match stream.capture_frame() {
            Ok(frame) => frame,
            Err(err) => {
                self.stats.skipped_captures += 1;
                log::warn!("detection loop: tick {} skipped: {}", tick, err);
                return TickOutcome::CaptureSkipped;
            }
        };

        self.in_flight = Some(tick);
        let result = self.model.detect(&frame).await;
        self.in_flight = None;

        match result {
            Ok(predictions) => {
                self.stats.inferences += 1;
                if !stream.is_active() {
                    self.stats.discarded += 1;
                    log::warn!(
                        "detection loop: tick {} result dropped, camera stream ended",
                        tick
                    );
                    return TickOutcome::Discarded;
                }
                log::debug!(
                    "detection loop: tick {} frame {} -> {} prediction(s)",
                    tick,
                    frame.sequence,
                    predictions.len()
                );
                self.predictions = predictions;
                renderer.render(&self.predictions);
                self.stats.draws += 1;
                TickOutcome::Drawn(self.predictions.len())
            }
            Err(err) => {
                self.stats.failed_inferences += 1;
                log::warn!("detection loop: tick {} inference failed: {}", tick, err);
                TickOutcome::InferenceFailed
            }
        }
    }

    /// Account for an inference abandoned by cancellation.
    ///
    /// Returns true when a tick was mid-inference. Its result is gone with the
    /// dropped future; this only records the fact.
    pub fn discard_in_flight(&mut self) -> bool {
        match self.in_flight.take() {
            Some(tick) => {
                self.stats.discarded += 1;
                log::info!("detection loop: discarded in-flight inference of tick {}", tick);
                true
            }
            None => false,
        }
    }

    /// Predictions from the most recent successful tick.
    pub fn predictions(&self) -> &[Prediction] {
        &self.predictions
    }

    pub fn stats(&self) -> LoopStats {
        self.stats.clone()
    }
}
