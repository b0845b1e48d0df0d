//! monitor_demo - run one proctoring session against a configured camera
//!
//! The session runs until `--seconds` have passed, then the submission flag
//! is raised and the monitor shuts down. The final report is logged and the
//! last overlay can be written to PNG.

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use exam_monitor::{
    model_provider, open_devices, Canvas, LifecycleCoordinator, LogNotifier, ModelLoader,
    MonitorConfig, SessionState,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Seconds to monitor before the exam is submitted.
    #[arg(long, default_value_t = 3)]
    seconds: u64,
    /// Camera URI, overrides the configured one.
    #[arg(long, env = "EXAM_MONITOR_CAMERA")]
    camera: Option<String>,
    /// Write the overlay as it was when the session stopped.
    #[arg(long)]
    overlay_out: Option<PathBuf>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.seconds == 0 {
        return Err(anyhow!("seconds must be >= 1"));
    }

    let mut config = MonitorConfig::load()?;
    if let Some(camera) = args.camera {
        config.camera.uri = camera;
    }
    log::info!(
        "monitor_demo: camera={} model={:?} tick={:?}",
        config.camera.uri,
        config.model.source,
        config.tick_interval
    );

    let devices = open_devices(&config.camera.uri)?;
    let loader = Arc::new(ModelLoader::new(model_provider(&config)?));
    let canvas = Canvas::default();

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("failed to build runtime")?;

    let coordinator = LifecycleCoordinator::from_config(
        &config,
        devices,
        loader,
        Box::new(canvas.clone()),
        Arc::new(LogNotifier),
    );
    let (submitted_tx, submitted_rx) = watch::channel(false);
    let exam_length = Duration::from_secs(args.seconds);

    let (report, overlay) = runtime.block_on(async {
        let session = coordinator.run(submitted_rx);
        tokio::pin!(session);
        tokio::select! {
            // Failed sessions end on their own before the exam does.
            report = &mut session => (report, None),
            _ = tokio::time::sleep(exam_length) => {
                // Stopping clears the overlay; keep what the candidate last saw.
                let overlay = canvas.snapshot();
                log::info!("monitor_demo: submitting exam");
                submitted_tx.send_replace(true);
                (session.await, Some(overlay))
            }
        }
    });

    log::info!(
        "monitor_demo: session {} after {} tick(s), {} draw(s), {} release(s)",
        report.final_state,
        report.loop_stats.ticks,
        report.loop_stats.draws,
        report.stream_stats.releases
    );
    if let Some(message) = report.status_message() {
        log::warn!("monitor_demo: {}", message);
    }

    if let Some(path) = args.overlay_out {
        match overlay {
            Some(overlay) => {
                overlay.save_png(&path)?;
                log::info!(
                    "monitor_demo: overlay with {} box(es) written to {}",
                    overlay.boxes.len(),
                    path.display()
                );
            }
            None => log::warn!("monitor_demo: no overlay to write, session ended early"),
        }
    }

    if report.final_state == SessionState::Errored {
        return Err(anyhow!(
            "session failed: {}",
            report
                .error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    Ok(())
}
