//! taskmaster HTTP server binary.
//!
//! Starts an axum HTTP server exposing the tracker tools, and a background
//! task that records domain events as metrics and artifacts.
//!
//! # Environment Variables
//!
//! - `TASKMASTER_CONFIG` - Optional YAML config file
//! - `TASKMASTER_AUTO_APPROVAL_THRESHOLD`, `TASKMASTER_ARTIFACTS_DIR`,
//!   `TASKMASTER_EVENT_POLICY`, `HOST`, `PORT` - Overrides, see `TrackerConfig`
//! - `RUST_LOG` - Tracing filter (default: "info,taskmaster=debug")
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin server
//! ```

use std::sync::Arc;

use anyhow::Context;

use taskmaster::events::EventDispatcher;
use taskmaster::server::{app_router, AppState};
use taskmaster::telemetry::LogMetricsSink;
use taskmaster::tracker::SharedTaskMaster;
use taskmaster::utilities::{FileArtifactStore, TrackerConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,taskmaster=debug".into()),
        )
        .init();

    let config = TrackerConfig::from_env().context("loading configuration")?;
    let artifacts = FileArtifactStore::new(config.artifacts_dir.clone());
    tracing::info!(
        threshold = config.auto_approval_threshold,
        event_policy = %config.event_policy,
        artifacts = %artifacts.directory().display(),
        "configuration loaded"
    );

    let (events_tx, events_rx) = tokio::sync::mpsc::unbounded_channel();
    let dispatcher = EventDispatcher::new(Arc::new(LogMetricsSink), Arc::new(artifacts));
    let dispatcher_task = tokio::spawn(dispatcher.run(events_rx));

    let tracker = SharedTaskMaster::new(config.build_tracker()).with_event_sender(events_tx);
    let app = app_router(AppState::new(tracker));

    let bind_addr = config.bind_addr();
    tracing::info!("taskmaster server starting on {}", bind_addr);
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health       - liveness probe");
    tracing::info!("  GET  /tools        - tool definitions");
    tracing::info!("  POST /tools/:name  - run a tool");
    tracing::info!("  GET  /requests     - list requests");
    tracing::info!("  GET  /tasks/:id    - task details");

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding {bind_addr}"))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
            tracing::info!("Shutting down");
        })
        .await
        .context("server failed")?;

    // The router (and with it the last event sender) is gone; let the
    // dispatcher flush what is queued.
    if let Err(e) = dispatcher_task.await {
        tracing::warn!("Event dispatcher ended abnormally: {}", e);
    }
    Ok(())
}
