//! Lifecycle (C5): startup/health/debug endpoints and signal-driven
//! graceful shutdown, shared by both agent binaries.

pub mod signals;

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::config::SharedConfig;
use crate::error::{AgentError, Result};

/// Fixed grace period after a shutdown signal before any still-blocked
/// handler is force-unblocked (spec.md §5).
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(10);

/// `GET /health` — 200 "OK" unconditionally after startup completes.
/// Does not touch the backend.
pub async fn health_check() -> &'static str {
    "OK"
}

/// `GET /debug/config` — only mounted when `--debug`/`DEBUG_MODE` is set.
pub async fn debug_config(State(config): State<Arc<SharedConfig>>) -> impl IntoResponse {
    Json(config.to_json())
}

/// Run `router` on `listener` until a shutdown signal arrives on
/// `shutdown_tx`, then stop accepting connections and wait up to
/// [`SHUTDOWN_GRACE_PERIOD`] for in-flight handlers before returning.
pub async fn run_server(
    listener: TcpListener,
    router: axum::Router,
    shutdown_tx: broadcast::Sender<()>,
) -> Result<()> {
    let mut graceful_rx = shutdown_tx.subscribe();
    let mut grace_timer_rx = shutdown_tx.subscribe();

    let serve_fut = axum::serve(listener, router).with_graceful_shutdown(async move {
        let _ = graceful_rx.recv().await;
        info!("stopping HTTP server, draining in-flight requests");
    });

    let grace_period_elapsed = async move {
        let _ = grace_timer_rx.recv().await;
        tokio::time::sleep(SHUTDOWN_GRACE_PERIOD).await;
    };

    tokio::select! {
        result = serve_fut => {
            result.map_err(|e| AgentError::Startup(format!("server error: {e}")))?;
        }
        _ = grace_period_elapsed => {
            warn!("shutdown grace period elapsed; unblocking any remaining handlers");
        }
    }

    info!("HTTP server stopped");
    Ok(())
}
