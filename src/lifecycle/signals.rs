//! Signal handling for graceful shutdown.
//!
//! Provides asynchronous signal handling for SIGTERM and SIGINT so the
//! lifecycle can stop accepting connections and drain the batcher.

use tokio::sync::broadcast;
use tracing::{error, info};

/// Returns a broadcast sender/receiver pair; the receiver resolves once
/// SIGTERM or SIGINT (Ctrl+C) is received.
#[cfg(unix)]
pub fn setup_signal_handlers() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let shutdown_tx_clone = shutdown_tx.clone();

    tokio::spawn(async move {
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to register SIGTERM handler");
        let mut sigint = signal(SignalKind::interrupt()).expect("failed to register SIGINT handler");

        tokio::select! {
            _ = sigterm.recv() => info!("received SIGTERM, initiating graceful shutdown"),
            _ = sigint.recv() => info!("received SIGINT, initiating graceful shutdown"),
        }

        if shutdown_tx_clone.send(()).is_err() {
            error!("failed to broadcast shutdown signal");
        }
    });

    (shutdown_tx, shutdown_rx)
}

#[cfg(windows)]
pub fn setup_signal_handlers() -> (broadcast::Sender<()>, broadcast::Receiver<()>) {
    use tokio::signal;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let shutdown_tx_clone = shutdown_tx.clone();

    tokio::spawn(async move {
        if let Err(e) = signal::ctrl_c().await {
            error!("failed to listen for Ctrl+C: {}", e);
            return;
        }
        info!("received Ctrl+C, initiating graceful shutdown");
        if shutdown_tx_clone.send(()).is_err() {
            error!("failed to broadcast shutdown signal");
        }
    });

    (shutdown_tx, shutdown_rx)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn signal_handler_setup_does_not_panic() {
        let (_tx, _rx) = setup_signal_handlers();
    }
}
