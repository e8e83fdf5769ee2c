use std::time::Duration;

use actix_web::dev::ServerHandle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::status::JobStatusStore;

/// Handles graceful shutdown of the application
///
/// On SIGTERM or CTRL+C:
/// 1. Stop the HTTP server (no new runs can be requested)
/// 2. Signal the run worker to stop taking tickets
/// 3. Give an in-flight run up to the grace period to finish
pub struct ShutdownCoordinator {
    server_handle: ServerHandle,
    server_task: JoinHandle<Result<(), std::io::Error>>,
    worker_handle: JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
    statuses: JobStatusStore,
    grace: Duration,
}

impl ShutdownCoordinator {
    pub fn new(
        server_handle: ServerHandle,
        server_task: JoinHandle<Result<(), std::io::Error>>,
        worker_handle: JoinHandle<()>,
        shutdown_tx: watch::Sender<bool>,
        statuses: JobStatusStore,
        grace: Duration,
    ) -> Self {
        Self {
            server_handle,
            server_task,
            worker_handle,
            shutdown_tx,
            statuses,
            grace,
        }
    }

    /// Wait for a shutdown signal, then shut down in order
    pub async fn wait_for_shutdown(self) -> Result<(), std::io::Error> {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for CTRL+C: {:?}", e);
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    error!("Failed to install SIGTERM handler: {:?}", e);
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            _ = ctrl_c => {
                info!("Received CTRL+C signal, initiating graceful shutdown...");
            }
            _ = terminate => {
                info!("Received SIGTERM signal, initiating graceful shutdown...");
            }
        }

        self.shutdown().await
    }

    async fn shutdown(self) -> Result<(), std::io::Error> {
        info!("Stopping HTTP server (no longer accepting new requests)...");
        self.server_handle.stop(true).await;

        info!("Signaling run worker to stop...");
        if let Err(e) = self.shutdown_tx.send(true) {
            error!("Failed to send shutdown signal to run worker: {:?}", e);
        }

        if self.statuses.any_running() {
            info!("Waiting up to {:?} for the in-flight run to finish...", self.grace);
        }
        match tokio::time::timeout(self.grace, self.worker_handle).await {
            Ok(Ok(())) => info!("Run worker stopped"),
            Ok(Err(e)) => error!("Run worker failed to stop: {:?}", e),
            Err(_) => warn!("Run still in progress after grace period, abandoning it"),
        }

        match self.server_task.await {
            Ok(Ok(_)) => info!("HTTP server shut down successfully"),
            Ok(Err(e)) => error!("HTTP server encountered error during shutdown: {:?}", e),
            Err(e) => error!("HTTP server task panicked: {:?}", e),
        }

        info!("Graceful shutdown completed");
        Ok(())
    }
}
