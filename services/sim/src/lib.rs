//! converge-sim: an in-memory simulated orchestrator control plane.
//!
//! The crate ships a `converge-sim` binary, and exposes [`spawn`] so test
//! suites can run the simulator in-process on an ephemeral port.

pub mod api;
pub mod config;
pub mod error;
pub mod script;
pub mod state;
pub mod store;
pub mod validation;
pub mod worker;

use std::net::SocketAddr;

use anyhow::{Context, Result};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

pub use config::SimConfig;
use state::SimState;
use worker::ConvergenceWorker;

/// A running simulator. Dropping the handle signals shutdown.
pub struct SimHandle {
    addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    server: Option<JoinHandle<()>>,
    worker: Option<JoinHandle<()>>,
}

impl SimHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Signal shutdown and wait for the server and worker to exit.
    pub async fn shutdown(mut self) {
        self.shutdown_tx.send_replace(true);
        for handle in [self.server.take(), self.worker.take()].into_iter().flatten() {
            if let Err(e) = handle.await {
                error!(error = %e, "Simulator task panicked");
            }
        }
        info!("Simulator shutdown complete");
    }
}

impl Drop for SimHandle {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

/// Bind `config.listen_addr` and start serving plus the convergence worker.
pub async fn spawn(config: SimConfig) -> Result<SimHandle> {
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;
    let addr = listener.local_addr().context("listener has no local address")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let state = SimState::new(config, shutdown_rx.clone());

    let worker = tokio::spawn({
        let worker = ConvergenceWorker::new(state.clone());
        let shutdown_rx = shutdown_rx.clone();
        async move { worker.run(shutdown_rx).await }
    });

    let app = api::create_router(state);
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let mut shutdown_rx = shutdown_rx;
                loop {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    if shutdown_rx.changed().await.is_err() {
                        break;
                    }
                }
                info!("HTTP server shutting down");
            })
            .await;
        if let Err(e) = result {
            error!(error = %e, "Server error");
        }
    });

    info!(addr = %addr, "Simulator listening");
    Ok(SimHandle {
        addr,
        shutdown_tx,
        server: Some(server),
        worker: Some(worker),
    })
}
