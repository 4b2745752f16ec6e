//! converge-sim
//!
//! Serves the simulated control plane until Ctrl+C.

use anyhow::Result;
use converge_sim::SimConfig;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SimConfig::from_env()?;

    // Prefer RUST_LOG, fall back to CONVERGE_SIM_LOG_LEVEL
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| config.log_level.clone().into()))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        listen_addr = %config.listen_addr,
        cells = config.cell_count,
        tick_ms = config.tick_interval.as_millis() as u64,
        "Starting converge simulator"
    );

    let sim = converge_sim::spawn(config).await?;

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal");

    let timeout = std::time::Duration::from_secs(10);
    if tokio::time::timeout(timeout, sim.shutdown()).await.is_err() {
        tracing::warn!("Simulator did not shut down in time");
    }
    Ok(())
}
