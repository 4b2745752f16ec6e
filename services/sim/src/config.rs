//! Configuration for the simulator.

use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};

/// Simulator configuration.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// HTTP listen address; port 0 picks an ephemeral port.
    pub listen_addr: SocketAddr,

    /// Log filter used when `RUST_LOG` is unset.
    pub log_level: String,

    /// Convergence worker period. Each entity moves at most one state per tick.
    pub tick_interval: Duration,

    /// How long a task runs before completing, on top of any `sleep` in its script.
    pub task_run_time: Duration,

    /// Number of cells in the fixed inventory.
    pub cell_count: usize,

    /// Restart delay after the immediate restarts are used up; doubles per crash.
    pub crash_backoff: Duration,

    /// Upper bound on the restart delay.
    pub max_crash_backoff: Duration,

    /// Completion callback delivery attempts before the task is resolved anyway.
    pub callback_attempts: u32,

    /// Delay between callback attempts.
    pub callback_retry_delay: Duration,

    /// Upper bound on a single callback request.
    pub callback_timeout: Duration,

    /// Buffered events per subscriber; a reader further behind is disconnected.
    pub event_buffer: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8889)),
            log_level: "info".to_string(),
            tick_interval: Duration::from_millis(100),
            task_run_time: Duration::from_millis(500),
            cell_count: 2,
            crash_backoff: Duration::from_secs(30),
            max_crash_backoff: Duration::from_secs(16 * 60),
            callback_attempts: 5,
            callback_retry_delay: Duration::from_millis(500),
            callback_timeout: Duration::from_secs(5),
            event_buffer: 1024,
        }
    }
}

impl SimConfig {
    /// Tight timings on an ephemeral port, for in-process test runs.
    pub fn fast() -> Self {
        Self {
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            tick_interval: Duration::from_millis(20),
            task_run_time: Duration::from_millis(50),
            crash_backoff: Duration::from_millis(100),
            max_crash_backoff: Duration::from_secs(1),
            callback_retry_delay: Duration::from_millis(50),
            ..Self::default()
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();

        let listen_addr = std::env::var("CONVERGE_SIM_LISTEN_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8889".to_string());
        let listen_addr = listen_addr
            .parse()
            .with_context(|| format!("invalid CONVERGE_SIM_LISTEN_ADDR {listen_addr:?}"))?;

        let log_level =
            std::env::var("CONVERGE_SIM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let tick_ms: u64 = match std::env::var("CONVERGE_SIM_TICK_MS") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid CONVERGE_SIM_TICK_MS {raw:?}"))?,
            Err(_) => defaults.tick_interval.as_millis() as u64,
        };
        if tick_ms == 0 {
            anyhow::bail!("CONVERGE_SIM_TICK_MS must be greater than zero");
        }

        let cell_count = match std::env::var("CONVERGE_SIM_CELLS") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("invalid CONVERGE_SIM_CELLS {raw:?}"))?,
            Err(_) => defaults.cell_count,
        };

        Ok(Self {
            listen_addr,
            log_level,
            tick_interval: Duration::from_millis(tick_ms),
            cell_count,
            ..defaults
        })
    }
}
