//! Shared setup for the end-to-end suites.
//!
//! With `CONVERGE_API_URL` set, scenarios run against that control plane.
//! Otherwise each test starts an in-process simulator on an ephemeral port.

use anyhow::{Context, Result};
use converge_sim::{SimConfig, SimHandle};
use converge_testing::{logging::init_test_tracing, Harness, HarnessConfig};
use tracing::info;

pub struct Suite {
    pub harness: Harness,
    sim: Option<SimHandle>,
}

impl Suite {
    pub async fn start() -> Result<Self> {
        init_test_tracing();
        let config = HarnessConfig::from_env()?;

        let (base_url, sim) = match config.api_url.clone() {
            Some(url) => {
                info!(%url, "using external control plane");
                (url, None)
            }
            None => {
                let sim = converge_sim::spawn(SimConfig::fast())
                    .await
                    .context("failed to start simulator")?;
                (sim.base_url(), Some(sim))
            }
        };

        let harness = Harness::connect(config, &base_url)?;
        Ok(Self { harness, sim })
    }

    /// True when scenarios run against the in-process simulator.
    #[allow(dead_code)]
    pub fn is_simulated(&self) -> bool {
        self.sim.is_some()
    }

    pub async fn stop(self) {
        if let Some(sim) = self.sim {
            sim.shutdown().await;
        }
    }
}
