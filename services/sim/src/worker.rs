//! Convergence background worker.
//!
//! Ticks the store on a fixed interval and delivers completion callbacks
//! for tasks that entered `Resolving`.

use std::time::Duration;

use converge_events::Task;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, instrument, warn};

use crate::state::SimState;

/// Worker that drives every entity toward its desired state.
pub struct ConvergenceWorker {
    state: SimState,
    interval: Duration,
}

impl ConvergenceWorker {
    pub fn new(state: SimState) -> Self {
        let interval = state.config().tick_interval;
        Self { state, interval }
    }

    /// Run until shutdown is signaled.
    #[instrument(skip(self, shutdown))]
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_ms = self.interval.as_millis() as u64,
            "Starting convergence worker"
        );

        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.tick(),
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("Convergence worker shutting down");
                        break;
                    }
                }
            }
        }
    }

    fn tick(&self) {
        let callbacks = self.state.mutate(|store| store.tick(Instant::now()));
        for task in callbacks {
            tokio::spawn(deliver_callback(self.state.clone(), task));
        }
    }
}

/// POST the task to its completion callback URL, then resolve it.
///
/// 5xx responses and transport errors are retried with a fixed delay up to
/// the configured attempt count; any other response ends delivery.
#[instrument(skip(state, task), fields(task_guid = %task.task_guid))]
pub async fn deliver_callback(state: SimState, task: Task) {
    let Some(url) = task.definition.completion_callback_url.clone() else {
        return;
    };
    let config = state.config().clone();
    let mut shutdown = state.shutdown_signal();

    for attempt in 1..=config.callback_attempts {
        if state.is_shutting_down() {
            return;
        }

        let result = state
            .http()
            .post(&url)
            .timeout(config.callback_timeout)
            .json(&task)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(attempt, "Completion callback delivered");
                break;
            }
            Ok(response) if response.status().is_server_error() => {
                warn!(attempt, status = %response.status(), "Completion callback failed, retrying");
            }
            Ok(response) => {
                warn!(attempt, status = %response.status(), "Completion callback rejected");
                break;
            }
            Err(e) => {
                warn!(attempt, error = %e, "Completion callback unreachable, retrying");
            }
        }

        if attempt == config.callback_attempts {
            warn!(attempts = attempt, "Giving up on completion callback");
            break;
        }
        tokio::select! {
            _ = tokio::time::sleep(config.callback_retry_delay) => {}
            _ = shutdown.changed() => return,
        }
    }

    if let Err(e) = state.mutate(|store| store.resolve_task(&task.task_guid)) {
        debug!(error = %e, "Task was not resolvable after callback");
    }
}
