//! Polling engine: "eventually" and "consistently" over a probe.
//!
//! Every wait is bounded. A fetch never outlives the poll deadline, and a
//! fired scenario shutdown signal ends the poll at the next await point.

use std::fmt::Debug;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, trace};

use crate::matchers::Matcher;
use crate::probe::Probe;
use crate::{PollError, ProbeError};

/// Default deadline for `eventually`.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default spacing between fetches.
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl PollConfig {
    pub fn new(timeout: Duration, interval: Duration) -> Self {
        Self { timeout, interval }
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_INTERVAL)
    }
}

/// Runs probes against matchers on a fixed interval.
#[derive(Debug, Clone)]
pub struct Poller {
    config: PollConfig,
    shutdown: Option<watch::Receiver<bool>>,
}

impl Poller {
    /// A poller that stops when `shutdown` becomes `true`.
    pub fn new(config: PollConfig, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            config,
            shutdown: Some(shutdown),
        }
    }

    /// A poller bound only by its own deadlines.
    pub fn detached(config: PollConfig) -> Self {
        Self {
            config,
            shutdown: None,
        }
    }

    /// Same poller with a different deadline.
    #[must_use]
    pub fn within(&self, timeout: Duration) -> Self {
        Self {
            config: PollConfig {
                timeout,
                ..self.config
            },
            shutdown: self.shutdown.clone(),
        }
    }

    /// Same poller with a different interval.
    #[must_use]
    pub fn every(&self, interval: Duration) -> Self {
        Self {
            config: PollConfig {
                interval,
                ..self.config
            },
            shutdown: self.shutdown.clone(),
        }
    }

    pub fn config(&self) -> PollConfig {
        self.config
    }

    /// Poll until `matcher` holds, returning the matching snapshot.
    ///
    /// Probe errors count as "not yet" and are kept as the last observation.
    pub async fn eventually<P, M>(&self, probe: &P, matcher: &M) -> Result<P::Output, PollError>
    where
        P: Probe + ?Sized,
        P::Output: Debug,
        M: Matcher<P::Output> + ?Sized,
    {
        let entity = probe.describe();
        let start = Instant::now();
        let deadline = start + self.config.timeout;
        let mut shutdown = self.shutdown.clone();
        let mut attempts = 0u32;
        let mut last_observed = None;

        loop {
            if attempts > 0 && Instant::now() >= deadline {
                return Err(PollError::Timeout {
                    entity,
                    expected: matcher.describe(),
                    last_observed,
                    attempts,
                    elapsed: start.elapsed(),
                });
            }

            attempts += 1;
            match self.fetch(probe, deadline, &mut shutdown, &entity).await? {
                Ok(value) if matcher.evaluate(&value) => {
                    debug!(entity = %entity, attempts, elapsed = ?start.elapsed(), "poll matched");
                    return Ok(value);
                }
                Ok(value) => {
                    trace!(entity = %entity, attempt = attempts, "poll did not match yet");
                    last_observed = Some(format!("{value:#?}"));
                }
                Err(err) => {
                    trace!(entity = %entity, attempt = attempts, error = %err, "poll fetch failed");
                    last_observed = Some(format!("error: {err}"));
                }
            }

            self.pause(deadline, &mut shutdown, &entity).await?;
        }
    }

    /// Poll until the probe reports not-found.
    ///
    /// A successful fetch is a stale snapshot and is reported on timeout.
    pub async fn eventually_absent<P>(&self, probe: &P) -> Result<(), PollError>
    where
        P: Probe + ?Sized,
        P::Output: Debug,
    {
        let entity = probe.describe();
        let start = Instant::now();
        let deadline = start + self.config.timeout;
        let mut shutdown = self.shutdown.clone();
        let mut attempts = 0u32;
        let mut last_observed = None;

        loop {
            if attempts > 0 && Instant::now() >= deadline {
                return Err(PollError::Timeout {
                    entity,
                    expected: "not found".to_string(),
                    last_observed,
                    attempts,
                    elapsed: start.elapsed(),
                });
            }

            attempts += 1;
            match self.fetch(probe, deadline, &mut shutdown, &entity).await? {
                Err(ProbeError::NotFound(_)) => {
                    debug!(entity = %entity, attempts, elapsed = ?start.elapsed(), "entity gone");
                    return Ok(());
                }
                Ok(value) => last_observed = Some(format!("stale snapshot: {value:#?}")),
                Err(err) => last_observed = Some(format!("error: {err}")),
            }

            self.pause(deadline, &mut shutdown, &entity).await?;
        }
    }

    /// Poll for the whole `window`, failing on the first violation.
    ///
    /// A probe error is a violation. So is a fetch that outlives the window
    /// unless the window has fully elapsed by then.
    pub async fn consistently<P, M>(
        &self,
        probe: &P,
        matcher: &M,
        window: Duration,
    ) -> Result<(), PollError>
    where
        P: Probe + ?Sized,
        P::Output: Debug,
        M: Matcher<P::Output> + ?Sized,
    {
        let entity = probe.describe();
        let start = Instant::now();
        let deadline = start + window;
        let mut shutdown = self.shutdown.clone();
        let mut attempts = 0u32;

        loop {
            if attempts > 0 && Instant::now() >= deadline {
                debug!(entity = %entity, attempts, window = ?window, "held for the whole window");
                return Ok(());
            }

            attempts += 1;
            let observed = match self.fetch(probe, deadline, &mut shutdown, &entity).await? {
                Ok(value) if matcher.evaluate(&value) => None,
                Ok(value) => Some(matcher.describe_mismatch(&value)),
                Err(ProbeError::Timeout(_)) if Instant::now() >= deadline => None,
                Err(err) => Some(format!("error: {err}")),
            };

            if let Some(observed) = observed {
                return Err(PollError::Violation {
                    entity,
                    expected: matcher.describe(),
                    observed,
                    attempt: attempts,
                    after: start.elapsed(),
                });
            }

            self.pause(deadline, &mut shutdown, &entity).await?;
        }
    }

    /// One fetch bounded by the remaining time before `deadline`.
    async fn fetch<P>(
        &self,
        probe: &P,
        deadline: Instant,
        shutdown: &mut Option<watch::Receiver<bool>>,
        entity: &str,
    ) -> Result<Result<P::Output, ProbeError>, PollError>
    where
        P: Probe + ?Sized,
    {
        let remaining = deadline.saturating_duration_since(Instant::now());
        tokio::select! {
            biased;
            _ = cancelled(shutdown) => Err(PollError::Cancelled { entity: entity.to_string() }),
            fetched = timeout(remaining, probe.fetch()) => {
                Ok(fetched.unwrap_or(Err(ProbeError::Timeout(remaining))))
            }
        }
    }

    /// Sleep one interval, or until the deadline if that comes first.
    async fn pause(
        &self,
        deadline: Instant,
        shutdown: &mut Option<watch::Receiver<bool>>,
        entity: &str,
    ) -> Result<(), PollError> {
        let pause = self
            .config
            .interval
            .min(deadline.saturating_duration_since(Instant::now()));
        tokio::select! {
            biased;
            _ = cancelled(shutdown) => Err(PollError::Cancelled { entity: entity.to_string() }),
            _ = sleep(pause) => Ok(()),
        }
    }
}

/// Resolves once the shutdown signal is `true`; never resolves without one.
async fn cancelled(shutdown: &mut Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(rx) => {
            if rx.wait_for(|stop| *stop).await.is_err() {
                // Sender gone without signalling: nothing can cancel us now.
                std::future::pending::<()>().await;
            }
        }
        None => std::future::pending::<()>().await,
    }
}
