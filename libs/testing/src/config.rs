//! Harness configuration.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use converge_client::ClientConfig;

use crate::poll::{PollConfig, DEFAULT_INTERVAL, DEFAULT_TIMEOUT};

pub const DEFAULT_DOMAIN_PREFIX: &str = "converge";
pub const DEFAULT_ROOT_FS: &str = "docker:///busybox";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Harness configuration shared by every scenario in a test binary.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Control plane base URL. `None` means the caller provides its own
    /// system under test (usually an in-process simulator).
    pub api_url: Option<String>,

    /// Default timeout and interval for every poll.
    pub poll: PollConfig,

    /// Prefix of the per-scenario domain token.
    pub domain_prefix: String,

    /// TTL registered when a scenario freshens its domain; zero never expires.
    pub domain_ttl: Duration,

    /// Root filesystem used by generated payloads.
    pub root_fs: String,

    /// Upper bound on every non-streaming API request.
    pub request_timeout: Duration,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            api_url: None,
            poll: PollConfig::default(),
            domain_prefix: DEFAULT_DOMAIN_PREFIX.to_string(),
            domain_ttl: Duration::ZERO,
            root_fs: DEFAULT_ROOT_FS.to_string(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

impl HarnessConfig {
    /// Load configuration from environment variables.
    ///
    /// Unset variables fall back to their defaults; set but unparsable
    /// values are an error rather than being silently ignored.
    pub fn from_env() -> Result<Self> {
        let api_url = std::env::var("CONVERGE_API_URL")
            .ok()
            .filter(|s| !s.trim().is_empty());

        let timeout_ms = env_or("CONVERGE_DEFAULT_TIMEOUT_MS", DEFAULT_TIMEOUT.as_millis() as u64)?;
        let interval_ms =
            env_or("CONVERGE_POLL_INTERVAL_MS", DEFAULT_INTERVAL.as_millis() as u64)?;
        if interval_ms == 0 {
            anyhow::bail!("CONVERGE_POLL_INTERVAL_MS must be greater than zero");
        }

        let domain_prefix = std::env::var("CONVERGE_DOMAIN_PREFIX")
            .unwrap_or_else(|_| DEFAULT_DOMAIN_PREFIX.to_string());
        converge_id::Domain::generate(&domain_prefix)
            .with_context(|| format!("invalid CONVERGE_DOMAIN_PREFIX {domain_prefix:?}"))?;

        let domain_ttl_secs = env_or("CONVERGE_DOMAIN_TTL_SECS", 0u64)?;
        let root_fs =
            std::env::var("CONVERGE_ROOT_FS").unwrap_or_else(|_| DEFAULT_ROOT_FS.to_string());
        let request_timeout_ms = env_or(
            "CONVERGE_REQUEST_TIMEOUT_MS",
            DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
        )?;

        Ok(Self {
            api_url,
            poll: PollConfig::new(
                Duration::from_millis(timeout_ms),
                Duration::from_millis(interval_ms),
            ),
            domain_prefix,
            domain_ttl: Duration::from_secs(domain_ttl_secs),
            root_fs,
            request_timeout: Duration::from_millis(request_timeout_ms),
        })
    }

    /// Client settings for talking to `base_url`.
    pub fn client_config(&self, base_url: impl Into<String>) -> ClientConfig {
        ClientConfig {
            request_timeout: self.request_timeout,
            ..ClientConfig::new(base_url)
        }
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {name}: {raw:?}")),
        Err(_) => Ok(default),
    }
}
