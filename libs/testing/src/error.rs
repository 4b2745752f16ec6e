//! Harness error taxonomy.

use std::time::Duration;

use converge_client::ClientError;
use converge_events::ErrorKind;
use thiserror::Error;

/// Why a single probe fetch did not produce a snapshot.
///
/// Probes never retry, so each variant describes exactly one round trip.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProbeError {
    /// The entity does not exist on the remote side.
    #[error("{0} not found")]
    NotFound(String),

    /// The remote side was unreachable or the response was unreadable.
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote side answered with a typed error other than not-found.
    #[error("API error {kind}: {message}")]
    Api { kind: ErrorKind, message: String },

    /// The fetch did not finish before the polling deadline.
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

impl ProbeError {
    /// Classify a client error for the entity named `entity`.
    pub fn from_client(entity: &str, err: ClientError) -> Self {
        match err {
            ClientError::Api {
                kind: ErrorKind::ResourceNotFound,
                ..
            } => ProbeError::NotFound(entity.to_string()),
            ClientError::Api { kind, message, .. } => ProbeError::Api { kind, message },
            other => ProbeError::Transport(other.to_string()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ProbeError::NotFound(_))
    }
}

/// Failure modes of the polling engine.
#[derive(Debug, Error)]
pub enum PollError {
    /// The predicate never held before the deadline.
    #[error(
        "timed out after {elapsed:?} ({attempts} attempts) waiting for {entity} to match {expected}; last observed: {}",
        .last_observed.as_deref().unwrap_or("nothing")
    )]
    Timeout {
        entity: String,
        expected: String,
        last_observed: Option<String>,
        attempts: u32,
        elapsed: Duration,
    },

    /// The predicate stopped holding during a consistently window.
    #[error("{entity} stopped matching {expected} on attempt {attempt} after {after:?}; observed: {observed}")]
    Violation {
        entity: String,
        expected: String,
        observed: String,
        attempt: u32,
        after: Duration,
    },

    /// The owning scenario was torn down while polling.
    #[error("polling {entity} cancelled by scenario shutdown")]
    Cancelled { entity: String },
}

/// Event listener lifecycle failures.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to subscribe to events: {0}")]
    Subscribe(#[from] ClientError),

    /// The stream ended on its own before `close()` was requested.
    #[error("event stream ended unexpectedly after {received} events: {reason}")]
    ListenerEndedUnexpectedly { reason: String, received: usize },

    /// The background receiver did not exit within the drain timeout.
    #[error("event receiver did not exit within {0:?}")]
    ListenerLeaked(Duration),

    #[error("event receiver panicked: {0}")]
    ListenerPanicked(String),
}

/// Outcome of a failed [`crate::Harness::run`].
#[derive(Debug, Error)]
pub enum ScenarioError {
    /// The scenario body returned an error. Cleanup still ran.
    #[error("scenario {scenario} failed: {error:#}")]
    Failed {
        scenario: String,
        error: anyhow::Error,
        cleanup_failures: Vec<String>,
    },

    /// The scenario body panicked. Cleanup still ran.
    #[error("scenario {scenario} panicked: {message}")]
    Panicked {
        scenario: String,
        message: String,
        cleanup_failures: Vec<String>,
    },

    /// The body succeeded but at least one cleanup step failed.
    #[error("scenario {scenario} cleanup failed: {}", .failures.join("; "))]
    Cleanup {
        scenario: String,
        failures: Vec<String>,
    },
}

impl ScenarioError {
    /// Cleanup steps that failed while tearing this scenario down.
    pub fn cleanup_failures(&self) -> &[String] {
        match self {
            ScenarioError::Failed {
                cleanup_failures, ..
            }
            | ScenarioError::Panicked {
                cleanup_failures, ..
            } => cleanup_failures,
            ScenarioError::Cleanup { failures, .. } => failures,
        }
    }
}
