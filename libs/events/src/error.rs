//! Error types for event handling.

use thiserror::Error;

/// Errors that can occur when decoding change feed events.
#[derive(Debug, Error, Clone)]
pub enum EventError {
    /// The event type is unknown.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// The wire name and the payload disagree.
    #[error("event type mismatch: frame says {frame}, payload says {payload}")]
    TypeMismatch { frame: String, payload: String },

    /// The event payload is invalid.
    #[error("invalid event payload: {0}")]
    InvalidPayload(String),
}

impl From<serde_json::Error> for EventError {
    fn from(err: serde_json::Error) -> Self {
        EventError::InvalidPayload(err.to_string())
    }
}
