//! Client error taxonomy.

use converge_events::ErrorKind;
use thiserror::Error;

/// Errors returned by [`crate::ControlPlane`] operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The control plane answered with a typed error.
    #[error("API error ({status}) {kind}: {message}")]
    Api {
        status: u16,
        kind: ErrorKind,
        message: String,
        field: Option<String>,
    },

    /// The request never produced a response (connect, timeout, reset).
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// A response arrived but could not be decoded.
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The event stream has ended, either closed by the peer or by `close()`.
    #[error("event stream closed")]
    StreamClosed,

    /// The client was configured with an unusable base URL.
    #[error("invalid client configuration: {0}")]
    Config(String),
}

impl ClientError {
    /// Create an API error from response details.
    pub fn api(
        status: u16,
        kind: ErrorKind,
        message: impl Into<String>,
        field: Option<String>,
    ) -> Self {
        Self::Api {
            status,
            kind,
            message: message.into(),
            field,
        }
    }

    /// Returns the typed kind of an API error.
    pub fn kind(&self) -> Option<&ErrorKind> {
        match self {
            ClientError::Api { kind, .. } => Some(kind),
            _ => None,
        }
    }

    /// Returns true if the remote entity does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), Some(ErrorKind::ResourceNotFound))
    }

    /// Returns true if the error is a connectivity problem rather than an answer.
    pub fn is_transport(&self) -> bool {
        matches!(self, ClientError::Transport(_))
    }
}
