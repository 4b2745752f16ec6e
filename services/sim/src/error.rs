//! Store error types.

use converge_events::ErrorKind;
use thiserror::Error;

/// Errors returned by store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SimError {
    /// Request failed validation.
    #[error("{message}")]
    Invalid {
        kind: ErrorKind,
        field: String,
        message: String,
    },

    #[error("{0} already exists")]
    Exists(String),

    #[error("{0} not found")]
    NotFound(String),

    /// The entity is not in a state that allows the operation.
    #[error("{0}")]
    InvalidTransition(String),
}

impl SimError {
    pub fn invalid(kind: ErrorKind, field: &str, message: impl Into<String>) -> Self {
        Self::Invalid {
            kind,
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// The wire error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SimError::Invalid { kind, .. } => kind.clone(),
            SimError::Exists(_) => ErrorKind::ResourceExists,
            SimError::NotFound(_) => ErrorKind::ResourceNotFound,
            SimError::InvalidTransition(_) => ErrorKind::InvalidStateTransition,
        }
    }
}
