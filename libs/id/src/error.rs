//! Error types for identifier validation.

use thiserror::Error;

/// Errors that can occur when validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The identifier contains a character outside `[A-Za-z0-9_-]`.
    #[error("invalid character {character:?} at byte {position} in identifier '{value}'")]
    InvalidCharacter {
        value: String,
        character: char,
        position: usize,
    },

    /// The domain prefix is unusable.
    #[error("invalid domain prefix: {message}")]
    InvalidPrefix { message: String },
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
