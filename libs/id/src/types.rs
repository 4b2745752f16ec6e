//! Typed references for remote entities.

use serde::{Deserialize, Serialize};

use crate::{define_guid, is_guid_char, IdError, Ulid};

// =============================================================================
// Domains
// =============================================================================

/// A freshness namespace grouping the entities of one scenario run.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Domain(String);

impl Domain {
    /// Wraps an existing domain name.
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Mints a fresh domain token `{prefix}-{ulid}`.
    pub fn generate(prefix: &str) -> Result<Self, IdError> {
        if prefix.is_empty() {
            return Err(IdError::InvalidPrefix {
                message: "prefix cannot be empty".to_string(),
            });
        }
        if !prefix.chars().all(is_guid_char) {
            return Err(IdError::InvalidPrefix {
                message: format!("'{prefix}' contains characters outside [A-Za-z0-9_-]"),
            });
        }

        let ulid = Ulid::new().to_string().to_ascii_lowercase();
        Ok(Self(format!("{prefix}-{ulid}")))
    }

    /// Returns the domain as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Domain {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for Domain {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Guids
// =============================================================================

define_guid!(
    /// Identifier of a one-shot Task.
    TaskGuid
);

define_guid!(
    /// Identifier of a DesiredLRP and all of its ActualLRP instances.
    ProcessGuid
);

define_guid!(
    /// Identifier of a cell (the host running containers).
    CellId
);
