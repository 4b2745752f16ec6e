//! # converge-id
//!
//! Entity references for the converge acceptance harness.
//!
//! ## Design Principles
//!
//! - Task guids and process guids are distinct types and cannot be mixed
//! - Generated guids carry the scenario's domain token as a suffix, so
//!   parallel workers never collide in the shared remote system
//! - Any string can be wrapped (negative scenarios send malformed guids on
//!   purpose); `validate()` applies the remote guid grammar
//!
//! ## Formats
//!
//! - Domain: `{prefix}-{ulid}`, e.g. `converge-01hv4z2wqxkjnm8gpqy6vbkc3d`
//! - Guid: `{ulid}-{domain}`, e.g.
//!   `01hv4z3mxnkpqr9hstz7wcld4e-converge-01hv4z2wqxkjnm8gpqy6vbkc3d`

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;

/// Returns true if `c` may appear in a task or process guid.
pub fn is_guid_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '-' || c == '_'
}

/// Validates a raw identifier against the guid grammar.
pub fn validate_guid(value: &str) -> Result<(), IdError> {
    if value.is_empty() {
        return Err(IdError::Empty);
    }

    if let Some((position, character)) = value.char_indices().find(|(_, c)| !is_guid_char(*c)) {
        return Err(IdError::InvalidCharacter {
            value: value.to_string(),
            character,
            position,
        });
    }

    Ok(())
}
