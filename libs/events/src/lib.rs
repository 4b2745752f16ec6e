//! # converge-events
//!
//! Models of the remote entities the harness observes, and the change
//! feed events that describe their transitions.
//!
//! ## Design Principles
//!
//! - Snapshots are immutable values fetched at one point in time
//! - Events carry before/after snapshots where the remote feed provides them
//! - Every event maps to exactly one entity key (guid, optional index)
//!
//! ## Entities
//!
//! - Tasks (`task_*` events)
//! - Desired LRPs (`desired_lrp_*` events)
//! - Actual LRPs (`actual_lrp_*` events)
//! - Cells and domains (no events; polled only)

mod error;
mod event;
mod types;

pub use error::EventError;
pub use event::*;
pub use types::*;
