//! # converge-client
//!
//! Client side of the control-plane wire contract.
//!
//! - [`ControlPlane`]: the operations the harness issues against the system
//!   under test (tasks, desired/actual LRPs, cells, domains, events)
//! - [`HttpControlPlane`]: the JSON-over-HTTP implementation
//! - [`EventSource`]: a blocking-style cursor over the change feed, backed
//!   by server-sent events
//!
//! The client never retries. A transport failure surfaces as
//! [`ClientError::Transport`] on the call that hit it; retry policy belongs
//! to the polling engine that owns the call.

mod api;
mod error;
mod http;
pub mod sse;

pub use api::{ControlPlane, EventSource};
pub use error::ClientError;
pub use http::{ClientConfig, HttpControlPlane};
pub use sse::SseEventSource;
