//! Convergence-observation harness.
//!
//! The pieces, leaves first:
//!
//! - [`probe`]: one-shot accessors for remote entities
//! - [`poll`]: "eventually" and "consistently" over a probe and a matcher
//! - [`matchers`]: typed expectations with readable mismatch reports
//! - [`events`]: a background change-feed receiver and its buffer
//! - [`scenario`]: per-scenario context with cleanup on every exit path
//!
//! Scenarios issue a mutation, observe the resulting state through probes
//! or the event buffer, and tear down whatever they created even when an
//! assertion fails midway.

pub mod callback;
pub mod config;
mod error;
pub mod events;
pub mod logging;
pub mod matchers;
pub mod poll;
pub mod probe;
pub mod requests;
pub mod scenario;

#[cfg(test)]
mod fixtures;

pub use callback::CallbackReceiver;
pub use config::HarnessConfig;
pub use error::{HarnessError, PollError, ProbeError, ScenarioError};
pub use events::{EventBuffer, EventListener};
pub use matchers::{
    AllOf, ContainsEvent, CrashCountMatch, EventMatch, IdentityMatch, InstancesMatch,
    LifecycleOrder, Matcher, MatcherExt, Satisfies, StateMatch, TaskResultMatch,
};
pub use poll::{PollConfig, Poller};
pub use probe::{
    ActualLrpProbe, ActualLrpsInDomainProbe, ActualLrpsProbe, CellsProbe, DesiredLrpProbe,
    DomainsProbe, EventBufferProbe, FnProbe, Probe, TaskProbe, TasksInDomainProbe,
};
pub use scenario::{Harness, ScenarioContext};
