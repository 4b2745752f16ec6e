//! Typed expectations over snapshots and events.
//!
//! Matchers are pure: they never fetch, retry or mutate. They are evaluated
//! directly against a snapshot or handed to the [`crate::Poller`].

use std::collections::BTreeSet;
use std::fmt::{self, Debug, Display};

use converge_events::{
    ActualLrp, ActualLrpState, DesiredLrp, EntityKey, Event, EventKind, Lifecycle, Task, TaskState,
};

/// A predicate with human-readable diagnostics.
pub trait Matcher<T: Debug + ?Sized>: Send + Sync {
    fn evaluate(&self, actual: &T) -> bool;

    /// The expected shape.
    fn describe(&self) -> String;

    /// The expected shape together with a dump of `actual`.
    fn describe_mismatch(&self, actual: &T) -> String {
        format!("expected {}\nactual: {:#?}", self.describe(), actual)
    }
}

/// Combinators available on every matcher.
pub trait MatcherExt<T: Debug + ?Sized>: Matcher<T> + Sized {
    /// Both `self` and `other` must hold.
    fn and<M: Matcher<T>>(self, other: M) -> AllOf<Self, M> {
        AllOf(self, other)
    }
}

impl<T: Debug + ?Sized, M: Matcher<T>> MatcherExt<T> for M {}

/// Anything that carries an entity identity.
pub trait Keyed {
    fn entity_key(&self) -> EntityKey;
}

impl Keyed for Task {
    fn entity_key(&self) -> EntityKey {
        EntityKey::task(&self.task_guid)
    }
}

impl Keyed for DesiredLrp {
    fn entity_key(&self) -> EntityKey {
        EntityKey::desired_lrp(&self.process_guid)
    }
}

impl Keyed for ActualLrp {
    fn entity_key(&self) -> EntityKey {
        EntityKey::actual_lrp(&self.process_guid, self.index)
    }
}

impl Keyed for Event {
    fn entity_key(&self) -> EntityKey {
        self.key()
    }
}

// =============================================================================
// Identity and state
// =============================================================================

/// Exact guid (and index, for instances) match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityMatch {
    key: EntityKey,
}

impl IdentityMatch {
    pub fn new(key: EntityKey) -> Self {
        Self { key }
    }

    pub fn task(guid: &converge_id::TaskGuid) -> Self {
        Self::new(EntityKey::task(guid))
    }

    pub fn desired_lrp(guid: &converge_id::ProcessGuid) -> Self {
        Self::new(EntityKey::desired_lrp(guid))
    }

    pub fn actual_lrp(guid: &converge_id::ProcessGuid, index: i32) -> Self {
        Self::new(EntityKey::actual_lrp(guid, index))
    }
}

impl<T: Keyed + Debug> Matcher<T> for IdentityMatch {
    fn evaluate(&self, actual: &T) -> bool {
        actual.entity_key() == self.key
    }

    fn describe(&self) -> String {
        format!("identity {}", self.key)
    }
}

/// Optional state match; `None` accepts any state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateMatch<S> {
    state: Option<S>,
}

impl<S> StateMatch<S> {
    pub fn is(state: S) -> Self {
        Self { state: Some(state) }
    }

    pub fn any() -> Self {
        Self { state: None }
    }
}

impl<S: Display> StateMatch<S> {
    fn describe_state(&self) -> String {
        match &self.state {
            Some(state) => format!("state {state}"),
            None => "any state".to_string(),
        }
    }
}

impl Matcher<Task> for StateMatch<TaskState> {
    fn evaluate(&self, actual: &Task) -> bool {
        self.state.is_none_or(|s| s == actual.state)
    }

    fn describe(&self) -> String {
        self.describe_state()
    }
}

impl Matcher<ActualLrp> for StateMatch<ActualLrpState> {
    fn evaluate(&self, actual: &ActualLrp) -> bool {
        self.state.is_none_or(|s| s == actual.state)
    }

    fn describe(&self) -> String {
        self.describe_state()
    }
}

/// Crash count of one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashCountMatch {
    Exactly(i32),
    AtLeast(i32),
}

impl Matcher<ActualLrp> for CrashCountMatch {
    fn evaluate(&self, actual: &ActualLrp) -> bool {
        match *self {
            CrashCountMatch::Exactly(n) => actual.crash_count == n,
            CrashCountMatch::AtLeast(n) => actual.crash_count >= n,
        }
    }

    fn describe(&self) -> String {
        match self {
            CrashCountMatch::Exactly(n) => format!("crash count {n}"),
            CrashCountMatch::AtLeast(n) => format!("crash count >= {n}"),
        }
    }
}

/// A completed task's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskResultMatch {
    failed: bool,
    reason_contains: Option<String>,
}

impl TaskResultMatch {
    /// Completed with `failed == false`.
    pub fn succeeded() -> Self {
        Self {
            failed: false,
            reason_contains: None,
        }
    }

    /// Completed with `failed == true`, any reason.
    pub fn failed() -> Self {
        Self {
            failed: true,
            reason_contains: None,
        }
    }

    /// Completed with `failed == true` and a reason containing `reason`.
    pub fn failed_with(reason: impl Into<String>) -> Self {
        Self {
            failed: true,
            reason_contains: Some(reason.into()),
        }
    }
}

impl Matcher<Task> for TaskResultMatch {
    fn evaluate(&self, actual: &Task) -> bool {
        actual.state == TaskState::Completed
            && actual.failed == self.failed
            && self
                .reason_contains
                .as_deref()
                .is_none_or(|r| actual.failure_reason.contains(r))
    }

    fn describe(&self) -> String {
        match (self.failed, &self.reason_contains) {
            (false, _) => "completed successfully".to_string(),
            (true, None) => "completed with failure".to_string(),
            (true, Some(reason)) => format!("completed with failure containing {reason:?}"),
        }
    }

    fn describe_mismatch(&self, actual: &Task) -> String {
        format!(
            "expected {}\nactual: state={} failed={} failure_reason={:?} result={:?}",
            self.describe(),
            actual.state,
            actual.failed,
            actual.failure_reason,
            actual.result
        )
    }
}

// =============================================================================
// Collections
// =============================================================================

/// Exact number of instances at distinct indices, optionally all in one state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstancesMatch {
    count: usize,
    state: Option<ActualLrpState>,
}

impl InstancesMatch {
    pub fn exactly(count: usize) -> Self {
        Self { count, state: None }
    }

    pub fn running(count: usize) -> Self {
        Self {
            count,
            state: Some(ActualLrpState::Running),
        }
    }

    pub fn none() -> Self {
        Self::exactly(0)
    }
}

impl Matcher<Vec<ActualLrp>> for InstancesMatch {
    fn evaluate(&self, actual: &Vec<ActualLrp>) -> bool {
        let indices: BTreeSet<i32> = actual.iter().map(|lrp| lrp.index).collect();
        actual.len() == self.count
            && indices.len() == self.count
            && actual
                .iter()
                .all(|lrp| self.state.is_none_or(|s| s == lrp.state))
    }

    fn describe(&self) -> String {
        match self.state {
            Some(state) => format!("{} {state} instances at distinct indices", self.count),
            None => format!("{} instances at distinct indices", self.count),
        }
    }

    fn describe_mismatch(&self, actual: &Vec<ActualLrp>) -> String {
        let observed: Vec<String> = actual
            .iter()
            .map(|lrp| {
                format!(
                    "{}[{}] {} crashes={}",
                    lrp.process_guid, lrp.index, lrp.state, lrp.crash_count
                )
            })
            .collect();
        format!(
            "expected {}\nactual ({}): [{}]",
            self.describe(),
            actual.len(),
            observed.join(", ")
        )
    }
}

// =============================================================================
// Events
// =============================================================================

/// Event kind, optionally narrowed to one entity and instance state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMatch {
    kind: EventKind,
    key: Option<EntityKey>,
    state: Option<ActualLrpState>,
}

impl EventMatch {
    pub fn kind(kind: EventKind) -> Self {
        Self {
            kind,
            key: None,
            state: None,
        }
    }

    #[must_use]
    pub fn for_key(mut self, key: EntityKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Require the carried actual LRP snapshot to be in `state`.
    #[must_use]
    pub fn with_state(mut self, state: ActualLrpState) -> Self {
        self.state = Some(state);
        self
    }
}

impl Matcher<Event> for EventMatch {
    fn evaluate(&self, actual: &Event) -> bool {
        actual.kind() == self.kind
            && self.key.as_ref().is_none_or(|k| *k == actual.key())
            && self
                .state
                .is_none_or(|s| actual.actual_lrp().is_some_and(|lrp| lrp.state == s))
    }

    fn describe(&self) -> String {
        let mut out = self.kind.to_string();
        if let Some(key) = &self.key {
            out.push_str(&format!(" for {key}"));
        }
        if let Some(state) = self.state {
            out.push_str(&format!(" in state {state}"));
        }
        out
    }
}

/// At least one buffered event matches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainsEvent(pub EventMatch);

impl Matcher<Vec<Event>> for ContainsEvent {
    fn evaluate(&self, actual: &Vec<Event>) -> bool {
        actual.iter().any(|event| self.0.evaluate(event))
    }

    fn describe(&self) -> String {
        format!("an event {}", self.0.describe())
    }

    fn describe_mismatch(&self, actual: &Vec<Event>) -> String {
        format!(
            "expected {}\nreceived: {}",
            self.describe(),
            EventSummary(actual)
        )
    }
}

/// Events for one entity arrive created, then changed, then removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleOrder {
    key: EntityKey,
    require_removed: bool,
}

impl LifecycleOrder {
    /// A created event first and no phase going backwards.
    pub fn ordered(key: EntityKey) -> Self {
        Self {
            key,
            require_removed: false,
        }
    }

    /// Like [`LifecycleOrder::ordered`], and the last event is a removal.
    pub fn complete(key: EntityKey) -> Self {
        Self {
            key,
            require_removed: true,
        }
    }

    fn phases(&self, events: &[Event]) -> Vec<Lifecycle> {
        events
            .iter()
            .filter(|event| event.key() == self.key)
            .map(|event| event.kind().lifecycle())
            .collect()
    }
}

impl Matcher<Vec<Event>> for LifecycleOrder {
    fn evaluate(&self, actual: &Vec<Event>) -> bool {
        let phases = self.phases(actual);
        phases.first() == Some(&Lifecycle::Created)
            && phases.windows(2).all(|pair| pair[0] <= pair[1])
            && (!self.require_removed || phases.last() == Some(&Lifecycle::Removed))
    }

    fn describe(&self) -> String {
        if self.require_removed {
            format!("created < changed < removed for {}", self.key)
        } else {
            format!("created < changed for {}", self.key)
        }
    }

    fn describe_mismatch(&self, actual: &Vec<Event>) -> String {
        let related: Vec<Event> = actual
            .iter()
            .filter(|event| event.key() == self.key)
            .cloned()
            .collect();
        format!(
            "expected {}\nreceived for {}: {}",
            self.describe(),
            self.key,
            EventSummary(&related)
        )
    }
}

struct EventSummary<'a>(&'a [Event]);

impl fmt::Display for EventSummary<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("no events");
        }
        for (i, event) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", event.kind(), event.key())?;
        }
        Ok(())
    }
}

// =============================================================================
// Composition
// =============================================================================

/// A named closure predicate.
pub struct Satisfies<F> {
    description: String,
    predicate: F,
}

impl<F> Satisfies<F> {
    pub fn new(description: impl Into<String>, predicate: F) -> Self {
        Self {
            description: description.into(),
            predicate,
        }
    }
}

impl<T, F> Matcher<T> for Satisfies<F>
where
    T: Debug + ?Sized,
    F: Fn(&T) -> bool + Send + Sync,
{
    fn evaluate(&self, actual: &T) -> bool {
        (self.predicate)(actual)
    }

    fn describe(&self) -> String {
        self.description.clone()
    }
}

/// Both matchers must hold. Built with [`MatcherExt::and`].
#[derive(Debug, Clone)]
pub struct AllOf<A, B>(pub A, pub B);

impl<T, A, B> Matcher<T> for AllOf<A, B>
where
    T: Debug + ?Sized,
    A: Matcher<T>,
    B: Matcher<T>,
{
    fn evaluate(&self, actual: &T) -> bool {
        self.0.evaluate(actual) && self.1.evaluate(actual)
    }

    fn describe(&self) -> String {
        format!("{} and {}", self.0.describe(), self.1.describe())
    }

    fn describe_mismatch(&self, actual: &T) -> String {
        let mut failing = Vec::new();
        if !self.0.evaluate(actual) {
            failing.push(self.0.describe());
        }
        if !self.1.evaluate(actual) {
            failing.push(self.1.describe());
        }
        format!(
            "expected {}\nfailed: {}\nactual: {:#?}",
            self.describe(),
            failing.join(", "),
            actual
        )
    }
}
