//! Change feed events.
//!
//! The remote system emits one event per observable transition, at either
//! desired-spec or actual-instance granularity. On the wire an event is
//! `{"type": "<wire name>", "data": {...}}`; the SSE frame repeats the wire
//! name in its `event:` line.

use std::fmt;

use converge_id::{ProcessGuid, TaskGuid};
use serde::{Deserialize, Serialize};

use crate::{ActualLrp, DesiredLrp, EventError, Task};

// =============================================================================
// Event Type Constants
// =============================================================================

/// All event wire names as constants.
pub mod event_types {
    // Desired LRP
    pub const DESIRED_LRP_CREATED: &str = "desired_lrp_created";
    pub const DESIRED_LRP_CHANGED: &str = "desired_lrp_changed";
    pub const DESIRED_LRP_REMOVED: &str = "desired_lrp_removed";

    // Actual LRP
    pub const ACTUAL_LRP_CREATED: &str = "actual_lrp_created";
    pub const ACTUAL_LRP_CHANGED: &str = "actual_lrp_changed";
    pub const ACTUAL_LRP_REMOVED: &str = "actual_lrp_removed";
    pub const ACTUAL_LRP_CRASHED: &str = "actual_lrp_crashed";

    // Task
    pub const TASK_CREATED: &str = "task_created";
    pub const TASK_CHANGED: &str = "task_changed";
    pub const TASK_REMOVED: &str = "task_removed";
}

/// A typed change notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Event {
    DesiredLrpCreated {
        desired_lrp: DesiredLrp,
    },
    DesiredLrpChanged {
        before: DesiredLrp,
        after: DesiredLrp,
    },
    DesiredLrpRemoved {
        desired_lrp: DesiredLrp,
    },
    ActualLrpCreated {
        actual_lrp: ActualLrp,
    },
    ActualLrpChanged {
        before: ActualLrp,
        after: ActualLrp,
    },
    ActualLrpRemoved {
        actual_lrp: ActualLrp,
    },
    ActualLrpCrashed {
        actual_lrp: ActualLrp,
        crash_count: i32,
        crash_reason: String,
    },
    TaskCreated {
        task: Task,
    },
    TaskChanged {
        before: Task,
        after: Task,
    },
    TaskRemoved {
        task: Task,
    },
}

/// The variant of an [`Event`] without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    DesiredLrpCreated,
    DesiredLrpChanged,
    DesiredLrpRemoved,
    ActualLrpCreated,
    ActualLrpChanged,
    ActualLrpRemoved,
    ActualLrpCrashed,
    TaskCreated,
    TaskChanged,
    TaskRemoved,
}

/// Where in an entity's lifetime an event sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Lifecycle {
    Created,
    Changed,
    Removed,
}

impl EventKind {
    pub const ALL: [EventKind; 10] = [
        EventKind::DesiredLrpCreated,
        EventKind::DesiredLrpChanged,
        EventKind::DesiredLrpRemoved,
        EventKind::ActualLrpCreated,
        EventKind::ActualLrpChanged,
        EventKind::ActualLrpRemoved,
        EventKind::ActualLrpCrashed,
        EventKind::TaskCreated,
        EventKind::TaskChanged,
        EventKind::TaskRemoved,
    ];

    pub fn wire_name(&self) -> &'static str {
        use event_types::*;
        match self {
            EventKind::DesiredLrpCreated => DESIRED_LRP_CREATED,
            EventKind::DesiredLrpChanged => DESIRED_LRP_CHANGED,
            EventKind::DesiredLrpRemoved => DESIRED_LRP_REMOVED,
            EventKind::ActualLrpCreated => ACTUAL_LRP_CREATED,
            EventKind::ActualLrpChanged => ACTUAL_LRP_CHANGED,
            EventKind::ActualLrpRemoved => ACTUAL_LRP_REMOVED,
            EventKind::ActualLrpCrashed => ACTUAL_LRP_CRASHED,
            EventKind::TaskCreated => TASK_CREATED,
            EventKind::TaskChanged => TASK_CHANGED,
            EventKind::TaskRemoved => TASK_REMOVED,
        }
    }

    pub fn from_wire_name(name: &str) -> Result<Self, EventError> {
        EventKind::ALL
            .into_iter()
            .find(|kind| kind.wire_name() == name)
            .ok_or_else(|| EventError::UnknownEventType(name.to_string()))
    }

    /// Crash notifications count as changes of the instance.
    pub fn lifecycle(&self) -> Lifecycle {
        match self {
            EventKind::DesiredLrpCreated | EventKind::ActualLrpCreated | EventKind::TaskCreated => {
                Lifecycle::Created
            }
            EventKind::DesiredLrpChanged
            | EventKind::ActualLrpChanged
            | EventKind::ActualLrpCrashed
            | EventKind::TaskChanged => Lifecycle::Changed,
            EventKind::DesiredLrpRemoved | EventKind::ActualLrpRemoved | EventKind::TaskRemoved => {
                Lifecycle::Removed
            }
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Identity of the entity an event or snapshot describes.
///
/// Desired LRPs and tasks have no index; actual LRPs always do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
    pub guid: String,
    pub index: Option<i32>,
}

impl EntityKey {
    pub fn task(guid: &TaskGuid) -> Self {
        Self {
            guid: guid.to_string(),
            index: None,
        }
    }

    pub fn desired_lrp(guid: &ProcessGuid) -> Self {
        Self {
            guid: guid.to_string(),
            index: None,
        }
    }

    pub fn actual_lrp(guid: &ProcessGuid, index: i32) -> Self {
        Self {
            guid: guid.to_string(),
            index: Some(index),
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(index) => write!(f, "{}[{}]", self.guid, index),
            None => f.write_str(&self.guid),
        }
    }
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::DesiredLrpCreated { .. } => EventKind::DesiredLrpCreated,
            Event::DesiredLrpChanged { .. } => EventKind::DesiredLrpChanged,
            Event::DesiredLrpRemoved { .. } => EventKind::DesiredLrpRemoved,
            Event::ActualLrpCreated { .. } => EventKind::ActualLrpCreated,
            Event::ActualLrpChanged { .. } => EventKind::ActualLrpChanged,
            Event::ActualLrpRemoved { .. } => EventKind::ActualLrpRemoved,
            Event::ActualLrpCrashed { .. } => EventKind::ActualLrpCrashed,
            Event::TaskCreated { .. } => EventKind::TaskCreated,
            Event::TaskChanged { .. } => EventKind::TaskChanged,
            Event::TaskRemoved { .. } => EventKind::TaskRemoved,
        }
    }

    /// Returns the key of the entity this event is about.
    pub fn key(&self) -> EntityKey {
        match self {
            Event::DesiredLrpCreated { desired_lrp }
            | Event::DesiredLrpRemoved { desired_lrp }
            | Event::DesiredLrpChanged {
                after: desired_lrp, ..
            } => EntityKey::desired_lrp(&desired_lrp.process_guid),
            Event::ActualLrpCreated { actual_lrp }
            | Event::ActualLrpRemoved { actual_lrp }
            | Event::ActualLrpCrashed { actual_lrp, .. }
            | Event::ActualLrpChanged {
                after: actual_lrp, ..
            } => EntityKey::actual_lrp(&actual_lrp.process_guid, actual_lrp.index),
            Event::TaskCreated { task }
            | Event::TaskRemoved { task }
            | Event::TaskChanged { after: task, .. } => EntityKey::task(&task.task_guid),
        }
    }

    /// The actual LRP snapshot after this event, if it is an instance event.
    pub fn actual_lrp(&self) -> Option<&ActualLrp> {
        match self {
            Event::ActualLrpCreated { actual_lrp }
            | Event::ActualLrpRemoved { actual_lrp }
            | Event::ActualLrpCrashed { actual_lrp, .. }
            | Event::ActualLrpChanged {
                after: actual_lrp, ..
            } => Some(actual_lrp),
            _ => None,
        }
    }

    /// The desired LRP snapshot after this event, if it is a desired event.
    pub fn desired_lrp(&self) -> Option<&DesiredLrp> {
        match self {
            Event::DesiredLrpCreated { desired_lrp }
            | Event::DesiredLrpRemoved { desired_lrp }
            | Event::DesiredLrpChanged {
                after: desired_lrp, ..
            } => Some(desired_lrp),
            _ => None,
        }
    }

    /// The task snapshot after this event, if it is a task event.
    pub fn task(&self) -> Option<&Task> {
        match self {
            Event::TaskCreated { task }
            | Event::TaskRemoved { task }
            | Event::TaskChanged { after: task, .. } => Some(task),
            _ => None,
        }
    }

    /// Decodes one SSE frame, checking the frame name against the payload.
    pub fn decode_frame(event_name: Option<&str>, data: &str) -> Result<Self, EventError> {
        let event: Event = serde_json::from_str(data)?;
        if let Some(name) = event_name {
            let frame_kind = EventKind::from_wire_name(name)?;
            if frame_kind != event.kind() {
                return Err(EventError::TypeMismatch {
                    frame: name.to_string(),
                    payload: event.kind().wire_name().to_string(),
                });
            }
        }
        Ok(event)
    }

    /// Encodes this event as one SSE frame terminated by a blank line.
    pub fn encode_frame(&self) -> Result<String, EventError> {
        let data = serde_json::to_string(self)?;
        Ok(format!("event: {}\ndata: {}\n\n", self.kind(), data))
    }
}
