//! Entity snapshots: tasks, LRPs, cells, and the shared wire shapes.
//!
//! Every snapshot here is a value fetched at one point in time. Nothing is
//! cached; a fresh poll produces a fresh snapshot.

use chrono::{DateTime, Utc};
use converge_id::{CellId, Domain, ProcessGuid, TaskGuid};
use serde::{Deserialize, Serialize};

// =============================================================================
// Actions
// =============================================================================

/// An environment variable passed to a run action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvVar {
    pub name: String,
    pub value: String,
}

/// A process to run inside the container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunAction {
    pub path: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub env: Vec<EnvVar>,
}

impl RunAction {
    /// Runs `script` under `sh -c` as root.
    pub fn shell(script: impl Into<String>) -> Self {
        Self {
            path: "sh".to_string(),
            args: vec!["-c".to_string(), script.into()],
            user: "root".to_string(),
            env: Vec::new(),
        }
    }

    /// Returns the script passed to `sh -c`, if this is a shell action.
    pub fn script(&self) -> Option<&str> {
        match self.args.as_slice() {
            [flag, script] if flag == "-c" => Some(script.as_str()),
            _ => None,
        }
    }
}

// =============================================================================
// Tasks
// =============================================================================

/// Task lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Completed,
    Resolving,
}

impl std::fmt::Display for TaskState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TaskState::Pending => "pending",
            TaskState::Running => "running",
            TaskState::Completed => "completed",
            TaskState::Resolving => "resolving",
        };
        f.write_str(s)
    }
}

/// The user-supplied portion of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskDefinition {
    pub root_fs: String,
    pub action: RunAction,
    #[serde(default)]
    pub memory_mb: i32,
    #[serde(default)]
    pub disk_mb: i32,
    #[serde(default)]
    pub cpu_weight: u32,
    #[serde(default)]
    pub log_guid: String,
    #[serde(default)]
    pub annotation: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_callback_url: Option<String>,
    #[serde(default)]
    pub privileged: bool,
    #[serde(default)]
    pub result_file: String,
}

/// Request body for creating a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task_guid: TaskGuid,
    pub domain: Domain,
    pub definition: TaskDefinition,
}

/// A task snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub task_guid: TaskGuid,
    pub domain: Domain,
    pub definition: TaskDefinition,
    pub state: TaskState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<CellId>,
    #[serde(default)]
    pub failed: bool,
    #[serde(default)]
    pub failure_reason: String,
    #[serde(default)]
    pub result: String,
    #[serde(default)]
    pub rejection_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_completed_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Modification tags
// =============================================================================

/// An (epoch, index) version stamp on mutable remote entities.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ModificationTag {
    pub epoch: String,
    pub index: u32,
}

impl ModificationTag {
    pub fn new(epoch: impl Into<String>) -> Self {
        Self {
            epoch: epoch.into(),
            index: 0,
        }
    }

    /// Returns the tag after one more modification.
    #[must_use]
    pub fn incremented(&self) -> Self {
        Self {
            epoch: self.epoch.clone(),
            index: self.index + 1,
        }
    }

    /// Returns true if `newer` records a modification after `self`.
    ///
    /// An empty epoch on either side carries no ordering information and is
    /// treated as a successor. A different epoch means the entity was
    /// recreated.
    pub fn succeeded_by(&self, newer: &ModificationTag) -> bool {
        if self.epoch.is_empty() || newer.epoch.is_empty() {
            return true;
        }
        self.epoch != newer.epoch || self.index < newer.index
    }
}

// =============================================================================
// Desired LRPs
// =============================================================================

/// The declared specification of a long-running process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DesiredLrp {
    pub process_guid: ProcessGuid,
    pub domain: Domain,
    pub root_fs: String,
    pub instances: i32,
    pub action: RunAction,
    #[serde(default)]
    pub memory_mb: i32,
    #[serde(default)]
    pub disk_mb: i32,
    #[serde(default)]
    pub cpu_weight: u32,
    #[serde(default)]
    pub ports: Vec<u32>,
    #[serde(default)]
    pub routes: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub annotation: String,
    #[serde(default)]
    pub log_guid: String,
    #[serde(default)]
    pub start_timeout_ms: i64,
    #[serde(default)]
    pub modification_tag: ModificationTag,
}

/// A partial update to a desired LRP; `None` leaves a field unchanged.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DesiredLrpUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instances: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routes: Option<serde_json::Map<String, serde_json::Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub annotation: Option<String>,
}

impl DesiredLrpUpdate {
    pub fn instances(instances: i32) -> Self {
        Self {
            instances: Some(instances),
            ..Default::default()
        }
    }

    pub fn annotation(annotation: impl Into<String>) -> Self {
        Self {
            annotation: Some(annotation.into()),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_none() && self.routes.is_none() && self.annotation.is_none()
    }
}

// =============================================================================
// Actual LRPs
// =============================================================================

/// ActualLRP instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActualLrpState {
    Unclaimed,
    Claimed,
    Running,
    Crashed,
}

impl std::fmt::Display for ActualLrpState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ActualLrpState::Unclaimed => "unclaimed",
            ActualLrpState::Claimed => "claimed",
            ActualLrpState::Running => "running",
            ActualLrpState::Crashed => "crashed",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortMapping {
    pub container_port: u32,
    pub host_port: u32,
}

/// Where a running instance can be reached.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActualLrpNetInfo {
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub ports: Vec<PortMapping>,
}

/// An observed runtime instance of a desired LRP at one index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActualLrp {
    pub process_guid: ProcessGuid,
    pub index: i32,
    pub domain: Domain,
    #[serde(default)]
    pub instance_guid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cell_id: Option<CellId>,
    pub state: ActualLrpState,
    #[serde(default)]
    pub crash_count: i32,
    #[serde(default)]
    pub crash_reason: String,
    #[serde(default)]
    pub placement_error: String,
    #[serde(default)]
    pub net_info: ActualLrpNetInfo,
    pub since: DateTime<Utc>,
    #[serde(default)]
    pub modification_tag: ModificationTag,
}

/// Query filter for listing actual LRPs.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ActualLrpFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<Domain>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub process_guid: Option<ProcessGuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<i32>,
}

impl ActualLrpFilter {
    pub fn process_guid(guid: &ProcessGuid) -> Self {
        Self {
            process_guid: Some(guid.clone()),
            ..Default::default()
        }
    }

    pub fn domain(domain: &Domain) -> Self {
        Self {
            domain: Some(domain.clone()),
            ..Default::default()
        }
    }

    /// Returns true if `lrp` passes every set criterion.
    pub fn admits(&self, lrp: &ActualLrp) -> bool {
        self.domain.as_ref().is_none_or(|d| *d == lrp.domain)
            && self
                .process_guid
                .as_ref()
                .is_none_or(|g| *g == lrp.process_guid)
            && self.index.is_none_or(|i| i == lrp.index)
    }
}

// =============================================================================
// Cells
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellCapacity {
    pub memory_mb: i32,
    pub disk_mb: i32,
    pub containers: i32,
}

/// A cell registered with the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPresence {
    pub cell_id: CellId,
    pub rep_address: String,
    #[serde(default)]
    pub zone: String,
    pub capacity: CellCapacity,
}

// =============================================================================
// Wire shapes
// =============================================================================

/// List envelope used by every collection endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
}

impl<T> ListResponse<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self { items }
    }
}

/// Body of `PUT /v1/domains/{domain}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainUpsertRequest {
    /// Seconds until the domain expires; 0 means it never does.
    pub ttl_seconds: u64,
}

/// Typed error taxonomy shared by the control plane and its clients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidTask,
    InvalidDesiredLrp,
    InvalidRequest,
    ResourceExists,
    ResourceNotFound,
    InvalidStateTransition,
    Unknown(String),
}

impl ErrorKind {
    /// Returns the wire code for this kind.
    pub fn code(&self) -> &str {
        match self {
            ErrorKind::InvalidTask => "invalid_task",
            ErrorKind::InvalidDesiredLrp => "invalid_desired_lrp",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::ResourceExists => "resource_exists",
            ErrorKind::ResourceNotFound => "resource_not_found",
            ErrorKind::InvalidStateTransition => "invalid_state_transition",
            ErrorKind::Unknown(code) => code.as_str(),
        }
    }

    /// Parses a wire code; unrecognized codes are preserved.
    pub fn from_code(code: &str) -> Self {
        match code {
            "invalid_task" => ErrorKind::InvalidTask,
            "invalid_desired_lrp" => ErrorKind::InvalidDesiredLrp,
            "invalid_request" => ErrorKind::InvalidRequest,
            "resource_exists" => ErrorKind::ResourceExists,
            "resource_not_found" => ErrorKind::ResourceNotFound,
            "invalid_state_transition" => ErrorKind::InvalidStateTransition,
            other => ErrorKind::Unknown(other.to_string()),
        }
    }

    /// Returns true for synchronous validation failures.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ErrorKind::InvalidTask | ErrorKind::InvalidDesiredLrp | ErrorKind::InvalidRequest
        )
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.code())
    }
}

/// Error body returned with every non-2xx response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}
