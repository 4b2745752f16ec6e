//! In-memory control plane state and its convergence rules.
//!
//! The store is synchronous and owns no clock: every operation that
//! schedules something takes `now`. Each mutation appends the events it
//! caused to an internal queue which the caller drains and publishes while
//! still holding the lock, so subscribers see events in mutation order.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use converge_events::{
    ActualLrp, ActualLrpFilter, ActualLrpNetInfo, ActualLrpState, CellCapacity, CellPresence,
    DesiredLrp, DesiredLrpUpdate, ErrorKind, Event, ModificationTag, PortMapping, Task,
    TaskRequest, TaskState,
};
use converge_id::{validate_guid, CellId, Domain, ProcessGuid, TaskGuid};
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::SimConfig;
use crate::error::SimError;
use crate::script::ScriptOutcome;
use crate::validation::{validate_desired_lrp, validate_task, validate_update};

pub const CANCELLED_REASON: &str = "task was cancelled";
pub const INSUFFICIENT_RESOURCES: &str = "insufficient resources: no cells available";

const FIRST_HOST_PORT: u32 = 61000;
const IMMEDIATE_RESTARTS: i32 = 3;

struct TaskRecord {
    task: Task,
    outcome: ScriptOutcome,
    finish_at: Option<Instant>,
}

struct ActualRecord {
    lrp: ActualLrp,
    outcome: ScriptOutcome,
    crash_at: Option<Instant>,
    restart_at: Option<Instant>,
}

/// The simulated control plane's entire state.
pub struct Store {
    tasks: BTreeMap<String, TaskRecord>,
    desired: BTreeMap<String, DesiredLrp>,
    actuals: BTreeMap<(String, i32), ActualRecord>,
    domains: BTreeMap<String, Option<Instant>>,
    cells: Vec<CellPresence>,
    next_cell: usize,
    next_host_port: u32,
    task_run_time: Duration,
    crash_backoff: Duration,
    max_crash_backoff: Duration,
    events: Vec<Event>,
}

impl Store {
    pub fn new(config: &SimConfig) -> Self {
        let cells = (0..config.cell_count)
            .map(|i| CellPresence {
                cell_id: CellId::new(format!("cell-{i}")),
                rep_address: format!("http://{}:1800", cell_ip(i)),
                zone: format!("z{}", i % 2 + 1),
                capacity: CellCapacity {
                    memory_mb: 8192,
                    disk_mb: 16384,
                    containers: 256,
                },
            })
            .collect();

        Self {
            tasks: BTreeMap::new(),
            desired: BTreeMap::new(),
            actuals: BTreeMap::new(),
            domains: BTreeMap::new(),
            cells,
            next_cell: 0,
            next_host_port: FIRST_HOST_PORT,
            task_run_time: config.task_run_time,
            crash_backoff: config.crash_backoff,
            max_crash_backoff: config.max_crash_backoff,
            events: Vec::new(),
        }
    }

    /// Take the events produced since the last drain, in mutation order.
    pub fn drain_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    // =========================================================================
    // Tasks
    // =========================================================================

    pub fn desire_task(&mut self, request: TaskRequest) -> Result<Task, SimError> {
        validate_task(&request)?;
        let key = request.task_guid.to_string();
        if self.tasks.contains_key(&key) {
            return Err(SimError::Exists(format!("task {key}")));
        }

        let now = Utc::now();
        let task = Task {
            task_guid: request.task_guid,
            domain: request.domain,
            definition: request.definition,
            state: TaskState::Pending,
            cell_id: None,
            failed: false,
            failure_reason: String::new(),
            result: String::new(),
            rejection_count: 0,
            created_at: now,
            updated_at: now,
            first_completed_at: None,
        };
        let outcome = ScriptOutcome::of(&task.definition.action);

        info!(task_guid = %task.task_guid, domain = %task.domain, "Task desired");
        self.events.push(Event::TaskCreated { task: task.clone() });
        self.tasks.insert(
            key,
            TaskRecord {
                task: task.clone(),
                outcome,
                finish_at: None,
            },
        );
        Ok(task)
    }

    pub fn task(&self, guid: &TaskGuid) -> Result<Task, SimError> {
        self.tasks
            .get(guid.as_str())
            .map(|r| r.task.clone())
            .ok_or_else(|| task_not_found(guid))
    }

    pub fn tasks(&self, domain: Option<&Domain>) -> Vec<Task> {
        self.tasks
            .values()
            .filter(|r| domain.is_none_or(|d| *d == r.task.domain))
            .map(|r| r.task.clone())
            .collect()
    }

    pub fn cancel_task(&mut self, guid: &TaskGuid) -> Result<(), SimError> {
        let record = self
            .tasks
            .get_mut(guid.as_str())
            .ok_or_else(|| task_not_found(guid))?;

        match record.task.state {
            TaskState::Pending | TaskState::Running => {
                let before = record.task.clone();
                complete(&mut record.task, Some(CANCELLED_REASON.to_string()), String::new());
                info!(task_guid = %guid, "Task cancelled");
                self.events.push(Event::TaskChanged {
                    before,
                    after: record.task.clone(),
                });
                Ok(())
            }
            state => Err(SimError::InvalidTransition(format!(
                "task {guid} is {state} and cannot be cancelled"
            ))),
        }
    }

    pub fn delete_task(&mut self, guid: &TaskGuid) -> Result<(), SimError> {
        let record = self
            .tasks
            .get(guid.as_str())
            .ok_or_else(|| task_not_found(guid))?;

        if record.task.state != TaskState::Completed {
            return Err(SimError::InvalidTransition(format!(
                "task {guid} is {} and cannot be deleted until completed",
                record.task.state
            )));
        }

        if let Some(record) = self.tasks.remove(guid.as_str()) {
            info!(task_guid = %guid, "Task deleted");
            self.events.push(Event::TaskRemoved { task: record.task });
        }
        Ok(())
    }

    /// Remove a task whose completion callback has been dealt with.
    pub fn resolve_task(&mut self, guid: &TaskGuid) -> Result<(), SimError> {
        let record = self
            .tasks
            .get(guid.as_str())
            .ok_or_else(|| task_not_found(guid))?;

        if record.task.state != TaskState::Resolving {
            return Err(SimError::InvalidTransition(format!(
                "task {guid} is {} and cannot be resolved",
                record.task.state
            )));
        }

        if let Some(record) = self.tasks.remove(guid.as_str()) {
            debug!(task_guid = %guid, "Task resolved");
            self.events.push(Event::TaskRemoved { task: record.task });
        }
        Ok(())
    }

    // =========================================================================
    // Desired LRPs
    // =========================================================================

    pub fn desire_lrp(&mut self, mut lrp: DesiredLrp) -> Result<DesiredLrp, SimError> {
        validate_desired_lrp(&lrp)?;
        let key = lrp.process_guid.to_string();
        if self.desired.contains_key(&key) {
            return Err(SimError::Exists(format!("desired lrp {key}")));
        }

        lrp.modification_tag = ModificationTag::new(Uuid::new_v4().to_string());
        info!(
            process_guid = %lrp.process_guid,
            domain = %lrp.domain,
            instances = lrp.instances,
            "Desired LRP created"
        );
        self.events.push(Event::DesiredLrpCreated {
            desired_lrp: lrp.clone(),
        });
        self.desired.insert(key, lrp.clone());

        for index in 0..lrp.instances {
            self.create_actual(&lrp, index);
        }
        Ok(lrp)
    }

    pub fn desired_lrp(&self, guid: &ProcessGuid) -> Result<DesiredLrp, SimError> {
        self.desired
            .get(guid.as_str())
            .cloned()
            .ok_or_else(|| lrp_not_found(guid))
    }

    pub fn desired_lrps(&self, domain: Option<&Domain>) -> Vec<DesiredLrp> {
        self.desired
            .values()
            .filter(|lrp| domain.is_none_or(|d| *d == lrp.domain))
            .cloned()
            .collect()
    }

    /// Apply `update`. Only an update that changes a field advances the
    /// modification tag and emits a change event.
    pub fn update_desired_lrp(
        &mut self,
        guid: &ProcessGuid,
        update: DesiredLrpUpdate,
    ) -> Result<DesiredLrp, SimError> {
        validate_update(&update)?;
        let before = self.desired_lrp(guid)?;

        let mut after = before.clone();
        if let Some(instances) = update.instances {
            after.instances = instances;
        }
        if let Some(routes) = update.routes {
            after.routes = routes;
        }
        if let Some(annotation) = update.annotation {
            after.annotation = annotation;
        }

        if after == before {
            debug!(process_guid = %guid, "Desired LRP update changed nothing");
            return Ok(before);
        }

        after.modification_tag = before.modification_tag.incremented();
        info!(
            process_guid = %guid,
            instances = after.instances,
            tag_index = after.modification_tag.index,
            "Desired LRP updated"
        );
        self.events.push(Event::DesiredLrpChanged {
            before: before.clone(),
            after: after.clone(),
        });
        self.desired.insert(guid.to_string(), after.clone());

        for index in after.instances..before.instances {
            self.remove_actual(guid, index);
        }
        for index in before.instances..after.instances {
            self.create_actual(&after, index);
        }
        Ok(after)
    }

    pub fn remove_desired_lrp(&mut self, guid: &ProcessGuid) -> Result<(), SimError> {
        let lrp = self
            .desired
            .remove(guid.as_str())
            .ok_or_else(|| lrp_not_found(guid))?;

        info!(process_guid = %guid, "Desired LRP removed");
        self.events.push(Event::DesiredLrpRemoved { desired_lrp: lrp });

        let indices: Vec<i32> = self
            .actuals
            .keys()
            .filter(|(g, _)| g == guid.as_str())
            .map(|(_, i)| *i)
            .collect();
        for index in indices {
            self.remove_actual(guid, index);
        }
        Ok(())
    }

    // =========================================================================
    // Actual LRPs
    // =========================================================================

    pub fn actual_lrps(&self, filter: &ActualLrpFilter) -> Vec<ActualLrp> {
        self.actuals
            .values()
            .map(|r| &r.lrp)
            .filter(|lrp| filter.admits(lrp))
            .cloned()
            .collect()
    }

    pub fn actual_lrp(&self, guid: &ProcessGuid, index: i32) -> Result<ActualLrp, SimError> {
        self.actuals
            .get(&(guid.to_string(), index))
            .map(|r| r.lrp.clone())
            .ok_or_else(|| actual_not_found(guid, index))
    }

    /// Stop one instance. The next tick replaces it if it is still desired.
    pub fn retire_actual_lrp(&mut self, guid: &ProcessGuid, index: i32) -> Result<(), SimError> {
        if !self.actuals.contains_key(&(guid.to_string(), index)) {
            return Err(actual_not_found(guid, index));
        }
        info!(process_guid = %guid, index, "Actual LRP retired");
        self.remove_actual(guid, index);
        Ok(())
    }

    fn create_actual(&mut self, desired: &DesiredLrp, index: i32) {
        let instance_guid = Uuid::new_v4().to_string();
        let lrp = ActualLrp {
            process_guid: desired.process_guid.clone(),
            index,
            domain: desired.domain.clone(),
            instance_guid: instance_guid.clone(),
            cell_id: None,
            state: ActualLrpState::Unclaimed,
            crash_count: 0,
            crash_reason: String::new(),
            placement_error: String::new(),
            net_info: ActualLrpNetInfo::default(),
            since: Utc::now(),
            modification_tag: ModificationTag::new(instance_guid),
        };

        self.events.push(Event::ActualLrpCreated {
            actual_lrp: lrp.clone(),
        });
        self.actuals.insert(
            (desired.process_guid.to_string(), index),
            ActualRecord {
                lrp,
                outcome: ScriptOutcome::of(&desired.action),
                crash_at: None,
                restart_at: None,
            },
        );
    }

    fn remove_actual(&mut self, guid: &ProcessGuid, index: i32) {
        if let Some(record) = self.actuals.remove(&(guid.to_string(), index)) {
            self.events.push(Event::ActualLrpRemoved {
                actual_lrp: record.lrp,
            });
        }
    }

    // =========================================================================
    // Cells and domains
    // =========================================================================

    pub fn cells(&self) -> Vec<CellPresence> {
        self.cells.clone()
    }

    /// Register or refresh a domain; a zero TTL never expires.
    pub fn upsert_domain(&mut self, domain: &str, ttl: Duration, now: Instant) -> Result<(), SimError> {
        validate_guid(domain).map_err(|e| {
            SimError::invalid(ErrorKind::InvalidRequest, "domain", format!("domain: {e}"))
        })?;
        let expires_at = if ttl.is_zero() { None } else { now.checked_add(ttl) };
        debug!(domain, ttl_secs = ttl.as_secs(), "Domain upserted");
        self.domains.insert(domain.to_string(), expires_at);
        Ok(())
    }

    pub fn domains(&self, now: Instant) -> Vec<Domain> {
        self.domains
            .iter()
            .filter(|(_, expires_at)| expires_at.is_none_or(|at| at > now))
            .map(|(name, _)| Domain::new(name.clone()))
            .collect()
    }

    // =========================================================================
    // Convergence
    // =========================================================================

    /// Advance every entity by at most one state.
    ///
    /// Returns the tasks that just entered `Resolving` and need their
    /// completion callback delivered.
    pub fn tick(&mut self, now: Instant) -> Vec<Task> {
        self.domains
            .retain(|_, expires_at| expires_at.is_none_or(|at| at > now));

        let callbacks = self.converge_tasks(now);
        self.replace_missing_actuals();
        self.converge_actuals(now);
        callbacks
    }

    fn converge_tasks(&mut self, now: Instant) -> Vec<Task> {
        let mut callbacks = Vec::new();
        let keys: Vec<String> = self.tasks.keys().cloned().collect();

        for key in keys {
            let cell = match self.tasks.get(&key).map(|r| r.task.state) {
                Some(TaskState::Pending) => match self.next_cell() {
                    Some(i) => Some(self.cells[i].cell_id.clone()),
                    None => continue,
                },
                _ => None,
            };
            let Some(record) = self.tasks.get_mut(&key) else {
                continue;
            };
            let before = record.task.clone();

            match record.task.state {
                TaskState::Pending => {
                    record.task.state = TaskState::Running;
                    record.task.cell_id = cell;
                    record.finish_at =
                        deadline(now, self.task_run_time.saturating_add(record.outcome.sleep));
                    debug!(task_guid = %key, "Task running");
                }
                TaskState::Running if record.finish_at.is_some_and(|at| now >= at) => {
                    let status = record.outcome.task_status();
                    let reason = (status != 0).then(|| format!("Exited with status {status}"));
                    let result = if record.task.definition.result_file.is_empty() {
                        String::new()
                    } else {
                        record.outcome.output.clone().unwrap_or_default()
                    };
                    complete(&mut record.task, reason, result);
                    info!(task_guid = %key, failed = record.task.failed, "Task completed");
                }
                TaskState::Completed
                    if record.task.definition.completion_callback_url.is_some() =>
                {
                    record.task.state = TaskState::Resolving;
                    record.task.updated_at = Utc::now();
                    callbacks.push(record.task.clone());
                }
                _ => continue,
            }

            self.events.push(Event::TaskChanged {
                before,
                after: record.task.clone(),
            });
        }
        callbacks
    }

    fn replace_missing_actuals(&mut self) {
        let desired: Vec<DesiredLrp> = self.desired.values().cloned().collect();
        for lrp in desired {
            for index in 0..lrp.instances {
                if !self.actuals.contains_key(&(lrp.process_guid.to_string(), index)) {
                    debug!(process_guid = %lrp.process_guid, index, "Replacing missing instance");
                    self.create_actual(&lrp, index);
                }
            }
        }
    }

    fn converge_actuals(&mut self, now: Instant) {
        let keys: Vec<(String, i32)> = self.actuals.keys().cloned().collect();

        for key in keys {
            let Some(state) = self.actuals.get(&key).map(|r| r.lrp.state) else {
                continue;
            };
            let placement = match state {
                ActualLrpState::Unclaimed => Some(self.next_cell()),
                _ => None,
            };
            let ports = match state {
                ActualLrpState::Claimed => self
                    .desired
                    .get(&key.0)
                    .map(|d| d.ports.clone())
                    .unwrap_or_default(),
                _ => Vec::new(),
            };
            let claimed_on = self.actuals.get(&key).and_then(|r| r.lrp.cell_id.clone());
            let net_info = match (state, claimed_on) {
                (ActualLrpState::Claimed, Some(cell)) => Some(self.net_info(&cell, &ports)),
                _ => None,
            };

            let Some(record) = self.actuals.get_mut(&key) else {
                continue;
            };
            let before = record.lrp.clone();
            let mut crashed = false;

            match state {
                ActualLrpState::Unclaimed => match placement.flatten() {
                    Some(i) => {
                        record.lrp.state = ActualLrpState::Claimed;
                        record.lrp.cell_id = Some(self.cells[i].cell_id.clone());
                        record.lrp.placement_error.clear();
                    }
                    None if record.lrp.placement_error.is_empty() => {
                        record.lrp.placement_error = INSUFFICIENT_RESOURCES.to_string();
                    }
                    None => continue,
                },
                ActualLrpState::Claimed => {
                    record.lrp.state = ActualLrpState::Running;
                    record.lrp.net_info = net_info.unwrap_or_default();
                    record.crash_at = if record.outcome.crashes() {
                        deadline(now, record.outcome.sleep)
                    } else {
                        None
                    };
                }
                ActualLrpState::Running if record.crash_at.is_some_and(|at| now >= at) => {
                    let status = record.outcome.exit_status.unwrap_or(0);
                    record.lrp.state = ActualLrpState::Crashed;
                    record.lrp.crash_count += 1;
                    record.lrp.crash_reason = format!("Exited with status {status}");
                    record.lrp.cell_id = None;
                    record.lrp.net_info = ActualLrpNetInfo::default();
                    record.crash_at = None;
                    record.restart_at = deadline(
                        now,
                        restart_delay(
                            record.lrp.crash_count,
                            self.crash_backoff,
                            self.max_crash_backoff,
                        ),
                    );
                    crashed = true;
                }
                ActualLrpState::Crashed if record.restart_at.is_some_and(|at| now >= at) => {
                    record.lrp.state = ActualLrpState::Unclaimed;
                    record.restart_at = None;
                }
                _ => continue,
            }

            record.lrp.since = Utc::now();
            record.lrp.modification_tag = record.lrp.modification_tag.incremented();
            let after = record.lrp.clone();

            if crashed {
                info!(
                    process_guid = %after.process_guid,
                    index = after.index,
                    crash_count = after.crash_count,
                    "Actual LRP crashed"
                );
                self.events.push(Event::ActualLrpCrashed {
                    actual_lrp: after.clone(),
                    crash_count: after.crash_count,
                    crash_reason: after.crash_reason.clone(),
                });
            }
            self.events.push(Event::ActualLrpChanged { before, after });
        }
    }

    /// Round-robin placement; `None` when the inventory is empty.
    fn next_cell(&mut self) -> Option<usize> {
        if self.cells.is_empty() {
            return None;
        }
        let i = self.next_cell % self.cells.len();
        self.next_cell = self.next_cell.wrapping_add(1);
        Some(i)
    }

    fn net_info(&mut self, cell: &CellId, ports: &[u32]) -> ActualLrpNetInfo {
        let address = self
            .cells
            .iter()
            .position(|c| c.cell_id == *cell)
            .map(cell_ip)
            .unwrap_or_default();
        let ports = ports
            .iter()
            .map(|container_port| {
                let host_port = self.next_host_port;
                self.next_host_port += 1;
                PortMapping {
                    container_port: *container_port,
                    host_port,
                }
            })
            .collect();
        ActualLrpNetInfo { address, ports }
    }
}

fn complete(task: &mut Task, failure: Option<String>, result: String) {
    let now = Utc::now();
    task.state = TaskState::Completed;
    task.failed = failure.is_some();
    task.failure_reason = failure.unwrap_or_default();
    task.result = result;
    task.updated_at = now;
    task.first_completed_at.get_or_insert(now);
}

/// `now + delay`, or `None` (never) when the instant would overflow.
fn deadline(now: Instant, delay: Duration) -> Option<Instant> {
    now.checked_add(delay)
}

/// The first few restarts are immediate; after that the delay doubles per
/// crash from `base`, capped at `max`.
pub fn restart_delay(crash_count: i32, base: Duration, max: Duration) -> Duration {
    if crash_count <= IMMEDIATE_RESTARTS {
        return Duration::ZERO;
    }
    let doublings = (crash_count - IMMEDIATE_RESTARTS - 1).min(16) as u32;
    base.saturating_mul(1 << doublings).min(max)
}

fn cell_ip(i: usize) -> String {
    format!("10.0.{}.{}", i / 250, i % 250 + 1)
}

fn task_not_found(guid: &TaskGuid) -> SimError {
    SimError::NotFound(format!("task {guid}"))
}

fn lrp_not_found(guid: &ProcessGuid) -> SimError {
    SimError::NotFound(format!("desired lrp {guid}"))
}

fn actual_not_found(guid: &ProcessGuid, index: i32) -> SimError {
    SimError::NotFound(format!("actual lrp {guid}[{index}]"))
}
