//! Shared values and stand-ins for unit tests.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use converge_client::{ClientError, ControlPlane, EventSource};
use converge_events::{
    ActualLrp, ActualLrpFilter, ActualLrpNetInfo, ActualLrpState, CellPresence, DesiredLrp,
    DesiredLrpUpdate, ErrorKind, Event, ModificationTag, Task, TaskRequest, TaskState,
};
use converge_id::{Domain, ProcessGuid, TaskGuid};
use tokio::sync::mpsc;

use crate::requests;

const ROOT_FS: &str = "docker:///busybox";

pub fn domain() -> Domain {
    Domain::new("converge-test")
}

pub fn task(guid: &str, state: TaskState) -> Task {
    let request = requests::task(&TaskGuid::new(guid), &domain(), ROOT_FS, "echo hello");
    Task {
        task_guid: request.task_guid,
        domain: request.domain,
        definition: request.definition,
        state,
        cell_id: None,
        failed: false,
        failure_reason: String::new(),
        result: String::new(),
        rejection_count: 0,
        created_at: Utc::now(),
        updated_at: Utc::now(),
        first_completed_at: None,
    }
}

pub fn desired_lrp(guid: &str, instances: i32) -> DesiredLrp {
    requests::desired_lrp(&ProcessGuid::new(guid), &domain(), ROOT_FS, instances, "sleep 1000")
}

pub fn actual_lrp(guid: &str, index: i32, state: ActualLrpState) -> ActualLrp {
    ActualLrp {
        process_guid: ProcessGuid::new(guid),
        index,
        domain: domain(),
        instance_guid: format!("{guid}-{index}"),
        cell_id: None,
        state,
        crash_count: 0,
        crash_reason: String::new(),
        placement_error: String::new(),
        net_info: ActualLrpNetInfo::default(),
        since: Utc::now(),
        modification_tag: ModificationTag::new("epoch"),
    }
}

/// An event source fed from a channel; dropping the sender ends the stream.
pub struct ChannelSource {
    rx: mpsc::Receiver<Result<Event, ClientError>>,
    closed: bool,
}

impl ChannelSource {
    pub fn new(rx: mpsc::Receiver<Result<Event, ClientError>>) -> Self {
        Self { rx, closed: false }
    }
}

#[async_trait]
impl EventSource for ChannelSource {
    async fn next(&mut self) -> Result<Event, ClientError> {
        if self.closed {
            return Err(ClientError::StreamClosed);
        }
        self.rx.recv().await.unwrap_or(Err(ClientError::StreamClosed))
    }

    fn close(&mut self) {
        self.closed = true;
        self.rx.close();
    }
}

/// A control plane that records calls and keeps tasks in memory.
///
/// Tasks complete as soon as they are desired; there are never any actual
/// LRPs.
#[derive(Default)]
pub struct StubControlPlane {
    calls: Mutex<Vec<String>>,
    tasks: Mutex<HashMap<String, Task>>,
    streams: Mutex<Vec<mpsc::Sender<Result<Event, ClientError>>>>,
}

impl StubControlPlane {
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn has_task(&self, guid: &TaskGuid) -> bool {
        self.tasks.lock().unwrap().contains_key(guid.as_str())
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn not_found(what: impl std::fmt::Display) -> ClientError {
        ClientError::api(404, ErrorKind::ResourceNotFound, format!("{what} not found"), None)
    }
}

#[async_trait]
impl ControlPlane for StubControlPlane {
    async fn ping(&self) -> Result<(), ClientError> {
        Ok(())
    }

    async fn desire_task(&self, request: &TaskRequest) -> Result<(), ClientError> {
        self.record(format!("desire_task {}", request.task_guid));
        if request.task_guid.validate().is_err() {
            return Err(ClientError::api(
                400,
                ErrorKind::InvalidTask,
                "invalid task guid",
                Some("task_guid".to_string()),
            ));
        }
        let mut t = task(request.task_guid.as_str(), TaskState::Completed);
        t.definition = request.definition.clone();
        self.tasks
            .lock()
            .unwrap()
            .insert(request.task_guid.to_string(), t);
        Ok(())
    }

    async fn task_by_guid(&self, guid: &TaskGuid) -> Result<Task, ClientError> {
        self.record(format!("task_by_guid {guid}"));
        self.tasks
            .lock()
            .unwrap()
            .get(guid.as_str())
            .cloned()
            .ok_or_else(|| Self::not_found(guid))
    }

    async fn tasks(&self, _domain: Option<&Domain>) -> Result<Vec<Task>, ClientError> {
        Ok(self.tasks.lock().unwrap().values().cloned().collect())
    }

    async fn cancel_task(&self, guid: &TaskGuid) -> Result<(), ClientError> {
        self.record(format!("cancel_task {guid}"));
        if self.has_task(guid) {
            Ok(())
        } else {
            Err(Self::not_found(guid))
        }
    }

    async fn delete_task(&self, guid: &TaskGuid) -> Result<(), ClientError> {
        self.record(format!("delete_task {guid}"));
        self.tasks
            .lock()
            .unwrap()
            .remove(guid.as_str())
            .map(|_| ())
            .ok_or_else(|| Self::not_found(guid))
    }

    async fn desire_lrp(&self, lrp: &DesiredLrp) -> Result<(), ClientError> {
        self.record(format!("desire_lrp {}", lrp.process_guid));
        Ok(())
    }

    async fn desired_lrp_by_process_guid(
        &self,
        guid: &ProcessGuid,
    ) -> Result<DesiredLrp, ClientError> {
        Err(Self::not_found(guid))
    }

    async fn desired_lrps(&self, _domain: Option<&Domain>) -> Result<Vec<DesiredLrp>, ClientError> {
        Ok(Vec::new())
    }

    async fn update_desired_lrp(
        &self,
        guid: &ProcessGuid,
        _update: &DesiredLrpUpdate,
    ) -> Result<(), ClientError> {
        Err(Self::not_found(guid))
    }

    async fn remove_desired_lrp(&self, guid: &ProcessGuid) -> Result<(), ClientError> {
        self.record(format!("remove_desired_lrp {guid}"));
        Ok(())
    }

    async fn actual_lrps(&self, _filter: &ActualLrpFilter) -> Result<Vec<ActualLrp>, ClientError> {
        Ok(Vec::new())
    }

    async fn actual_lrp(&self, guid: &ProcessGuid, index: i32) -> Result<ActualLrp, ClientError> {
        Err(Self::not_found(format!("{guid}[{index}]")))
    }

    async fn retire_actual_lrp(&self, guid: &ProcessGuid, index: i32) -> Result<(), ClientError> {
        Err(Self::not_found(format!("{guid}[{index}]")))
    }

    async fn cells(&self) -> Result<Vec<CellPresence>, ClientError> {
        Ok(Vec::new())
    }

    async fn upsert_domain(&self, domain: &Domain, _ttl: Duration) -> Result<(), ClientError> {
        self.record(format!("upsert_domain {domain}"));
        Ok(())
    }

    async fn domains(&self) -> Result<Vec<Domain>, ClientError> {
        Ok(Vec::new())
    }

    async fn subscribe_to_events(&self) -> Result<Box<dyn EventSource>, ClientError> {
        let (tx, rx) = mpsc::channel(16);
        self.streams.lock().unwrap().push(tx);
        Ok(Box::new(ChannelSource::new(rx)))
    }
}
