//! Entity accessors.
//!
//! A probe performs exactly one remote fetch per call and never retries;
//! retry policy belongs to [`crate::Poller`]. Probes are cheap to build and
//! hold only a client handle plus the entity reference.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use converge_client::ControlPlane;
use converge_events::{ActualLrp, ActualLrpFilter, CellPresence, DesiredLrp, Event, Task};
use converge_id::{Domain, ProcessGuid, TaskGuid};

use crate::events::EventBuffer;
use crate::ProbeError;

/// A pollable view of one remote entity or collection.
#[async_trait]
pub trait Probe: Send + Sync {
    type Output: Send;

    /// The entity reference, used in diagnostics.
    fn describe(&self) -> String;

    /// Fetch a fresh snapshot.
    async fn fetch(&self) -> Result<Self::Output, ProbeError>;
}

/// A single task by guid.
#[derive(Clone)]
pub struct TaskProbe {
    client: Arc<dyn ControlPlane>,
    guid: TaskGuid,
}

impl TaskProbe {
    pub fn new(client: Arc<dyn ControlPlane>, guid: TaskGuid) -> Self {
        Self { client, guid }
    }
}

#[async_trait]
impl Probe for TaskProbe {
    type Output = Task;

    fn describe(&self) -> String {
        format!("task {}", self.guid)
    }

    async fn fetch(&self) -> Result<Task, ProbeError> {
        self.client
            .task_by_guid(&self.guid)
            .await
            .map_err(|e| ProbeError::from_client(&self.describe(), e))
    }
}

/// Every task in a domain.
#[derive(Clone)]
pub struct TasksInDomainProbe {
    client: Arc<dyn ControlPlane>,
    domain: Domain,
}

impl TasksInDomainProbe {
    pub fn new(client: Arc<dyn ControlPlane>, domain: Domain) -> Self {
        Self { client, domain }
    }
}

#[async_trait]
impl Probe for TasksInDomainProbe {
    type Output = Vec<Task>;

    fn describe(&self) -> String {
        format!("tasks in domain {}", self.domain)
    }

    async fn fetch(&self) -> Result<Vec<Task>, ProbeError> {
        self.client
            .tasks(Some(&self.domain))
            .await
            .map_err(|e| ProbeError::from_client(&self.describe(), e))
    }
}

/// A single desired LRP by process guid.
#[derive(Clone)]
pub struct DesiredLrpProbe {
    client: Arc<dyn ControlPlane>,
    guid: ProcessGuid,
}

impl DesiredLrpProbe {
    pub fn new(client: Arc<dyn ControlPlane>, guid: ProcessGuid) -> Self {
        Self { client, guid }
    }
}

#[async_trait]
impl Probe for DesiredLrpProbe {
    type Output = DesiredLrp;

    fn describe(&self) -> String {
        format!("desired LRP {}", self.guid)
    }

    async fn fetch(&self) -> Result<DesiredLrp, ProbeError> {
        self.client
            .desired_lrp_by_process_guid(&self.guid)
            .await
            .map_err(|e| ProbeError::from_client(&self.describe(), e))
    }
}

/// One actual LRP instance by process guid and index.
#[derive(Clone)]
pub struct ActualLrpProbe {
    client: Arc<dyn ControlPlane>,
    guid: ProcessGuid,
    index: i32,
}

impl ActualLrpProbe {
    pub fn new(client: Arc<dyn ControlPlane>, guid: ProcessGuid, index: i32) -> Self {
        Self {
            client,
            guid,
            index,
        }
    }
}

#[async_trait]
impl Probe for ActualLrpProbe {
    type Output = ActualLrp;

    fn describe(&self) -> String {
        format!("actual LRP {}[{}]", self.guid, self.index)
    }

    async fn fetch(&self) -> Result<ActualLrp, ProbeError> {
        self.client
            .actual_lrp(&self.guid, self.index)
            .await
            .map_err(|e| ProbeError::from_client(&self.describe(), e))
    }
}

/// Every actual LRP of one process guid.
#[derive(Clone)]
pub struct ActualLrpsProbe {
    client: Arc<dyn ControlPlane>,
    guid: ProcessGuid,
}

impl ActualLrpsProbe {
    pub fn new(client: Arc<dyn ControlPlane>, guid: ProcessGuid) -> Self {
        Self { client, guid }
    }
}

#[async_trait]
impl Probe for ActualLrpsProbe {
    type Output = Vec<ActualLrp>;

    fn describe(&self) -> String {
        format!("actual LRPs of {}", self.guid)
    }

    async fn fetch(&self) -> Result<Vec<ActualLrp>, ProbeError> {
        self.client
            .actual_lrps(&ActualLrpFilter::process_guid(&self.guid))
            .await
            .map_err(|e| ProbeError::from_client(&self.describe(), e))
    }
}

/// Every actual LRP in a domain.
#[derive(Clone)]
pub struct ActualLrpsInDomainProbe {
    client: Arc<dyn ControlPlane>,
    domain: Domain,
}

impl ActualLrpsInDomainProbe {
    pub fn new(client: Arc<dyn ControlPlane>, domain: Domain) -> Self {
        Self { client, domain }
    }
}

#[async_trait]
impl Probe for ActualLrpsInDomainProbe {
    type Output = Vec<ActualLrp>;

    fn describe(&self) -> String {
        format!("actual LRPs in domain {}", self.domain)
    }

    async fn fetch(&self) -> Result<Vec<ActualLrp>, ProbeError> {
        self.client
            .actual_lrps(&ActualLrpFilter::domain(&self.domain))
            .await
            .map_err(|e| ProbeError::from_client(&self.describe(), e))
    }
}

/// The cell inventory.
#[derive(Clone)]
pub struct CellsProbe {
    client: Arc<dyn ControlPlane>,
}

impl CellsProbe {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Probe for CellsProbe {
    type Output = Vec<CellPresence>;

    fn describe(&self) -> String {
        "cells".to_string()
    }

    async fn fetch(&self) -> Result<Vec<CellPresence>, ProbeError> {
        self.client
            .cells()
            .await
            .map_err(|e| ProbeError::from_client("cells", e))
    }
}

/// The set of fresh domains.
#[derive(Clone)]
pub struct DomainsProbe {
    client: Arc<dyn ControlPlane>,
}

impl DomainsProbe {
    pub fn new(client: Arc<dyn ControlPlane>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Probe for DomainsProbe {
    type Output = Vec<Domain>;

    fn describe(&self) -> String {
        "domains".to_string()
    }

    async fn fetch(&self) -> Result<Vec<Domain>, ProbeError> {
        self.client
            .domains()
            .await
            .map_err(|e| ProbeError::from_client("domains", e))
    }
}

/// A copy of an event buffer's current contents. Never fails.
#[derive(Debug, Clone)]
pub struct EventBufferProbe {
    buffer: EventBuffer,
}

impl EventBufferProbe {
    pub fn new(buffer: EventBuffer) -> Self {
        Self { buffer }
    }
}

#[async_trait]
impl Probe for EventBufferProbe {
    type Output = Vec<Event>;

    fn describe(&self) -> String {
        "event buffer".to_string()
    }

    async fn fetch(&self) -> Result<Vec<Event>, ProbeError> {
        Ok(self.buffer.snapshot())
    }
}

/// Wraps an async closure as a probe.
pub struct FnProbe<F> {
    name: String,
    fetch: F,
}

impl<F> FnProbe<F> {
    pub fn new(name: impl Into<String>, fetch: F) -> Self {
        Self {
            name: name.into(),
            fetch,
        }
    }
}

#[async_trait]
impl<F, Fut, T> Probe for FnProbe<F>
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = Result<T, ProbeError>> + Send + 'static,
    T: Send + 'static,
{
    type Output = T;

    fn describe(&self) -> String {
        self.name.clone()
    }

    async fn fetch(&self) -> Result<T, ProbeError> {
        (self.fetch)().await
    }
}
