//! The control-plane contract consumed by the harness.

use std::time::Duration;

use async_trait::async_trait;
use converge_events::{
    ActualLrp, ActualLrpFilter, CellPresence, DesiredLrp, DesiredLrpUpdate, Event, Task,
    TaskRequest,
};
use converge_id::{Domain, ProcessGuid, TaskGuid};

use crate::ClientError;

/// Operations offered by the system under test.
///
/// Implementations issue exactly one remote round-trip per call and never
/// retry.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Checks that the control plane is reachable.
    async fn ping(&self) -> Result<(), ClientError>;

    // -------------------------------------------------------------------------
    // Tasks
    // -------------------------------------------------------------------------

    async fn desire_task(&self, request: &TaskRequest) -> Result<(), ClientError>;

    async fn task_by_guid(&self, guid: &TaskGuid) -> Result<Task, ClientError>;

    async fn tasks(&self, domain: Option<&Domain>) -> Result<Vec<Task>, ClientError>;

    async fn cancel_task(&self, guid: &TaskGuid) -> Result<(), ClientError>;

    /// Deletes a completed task. Fails with `InvalidStateTransition` otherwise.
    async fn delete_task(&self, guid: &TaskGuid) -> Result<(), ClientError>;

    // -------------------------------------------------------------------------
    // Desired LRPs
    // -------------------------------------------------------------------------

    async fn desire_lrp(&self, lrp: &DesiredLrp) -> Result<(), ClientError>;

    async fn desired_lrp_by_process_guid(
        &self,
        guid: &ProcessGuid,
    ) -> Result<DesiredLrp, ClientError>;

    async fn desired_lrps(&self, domain: Option<&Domain>) -> Result<Vec<DesiredLrp>, ClientError>;

    async fn update_desired_lrp(
        &self,
        guid: &ProcessGuid,
        update: &DesiredLrpUpdate,
    ) -> Result<(), ClientError>;

    async fn remove_desired_lrp(&self, guid: &ProcessGuid) -> Result<(), ClientError>;

    // -------------------------------------------------------------------------
    // Actual LRPs
    // -------------------------------------------------------------------------

    async fn actual_lrps(&self, filter: &ActualLrpFilter) -> Result<Vec<ActualLrp>, ClientError>;

    async fn actual_lrp(&self, guid: &ProcessGuid, index: i32) -> Result<ActualLrp, ClientError>;

    /// Stops one instance; the control plane replaces it if still desired.
    async fn retire_actual_lrp(&self, guid: &ProcessGuid, index: i32) -> Result<(), ClientError>;

    // -------------------------------------------------------------------------
    // Cells and domains
    // -------------------------------------------------------------------------

    async fn cells(&self) -> Result<Vec<CellPresence>, ClientError>;

    /// Marks a domain fresh for `ttl`; a zero TTL never expires.
    async fn upsert_domain(&self, domain: &Domain, ttl: Duration) -> Result<(), ClientError>;

    async fn domains(&self) -> Result<Vec<Domain>, ClientError>;

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    async fn subscribe_to_events(&self) -> Result<Box<dyn EventSource>, ClientError>;
}

/// A cursor over the change feed.
#[async_trait]
pub trait EventSource: Send {
    /// Waits for the next event in receive order.
    ///
    /// Returns `ClientError::StreamClosed` once the peer has closed the
    /// stream or after [`EventSource::close`]; every later call returns it
    /// again.
    async fn next(&mut self) -> Result<Event, ClientError>;

    /// Closes the stream. Idempotent.
    fn close(&mut self);
}
