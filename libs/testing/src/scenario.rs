//! Scenario orchestration.
//!
//! A [`ScenarioContext`] is passed explicitly into every helper. It owns the
//! scenario's domain token, its poller and shutdown signal, and a LIFO stack
//! of cleanup steps that [`Harness::run`] executes on every exit path.

use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context as _;
use async_trait::async_trait;
use converge_client::{ClientError, ControlPlane, HttpControlPlane};
use converge_events::{DesiredLrp, ErrorKind, TaskRequest, TaskState};
use converge_id::{Domain, IdError, ProcessGuid, TaskGuid};
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use tokio::sync::watch;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::events::{EventBuffer, EventListener};
use crate::matchers::{InstancesMatch, Satisfies};
use crate::probe::{
    ActualLrpProbe, ActualLrpsInDomainProbe, ActualLrpsProbe, CellsProbe, DesiredLrpProbe,
    DomainsProbe, Probe, TaskProbe, TasksInDomainProbe,
};
use crate::{requests, HarnessConfig, HarnessError, Poller, ProbeError, ScenarioError};

/// Entry point shared by every scenario in a test binary.
#[derive(Clone)]
pub struct Harness {
    config: HarnessConfig,
    client: Arc<dyn ControlPlane>,
}

impl Harness {
    pub fn new(config: HarnessConfig, client: Arc<dyn ControlPlane>) -> Self {
        Self { config, client }
    }

    /// Build an HTTP client for `base_url` from `config`.
    pub fn connect(config: HarnessConfig, base_url: &str) -> anyhow::Result<Self> {
        let client = HttpControlPlane::new(&config.client_config(base_url))
            .with_context(|| format!("failed to build client for {base_url}"))?;
        Ok(Self::new(config, Arc::new(client)))
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn ControlPlane> {
        &self.client
    }

    /// A fresh context with its own domain token.
    pub fn scenario(&self, name: &str) -> Result<ScenarioContext, IdError> {
        let domain = Domain::generate(&self.config.domain_prefix)?;
        let (shutdown, _) = watch::channel(false);
        let poller = Poller::new(self.config.poll, shutdown.subscribe());

        Ok(ScenarioContext {
            inner: Arc::new(ScenarioInner {
                name: name.to_string(),
                domain,
                client: Arc::clone(&self.client),
                config: self.config.clone(),
                poller,
                shutdown,
                cleanups: Mutex::new(Vec::new()),
            }),
        })
    }

    /// Run `body` in a fresh scenario and tear it down afterwards.
    ///
    /// The domain is freshened before `body` runs. Registered cleanups run
    /// in reverse order whether `body` returns, fails or panics. Cleanup
    /// failures are logged and never replace the body's own failure.
    pub async fn run<F, Fut>(&self, name: &str, body: F) -> Result<(), ScenarioError>
    where
        F: FnOnce(ScenarioContext) -> Fut,
        Fut: Future<Output = anyhow::Result<()>>,
    {
        let ctx = self.scenario(name).map_err(|e| ScenarioError::Failed {
            scenario: name.to_string(),
            error: anyhow::Error::new(e).context("invalid domain prefix"),
            cleanup_failures: Vec::new(),
        })?;
        let span = info_span!("scenario", scenario = %name, domain = %ctx.domain());

        async move {
            info!("scenario started");
            let outcome = AssertUnwindSafe(async {
                ctx.freshen_domain()
                    .await
                    .with_context(|| format!("failed to freshen domain {}", ctx.domain()))?;
                body(ctx.clone()).await
            })
            .catch_unwind()
            .await;

            let cleanup_failures = ctx.teardown().await;
            let scenario = name.to_string();

            match outcome {
                Ok(Ok(())) if cleanup_failures.is_empty() => {
                    info!("scenario passed");
                    Ok(())
                }
                Ok(Ok(())) => Err(ScenarioError::Cleanup {
                    scenario,
                    failures: cleanup_failures,
                }),
                Ok(Err(error)) => {
                    warn!(error = %format!("{error:#}"), "scenario failed");
                    Err(ScenarioError::Failed {
                        scenario,
                        error,
                        cleanup_failures,
                    })
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(%message, "scenario panicked");
                    Err(ScenarioError::Panicked {
                        scenario,
                        message,
                        cleanup_failures,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }
}

type CleanupFn = Box<dyn FnOnce() -> BoxFuture<'static, anyhow::Result<()>> + Send>;

struct Cleanup {
    label: String,
    run: CleanupFn,
}

struct ScenarioInner {
    name: String,
    domain: Domain,
    client: Arc<dyn ControlPlane>,
    config: HarnessConfig,
    poller: Poller,
    shutdown: watch::Sender<bool>,
    cleanups: Mutex<Vec<Cleanup>>,
}

/// Per-scenario state. Cheap to clone; clones share the cleanup stack.
#[derive(Clone)]
pub struct ScenarioContext {
    inner: Arc<ScenarioInner>,
}

impl ScenarioContext {
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// The scenario's domain token; every generated guid carries it.
    pub fn domain(&self) -> &Domain {
        &self.inner.domain
    }

    pub fn client(&self) -> &Arc<dyn ControlPlane> {
        &self.inner.client
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.inner.config
    }

    /// Poller bound to this scenario's shutdown signal.
    pub fn poller(&self) -> &Poller {
        &self.inner.poller
    }

    /// Becomes `true` when the scenario is torn down.
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.inner.shutdown.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        *self.inner.shutdown.borrow()
    }

    pub fn task_guid(&self) -> TaskGuid {
        TaskGuid::generate(self.domain())
    }

    pub fn process_guid(&self) -> ProcessGuid {
        ProcessGuid::generate(self.domain())
    }

    /// A valid task request with a fresh guid.
    pub fn task_request(&self, script: &str) -> TaskRequest {
        requests::task(
            &self.task_guid(),
            self.domain(),
            &self.inner.config.root_fs,
            script,
        )
    }

    /// A valid desired LRP with a fresh process guid.
    pub fn desired_lrp(&self, instances: i32, script: &str) -> DesiredLrp {
        requests::desired_lrp(
            &self.process_guid(),
            self.domain(),
            &self.inner.config.root_fs,
            instances,
            script,
        )
    }

    pub fn task_probe(&self, guid: &TaskGuid) -> TaskProbe {
        TaskProbe::new(self.client().clone(), guid.clone())
    }

    pub fn tasks_probe(&self) -> TasksInDomainProbe {
        TasksInDomainProbe::new(self.client().clone(), self.domain().clone())
    }

    pub fn desired_lrp_probe(&self, guid: &ProcessGuid) -> DesiredLrpProbe {
        DesiredLrpProbe::new(self.client().clone(), guid.clone())
    }

    pub fn actual_lrp_probe(&self, guid: &ProcessGuid, index: i32) -> ActualLrpProbe {
        ActualLrpProbe::new(self.client().clone(), guid.clone(), index)
    }

    pub fn actual_lrps_probe(&self, guid: &ProcessGuid) -> ActualLrpsProbe {
        ActualLrpsProbe::new(self.client().clone(), guid.clone())
    }

    pub fn domain_actual_lrps_probe(&self) -> ActualLrpsInDomainProbe {
        ActualLrpsInDomainProbe::new(self.client().clone(), self.domain().clone())
    }

    pub fn cells_probe(&self) -> CellsProbe {
        CellsProbe::new(self.client().clone())
    }

    pub fn domains_probe(&self) -> DomainsProbe {
        DomainsProbe::new(self.client().clone())
    }

    /// Register the domain with the configured TTL.
    pub async fn freshen_domain(&self) -> Result<(), ClientError> {
        self.client()
            .upsert_domain(self.domain(), self.inner.config.domain_ttl)
            .await
    }

    /// Push a cleanup step; steps run last-registered first.
    pub fn defer<F, Fut>(&self, label: impl Into<String>, cleanup: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let label = label.into();
        if self.is_shut_down() {
            warn!(cleanup = %label, "cleanup registered after teardown; ignored");
            return;
        }
        self.lock_cleanups().push(Cleanup {
            label,
            run: Box::new(move || cleanup().boxed()),
        });
    }

    /// Desire a task and register its removal.
    pub async fn create_task(&self, request: &TaskRequest) -> Result<(), ClientError> {
        self.client().desire_task(request).await?;
        debug!(task_guid = %request.task_guid, "task desired");

        let client = self.client().clone();
        let poller = self.teardown_poller();
        let guid = request.task_guid.clone();
        self.defer(format!("remove task {guid}"), move || {
            retire_task(client, poller, guid)
        });
        Ok(())
    }

    /// Desire an LRP and register its removal.
    pub async fn create_lrp(&self, lrp: &DesiredLrp) -> Result<(), ClientError> {
        self.client().desire_lrp(lrp).await?;
        debug!(process_guid = %lrp.process_guid, instances = lrp.instances, "LRP desired");

        let client = self.client().clone();
        let poller = self.teardown_poller();
        let guid = lrp.process_guid.clone();
        self.defer(format!("remove desired LRP {guid}"), move || {
            retire_lrp(client, poller, guid)
        });
        Ok(())
    }

    /// Start a background event listener closed at teardown.
    pub async fn listen(&self) -> Result<EventBuffer, HarnessError> {
        let listener = EventListener::start(self.client().as_ref(), self.shutdown_signal()).await?;
        let buffer = listener.buffer();
        self.defer("close event listener", move || async move {
            listener.close().await.map_err(anyhow::Error::from)
        });
        Ok(buffer)
    }

    /// Cleanup steps poll after the shutdown signal fired, so they get a
    /// poller of their own.
    fn teardown_poller(&self) -> Poller {
        Poller::detached(self.inner.config.poll)
    }

    fn lock_cleanups(&self) -> MutexGuard<'_, Vec<Cleanup>> {
        self.inner
            .cleanups
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Fire the shutdown signal, then run every cleanup step.
    async fn teardown(&self) -> Vec<String> {
        self.inner.shutdown.send_replace(true);
        let cleanups = std::mem::take(&mut *self.lock_cleanups());

        let mut failures = Vec::new();
        for Cleanup { label, run } in cleanups.into_iter().rev() {
            match AssertUnwindSafe(run()).catch_unwind().await {
                Ok(Ok(())) => debug!(cleanup = %label, "cleanup finished"),
                Ok(Err(error)) => {
                    warn!(cleanup = %label, error = %format!("{error:#}"), "cleanup failed");
                    failures.push(format!("{label}: {error:#}"));
                }
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    warn!(cleanup = %label, %message, "cleanup panicked");
                    failures.push(format!("{label}: panicked: {message}"));
                }
            }
        }
        failures
    }
}

/// Cancel, wait for completion, delete, wait for disappearance.
async fn retire_task(
    client: Arc<dyn ControlPlane>,
    poller: Poller,
    guid: TaskGuid,
) -> anyhow::Result<()> {
    match client.cancel_task(&guid).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) if e.kind() == Some(&ErrorKind::InvalidStateTransition) => {}
        Err(e) => return Err(anyhow::Error::new(e).context(format!("cancel task {guid}"))),
    }

    let entity = format!("task {guid}");
    let settle = SettledTaskProbe {
        client: Arc::clone(&client),
        guid: guid.clone(),
    };
    let state = poller
        .eventually(&settle, &Satisfies::new("completed or gone", completed_or_gone))
        .await?;
    if state.is_none() {
        return Ok(());
    }

    match client.delete_task(&guid).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => return Ok(()),
        Err(e) => return Err(anyhow::Error::new(e).context(format!("delete {entity}"))),
    }
    poller
        .eventually_absent(&TaskProbe::new(client, guid))
        .await?;
    Ok(())
}

/// A task's state, `None` once it is gone.
struct SettledTaskProbe {
    client: Arc<dyn ControlPlane>,
    guid: TaskGuid,
}

#[async_trait]
impl Probe for SettledTaskProbe {
    type Output = Option<TaskState>;

    fn describe(&self) -> String {
        format!("task {}", self.guid)
    }

    async fn fetch(&self) -> Result<Option<TaskState>, ProbeError> {
        match self.client.task_by_guid(&self.guid).await {
            Ok(task) => Ok(Some(task.state)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(ProbeError::from_client(&self.describe(), e)),
        }
    }
}

fn completed_or_gone(state: &Option<TaskState>) -> bool {
    state.is_none_or(|s| s == TaskState::Completed)
}

/// Remove the desired LRP and wait until no instance remains.
async fn retire_lrp(
    client: Arc<dyn ControlPlane>,
    poller: Poller,
    guid: ProcessGuid,
) -> anyhow::Result<()> {
    match client.remove_desired_lrp(&guid).await {
        Ok(()) => {}
        Err(e) if e.is_not_found() => {}
        Err(e) => return Err(anyhow::Error::new(e).context(format!("remove desired LRP {guid}"))),
    }
    poller
        .eventually(&ActualLrpsProbe::new(client, guid), &InstancesMatch::none())
        .await?;
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
