//! Cells, domains, and scenario teardown.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p converge-e2e --test inventory
//! ```

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, ensure};
use converge_events::{ActualLrpFilter, CellPresence};
use converge_id::{Domain, ProcessGuid, TaskGuid};
use converge_testing::{Satisfies, ScenarioError};

use common::Suite;

#[tokio::test]
async fn test_cells_are_registered() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("cell inventory", |ctx| async move {
            let cells = ctx
                .poller()
                .eventually(
                    &ctx.cells_probe(),
                    &Satisfies::new("at least one cell", |cells: &Vec<CellPresence>| {
                        !cells.is_empty()
                    }),
                )
                .await?;
            ensure!(
                cells.iter().all(|c| c.capacity.containers > 0),
                "cell without capacity: {cells:?}"
            );
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_domains_are_fresh_until_their_ttl() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("domain freshness", |ctx| async move {
            let probe = ctx.domains_probe();
            let mine = ctx.domain().clone();
            ctx.poller()
                .eventually(
                    &probe,
                    &Satisfies::new("contains the scenario domain", |domains: &Vec<Domain>| {
                        domains.contains(&mine)
                    }),
                )
                .await?;

            let short = Domain::generate(&ctx.config().domain_prefix)?;
            ctx.client().upsert_domain(&short, Duration::from_secs(1)).await?;
            ctx.poller()
                .eventually(
                    &probe,
                    &Satisfies::new("contains the short-lived domain", |domains: &Vec<Domain>| {
                        domains.contains(&short)
                    }),
                )
                .await?;
            ctx.poller()
                .within(Duration::from_secs(10))
                .eventually(
                    &probe,
                    &Satisfies::new("short-lived domain expired", |domains: &Vec<Domain>| {
                        !domains.contains(&short)
                    }),
                )
                .await?;
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_failed_scenario_still_cleans_up() -> anyhow::Result<()> {
    let suite = Suite::start().await?;
    let client = suite.harness.client().clone();
    let created: Arc<Mutex<Option<(ProcessGuid, TaskGuid)>>> = Arc::default();

    let slot = Arc::clone(&created);
    let outcome = suite
        .harness
        .run("fails after creating", |ctx| async move {
            let lrp = ctx.desired_lrp(2, "sleep 1000");
            ctx.create_lrp(&lrp).await?;
            let task = ctx.task_request("sleep 1000");
            ctx.create_task(&task).await?;
            *slot.lock().unwrap() = Some((lrp.process_guid, task.task_guid));
            bail!("failing on purpose")
        })
        .await;

    match &outcome {
        Err(ScenarioError::Failed {
            error,
            cleanup_failures,
            ..
        }) => {
            ensure!(error.to_string() == "failing on purpose", "body failed with {error:#}");
            ensure!(cleanup_failures.is_empty(), "cleanup failed: {cleanup_failures:?}");
        }
        other => bail!("expected the body's failure, got {other:?}"),
    }

    let Some((process_guid, task_guid)) = created.lock().unwrap().clone() else {
        bail!("scenario never created its entities");
    };

    // teardown already waited, so a single fetch is authoritative
    let actuals = client
        .actual_lrps(&ActualLrpFilter::process_guid(&process_guid))
        .await?;
    ensure!(actuals.is_empty(), "instances survived teardown: {actuals:?}");

    let desired = client.desired_lrp_by_process_guid(&process_guid).await;
    ensure!(
        desired.as_ref().is_err_and(|e| e.is_not_found()),
        "desired LRP survived teardown: {desired:?}"
    );
    let task = client.task_by_guid(&task_guid).await;
    ensure!(
        task.as_ref().is_err_and(|e| e.is_not_found()),
        "task survived teardown: {task:?}"
    );

    suite.stop().await;
    Ok(())
}
