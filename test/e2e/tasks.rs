//! Task lifecycle scenarios.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p converge-e2e --test tasks
//! ```

mod common;

use std::time::Duration;

use anyhow::{bail, ensure, Context};
use converge_events::{ErrorKind, Task, TaskState};
use converge_testing::{
    IdentityMatch, MatcherExt, Probe, Satisfies, StateMatch, TaskResultMatch,
};
use tracing::info;

use common::Suite;

/// Returns the error kind of a rejected create, failing if it was accepted.
fn rejection_kind(result: Result<(), converge_client::ClientError>) -> anyhow::Result<ErrorKind> {
    match result {
        Ok(()) => bail!("request was accepted"),
        Err(e) => e
            .kind()
            .cloned()
            .with_context(|| format!("expected a typed API error, got {e}")),
    }
}

#[tokio::test]
async fn test_echo_task_completes_successfully() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("echo task completes", |ctx| async move {
            let request = ctx.task_request("echo hello");
            let guid = request.task_guid.clone();
            ctx.create_task(&request).await?;

            // an immediate fetch already reports the requested identity
            let fetched = ctx.task_probe(&guid).fetch().await?;
            ensure!(fetched.task_guid == guid, "fetched {}", fetched.task_guid);
            ensure!(fetched.domain == *ctx.domain(), "fetched domain {}", fetched.domain);

            let task = ctx
                .poller()
                .eventually(
                    &ctx.task_probe(&guid),
                    &IdentityMatch::task(&guid).and(TaskResultMatch::succeeded()),
                )
                .await?;
            info!(task_guid = %task.task_guid, "task completed");
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_exiting_task_reports_failure() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("exit 1 fails the task", |ctx| async move {
            let request = ctx.task_request("echo starting; exit 1");
            ctx.create_task(&request).await?;

            ctx.poller()
                .eventually(&ctx.task_probe(&request.task_guid), &TaskResultMatch::failed())
                .await?;
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_task_requests_fail_synchronously() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("invalid task requests", |ctx| async move {
            let mut spaced = ctx.task_request("echo hello");
            spaced.task_guid = format!("{} with space", spaced.task_guid).into();

            let mut heavy = ctx.task_request("echo hello");
            heavy.definition.cpu_weight = 101;

            let mut verbose = ctx.task_request("echo hello");
            verbose.definition.annotation = "a".repeat(10 * 1024 + 1);

            for (name, request) in [
                ("guid with a space", spaced),
                ("cpu weight over 100", heavy),
                ("oversized annotation", verbose),
            ] {
                let kind = rejection_kind(ctx.create_task(&request).await)?;
                ensure!(kind == ErrorKind::InvalidTask, "{name}: got {kind}");
            }

            // nothing was created, so nothing shows up in the domain
            let tasks = ctx.tasks_probe().fetch().await?;
            ensure!(tasks.is_empty(), "unexpected tasks: {tasks:?}");
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_duplicate_task_guid_is_rejected() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("duplicate task guid", |ctx| async move {
            let request = ctx.task_request("sleep 1");
            ctx.create_task(&request).await?;

            let kind = rejection_kind(ctx.client().desire_task(&request).await)?;
            ensure!(kind == ErrorKind::ResourceExists, "got {kind}");
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_cancel_running_task_then_delete() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("cancel and delete", |ctx| async move {
            let request = ctx.task_request("sleep 1000");
            let guid = request.task_guid.clone();
            ctx.create_task(&request).await?;

            ctx.poller()
                .eventually(&ctx.task_probe(&guid), &StateMatch::is(TaskState::Running))
                .await?;

            let kind = rejection_kind(ctx.client().delete_task(&guid).await)?;
            ensure!(kind == ErrorKind::InvalidStateTransition, "got {kind}");

            ctx.client().cancel_task(&guid).await?;
            ctx.poller()
                .eventually(
                    &ctx.task_probe(&guid),
                    &TaskResultMatch::failed_with("task was cancelled"),
                )
                .await?;

            ctx.client().delete_task(&guid).await?;
            ctx.poller().eventually_absent(&ctx.task_probe(&guid)).await?;
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_sleeping_task_stays_running() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("sleeping task does not complete early", |ctx| async move {
            let request = ctx.task_request("sleep 30");
            let guid = request.task_guid.clone();
            ctx.create_task(&request).await?;

            let probe = ctx.task_probe(&guid);
            let poller = ctx.poller().every(Duration::from_millis(100));
            poller.eventually(&probe, &StateMatch::is(TaskState::Running)).await?;
            poller
                .consistently(&probe, &StateMatch::is(TaskState::Running), Duration::from_secs(1))
                .await?;

            let listed = ctx
                .poller()
                .eventually(
                    &ctx.tasks_probe(),
                    &Satisfies::new("contains the task", |tasks: &Vec<Task>| {
                        tasks.iter().any(|t| t.task_guid == guid)
                    }),
                )
                .await?;
            ensure!(listed.len() == 1, "listed {} tasks", listed.len());
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}
