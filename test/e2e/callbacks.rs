//! Completion callback delivery.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p converge-e2e --test callbacks
//! ```

mod common;

use std::sync::Arc;

use anyhow::ensure;
use converge_events::{Task, TaskState};
use converge_testing::{CallbackReceiver, FnProbe, ProbeError, Satisfies};

use common::Suite;

#[tokio::test]
async fn test_callback_survives_failed_deliveries() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("callback retried after 503s", |ctx| async move {
            // the first two deliveries are answered with 503
            let receiver = Arc::new(CallbackReceiver::spawn(2).await?);

            let mut request = ctx.task_request("echo hello");
            request.definition.completion_callback_url = Some(receiver.url());
            let guid = request.task_guid.clone();
            ctx.create_task(&request).await?;

            let deliveries = {
                let receiver = Arc::clone(&receiver);
                FnProbe::new("callback deliveries", move || {
                    let receiver = Arc::clone(&receiver);
                    async move { Ok::<_, ProbeError>(receiver.deliveries()) }
                })
            };
            let delivered = ctx
                .poller()
                .eventually(
                    &deliveries,
                    &Satisfies::new("one accepted delivery", |tasks: &Vec<Task>| tasks.len() == 1),
                )
                .await?;

            ensure!(delivered[0].task_guid == guid, "delivered {}", delivered[0].task_guid);
            ensure!(!delivered[0].failed, "delivered task failed");
            ensure!(
                matches!(delivered[0].state, TaskState::Completed | TaskState::Resolving),
                "delivered in state {}",
                delivered[0].state
            );
            ensure!(receiver.attempts() >= 3, "only {} attempts", receiver.attempts());

            // a resolved task is removed without an explicit delete
            ctx.poller().eventually_absent(&ctx.task_probe(&guid)).await?;
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}
