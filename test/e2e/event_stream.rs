//! Change feed scenarios: lifecycle ordering per entity.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p converge-e2e --test event_stream
//! ```

mod common;

use converge_events::{ActualLrpState, EntityKey, EventKind, TaskState};
use converge_testing::{
    ContainsEvent, EventBufferProbe, EventMatch, InstancesMatch, LifecycleOrder, MatcherExt,
    StateMatch,
};

use common::Suite;

#[tokio::test]
async fn test_lrp_events_arrive_in_lifecycle_order() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("LRP lifecycle events", |ctx| async move {
            let events = EventBufferProbe::new(ctx.listen().await?);

            let lrp = ctx.desired_lrp(1, "sleep 1000");
            let guid = lrp.process_guid.clone();
            ctx.create_lrp(&lrp).await?;
            ctx.poller()
                .eventually(&ctx.actual_lrps_probe(&guid), &InstancesMatch::running(1))
                .await?;

            ctx.client().remove_desired_lrp(&guid).await?;
            ctx.poller()
                .eventually(&ctx.actual_lrps_probe(&guid), &InstancesMatch::none())
                .await?;

            let instance = EntityKey::actual_lrp(&guid, 0);
            ctx.poller()
                .eventually(
                    &events,
                    &LifecycleOrder::complete(EntityKey::desired_lrp(&guid))
                        .and(LifecycleOrder::complete(instance.clone()))
                        .and(ContainsEvent(
                            EventMatch::kind(EventKind::ActualLrpChanged)
                                .for_key(instance)
                                .with_state(ActualLrpState::Running),
                        )),
                )
                .await?;
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_task_events_arrive_in_lifecycle_order() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("task lifecycle events", |ctx| async move {
            let events = EventBufferProbe::new(ctx.listen().await?);

            let request = ctx.task_request("echo hello");
            let guid = request.task_guid.clone();
            ctx.create_task(&request).await?;
            ctx.poller()
                .eventually(&ctx.task_probe(&guid), &StateMatch::is(TaskState::Completed))
                .await?;
            ctx.client().delete_task(&guid).await?;

            ctx.poller()
                .eventually(&events, &LifecycleOrder::complete(EntityKey::task(&guid)))
                .await?;
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_crash_is_announced_on_the_feed() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("crash events", |ctx| async move {
            let events = EventBufferProbe::new(ctx.listen().await?);

            let lrp = ctx.desired_lrp(1, "exit 2");
            let guid = lrp.process_guid.clone();
            ctx.create_lrp(&lrp).await?;

            ctx.poller()
                .eventually(
                    &events,
                    &ContainsEvent(
                        EventMatch::kind(EventKind::ActualLrpCrashed)
                            .for_key(EntityKey::actual_lrp(&guid, 0)),
                    )
                    .and(LifecycleOrder::ordered(EntityKey::actual_lrp(&guid, 0))),
                )
                .await?;
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}
