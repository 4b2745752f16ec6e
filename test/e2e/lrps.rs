//! Long-running process scenarios: scaling, updates, crashes, retirement.
//!
//! ## Running
//!
//! ```bash
//! cargo test -p converge-e2e --test lrps
//! ```

mod common;

use anyhow::{bail, ensure};
use converge_events::{ActualLrp, ActualLrpState, DesiredLrp, DesiredLrpUpdate, ErrorKind};
use converge_testing::{
    CrashCountMatch, IdentityMatch, InstancesMatch, MatcherExt, Probe, Satisfies, StateMatch,
};

use common::Suite;

#[tokio::test]
async fn test_lrp_scales_up_and_is_removed() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("scale 1 to 2 then delete", |ctx| async move {
            let lrp = ctx.desired_lrp(1, "sleep 1000");
            let guid = lrp.process_guid.clone();
            ctx.create_lrp(&lrp).await?;

            let poller = ctx.poller();
            poller
                .eventually(&ctx.actual_lrps_probe(&guid), &InstancesMatch::running(1))
                .await?;
            poller
                .eventually(
                    &ctx.actual_lrp_probe(&guid, 0),
                    &IdentityMatch::actual_lrp(&guid, 0).and(StateMatch::is(ActualLrpState::Running)),
                )
                .await?;

            ctx.client()
                .update_desired_lrp(&guid, &DesiredLrpUpdate::instances(2))
                .await?;
            let running = poller
                .eventually(&ctx.actual_lrps_probe(&guid), &InstancesMatch::running(2))
                .await?;
            ensure!(
                running.iter().all(|a| !a.net_info.address.is_empty()),
                "running instances without an address: {running:?}"
            );

            ctx.client().remove_desired_lrp(&guid).await?;
            poller
                .eventually(&ctx.actual_lrps_probe(&guid), &InstancesMatch::none())
                .await?;
            poller.eventually_absent(&ctx.desired_lrp_probe(&guid)).await?;
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_only_real_updates_advance_modification_tag() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("modification tag", |ctx| async move {
            let lrp = ctx.desired_lrp(1, "sleep 1000");
            let guid = lrp.process_guid.clone();
            ctx.create_lrp(&lrp).await?;

            let probe = ctx.desired_lrp_probe(&guid);
            let original = probe.fetch().await?.modification_tag;

            // same instance count: nothing changes server side
            ctx.client()
                .update_desired_lrp(&guid, &DesiredLrpUpdate::instances(1))
                .await?;
            let after_noop = probe.fetch().await?.modification_tag;
            ensure!(
                after_noop == original,
                "no-op update moved the tag from {original:?} to {after_noop:?}"
            );

            ctx.client()
                .update_desired_lrp(&guid, &DesiredLrpUpdate::annotation("second revision"))
                .await?;
            let updated = ctx
                .poller()
                .eventually(
                    &probe,
                    &Satisfies::new("a later modification tag", |lrp: &DesiredLrp| {
                        original.succeeded_by(&lrp.modification_tag)
                            && lrp.modification_tag != original
                    }),
                )
                .await?;
            ensure!(updated.annotation == "second revision", "annotation {:?}", updated.annotation);
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_crashing_instance_accumulates_crashes() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("crash count grows", |ctx| async move {
            let lrp = ctx.desired_lrp(1, "exit 1");
            let guid = lrp.process_guid.clone();
            ctx.create_lrp(&lrp).await?;

            let crashed = ctx
                .poller()
                .eventually(&ctx.actual_lrp_probe(&guid, 0), &CrashCountMatch::AtLeast(2))
                .await?;
            ensure!(!crashed.crash_reason.is_empty(), "crash without a reason");
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_retired_instance_is_replaced() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("retire and replace", |ctx| async move {
            let lrp = ctx.desired_lrp(1, "sleep 1000");
            let guid = lrp.process_guid.clone();
            ctx.create_lrp(&lrp).await?;

            let probe = ctx.actual_lrp_probe(&guid, 0);
            let first = ctx
                .poller()
                .eventually(&probe, &StateMatch::is(ActualLrpState::Running))
                .await?;

            ctx.client().retire_actual_lrp(&guid, 0).await?;
            let replacement = ctx
                .poller()
                .eventually(
                    &probe,
                    &Satisfies::new("a new running instance", |actual: &ActualLrp| {
                        actual.instance_guid != first.instance_guid
                            && actual.state == ActualLrpState::Running
                    }),
                )
                .await?;
            ensure!(replacement.crash_count == 0, "replacement inherited crashes");
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_invalid_desired_lrps_are_rejected() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("invalid desired LRPs", |ctx| async move {
            let mut negative = ctx.desired_lrp(1, "sleep 1000");
            negative.instances = -1;
            let mut heavy = ctx.desired_lrp(1, "sleep 1000");
            heavy.cpu_weight = 101;
            let mut spaced = ctx.desired_lrp(1, "sleep 1000");
            spaced.process_guid = format!("{} x", spaced.process_guid).into();

            for (name, lrp) in [
                ("negative instances", negative),
                ("cpu weight over 100", heavy),
                ("guid with a space", spaced),
            ] {
                match ctx.create_lrp(&lrp).await {
                    Ok(()) => bail!("{name}: accepted"),
                    Err(e) => ensure!(
                        e.kind() == Some(&ErrorKind::InvalidDesiredLrp),
                        "{name}: got {e}"
                    ),
                }
            }

            let lrps = ctx.client().desired_lrps(Some(ctx.domain())).await?;
            ensure!(lrps.is_empty(), "unexpected desired LRPs: {lrps:?}");
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}

#[tokio::test]
async fn test_domain_listing_spans_lrps() -> anyhow::Result<()> {
    let suite = Suite::start().await?;

    suite
        .harness
        .run("actual LRPs by domain", |ctx| async move {
            let a = ctx.desired_lrp(1, "sleep 1000");
            let b = ctx.desired_lrp(2, "sleep 1000");
            ctx.create_lrp(&a).await?;
            ctx.create_lrp(&b).await?;

            ctx.poller()
                .eventually(
                    &ctx.domain_actual_lrps_probe(),
                    &Satisfies::new("3 running instances", |all: &Vec<ActualLrp>| {
                        all.len() == 3 && all.iter().all(|x| x.state == ActualLrpState::Running)
                    }),
                )
                .await?;

            let only_b = ctx.actual_lrps_probe(&b.process_guid).fetch().await?;
            ensure!(only_b.len() == 2, "expected 2 instances of b, got {}", only_b.len());
            Ok(())
        })
        .await?;

    suite.stop().await;
    Ok(())
}
