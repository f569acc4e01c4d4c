//! End-to-end controller tests.
//!
//! Each test assembles a controller through [`ControllerBuilder`] with a
//! scripted runner and runs it on paused time until it stops by itself.

use rscheduler::testing::{Reply, ScriptedRunner};
use rscheduler::{
    ControlError, ControllerBuilder, ControllerConfig, Event, JobId, MonitorError, ShutdownReason,
};
use std::sync::Arc;

use crate::common::{
    ANALYZE, POOL, QSTAT, cluster, count_events, healthy_runner, recorded_bus, workers,
};

fn fast_config() -> ControllerConfig {
    ControllerConfig {
        burst_interval_minutes: 1,
        liveness_interval_secs: 1,
        minimum_workers: 60,
        free_fraction: 0.1,
        ..ControllerConfig::default()
    }
}

#[tokio::test(start_paused = true)]
async fn test_controller_runs_until_job_is_gone() {
    let runner = healthy_runner(320, 40, 100);
    // Alive on the first lookup, gone on the second.
    runner.push_for(QSTAT, Reply::stdout("42.balza  run-parallel  R\n"));
    runner.always(QSTAT, Reply::failure(153, "qstat: Unknown Job Id 42.balza"));
    let (events, recorder) = recorded_bus().await;

    let controller = ControllerBuilder::new(fast_config())
        .with_runner(runner.clone())
        .with_event_bus(events)
        .build(JobId::new("42"))
        .unwrap();
    let state = controller.state().clone();

    let reason = controller.run().await.unwrap();
    assert_eq!(reason, ShutdownReason::JobGone);
    assert!(!state.is_running().await);

    // One cycle ran before the job disappeared two seconds in.
    let pool_calls = runner.invocations_of(POOL);
    assert_eq!(
        pool_calls,
        vec!["run-parallel.sh num_worker 42", "run-parallel.sh add 2 42"]
    );
    assert_eq!(runner.invocations_of(QSTAT).len(), 2);

    assert_eq!(
        count_events(&recorder, |e| matches!(e, Event::JobGone { .. })).await,
        1
    );
    assert_eq!(
        count_events(&recorder, |e| matches!(
            e,
            Event::ShutdownRequested {
                reason: ShutdownReason::JobGone,
                ..
            }
        ))
        .await,
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_dry_run_never_adjusts_the_pool() {
    let runner = healthy_runner(320, 40, 100);
    runner.push_for(QSTAT, Reply::stdout("42.balza  run-parallel  R\n"));
    runner.always(QSTAT, Reply::failure(1, ""));
    let (events, recorder) = recorded_bus().await;

    let config = ControllerConfig {
        dry_run: true,
        liveness_interval_secs: 50,
        ..fast_config()
    };
    let controller = ControllerBuilder::new(config)
        .with_runner(runner.clone())
        .with_event_bus(events)
        .build(JobId::new("42"))
        .unwrap();

    assert_eq!(controller.run().await.unwrap(), ShutdownReason::JobGone);

    // The job is gone at 100s: cycles at 0s and 60s decide to add, none executes.
    let pool_calls = runner.invocations_of(POOL);
    assert!(pool_calls.iter().all(|c| c.contains("num_worker")));
    assert_eq!(pool_calls.len(), 2);
    assert_eq!(
        count_events(&recorder, |e| matches!(
            e,
            Event::WorkersAdded {
                count: 2,
                dry_run: true,
                ..
            }
        ))
        .await,
        2
    );
}

#[tokio::test(start_paused = true)]
async fn test_missing_control_command_is_fatal() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.always(ANALYZE, cluster(320, 40));
    runner.always(QSTAT, Reply::stdout(""));
    // The count query answers, the add command cannot be started.
    runner.push_for(POOL, workers(100, 0, 0));
    runner.always(POOL, Reply::Unavailable);

    let controller = ControllerBuilder::new(fast_config())
        .with_runner(runner.clone())
        .build(JobId::new("42"))
        .unwrap();
    let state = controller.state().clone();

    let err = controller.run().await.unwrap_err();
    assert!(matches!(
        err,
        MonitorError::Control(ControlError::Unavailable(_))
    ));
    assert_eq!(err.shutdown_reason(), ShutdownReason::ControlUnavailable);
    assert_eq!(
        state.shutdown_reason().await,
        Some(ShutdownReason::ControlUnavailable)
    );
}

#[tokio::test(start_paused = true)]
async fn test_probe_failure_limit_ends_the_run() {
    let runner = healthy_runner(320, 40, 100);
    runner.always(ANALYZE, Reply::failure(2, "analyze: scheduler unreachable"));

    let config = ControllerConfig {
        max_probe_failures: Some(3),
        ..fast_config()
    };
    let controller = ControllerBuilder::new(config)
        .with_runner(runner.clone())
        .build(JobId::new("42"))
        .unwrap();

    let err = controller.run().await.unwrap_err();
    assert!(matches!(err, MonitorError::ProbeFailures { consecutive: 3, .. }));
    assert_eq!(runner.invocations_of(ANALYZE).len(), 3);
    // Probing never got as far as the pool.
    assert!(runner.invocations_of(POOL).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_external_stop_is_reported_as_interrupted() {
    let runner = healthy_runner(320, 32, 100);
    let controller = ControllerBuilder::new(fast_config())
        .with_runner(runner.clone())
        .build(JobId::new("42"))
        .unwrap();
    let state = controller.state().clone();

    let run = tokio::spawn(controller.run());
    tokio::time::sleep(std::time::Duration::from_secs(150)).await;
    assert!(state.stop(ShutdownReason::Interrupted).await);

    let reason = run.await.unwrap().unwrap();
    assert_eq!(reason, ShutdownReason::Interrupted);
    // Exactly at target: cycles at 0s, 60s and 120s held.
    assert_eq!(runner.invocations_of(ANALYZE).len(), 3);
    assert!(
        runner
            .invocations_of(POOL)
            .iter()
            .all(|c| c.contains("num_worker"))
    );
}
