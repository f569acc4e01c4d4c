//! Liveness monitor integration tests.

use rscheduler::testing::{Reply, ScriptedRunner};
use rscheduler::{CommandSpec, ControllerState, Event, JobId, LivenessMonitor, ShutdownReason};
use std::sync::Arc;
use std::time::Duration;

use crate::common::{QSTAT, count_events, recorded_bus};

fn qstat() -> CommandSpec {
    CommandSpec::new(QSTAT).arg("{job}")
}

#[tokio::test(start_paused = true)]
async fn test_flaky_queue_is_retried_until_job_leaves() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.push_for(QSTAT, Reply::Timeout(Duration::from_secs(30)));
    runner.push_for(QSTAT, Reply::Unavailable);
    runner.push_for(QSTAT, Reply::stdout("1355859.balza  run-parallel  R\n"));
    runner.push_for(QSTAT, Reply::failure(153, "qstat: Unknown Job Id"));

    let state = ControllerState::new(0.1, 60).unwrap();
    let (events, recorder) = recorded_bus().await;
    let start = tokio::time::Instant::now();

    LivenessMonitor::new(
        runner.clone(),
        qstat(),
        JobId::new("1355859"),
        state.clone(),
        events,
    )
    .with_interval(Duration::from_secs(10))
    .run()
    .await;

    // Timeout, unavailable and present are not "gone"; the fourth lookup is.
    assert_eq!(start.elapsed(), Duration::from_secs(40));
    assert_eq!(runner.invocations_of(QSTAT), vec!["qstat 1355859"; 4]);
    assert_eq!(state.shutdown_reason().await, Some(ShutdownReason::JobGone));
    assert_eq!(
        count_events(&recorder, |e| matches!(e, Event::JobGone { .. })).await,
        1
    );
}

#[tokio::test(start_paused = true)]
async fn test_stopped_state_ends_monitor_without_lookups() {
    let runner = Arc::new(ScriptedRunner::new());
    runner.always(QSTAT, Reply::failure(1, ""));

    let state = ControllerState::new(0.1, 60).unwrap();
    let (events, recorder) = recorded_bus().await;
    let monitor = LivenessMonitor::new(runner.clone(), qstat(), JobId::new("7"), state.clone(), events)
        .with_interval(Duration::from_secs(60))
        .spawn();

    state.stop(ShutdownReason::Interrupted).await;
    monitor.await.unwrap();

    // Stopped before the first tick: nothing was asked.
    assert!(runner.calls().is_empty());
    assert_eq!(
        state.shutdown_reason().await,
        Some(ShutdownReason::Interrupted)
    );
    assert!(recorder.events().await.is_empty());
}
