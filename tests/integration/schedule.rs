//! Schedule rule integration tests.
//!
//! Rules are built from configuration text, fired by the engine at fixed
//! instants, and observed through the feedback loop's next decision.

use chrono::{DateTime, TimeZone, Utc};
use rscheduler::config::build_rules;
use rscheduler::testing::ScriptedRunner;
use rscheduler::{
    Adjustment, CommandSpec, ControllerConfig, ControllerState, CycleOutcome, Event, FeedbackLoop,
    Intent, JobId, ResourceProbe, Schedule, ScheduleEngine, SchedulerError, WorkerPoolController,
    WorkerPoolProbe,
};
use std::sync::Arc;

use crate::common::{ANALYZE, POOL, cluster, recorded_bus, workers};

const EVENING_ADD: &str = "0.25:0 0 18 * * * mon-fri";
const MORNING_QUENCH: &str = "0.75:0 0 8 * * * mon-fri";

fn at(day: u32, hour: u32, min: u32, sec: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, day, hour, min, sec).unwrap()
}

fn weekday_config() -> ControllerConfig {
    ControllerConfig {
        add: vec![EVENING_ADD.to_string()],
        quench: vec![MORNING_QUENCH.to_string()],
        ..ControllerConfig::default()
    }
}

#[test]
fn test_weekday_rule_skips_the_weekend() {
    let schedule = Schedule::new("0 0 18 * * * mon-fri").unwrap();
    // Friday evening, after the rule fired.
    let next = schedule.next_after(at(7, 19, 0, 0)).unwrap();
    assert_eq!(next, at(10, 18, 0, 0));
}

#[test]
fn test_rule_is_evaluated_in_its_timezone() {
    let schedule = Schedule::with_timezone("0 0 8 * * * *", "America/New_York").unwrap();
    // 08:00 EDT is 12:00 UTC.
    let next = schedule.next_after(at(3, 0, 0, 0)).unwrap();
    assert_eq!(next, at(3, 12, 0, 0));
}

#[test]
fn test_rules_keep_their_text_as_name() {
    let rules = build_rules(&weekday_config(), at(3, 7, 0, 0)).unwrap();
    let names: Vec<_> = rules.iter().map(|r| r.name().to_string()).collect();
    assert_eq!(names, vec![EVENING_ADD, MORNING_QUENCH]);
    assert_eq!(rules[1].intent(), Intent::Quench);
}

#[tokio::test]
async fn test_fired_rules_drive_the_next_cycle() {
    let now = at(3, 7, 0, 0);
    let state = ControllerState::new(0.1, 60).unwrap();
    let (events, recorder) = recorded_bus().await;

    let mut engine = ScheduleEngine::new(state.clone(), events.clone());
    for rule in build_rules(&weekday_config(), now).unwrap() {
        engine.register(rule);
    }
    engine.arm_at(now);

    let runner = Arc::new(ScriptedRunner::new());
    runner.always(ANALYZE, cluster(320, 160));
    runner.always(POOL, workers(100, 0, 0));
    let job = JobId::new("42");
    let mut feedback = FeedbackLoop::new(
        job.clone(),
        ResourceProbe::new(runner.clone(), CommandSpec::new(ANALYZE)),
        WorkerPoolProbe::new(runner.clone(), CommandSpec::new(POOL)),
        WorkerPoolController::new(runner.clone(), CommandSpec::new(POOL)),
        state.clone(),
        events,
    );

    // Morning: keep three quarters free, quench down to the floor.
    assert_eq!(engine.check_rules(at(3, 8, 0, 1)).await, 1);
    assert_eq!(state.target_free_fraction().await, 0.75);
    assert_eq!(
        feedback.run_cycle().await.unwrap(),
        CycleOutcome::Applied(Adjustment::Quench(40))
    );

    // Nothing is due in between.
    assert_eq!(engine.check_rules(at(3, 12, 0, 0)).await, 0);

    // Evening: a quarter free is enough, grow.
    assert_eq!(engine.check_rules(at(3, 18, 0, 0)).await, 1);
    assert_eq!(state.target_free_fraction().await, 0.25);
    assert_eq!(
        feedback.run_cycle().await.unwrap(),
        CycleOutcome::Applied(Adjustment::Add(20))
    );

    let targets: Vec<_> = recorder
        .events()
        .await
        .into_iter()
        .filter_map(|e| match e {
            Event::TargetChanged {
                previous, target, ..
            } => Some((previous, target)),
            _ => None,
        })
        .collect();
    assert_eq!(targets, vec![(0.1, 0.75), (0.75, 0.25)]);
}

#[tokio::test]
async fn test_latest_missed_occurrence_wins_after_a_gap() {
    let state = ControllerState::new(0.1, 60).unwrap();
    let (events, _recorder) = recorded_bus().await;
    let mut engine = ScheduleEngine::new(state.clone(), events);
    for rule in build_rules(&weekday_config(), at(3, 7, 0, 0)).unwrap() {
        engine.register(rule);
    }
    engine.arm_at(at(3, 7, 0, 0));

    // Asleep from Monday 07:00 to Wednesday 09:00. The add rule last fired
    // Tuesday evening, the quench rule Wednesday morning.
    assert_eq!(engine.check_rules(at(5, 9, 0, 0)).await, 2);
    assert_eq!(state.target_free_fraction().await, 0.75);
}

#[tokio::test]
async fn test_manual_fire_through_handle() {
    let state = ControllerState::new(0.1, 60).unwrap();
    let (events, _recorder) = recorded_bus().await;
    let mut engine = ScheduleEngine::new(state.clone(), events);
    for rule in build_rules(&weekday_config(), Utc::now()).unwrap() {
        engine.register(rule);
    }

    let (handle, task) = engine.start();
    assert_eq!(handle.fire(EVENING_ADD).await.unwrap(), 0.1);
    assert_eq!(state.target_free_fraction().await, 0.25);

    let missing = handle.fire("0.5:* * * * * * *").await;
    assert!(matches!(missing, Err(SchedulerError::RuleNotFound(_))));

    handle.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(!handle.is_running().await);
}
