//! Common test utilities shared across integration tests.

use rscheduler::testing::{RecordingHandler, Reply, ScriptedRunner};
use rscheduler::{Event, EventBus};
use std::sync::Arc;

pub const ANALYZE: &str = "analyze";
pub const POOL: &str = "run-parallel.sh";
pub const QSTAT: &str = "qstat";

/// `analyze` output for a cluster of `total` CPUs with `free` of them idle.
pub fn cluster(total: u64, free: u64) -> Reply {
    Reply::stdout(format!(
        "||| 0 jobs pending\n||| {} CPUs: 0 down or offline, {} busy, {} free\n",
        total,
        total - free,
        free
    ))
}

/// `run-parallel.sh num_worker` output.
pub fn workers(current: u64, quenched: u64, added: u64) -> Reply {
    Reply::stdout(format!("w:{} q:{} a:{}\n", current, quenched, added))
}

/// An event bus with a recorder already registered.
pub async fn recorded_bus() -> (Arc<EventBus>, Arc<RecordingHandler>) {
    let events = Arc::new(EventBus::new());
    let recorder = Arc::new(RecordingHandler::new());
    events.register(recorder.clone()).await;
    (events, recorder)
}

/// A runner for a healthy cluster where every command succeeds.
pub fn healthy_runner(total: u64, free: u64, current_workers: u64) -> Arc<ScriptedRunner> {
    let runner = Arc::new(ScriptedRunner::new());
    runner.always(ANALYZE, cluster(total, free));
    runner.always(POOL, workers(current_workers, 0, 0));
    runner.always(QSTAT, Reply::stdout("42.balza  run-parallel  R\n"));
    runner
}

/// Count recorded events matching `predicate`.
pub async fn count_events(recorder: &RecordingHandler, predicate: impl Fn(&Event) -> bool) -> usize {
    recorder.events().await.iter().filter(|e| predicate(e)).count()
}
