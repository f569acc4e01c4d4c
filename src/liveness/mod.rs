//! Liveness monitoring of the controlled job.
//!
//! The monitor runs as its own task, asking the cluster queue on a fixed
//! cadence whether the job still exists. Once the job is gone it stops the
//! shared [`ControllerState`] and exits; it never re-arms.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, info, warn};

use crate::core::state::{ControllerState, ShutdownReason};
use crate::core::types::JobId;
use crate::events::{Event, EventBus};
use crate::execution::{CommandError, CommandRunner, CommandSpec};

/// Default time between two queue lookups.
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(60);

/// Periodically checks that the monitored job is still queued.
pub struct LivenessMonitor {
    runner: Arc<dyn CommandRunner>,
    command: CommandSpec,
    job: JobId,
    state: ControllerState,
    events: Arc<EventBus>,
    interval: Duration,
}

impl LivenessMonitor {
    /// `command` is the queue lookup; `{job}` in its arguments is replaced
    /// with the job ID.
    pub fn new(
        runner: Arc<dyn CommandRunner>,
        command: CommandSpec,
        job: JobId,
        state: ControllerState,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            runner,
            command,
            job,
            state,
            events,
            interval: DEFAULT_LIVENESS_INTERVAL,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Ask the queue once. `Ok(false)` means the job is gone; an error means
    /// the question could not be answered.
    pub async fn check(&self) -> Result<bool, CommandError> {
        let spec = self.command.for_job(&self.job);
        info!(job_id = %self.job, "Checking if job is still alive");
        debug!(command = %spec, "queue lookup");

        let output = self.runner.run(&spec).await?;
        Ok(output.success())
    }

    /// Check on every tick until the job disappears or the state stops.
    ///
    /// The first check happens one interval after the call.
    pub async fn run(self) {
        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = self.state.wait_stopped() => {
                    debug!(job_id = %self.job, "liveness monitor stopping");
                    return;
                }
            }

            if !self.state.is_running().await {
                return;
            }

            match self.check().await {
                Ok(true) => debug!(job_id = %self.job, "job still queued"),
                Ok(false) => {
                    info!(job_id = %self.job, "job is no longer in the queue");
                    self.events.emit(Event::job_gone(self.job.clone())).await;
                    if self.state.stop(ShutdownReason::JobGone).await {
                        self.events
                            .emit(Event::shutdown_requested(ShutdownReason::JobGone))
                            .await;
                    }
                    return;
                }
                Err(e) => {
                    warn!(job_id = %self.job, error = %e, "queue lookup failed, retrying next interval");
                }
            }
        }
    }

    /// Run the monitor on its own task.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}
