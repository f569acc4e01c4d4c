//! Feedback loop: probe, size, adjust, sleep.
//!
//! Each cycle reads the cluster and the worker pool, computes an
//! [`Adjustment`] against the current target free fraction and applies it.
//! The loop only reads [`ControllerState`]; it stops the state itself only
//! when it cannot continue (the control command is missing, or too many
//! probes failed in a row).

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::control::{ControlError, WorkerPoolController};
use crate::core::sizing::{Adjustment, SizingPolicy};
use crate::core::snapshot::{ClusterSnapshot, PoolCounts};
use crate::core::state::{ControllerState, ShutdownReason};
use crate::core::types::JobId;
use crate::events::{Event, EventBus};
use crate::probe::{ProbeError, ResourceProbe, WorkerPoolProbe};

/// Default time between two feedback cycles.
pub const DEFAULT_BURST_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// Errors that end the feedback loop.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The worker-pool command could not be run.
    #[error(transparent)]
    Control(#[from] ControlError),

    /// Probes failed too many cycles in a row.
    #[error("{consecutive} consecutive probe failures, last: {last}")]
    ProbeFailures {
        consecutive: u32,
        #[source]
        last: ProbeError,
    },
}

impl MonitorError {
    /// Reason recorded in the controller state for this error.
    pub fn shutdown_reason(&self) -> ShutdownReason {
        match self {
            MonitorError::Control(_) => ShutdownReason::ControlUnavailable,
            MonitorError::ProbeFailures { .. } => ShutdownReason::ProbeFailures,
        }
    }
}

/// What one feedback cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The adjustment was applied (or was a hold).
    Applied(Adjustment),
    /// The control command ran and failed; the pool may be unchanged.
    ControlFailed(Adjustment),
    /// A probe failed; nothing was decided.
    Skipped,
    /// The controller stopped between probing and adjusting.
    Stopped,
}

/// Drives the worker pool towards the target free fraction.
pub struct FeedbackLoop {
    job: JobId,
    resources: ResourceProbe,
    pool: WorkerPoolProbe,
    controller: WorkerPoolController,
    policy: SizingPolicy,
    state: ControllerState,
    events: Arc<EventBus>,
    burst_interval: Duration,
    max_probe_failures: Option<u32>,
    consecutive_failures: u32,
}

impl FeedbackLoop {
    /// Create a loop with default sizing factors and the state's worker floor.
    pub fn new(
        job: JobId,
        resources: ResourceProbe,
        pool: WorkerPoolProbe,
        controller: WorkerPoolController,
        state: ControllerState,
        events: Arc<EventBus>,
    ) -> Self {
        Self {
            job,
            resources,
            pool,
            controller,
            policy: SizingPolicy::new(state.minimum_workers()),
            state,
            events,
            burst_interval: DEFAULT_BURST_INTERVAL,
            max_probe_failures: None,
            consecutive_failures: 0,
        }
    }

    /// Set the sizing policy. Its floor should match the state's.
    pub fn with_policy(mut self, policy: SizingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_burst_interval(mut self, interval: Duration) -> Self {
        self.burst_interval = interval;
        self
    }

    /// Stop after this many consecutive failed probes. `None` retries forever.
    pub fn with_max_probe_failures(mut self, max: Option<u32>) -> Self {
        self.max_probe_failures = max;
        self
    }

    /// Read the cluster, then the pool. `None` if the state stopped in between.
    async fn probe(&self) -> Result<Option<(ClusterSnapshot, PoolCounts)>, ProbeError> {
        let snapshot = self.resources.snapshot().await?;
        if !self.state.is_running().await {
            return Ok(None);
        }
        let counts = self.pool.counts(&self.job).await?;
        Ok(Some((snapshot, counts)))
    }

    async fn stop(&self, reason: ShutdownReason) {
        if self.state.stop(reason).await {
            self.events.emit(Event::shutdown_requested(reason)).await;
        }
    }

    /// Run a single cycle without sleeping.
    pub async fn run_cycle(&mut self) -> Result<CycleOutcome, MonitorError> {
        let (snapshot, counts) = match self.probe().await {
            Ok(Some(readings)) => {
                self.consecutive_failures = 0;
                readings
            }
            Ok(None) => return Ok(CycleOutcome::Stopped),
            Err(e) => {
                self.consecutive_failures += 1;
                let consecutive = self.consecutive_failures;
                warn!(job_id = %self.job, error = %e, consecutive, "Probe failed, skipping cycle");
                self.events
                    .emit(Event::cycle_skipped(self.job.clone(), e.to_string(), consecutive))
                    .await;

                if let Some(max) = self.max_probe_failures
                    && consecutive >= max
                {
                    error!(job_id = %self.job, consecutive, "Too many consecutive probe failures");
                    self.stop(ShutdownReason::ProbeFailures).await;
                    return Err(MonitorError::ProbeFailures {
                        consecutive,
                        last: e,
                    });
                }
                return Ok(CycleOutcome::Skipped);
            }
        };

        let target = self.state.target_free_fraction().await;
        info!(
            job_id = %self.job,
            "STATUS: {} / {} CPUs, {} free (minimum {} free)",
            counts,
            snapshot.total_units,
            snapshot.free_units,
            target
        );

        let adjustment = self.policy.compute(&snapshot, &counts, target);
        self.events
            .emit(Event::cycle_completed(
                self.job.clone(),
                snapshot,
                counts,
                target,
                adjustment,
            ))
            .await;

        if adjustment.is_hold() {
            return Ok(CycleOutcome::Applied(adjustment));
        }
        if !self.state.is_running().await {
            return Ok(CycleOutcome::Stopped);
        }

        match self.controller.apply(&self.job, adjustment).await {
            Ok(()) => {
                if let Some(event) =
                    Event::adjusted(self.job.clone(), adjustment, self.controller.is_dry_run())
                {
                    self.events.emit(event).await;
                }
                Ok(CycleOutcome::Applied(adjustment))
            }
            Err(e @ ControlError::CommandFailed(_)) => {
                warn!(job_id = %self.job, %adjustment, error = %e, "Worker pool adjustment failed");
                Ok(CycleOutcome::ControlFailed(adjustment))
            }
            Err(e @ ControlError::Unavailable(_)) => {
                error!(job_id = %self.job, error = %e, "Cannot run worker pool command, shutting down");
                self.stop(ShutdownReason::ControlUnavailable).await;
                Err(e.into())
            }
        }
    }

    /// Cycle until the controller stops.
    ///
    /// Returns the recorded shutdown reason, or an error if the loop itself
    /// had to stop the controller.
    pub async fn run(mut self) -> Result<ShutdownReason, MonitorError> {
        info!(
            job_id = %self.job,
            burst_interval = ?self.burst_interval,
            minimum_workers = self.policy.minimum_workers,
            dry_run = self.controller.is_dry_run(),
            "Monitoring job"
        );

        while self.state.is_running().await {
            self.run_cycle().await?;

            tokio::select! {
                _ = tokio::time::sleep(self.burst_interval) => {}
                _ = self.state.wait_stopped() => {}
            }
        }

        let reason = self
            .state
            .shutdown_reason()
            .await
            .unwrap_or(ShutdownReason::Interrupted);
        info!(job_id = %self.job, %reason, "Feedback loop stopped");
        Ok(reason)
    }
}
