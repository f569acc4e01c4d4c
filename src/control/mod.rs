//! Worker-pool control commands.
//!
//! [`WorkerPoolController`] turns a signed worker delta into an `add` or
//! `quench` call on the worker-pool tool. Floor clamping happens before the
//! controller is called; the controller only executes.

use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::core::sizing::Adjustment;
use crate::core::types::JobId;
use crate::execution::{CommandError, CommandRunner, CommandSpec};

/// Errors that can occur while adjusting the worker pool.
#[derive(Debug, Error)]
pub enum ControlError {
    /// The command ran but failed or timed out.
    #[error("worker pool command failed: {0}")]
    CommandFailed(#[source] CommandError),

    /// The command could not be run at all.
    #[error("worker pool command unavailable: {0}")]
    Unavailable(#[source] CommandError),
}

impl From<CommandError> for ControlError {
    fn from(err: CommandError) -> Self {
        if err.is_unavailable() {
            ControlError::Unavailable(err)
        } else {
            ControlError::CommandFailed(err)
        }
    }
}

/// Issues add and quench commands to the monitored job.
#[derive(Clone)]
pub struct WorkerPoolController {
    runner: Arc<dyn CommandRunner>,
    command: CommandSpec,
    dry_run: bool,
}

impl WorkerPoolController {
    /// `command` is the worker-pool tool; `add|quench <n> <job>` is appended.
    pub fn new(runner: Arc<dyn CommandRunner>, command: CommandSpec) -> Self {
        Self {
            runner,
            command,
            dry_run: false,
        }
    }

    /// Log commands instead of running them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// The command line `adjust` would run for `delta`, or `None` for zero.
    pub fn command_for(&self, job: &JobId, delta: i64) -> Option<CommandSpec> {
        let verb = match delta {
            0 => return None,
            d if d > 0 => "add",
            _ => "quench",
        };
        Some(self.command.for_job(job).args([
            verb.to_string(),
            delta.unsigned_abs().to_string(),
            job.to_string(),
        ]))
    }

    /// Grow (`delta > 0`) or shrink (`delta < 0`) the pool. Zero is a no-op.
    pub async fn adjust(&self, job: &JobId, delta: i64) -> Result<(), ControlError> {
        let Some(spec) = self.command_for(job, delta) else {
            return Ok(());
        };

        debug!(command = %spec, dry_run = self.dry_run, "adjusting worker pool");
        if self.dry_run {
            info!(command = %spec, "dry run, not executing");
            return Ok(());
        }

        self.runner
            .run(&spec)
            .await?
            .into_success(&spec.program)?;

        match Adjustment::from_delta(delta) {
            Adjustment::Add(n) => info!(job_id = %job, "Dynamically adding {} worker(s)", n),
            Adjustment::Quench(n) => info!(job_id = %job, "Dynamically quenching {} worker(s)", n),
            Adjustment::Hold => {}
        }
        Ok(())
    }

    /// Apply a sizing decision.
    pub async fn apply(&self, job: &JobId, adjustment: Adjustment) -> Result<(), ControlError> {
        self.adjust(job, adjustment.delta()).await
    }
}
