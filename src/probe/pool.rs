//! Worker-pool probe for the monitored job.

use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::debug;

use super::ProbeError;
use crate::core::snapshot::PoolCounts;
use crate::core::types::JobId;
use crate::execution::{CommandRunner, CommandSpec};

static COUNTS_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^w:(\d+) q:(\d+) a:(\d+)$").expect("worker count pattern is valid")
});

const WHAT: &str = "worker counts";

/// Parse `w:<current> q:<quenched> a:<added>` from the last non-empty line.
pub fn parse_worker_counts(output: &str) -> Result<PoolCounts, ProbeError> {
    let line = output
        .lines()
        .map(str::trim)
        .rfind(|l| !l.is_empty())
        .ok_or_else(|| ProbeError::malformed(WHAT, output))?;

    let caps = COUNTS_LINE
        .captures(line)
        .ok_or_else(|| ProbeError::malformed(WHAT, line))?;

    let field = |i: usize| {
        caps[i]
            .parse::<u64>()
            .map_err(|_| ProbeError::malformed(WHAT, line))
    };

    Ok(PoolCounts::new(field(1)?, field(2)?, field(3)?))
}

/// Queries the worker-pool tool for the monitored job's worker counts.
#[derive(Clone)]
pub struct WorkerPoolProbe {
    runner: Arc<dyn CommandRunner>,
    command: CommandSpec,
}

impl WorkerPoolProbe {
    /// `command` is the worker-pool tool; `num_worker <job>` is appended.
    pub fn new(runner: Arc<dyn CommandRunner>, command: CommandSpec) -> Self {
        Self { runner, command }
    }

    pub async fn counts(&self, job: &JobId) -> Result<PoolCounts, ProbeError> {
        let spec = self
            .command
            .for_job(job)
            .args(["num_worker", job.as_str()]);

        let output = self
            .runner
            .run(&spec)
            .await?
            .into_success(&spec.program)?;

        let counts = parse_worker_counts(&output.stdout)?;
        debug!(job_id = %job, %counts, "worker counts");
        Ok(counts)
    }
}
