//! Point-in-time readings of the cluster and of the monitored worker pool.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Cluster capacity as reported by the resource probe.
///
/// `free_units` already has pending demand subtracted: queued jobs will
/// claim free capacity before any new worker could.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub total_units: u64,
    pub free_units: u64,
    pub pending_jobs: u64,
}

impl ClusterSnapshot {
    /// Build a snapshot from raw readings, charging pending jobs against free units.
    pub fn from_raw(total_units: u64, raw_free_units: u64, pending_jobs: u64) -> Self {
        Self {
            total_units,
            free_units: raw_free_units.saturating_sub(pending_jobs),
            pending_jobs,
        }
    }

    /// Fraction of the cluster currently unclaimed, or `None` for an empty cluster.
    pub fn free_fraction(&self) -> Option<f64> {
        (self.total_units > 0).then(|| self.free_units as f64 / self.total_units as f64)
    }
}

impl fmt::Display for ClusterSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} CPUs, {} free, {} jobs pending",
            self.total_units, self.free_units, self.pending_jobs
        )
    }
}

/// Worker counts of the monitored job as reported by `num_worker`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolCounts {
    /// Workers currently running.
    pub current: u64,
    /// Workers asked to quench that have not exited yet.
    pub quenched: u64,
    /// Workers requested that have not started yet.
    pub added: u64,
}

impl PoolCounts {
    pub fn new(current: u64, quenched: u64, added: u64) -> Self {
        Self {
            current,
            quenched,
            added,
        }
    }
}

impl fmt::Display for PoolCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({} + {} - {})",
            self.current, self.added, self.quenched
        )
    }
}
