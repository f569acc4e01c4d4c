//! Worker pool sizing.
//!
//! Each feedback cycle compares the cluster's free fraction with the target
//! and proposes at most one adjustment. Growth is damped by `add_factor` so a
//! single noisy reading cannot overshoot; quenching is not damped by default
//! and never takes the pool below `minimum_workers`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::snapshot::{ClusterSnapshot, PoolCounts};

/// Default growth damping.
pub const DEFAULT_ADD_FACTOR: f64 = 0.25;

/// Default shrink damping.
pub const DEFAULT_QUENCH_FACTOR: f64 = 1.0;

/// Outcome of one sizing decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Adjustment {
    /// Leave the pool as it is.
    Hold,
    /// Add this many workers (always > 0).
    Add(u64),
    /// Quench this many workers (always > 0).
    Quench(u64),
}

impl Adjustment {
    /// Signed worker delta: positive grows, negative shrinks.
    pub fn delta(&self) -> i64 {
        match *self {
            Adjustment::Hold => 0,
            Adjustment::Add(n) => n as i64,
            Adjustment::Quench(n) => -(n as i64),
        }
    }

    /// Build an adjustment from a signed delta.
    pub fn from_delta(delta: i64) -> Self {
        match delta {
            0 => Adjustment::Hold,
            d if d > 0 => Adjustment::Add(d as u64),
            d => Adjustment::Quench(d.unsigned_abs()),
        }
    }

    pub fn is_hold(&self) -> bool {
        matches!(self, Adjustment::Hold)
    }
}

impl fmt::Display for Adjustment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Adjustment::Hold => write!(f, "hold"),
            Adjustment::Add(n) => write!(f, "add {}", n),
            Adjustment::Quench(n) => write!(f, "quench {}", n),
        }
    }
}

/// Parameters of the sizing algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SizingPolicy {
    /// Fraction of the free-capacity surplus turned into new workers per cycle.
    pub add_factor: f64,
    /// Fraction of the free-capacity deficit turned into quenched workers per cycle.
    pub quench_factor: f64,
    /// Floor the pool is never shrunk below.
    pub minimum_workers: u64,
}

impl SizingPolicy {
    /// Create a policy with the default damping factors.
    pub fn new(minimum_workers: u64) -> Self {
        Self {
            add_factor: DEFAULT_ADD_FACTOR,
            quench_factor: DEFAULT_QUENCH_FACTOR,
            minimum_workers,
        }
    }

    /// Builder: set the growth damping.
    pub fn with_add_factor(mut self, factor: f64) -> Self {
        self.add_factor = factor;
        self
    }

    /// Builder: set the shrink damping.
    pub fn with_quench_factor(mut self, factor: f64) -> Self {
        self.quench_factor = factor;
        self
    }

    /// Decide how to resize the pool so that roughly `target` of the cluster
    /// stays free.
    ///
    /// Workers already requested (`added`) or already leaving (`quenched`)
    /// count against the new request, so repeated cycles do not pile up
    /// requests while the cluster catches up.
    pub fn compute(
        &self,
        snapshot: &ClusterSnapshot,
        counts: &PoolCounts,
        target: f64,
    ) -> Adjustment {
        let Some(free) = snapshot.free_fraction() else {
            return Adjustment::Hold;
        };
        let total = snapshot.total_units as f64;

        if free > target {
            let wanted = ((free - target) * (total * self.add_factor)).ceil() as i64;
            let delta = wanted - counts.added as i64;
            if delta > 0 {
                Adjustment::Add(delta as u64)
            } else {
                Adjustment::Hold
            }
        } else {
            if counts.current <= self.minimum_workers {
                return Adjustment::Hold;
            }

            let headroom = (counts.current - self.minimum_workers) as f64;
            let wanted = (target - free) * (total * self.quench_factor) - counts.quenched as f64;
            let delta = wanted.max(0.0).min(headroom) as u64;
            if delta > 0 {
                Adjustment::Quench(delta)
            } else {
                Adjustment::Hold
            }
        }
    }
}

impl Default for SizingPolicy {
    fn default() -> Self {
        Self::new(60)
    }
}
