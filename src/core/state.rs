//! Controller state shared between the feedback loop, the schedule engine
//! and the liveness monitor.
//!
//! The target free fraction and the running flag live behind a single lock;
//! every read and write goes through [`ControllerState`]. The minimum worker
//! floor is fixed at construction and needs no locking.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::{Notify, RwLock};

/// Errors raised when mutating controller state.
#[derive(Debug, Error, PartialEq)]
pub enum StateError {
    /// Target free fraction outside `[0, 1]`.
    #[error("free fraction {0} is outside [0, 1]")]
    FractionOutOfRange(f64),
}

/// Why the controller stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// The monitored job is no longer in the cluster queue.
    JobGone,
    /// The operator interrupted the process.
    Interrupted,
    /// The worker-pool command could not be run at all.
    ControlUnavailable,
    /// Too many consecutive probe failures.
    ProbeFailures,
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ShutdownReason::JobGone => "monitored job left the queue",
            ShutdownReason::Interrupted => "interrupted",
            ShutdownReason::ControlUnavailable => "worker pool command unavailable",
            ShutdownReason::ProbeFailures => "too many probe failures",
        };
        f.write_str(s)
    }
}

#[derive(Debug)]
struct Inner {
    target_free_fraction: f64,
    running: bool,
    shutdown_reason: Option<ShutdownReason>,
}

/// Shared, cloneable handle to the controller state.
#[derive(Debug, Clone)]
pub struct ControllerState {
    inner: Arc<RwLock<Inner>>,
    stopped: Arc<Notify>,
    minimum_workers: u64,
}

fn check_fraction(fraction: f64) -> Result<f64, StateError> {
    if (0.0..=1.0).contains(&fraction) {
        Ok(fraction)
    } else {
        Err(StateError::FractionOutOfRange(fraction))
    }
}

impl ControllerState {
    /// Create running state with an initial target and a fixed worker floor.
    pub fn new(target_free_fraction: f64, minimum_workers: u64) -> Result<Self, StateError> {
        let target_free_fraction = check_fraction(target_free_fraction)?;
        Ok(Self {
            inner: Arc::new(RwLock::new(Inner {
                target_free_fraction,
                running: true,
                shutdown_reason: None,
            })),
            stopped: Arc::new(Notify::new()),
            minimum_workers,
        })
    }

    /// Worker floor, fixed for the lifetime of the controller.
    pub fn minimum_workers(&self) -> u64 {
        self.minimum_workers
    }

    pub async fn target_free_fraction(&self) -> f64 {
        self.inner.read().await.target_free_fraction
    }

    /// Replace the target free fraction, returning the previous value.
    pub async fn set_target_free_fraction(&self, fraction: f64) -> Result<f64, StateError> {
        let fraction = check_fraction(fraction)?;
        let mut inner = self.inner.write().await;
        Ok(std::mem::replace(&mut inner.target_free_fraction, fraction))
    }

    pub async fn is_running(&self) -> bool {
        self.inner.read().await.running
    }

    /// Reason recorded by the first stop request, if any.
    pub async fn shutdown_reason(&self) -> Option<ShutdownReason> {
        self.inner.read().await.shutdown_reason
    }

    /// Clear the running flag and wake every task waiting on it.
    ///
    /// Returns `true` if this call stopped the controller; later calls keep
    /// the first reason.
    pub async fn stop(&self, reason: ShutdownReason) -> bool {
        let first = {
            let mut inner = self.inner.write().await;
            inner.running = false;
            if inner.shutdown_reason.is_none() {
                inner.shutdown_reason = Some(reason);
                true
            } else {
                false
            }
        };

        self.stopped.notify_waiters();
        first
    }

    /// Resolve once the controller has stopped.
    pub async fn wait_stopped(&self) {
        loop {
            // Register interest before checking so a concurrent stop is not missed.
            let notified = self.stopped.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if !self.is_running().await {
                return;
            }
            notified.await;
        }
    }
}
