//! Lifecycle events and event handling.
//!
//! This module provides event emission for controller lifecycle events:
//! schedule retargeting, feedback cycles, pool adjustments and shutdown.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;

use crate::core::sizing::Adjustment;
use crate::core::snapshot::{ClusterSnapshot, PoolCounts};
use crate::core::state::ShutdownReason;
use crate::core::types::JobId;
use crate::scheduler::Intent;

/// Lifecycle events emitted by the controller.
#[derive(Debug, Clone)]
pub enum Event {
    /// A schedule rule fired and replaced the target free fraction.
    TargetChanged {
        rule: String,
        intent: Intent,
        previous: f64,
        target: f64,
        timestamp: Instant,
    },

    /// A feedback cycle read the cluster and decided on an adjustment.
    CycleCompleted {
        job_id: JobId,
        snapshot: ClusterSnapshot,
        counts: PoolCounts,
        target: f64,
        adjustment: Adjustment,
        timestamp: Instant,
    },

    /// Workers were requested for the monitored job.
    WorkersAdded {
        job_id: JobId,
        count: u64,
        dry_run: bool,
        timestamp: Instant,
    },

    /// Workers of the monitored job were asked to quench.
    WorkersQuenched {
        job_id: JobId,
        count: u64,
        dry_run: bool,
        timestamp: Instant,
    },

    /// A feedback cycle was skipped because a probe failed.
    CycleSkipped {
        job_id: JobId,
        error: String,
        /// Consecutive failed cycles, including this one.
        consecutive: u32,
        timestamp: Instant,
    },

    /// The monitored job is no longer in the cluster queue.
    JobGone { job_id: JobId, timestamp: Instant },

    /// The controller is stopping.
    ShutdownRequested {
        reason: ShutdownReason,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::TargetChanged { timestamp, .. } => *timestamp,
            Event::CycleCompleted { timestamp, .. } => *timestamp,
            Event::WorkersAdded { timestamp, .. } => *timestamp,
            Event::WorkersQuenched { timestamp, .. } => *timestamp,
            Event::CycleSkipped { timestamp, .. } => *timestamp,
            Event::JobGone { timestamp, .. } => *timestamp,
            Event::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    pub fn target_changed(rule: impl Into<String>, intent: Intent, previous: f64, target: f64) -> Self {
        Event::TargetChanged {
            rule: rule.into(),
            intent,
            previous,
            target,
            timestamp: Instant::now(),
        }
    }

    pub fn cycle_completed(
        job_id: JobId,
        snapshot: ClusterSnapshot,
        counts: PoolCounts,
        target: f64,
        adjustment: Adjustment,
    ) -> Self {
        Event::CycleCompleted {
            job_id,
            snapshot,
            counts,
            target,
            adjustment,
            timestamp: Instant::now(),
        }
    }

    /// Create the event matching an applied adjustment, if it changed the pool.
    pub fn adjusted(job_id: JobId, adjustment: Adjustment, dry_run: bool) -> Option<Self> {
        let timestamp = Instant::now();
        match adjustment {
            Adjustment::Hold => None,
            Adjustment::Add(count) => Some(Event::WorkersAdded {
                job_id,
                count,
                dry_run,
                timestamp,
            }),
            Adjustment::Quench(count) => Some(Event::WorkersQuenched {
                job_id,
                count,
                dry_run,
                timestamp,
            }),
        }
    }

    pub fn cycle_skipped(job_id: JobId, error: String, consecutive: u32) -> Self {
        Event::CycleSkipped {
            job_id,
            error,
            consecutive,
            timestamp: Instant::now(),
        }
    }

    pub fn job_gone(job_id: JobId) -> Self {
        Event::JobGone {
            job_id,
            timestamp: Instant::now(),
        }
    }

    pub fn shutdown_requested(reason: ShutdownReason) -> Self {
        Event::ShutdownRequested {
            reason,
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving lifecycle events.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers, in registration order.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
