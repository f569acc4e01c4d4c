//! The assembled controller: schedule engine, liveness monitor and feedback
//! loop sharing one [`ControllerState`].

use std::sync::Arc;
use tracing::{debug, warn};

use crate::core::state::{ControllerState, ShutdownReason};
use crate::events::{EventBus, EventHandler};
use crate::liveness::LivenessMonitor;
use crate::scheduler::ScheduleEngine;

use super::feedback::{FeedbackLoop, MonitorError};

/// A fully wired controller for one job.
pub struct Controller {
    state: ControllerState,
    events: Arc<EventBus>,
    engine: ScheduleEngine,
    liveness: LivenessMonitor,
    feedback: FeedbackLoop,
}

impl Controller {
    pub fn new(
        state: ControllerState,
        events: Arc<EventBus>,
        engine: ScheduleEngine,
        liveness: LivenessMonitor,
        feedback: FeedbackLoop,
    ) -> Self {
        Self {
            state,
            events,
            engine,
            liveness,
            feedback,
        }
    }

    /// Shared state, e.g. for an interrupt handler to stop the controller.
    pub fn state(&self) -> &ControllerState {
        &self.state
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Register an event handler on the controller's bus.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        self.events.register(handler).await;
    }

    pub fn rule_count(&self) -> usize {
        self.engine.rules().len()
    }

    /// Run until the job disappears, the state is stopped, or the feedback
    /// loop gives up. Background tasks are joined before returning.
    pub async fn run(self) -> Result<ShutdownReason, MonitorError> {
        let (schedule, engine_task) = self.engine.start();
        let liveness_task = self.liveness.spawn();

        let result = self.feedback.run().await;

        // The feedback loop only returns once the state is stopped, which
        // also ends both background tasks.
        if let Err(e) = schedule.shutdown().await {
            debug!(error = %e, "Schedule engine already stopped");
        }
        if let Err(e) = engine_task.await {
            warn!(error = %e, "Schedule engine task failed");
        }
        if let Err(e) = liveness_task.await {
            warn!(error = %e, "Liveness task failed");
        }

        result
    }
}
