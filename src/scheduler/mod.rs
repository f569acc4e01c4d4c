//! Schedule engine for time-triggered retargeting.
//!
//! This module provides the tick loop that fires schedule rules at their
//! configured times and replaces the controller's target free fraction.

mod engine;
mod handle;
mod types;

pub use engine::{DEFAULT_TICK_INTERVAL, ScheduleEngine};
pub use handle::ScheduleHandle;
pub use types::{Intent, RuleError, RuleState, ScheduleRule, SchedulerError, SchedulerState};
