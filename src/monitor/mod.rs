//! The feedback loop driving the worker pool, and the controller that runs
//! it alongside the schedule engine and the liveness monitor.

mod controller;
mod feedback;

pub use controller::Controller;
pub use feedback::{CycleOutcome, DEFAULT_BURST_INTERVAL, FeedbackLoop, MonitorError};
