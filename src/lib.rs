//! Adaptive worker-pool controller for `run-parallel.sh` jobs.
//!
//! The controller keeps roughly a target fraction of a shared cluster free by
//! adding workers to, or quenching workers from, one monitored job. Schedule
//! rules retarget that fraction at fixed times, and a liveness monitor stops
//! everything once the job leaves the queue.

pub mod config;
pub mod control;
pub mod core;
pub mod events;
pub mod execution;
pub mod liveness;
pub mod monitor;
pub mod probe;
pub mod scheduler;
pub mod testing;

pub use config::{ConfigError, ControllerBuilder, ControllerConfig, YamlLoader};
pub use control::{ControlError, WorkerPoolController};
pub use core::schedule::{Schedule, ScheduleError, TimePattern};
pub use core::sizing::{Adjustment, SizingPolicy};
pub use core::snapshot::{ClusterSnapshot, PoolCounts};
pub use core::state::{ControllerState, ShutdownReason, StateError};
pub use core::types::{JobId, JobSpecError};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{CommandError, CommandOutput, CommandRunner, CommandSpec, SystemCommandRunner};
pub use liveness::LivenessMonitor;
pub use monitor::{Controller, CycleOutcome, FeedbackLoop, MonitorError};
pub use probe::{ProbeError, ResourceProbe, WorkerPoolProbe};
pub use scheduler::{Intent, ScheduleEngine, ScheduleHandle, ScheduleRule, SchedulerError};
