//! Configuration type definitions.
//!
//! This module contains the type definitions for the YAML configuration of
//! the controller: cadences, sizing parameters, schedule rules and the
//! external commands.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::sizing::{DEFAULT_ADD_FACTOR, DEFAULT_QUENCH_FACTOR, SizingPolicy};
use crate::execution::{CommandSpec, JOB_PLACEHOLDER};

/// Controller configuration (r-scheduler.yaml).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControllerConfig {
    /// Minutes between two feedback cycles.
    pub burst_interval_minutes: u64,
    /// Floor on the worker count; never quench below it.
    pub minimum_workers: u64,
    /// Initial target free fraction of the cluster.
    pub free_fraction: f64,
    /// Growth damping.
    pub add_factor: f64,
    /// Shrink damping.
    pub quench_factor: f64,
    /// Seconds between two queue lookups.
    pub liveness_interval_secs: u64,
    /// Milliseconds between two schedule checks.
    pub schedule_tick_millis: u64,
    /// IANA timezone schedule rules are evaluated in.
    pub timezone: String,
    /// Log add/quench commands instead of running them.
    pub dry_run: bool,
    /// Per-command timeout; no timeout when absent.
    pub command_timeout_secs: Option<u64>,
    /// Consecutive failed probes tolerated before giving up; unlimited when absent.
    pub max_probe_failures: Option<u32>,
    /// Add rules, `<fraction>:<pattern>`.
    pub add: Vec<String>,
    /// Quench rules, `<fraction>:<pattern>`.
    pub quench: Vec<String>,
    /// External commands.
    pub commands: CommandsConfig,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            burst_interval_minutes: 5,
            minimum_workers: 60,
            free_fraction: 0.1,
            add_factor: DEFAULT_ADD_FACTOR,
            quench_factor: DEFAULT_QUENCH_FACTOR,
            liveness_interval_secs: 60,
            schedule_tick_millis: 1000,
            timezone: "UTC".to_string(),
            dry_run: false,
            command_timeout_secs: None,
            max_probe_failures: None,
            add: Vec::new(),
            quench: Vec::new(),
            commands: CommandsConfig::default(),
        }
    }
}

impl ControllerConfig {
    pub fn burst_interval(&self) -> Duration {
        Duration::from_secs(self.burst_interval_minutes.saturating_mul(60))
    }

    pub fn liveness_interval(&self) -> Duration {
        Duration::from_secs(self.liveness_interval_secs)
    }

    pub fn schedule_tick(&self) -> Duration {
        Duration::from_millis(self.schedule_tick_millis)
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        self.command_timeout_secs.map(Duration::from_secs)
    }

    pub fn sizing_policy(&self) -> SizingPolicy {
        SizingPolicy::new(self.minimum_workers)
            .with_add_factor(self.add_factor)
            .with_quench_factor(self.quench_factor)
    }
}

/// External commands used by the controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandsConfig {
    /// Prints total/free units and pending jobs.
    pub cluster_summary: CommandSpec,
    /// Worker-pool tool; `num_worker`, `add` and `quench` are appended.
    pub worker_pool: CommandSpec,
    /// Exits 0 while the job is queued. `{job}` is replaced with the job ID.
    pub queue_lookup: CommandSpec,
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            cluster_summary: CommandSpec::new("analyze"),
            worker_pool: CommandSpec::new("run-parallel.sh"),
            queue_lookup: CommandSpec::new("qstat").arg(JOB_PLACEHOLDER),
        }
    }
}
