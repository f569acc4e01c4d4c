//! Controller builder from configuration.
//!
//! This module converts a [`ControllerConfig`] into a runnable
//! [`Controller`]: schedule rules are parsed, shared state is created, and
//! every component is wired to the same command runner and event bus.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::control::WorkerPoolController;
use crate::core::state::ControllerState;
use crate::core::types::JobId;
use crate::events::EventBus;
use crate::execution::{CommandRunner, SystemCommandRunner};
use crate::liveness::LivenessMonitor;
use crate::monitor::{Controller, FeedbackLoop};
use crate::probe::{ResourceProbe, WorkerPoolProbe};
use crate::scheduler::{Intent, ScheduleEngine, ScheduleRule};

use super::error::ConfigError;
use super::types::ControllerConfig;
use super::yaml::YamlLoader;

/// Parse a `<fraction>:<pattern>` rule that must still fire after `now`.
pub fn parse_rule(
    text: &str,
    intent: Intent,
    timezone: &str,
    now: DateTime<Utc>,
) -> Result<ScheduleRule, ConfigError> {
    let rule = ScheduleRule::parse(text, intent, timezone)?;
    let Ok(next) = rule.next_fire_after(now) else {
        return Err(ConfigError::NoFutureOccurrence(rule.name().to_string()));
    };
    info!(
        rule = rule.name(),
        %intent,
        target = rule.target_fraction(),
        next_fire = %next,
        "Added {} rule",
        intent
    );
    Ok(rule)
}

/// Parse every add and quench rule of `config`, add rules first.
pub fn build_rules(
    config: &ControllerConfig,
    now: DateTime<Utc>,
) -> Result<Vec<ScheduleRule>, ConfigError> {
    let add = config.add.iter().map(|text| (text, Intent::Add));
    let quench = config.quench.iter().map(|text| (text, Intent::Quench));

    add.chain(quench)
        .map(|(text, intent)| parse_rule(text, intent, &config.timezone, now))
        .collect()
}

/// Builder for creating a [`Controller`] from configuration.
pub struct ControllerBuilder {
    config: ControllerConfig,
    runner: Option<Arc<dyn CommandRunner>>,
    events: Option<Arc<EventBus>>,
}

impl ControllerBuilder {
    pub fn new(config: ControllerConfig) -> Self {
        Self {
            config,
            runner: None,
            events: None,
        }
    }

    /// Use this runner instead of spawning real subprocesses.
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// Share an existing event bus.
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    /// Validate the configuration and assemble a controller for `job`.
    pub fn build(self, job: JobId) -> Result<Controller, ConfigError> {
        let config = self.config;
        YamlLoader::validate_config(&config)?;
        let rules = build_rules(&config, Utc::now())?;

        let state = ControllerState::new(config.free_fraction, config.minimum_workers)
            .map_err(|e| ConfigError::InvalidConfig(e.to_string()))?;
        let events = self.events.unwrap_or_default();
        let runner = self.runner.unwrap_or_else(|| {
            let runner = match config.command_timeout() {
                Some(timeout) => SystemCommandRunner::new().with_timeout(timeout),
                None => SystemCommandRunner::new(),
            };
            Arc::new(runner) as Arc<dyn CommandRunner>
        });

        let commands = &config.commands;

        let mut engine = ScheduleEngine::new(state.clone(), events.clone())
            .with_tick_interval(config.schedule_tick());
        for rule in rules {
            engine.register(rule);
        }

        let liveness = LivenessMonitor::new(
            runner.clone(),
            commands.queue_lookup.clone(),
            job.clone(),
            state.clone(),
            events.clone(),
        )
        .with_interval(config.liveness_interval());

        let feedback = FeedbackLoop::new(
            job,
            ResourceProbe::new(runner.clone(), commands.cluster_summary.clone()),
            WorkerPoolProbe::new(runner.clone(), commands.worker_pool.clone()),
            WorkerPoolController::new(runner, commands.worker_pool.clone())
                .with_dry_run(config.dry_run),
            state.clone(),
            events.clone(),
        )
        .with_policy(config.sizing_policy())
        .with_burst_interval(config.burst_interval())
        .with_max_probe_failures(config.max_probe_failures);

        Ok(Controller::new(state, events, engine, liveness, feedback))
    }
}
