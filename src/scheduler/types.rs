//! Scheduler type definitions.
//!
//! This module contains rule types, error types, state enums, and command
//! types for the schedule engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::schedule::{Schedule, ScheduleError};
use crate::core::state::StateError;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// No rule with this name is registered.
    #[error("rule not found: {0}")]
    RuleNotFound(String),

    /// The rule's target was rejected by the controller state.
    #[error("state error: {0}")]
    State(#[from] StateError),

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// Errors raised while parsing a `<fraction>:<pattern>` rule.
#[derive(Debug, Error, PartialEq)]
pub enum RuleError {
    /// No `:` between fraction and pattern.
    #[error("rule '{0}' must look like <fraction>:<sec> <min> <hour> <day> <month> <year> <dow>")]
    MissingSeparator(String),

    /// The fraction is not a number.
    #[error("rule '{rule}': '{value}' is not a number")]
    InvalidFraction { rule: String, value: String },

    /// The fraction is outside `[0, 1]`.
    #[error("rule '{rule}': fraction {value} is outside [0, 1]")]
    FractionOutOfRange { rule: String, value: f64 },

    /// The time pattern is invalid.
    #[error("rule '{rule}': {source}")]
    Schedule {
        rule: String,
        #[source]
        source: ScheduleError,
    },
}

/// What a rule is meant to do to the pool. Only affects logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Add,
    Quench,
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::Add => write!(f, "add"),
            Intent::Quench => write!(f, "quench"),
        }
    }
}

/// A time-triggered retargeting rule.
#[derive(Debug, Clone)]
pub struct ScheduleRule {
    name: String,
    schedule: Schedule,
    target_fraction: f64,
    intent: Intent,
}

impl ScheduleRule {
    /// Create a rule from its parts. The target must be within `[0, 1]`.
    pub fn new(
        name: impl Into<String>,
        schedule: Schedule,
        target_fraction: f64,
        intent: Intent,
    ) -> Result<Self, RuleError> {
        let name = name.into();
        if !(0.0..=1.0).contains(&target_fraction) {
            return Err(RuleError::FractionOutOfRange {
                rule: name,
                value: target_fraction,
            });
        }
        Ok(Self {
            name,
            schedule,
            target_fraction,
            intent,
        })
    }

    /// Parse `"<fraction>:<sec> <min> <hour> <day> <month> <year> <dow>"`,
    /// evaluating the pattern in `timezone`.
    ///
    /// The rule text, trimmed, becomes the rule's name.
    pub fn parse(text: &str, intent: Intent, timezone: &str) -> Result<Self, RuleError> {
        let name = text.trim();
        let (fraction, pattern) = name
            .split_once(':')
            .ok_or_else(|| RuleError::MissingSeparator(name.to_string()))?;

        let fraction = fraction.trim();
        let target = fraction
            .parse::<f64>()
            .map_err(|_| RuleError::InvalidFraction {
                rule: name.to_string(),
                value: fraction.to_string(),
            })?;

        let schedule =
            Schedule::with_timezone(pattern.trim(), timezone).map_err(|source| {
                RuleError::Schedule {
                    rule: name.to_string(),
                    source,
                }
            })?;

        Self::new(name, schedule, target, intent)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    pub fn target_fraction(&self) -> f64 {
        self.target_fraction
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    /// Next fire time strictly after `after`.
    pub fn next_fire_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        self.schedule.next_after(after)
    }
}

/// Arming state of one rule inside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleState {
    /// The rule fires at this instant.
    Armed(DateTime<Utc>),
    /// The pattern has no further occurrence.
    Exhausted,
}

impl RuleState {
    pub(crate) fn after(rule: &ScheduleRule, after: DateTime<Utc>) -> Self {
        match rule.next_fire_after(after) {
            Ok(next) => RuleState::Armed(next),
            Err(_) => RuleState::Exhausted,
        }
    }
}

/// State of the schedule engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// The engine has stopped ticking.
    Stopped,
    /// The engine is ticking.
    Running,
}

/// Commands that can be sent to the schedule engine.
pub(crate) enum SchedulerCommand {
    /// Fire a rule by name, outside its schedule.
    Fire {
        rule: String,
        response: oneshot::Sender<Result<f64, SchedulerError>>,
    },
    /// Shutdown the engine.
    Shutdown { response: oneshot::Sender<()> },
}
