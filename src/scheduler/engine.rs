//! Schedule engine for time-triggered retargeting.
//!
//! Each registered [`ScheduleRule`] is either armed with its next fire time
//! or exhausted. On every tick, due rules fire once (however many
//! occurrences were missed since the last tick) and are re-armed for their
//! next occurrence after the tick.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::core::state::ControllerState;
use crate::events::{Event, EventBus};

use super::handle::{COMMAND_CHANNEL_BUFFER, ScheduleHandle};
use super::types::{RuleState, ScheduleRule, SchedulerCommand, SchedulerError, SchedulerState};

/// Default time between two schedule checks.
pub const DEFAULT_TICK_INTERVAL: Duration = Duration::from_secs(1);

// Caps the missed-occurrence count for very frequent patterns.
const MAX_COUNT_ITERATIONS: usize = 100;

/// Fires schedule rules against the shared controller state.
pub struct ScheduleEngine {
    rules: Vec<ScheduleRule>,
    /// Parallel to `rules`.
    arming: Vec<RuleState>,
    state: ControllerState,
    events: Arc<EventBus>,
    tick_interval: Duration,
}

impl ScheduleEngine {
    /// Create an engine with no rules.
    pub fn new(state: ControllerState, events: Arc<EventBus>) -> Self {
        Self {
            rules: Vec::new(),
            arming: Vec::new(),
            state,
            events,
            tick_interval: DEFAULT_TICK_INTERVAL,
        }
    }

    /// Set the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Builder: register a rule.
    pub fn with_rule(mut self, rule: ScheduleRule) -> Self {
        self.register(rule);
        self
    }

    /// Register a rule, armed for its next occurrence after now.
    pub fn register(&mut self, rule: ScheduleRule) {
        self.arming.push(RuleState::after(&rule, Utc::now()));
        self.rules.push(rule);
    }

    /// Re-arm every rule for its next occurrence after `now`.
    pub fn arm_at(&mut self, now: DateTime<Utc>) {
        self.arming = self
            .rules
            .iter()
            .map(|rule| RuleState::after(rule, now))
            .collect();
    }

    pub fn rules(&self) -> &[ScheduleRule] {
        &self.rules
    }

    /// Arming state of the rule at `index`, in registration order.
    pub fn rule_state(&self, index: usize) -> Option<RuleState> {
        self.arming.get(index).copied()
    }

    /// Fire every rule due at `now` and re-arm it. Returns how many fired.
    ///
    /// Due rules fire in order of their latest due occurrence, so the most
    /// recent one determines the resulting target.
    pub async fn check_rules(&mut self, now: DateTime<Utc>) -> usize {
        let mut due = Vec::new();

        for (index, rule) in self.rules.iter().enumerate() {
            let RuleState::Armed(first) = self.arming[index] else {
                continue;
            };
            if first > now {
                continue;
            }

            let mut occurrence_count = 1;
            let mut latest = first;
            let mut next = RuleState::Exhausted;
            loop {
                if occurrence_count >= MAX_COUNT_ITERATIONS {
                    // The latest occurrence is somewhere before `now`.
                    latest = now;
                    next = RuleState::after(rule, now);
                    break;
                }
                match rule.next_fire_after(latest) {
                    Ok(t) if t <= now => {
                        occurrence_count += 1;
                        latest = t;
                    }
                    Ok(t) => {
                        next = RuleState::Armed(t);
                        break;
                    }
                    Err(_) => break,
                }
            }

            if occurrence_count >= MAX_COUNT_ITERATIONS {
                warn!(
                    rule = rule.name(),
                    now = %now,
                    missed_occurrences = format!("{}+", occurrence_count),
                    "Many scheduled occurrences missed ({}+), firing once",
                    MAX_COUNT_ITERATIONS
                );
            } else if occurrence_count > 1 {
                warn!(
                    rule = rule.name(),
                    now = %now,
                    missed_occurrences = occurrence_count,
                    "Multiple scheduled occurrences missed, firing once"
                );
            } else {
                debug!(rule = rule.name(), fire_time = %first, "Found scheduled occurrence");
            }

            if next == RuleState::Exhausted {
                info!(rule = rule.name(), "Rule has no further occurrences");
            }

            self.arming[index] = next;
            due.push((latest, index));
        }

        // Stable: ties keep registration order.
        due.sort_by_key(|(at, _)| *at);
        for (_, index) in &due {
            if let Err(e) = self.fire_rule(*index).await {
                warn!(rule = self.rules[*index].name(), error = %e, "Failed to fire rule");
            }
        }
        due.len()
    }

    /// Apply a rule's target. Returns the previous target.
    async fn fire_rule(&self, index: usize) -> Result<f64, SchedulerError> {
        let rule = &self.rules[index];
        let target = rule.target_fraction();
        let previous = self.state.set_target_free_fraction(target).await?;

        info!(
            rule = rule.name(),
            intent = %rule.intent(),
            previous,
            target,
            "Schedule rule fired, minimum free fraction is now {}",
            target
        );
        self.events
            .emit(Event::target_changed(rule.name(), rule.intent(), previous, target))
            .await;
        Ok(previous)
    }

    /// Fire the first rule named `name`.
    pub async fn fire_by_name(&self, name: &str) -> Result<f64, SchedulerError> {
        let index = self
            .rules
            .iter()
            .position(|r| r.name() == name)
            .ok_or_else(|| SchedulerError::RuleNotFound(name.to_string()))?;
        self.fire_rule(index).await
    }

    /// Start the engine on its own task and return a handle for controlling it.
    pub fn start(self) -> (ScheduleHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_CHANNEL_BUFFER);
        let state = Arc::new(RwLock::new(SchedulerState::Running));

        let handle = ScheduleHandle {
            command_tx,
            state: Arc::clone(&state),
        };

        let task = tokio::spawn(async move {
            self.run(command_rx, state).await;
        });

        (handle, task)
    }

    /// Main engine loop.
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        state: Arc<RwLock<SchedulerState>>,
    ) {
        let mut interval = tokio::time::interval(self.tick_interval);
        let controller = self.state.clone();
        info!(rules = self.rules.len(), "Schedule engine started");

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if !controller.is_running().await {
                        break;
                    }
                    self.check_rules(Utc::now()).await;
                }

                Some(command) = command_rx.recv() => {
                    match command {
                        SchedulerCommand::Fire { rule, response } => {
                            let result = self.fire_by_name(&rule).await;
                            let _ = response.send(result);
                        }
                        SchedulerCommand::Shutdown { response } => {
                            *state.write().await = SchedulerState::Stopped;
                            let _ = response.send(());
                            break;
                        }
                    }
                }

                _ = controller.wait_stopped() => {
                    debug!("Controller stopped, schedule engine exiting");
                    break;
                }
            }
        }

        *state.write().await = SchedulerState::Stopped;
        info!("Schedule engine stopped");
    }
}
