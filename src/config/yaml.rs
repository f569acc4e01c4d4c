//! YAML configuration parsing.
//!
//! Parses the controller configuration from YAML files and validates its
//! values. Every field is optional; absent fields take their defaults.

use chrono_tz::Tz;
use std::path::Path;

use super::error::ConfigError;
use super::types::ControllerConfig;

/// YAML configuration loader.
pub struct YamlLoader;

impl YamlLoader {
    /// Load controller configuration from a file.
    pub fn load_config(path: impl AsRef<Path>) -> Result<ControllerConfig, ConfigError> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| ConfigError::FileReadError {
                path: path.to_path_buf(),
                source,
            })?;

        let config = Self::deserialize(&content).map_err(|source| ConfigError::YamlFileError {
            path: path.to_path_buf(),
            source,
        })?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    /// Parse controller configuration from a YAML string.
    pub fn parse_config(yaml: &str) -> Result<ControllerConfig, ConfigError> {
        let config = Self::deserialize(yaml)?;
        Self::validate_config(&config)?;
        Ok(config)
    }

    fn deserialize(yaml: &str) -> Result<ControllerConfig, serde_yaml::Error> {
        // An empty document is an empty mapping, not an error.
        if yaml.trim().is_empty() {
            return Ok(ControllerConfig::default());
        }
        serde_yaml::from_str(yaml)
    }

    /// Validate value ranges. Rule syntax is checked when rules are built.
    pub fn validate_config(config: &ControllerConfig) -> Result<(), ConfigError> {
        if config.burst_interval_minutes == 0 {
            return Err(ConfigError::InvalidConfig(
                "burst_interval_minutes must be greater than 0".into(),
            ));
        }

        if !(0.0..=1.0).contains(&config.free_fraction) {
            return Err(ConfigError::InvalidConfig(format!(
                "free_fraction {} must be within [0, 1]",
                config.free_fraction
            )));
        }

        for (name, factor) in [
            ("add_factor", config.add_factor),
            ("quench_factor", config.quench_factor),
        ] {
            if !(factor.is_finite() && factor > 0.0) {
                return Err(ConfigError::InvalidConfig(format!(
                    "{} must be a positive number, got {}",
                    name, factor
                )));
            }
        }

        if config.liveness_interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "liveness_interval_secs must be greater than 0".into(),
            ));
        }

        if config.schedule_tick_millis == 0 {
            return Err(ConfigError::InvalidConfig(
                "schedule_tick_millis must be greater than 0".into(),
            ));
        }

        if config.command_timeout_secs == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "command_timeout_secs must be greater than 0".into(),
            ));
        }

        if config.max_probe_failures == Some(0) {
            return Err(ConfigError::InvalidConfig(
                "max_probe_failures must be greater than 0".into(),
            ));
        }

        if config.timezone.parse::<Tz>().is_err() {
            return Err(ConfigError::InvalidConfig(format!(
                "unknown timezone '{}'",
                config.timezone
            )));
        }

        let commands = &config.commands;
        for (name, spec) in [
            ("cluster_summary", &commands.cluster_summary),
            ("worker_pool", &commands.worker_pool),
            ("queue_lookup", &commands.queue_lookup),
        ] {
            if spec.program.trim().is_empty() {
                return Err(ConfigError::MissingField(format!(
                    "commands.{}.program",
                    name
                )));
            }
        }

        Ok(())
    }
}
