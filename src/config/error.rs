//! Configuration error types.
//!
//! This module defines error types for configuration loading and validation.

use std::path::PathBuf;
use thiserror::Error;

use crate::core::types::JobSpecError;
use crate::scheduler::RuleError;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read a specific file with context.
    #[error("failed to read file '{path}': {source}")]
    FileReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse YAML.
    #[error("YAML parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// Failed to parse YAML from a specific file.
    #[error("YAML parse error in '{path}': {source}")]
    YamlFileError {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required field is missing or empty.
    #[error("missing required field: {0}")]
    MissingField(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A schedule rule could not be parsed.
    #[error("invalid rule: {0}")]
    InvalidRule(#[from] RuleError),

    /// A schedule rule will never fire.
    #[error("rule '{0}' has no future occurrence")]
    NoFutureOccurrence(String),

    /// The job-spec could not be resolved.
    #[error("invalid job: {0}")]
    JobSpec(#[from] JobSpecError),
}
