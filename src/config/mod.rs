//! Configuration loading and parsing.
//!
//! This module provides YAML-based configuration for the controller and the
//! builder that turns it into running components.

mod builder;
mod error;
mod types;
mod yaml;

pub use builder::{ControllerBuilder, build_rules, parse_rule};
pub use error::ConfigError;
pub use types::{CommandsConfig, ControllerConfig};
pub use yaml::YamlLoader;
