//! External command execution.
//!
//! This module provides the seam through which every probe and control
//! command reaches the cluster.

mod command;

pub use command::{
    CommandError, CommandOutput, CommandRunner, CommandSpec, JOB_PLACEHOLDER, SystemCommandRunner,
};
