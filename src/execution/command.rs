//! External command execution.
//!
//! Every call the controller makes to the cluster goes through a
//! [`CommandRunner`]. The production implementation, [`SystemCommandRunner`],
//! spawns the program with `tokio::process::Command` and captures its output;
//! tests substitute a scripted runner.
//!
//! # Error Handling
//!
//! A command can fail in three ways:
//!
//! - **Spawn failure**: [`CommandError::Spawn`] if the program cannot be
//!   started at all (e.g. not on `PATH`). This is the only error for which
//!   [`CommandError::is_unavailable`] returns `true`.
//! - **Timeout**: [`CommandError::Timeout`] if the command ran longer than the
//!   runner's timeout. The child is killed when its future is dropped.
//! - **Non-zero exit**: the runner itself returns `Ok` with the exit code;
//!   [`CommandOutput::into_success`] converts that into
//!   [`CommandError::Failed`] for callers that only accept success.
//!
//! ```rust
//! use rscheduler::CommandSpec;
//!
//! let spec = CommandSpec::new("run-parallel.sh").args(["num_worker", "1355859"]);
//! assert_eq!(spec.render(), "run-parallel.sh num_worker 1355859");
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::core::types::JobId;

/// Placeholder replaced by the monitored job ID in configured arguments.
pub const JOB_PLACEHOLDER: &str = "{job}";

/// Errors raised while running an external command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("failed to run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    /// The program ran longer than allowed.
    #[error("'{program}' timed out after {duration:?}")]
    Timeout { program: String, duration: Duration },

    /// The program exited with a non-zero status.
    #[error("'{program}' exited with code {code}: {stderr}")]
    Failed {
        program: String,
        code: i32,
        stderr: String,
    },
}

impl CommandError {
    /// Check whether the command could not be run at all, as opposed to
    /// running and failing.
    pub fn is_unavailable(&self) -> bool {
        matches!(self, CommandError::Spawn { .. })
    }
}

/// A program and its arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append a single argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Copy of this command with every `{job}` in its arguments replaced.
    pub fn for_job(&self, job: &JobId) -> Self {
        Self {
            program: self.program.clone(),
            args: self
                .args
                .iter()
                .map(|a| a.replace(JOB_PLACEHOLDER, job.as_str()))
                .collect(),
        }
    }

    /// Shell-like rendering for log lines.
    pub fn render(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            if arg.is_empty() || arg.contains(char::is_whitespace) {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `-1` if the process was terminated by a signal.
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }

    /// Return the output if the exit code was zero, otherwise a
    /// [`CommandError::Failed`] naming `program`.
    pub fn into_success(self, program: &str) -> Result<Self, CommandError> {
        if self.success() {
            Ok(self)
        } else {
            Err(CommandError::Failed {
                program: program.to_string(),
                code: self.code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Runs external commands.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `spec` to completion and capture its output.
    ///
    /// A non-zero exit status is not an error at this level.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError>;
}

/// Runs commands as real subprocesses.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandRunner {
    timeout: Option<Duration>,
}

impl SystemCommandRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the per-command timeout.
    pub fn with_timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

#[async_trait]
impl CommandRunner for SystemCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        debug!(command = %spec, "running command");

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let spawn_error = |source| CommandError::Spawn {
            program: spec.program.clone(),
            source,
        };

        let output = match self.timeout {
            Some(duration) => timeout(duration, cmd.output())
                .await
                .map_err(|_| CommandError::Timeout {
                    program: spec.program.clone(),
                    duration,
                })?
                .map_err(spawn_error)?,
            None => cmd.output().await.map_err(spawn_error)?,
        };

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}
