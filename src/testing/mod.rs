//! Testing utilities for users of the r-scheduler library.
//!
//! This module provides helpers for exercising the controller without a
//! cluster:
//!
//! - [`ScriptedRunner`]: A [`CommandRunner`] that replays queued replies and
//!   records every invocation
//! - [`RecordingHandler`]: An [`EventHandler`] that keeps every event it sees

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::io;
use std::sync::Mutex;
use std::time::Duration;

use crate::events::{Event, EventHandler};
use crate::execution::{CommandError, CommandOutput, CommandRunner, CommandSpec};

/// A scripted reply to one command invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The command ran and produced this output.
    Output(CommandOutput),
    /// The command could not be started.
    Unavailable,
    /// The command exceeded its timeout.
    Timeout(Duration),
}

impl Reply {
    /// Successful run printing `stdout`.
    pub fn stdout(stdout: impl Into<String>) -> Self {
        Reply::Output(CommandOutput {
            code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        })
    }

    /// Run that exits with `code` and prints `stderr`.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Reply::Output(CommandOutput {
            code,
            stdout: String::new(),
            stderr: stderr.into(),
        })
    }

    fn into_result(self, program: &str) -> Result<CommandOutput, CommandError> {
        match self {
            Reply::Output(output) => Ok(output),
            Reply::Unavailable => Err(CommandError::Spawn {
                program: program.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "scripted: not found"),
            }),
            Reply::Timeout(duration) => Err(CommandError::Timeout {
                program: program.to_string(),
                duration,
            }),
        }
    }
}

#[derive(Default)]
struct Script {
    /// Replies for any program, consumed in order.
    shared: VecDeque<Reply>,
    /// Replies for a specific program, consumed before `shared`.
    by_program: HashMap<String, VecDeque<Reply>>,
    /// Replies repeated once a program's queue is empty.
    fallback: HashMap<String, Reply>,
    calls: Vec<CommandSpec>,
}

/// A command runner that replays scripted replies.
///
/// Replies are looked up in this order: the queue for the invoked program,
/// the shared queue, then the program's fallback. An invocation with no
/// reply behaves like a missing program.
///
/// # Example
///
/// ```
/// use rscheduler::testing::{Reply, ScriptedRunner};
/// use rscheduler::{CommandRunner, CommandSpec};
///
/// # tokio_test(async {
/// let runner = ScriptedRunner::new();
/// runner.push_for("analyze", Reply::stdout("320 CPUs: 0 down, 280 busy, 40 free\n"));
/// runner.always("qstat", Reply::stdout(""));
///
/// let output = runner.run(&CommandSpec::new("analyze")).await.unwrap();
/// assert!(output.stdout.contains("40 free"));
/// assert_eq!(runner.invocations(), vec!["analyze".to_string()]);
/// # });
/// # fn tokio_test<F: std::future::Future>(f: F) {
/// #     tokio::runtime::Runtime::new().unwrap().block_on(f);
/// # }
/// ```
#[derive(Default)]
pub struct ScriptedRunner {
    script: Mutex<Script>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a reply for whichever program runs next.
    pub fn push(&self, reply: Reply) {
        self.lock().shared.push_back(reply);
    }

    /// Queue a successful output for whichever program runs next.
    pub fn push_stdout(&self, stdout: impl Into<String>) {
        self.push(Reply::stdout(stdout));
    }

    /// Queue a captured output for whichever program runs next.
    pub fn push_output(&self, output: CommandOutput) {
        self.push(Reply::Output(output));
    }

    /// Queue a non-zero exit for whichever program runs next.
    pub fn push_failure(&self, code: i32, stderr: impl Into<String>) {
        self.push(Reply::failure(code, stderr));
    }

    /// Queue a reply for the next run of `program`.
    pub fn push_for(&self, program: impl Into<String>, reply: Reply) {
        self.lock()
            .by_program
            .entry(program.into())
            .or_default()
            .push_back(reply);
    }

    /// Reply to `program` with `reply` whenever nothing else is queued for it.
    pub fn always(&self, program: impl Into<String>, reply: Reply) {
        self.lock().fallback.insert(program.into(), reply);
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.lock().calls.clone()
    }

    /// Every command run so far, rendered as command lines.
    pub fn invocations(&self) -> Vec<String> {
        self.lock().calls.iter().map(CommandSpec::render).collect()
    }

    /// Rendered command lines whose program is `program`.
    pub fn invocations_of(&self, program: &str) -> Vec<String> {
        self.lock()
            .calls
            .iter()
            .filter(|c| c.program == program)
            .map(CommandSpec::render)
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Script> {
        self.script.lock().expect("lock poisoned")
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CommandError> {
        let reply = {
            let mut script = self.lock();
            script.calls.push(spec.clone());

            script
                .by_program
                .get_mut(&spec.program)
                .and_then(VecDeque::pop_front)
                .or_else(|| script.shared.pop_front())
                .or_else(|| script.fallback.get(&spec.program).cloned())
                .unwrap_or(Reply::Unavailable)
        };

        reply.into_result(&spec.program)
    }
}

/// An event handler that records received events.
#[derive(Default)]
pub struct RecordingHandler {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every event received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
