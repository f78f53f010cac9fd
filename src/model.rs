// src/model.rs

//! Data flowing into and out of the supervisor.
//!
//! - [`ExecutionRequest`] is what a caller hands to `launch`.
//! - [`OutputEvent`], [`ProgressSnapshot`] and [`ExecutionResult`] are what
//!   comes back, wrapped in a [`Notification`] so they share one channel.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::errors::{Result, RunwatchError};
use crate::types::{CancelReason, ExecutionMode, Severity, StreamOrigin};

/// Identifier of one run of a supervisor. Increases with every `launch`.
pub type RunId = u64;

/// An immutable description of one process execution.
///
/// Build it with [`ExecutionRequest::new`] (an arbitrary argv) or
/// [`ExecutionRequest::script`] (source code materialized to the script
/// artifact before spawning), then chain the `with_*` setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    command: Vec<String>,
    working_dir: Option<PathBuf>,
    env: Option<BTreeMap<String, String>>,
    timeout: Option<Duration>,
    mode: ExecutionMode,
    script: Option<String>,
}

impl ExecutionRequest {
    /// A request running `command[0]` with `command[1..]` as arguments.
    pub fn new<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            command: command.into_iter().map(Into::into).collect(),
            working_dir: None,
            env: None,
            timeout: None,
            mode: ExecutionMode::InteractiveScript,
            script: None,
        }
    }

    /// An interactive-script request.
    ///
    /// The supervisor writes `source` to its well-known artifact path and
    /// appends that path to `interpreter` + `interpreter_args`.
    pub fn script<I, S>(interpreter: &str, interpreter_args: I, source: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = vec![interpreter.to_string()];
        command.extend(interpreter_args.into_iter().map(Into::into));

        Self {
            script: Some(source.into()),
            ..Self::new(command)
        }
    }

    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_timeout_secs(self, secs: u64) -> Self {
        self.with_timeout(Duration::from_secs(secs))
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn command(&self) -> &[String] {
        &self.command
    }

    pub fn working_dir(&self) -> Option<&Path> {
        self.working_dir.as_deref()
    }

    pub fn env(&self) -> Option<&BTreeMap<String, String>> {
        self.env.as_ref()
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn script_source(&self) -> Option<&str> {
        self.script.as_deref()
    }

    /// Check everything that can be checked before spawning.
    ///
    /// A missing executable is only detected by the spawn itself.
    pub fn validate(&self) -> Result<()> {
        match self.command.first() {
            None => {
                return Err(RunwatchError::InvalidRequest(
                    "command must not be empty".to_string(),
                ));
            }
            Some(program) if program.trim().is_empty() => {
                return Err(RunwatchError::InvalidRequest(
                    "executable path must not be blank".to_string(),
                ));
            }
            Some(_) => {}
        }

        if let Some(dir) = &self.working_dir {
            if !dir.is_dir() {
                return Err(RunwatchError::InvalidRequest(format!(
                    "working directory {:?} does not exist",
                    dir
                )));
            }
        }

        if self.timeout == Some(Duration::ZERO) {
            return Err(RunwatchError::InvalidRequest(
                "timeout must be greater than zero".to_string(),
            ));
        }

        if self.script.is_some() && self.mode != ExecutionMode::InteractiveScript {
            return Err(RunwatchError::InvalidRequest(
                "script source is only supported in interactive-script mode".to_string(),
            ));
        }

        Ok(())
    }
}

/// One line read from the child's stdout or stderr.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputEvent {
    pub run_id: RunId,
    pub origin: StreamOrigin,
    pub line: String,
    pub severity: Severity,
    /// Monotonic across both streams of a run.
    pub seq: u64,
    pub timestamp: SystemTime,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressSnapshot {
    pub run_id: RunId,
    /// Always in `0..=100`.
    pub percent: u8,
    pub label: String,
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Completed { exit_code: i32 },
    Failed { exit_code: i32, stderr_tail: String },
    Cancelled(CancelReason),
    TimedOut,
    SpawnError(String),
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Completed { exit_code } => write!(f, "completed (exit code {exit_code})"),
            Outcome::Failed { exit_code, .. } => write!(f, "failed (exit code {exit_code})"),
            Outcome::Cancelled(reason) => write!(f, "cancelled: {reason}"),
            Outcome::TimedOut => f.write_str("timed out"),
            Outcome::SpawnError(msg) => write!(f, "spawn error: {msg}"),
        }
    }
}

/// Terminal notification of a run. Exactly one is produced per `launch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub run_id: RunId,
    pub outcome: Outcome,
    pub duration: Duration,
}

impl ExecutionResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, Outcome::Completed { .. })
    }

    /// Exit status a CLI wrapper should report for this result.
    ///
    /// Follows shell conventions: the child's own code when it ran to
    /// completion, 124 for a timeout, 127 for a spawn failure and 130 for a
    /// cancellation.
    pub fn process_exit_code(&self) -> i32 {
        match &self.outcome {
            Outcome::Completed { exit_code } => *exit_code,
            Outcome::Failed { exit_code, .. } => {
                if *exit_code == 0 { 1 } else { *exit_code }
            }
            Outcome::Cancelled(_) => 130,
            Outcome::TimedOut => 124,
            Outcome::SpawnError(_) => 127,
        }
    }
}

/// Everything a [`crate::sink::NotificationSink`] can receive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    Output(OutputEvent),
    Progress(ProgressSnapshot),
    Finished(ExecutionResult),
}

impl Notification {
    pub fn run_id(&self) -> RunId {
        match self {
            Notification::Output(e) => e.run_id,
            Notification::Progress(p) => p.run_id,
            Notification::Finished(r) => r.run_id,
        }
    }
}
