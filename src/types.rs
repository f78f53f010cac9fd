// src/types.rs

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;

/// How a request should be supervised.
///
/// - `InteractiveScript`: a user script, run with its output streamed to a
///   console. No synthetic progress.
/// - `OpaqueBuild`: a long-running external tool (e.g. a packager) whose real
///   completion fraction is unknown; a synthetic progress estimate is driven
///   by wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionMode {
    InteractiveScript,
    OpaqueBuild,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::InteractiveScript
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "interactive-script" | "script" => Ok(ExecutionMode::InteractiveScript),
            "opaque-build" | "build" => Ok(ExecutionMode::OpaqueBuild),
            other => Err(format!(
                "invalid execution mode: {other} (expected \"interactive-script\" or \"opaque-build\")"
            )),
        }
    }
}

/// Which output stream of the child a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamOrigin {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamOrigin::Stdout => f.write_str("stdout"),
            StreamOrigin::Stderr => f.write_str("stderr"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Normal,
    Error,
}

impl Severity {
    /// Classify a line of output.
    ///
    /// Anything on stderr is an error, as is any line containing "error" in
    /// any letter case (so "error-free" counts too).
    pub fn classify(origin: StreamOrigin, line: &str) -> Self {
        if origin == StreamOrigin::Stderr || line.to_lowercase().contains("error") {
            Severity::Error
        } else {
            Severity::Normal
        }
    }
}

/// Why a run was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    /// Explicit `cancel()` from a caller.
    UserRequested,
    /// The watchdog fired because the configured timeout elapsed.
    Timeout,
    /// A new `launch` arrived while this run was still active.
    Superseded,
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancelReason::UserRequested => f.write_str("cancelled by user"),
            CancelReason::Timeout => f.write_str("timed out"),
            CancelReason::Superseded => f.write_str("superseded by a new run"),
        }
    }
}

/// Lifecycle of the child process behind a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessStatus {
    Launching,
    Running,
    Terminating,
    Terminated,
}
