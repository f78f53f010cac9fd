// src/exec/mod.rs

//! Process execution layer.
//!
//! This module runs one external command at a time with
//! `tokio::process::Command` and reports what happens through a
//! [`NotificationSink`](crate::sink::NotificationSink).
//!
//! - [`supervisor`] owns the run lifecycle (`launch` / `cancel` / `wait`).
//! - [`stream_reader`] turns stdout/stderr into `OutputEvent`s.
//! - [`progress`] estimates progress for jobs that report none.
//! - [`cancel`] holds the shared cancellation flag and the graceful-then-forced
//!   termination of the child.
//! - [`artifact`] manages the transient script file of interactive runs.
//! - [`lifecycle`] is the supervisor's state machine.

pub mod artifact;
pub mod cancel;
pub mod lifecycle;
pub mod progress;
pub mod stream_reader;
pub mod supervisor;

pub use cancel::CancellationController;
pub use lifecycle::{SupervisorState, TerminalKind};
pub use progress::{ProgressEstimator, ProgressOptions};
pub use stream_reader::{StreamReader, StreamSummary};
pub use supervisor::{ProcessHandle, ProcessSupervisor, RunHandle, SupervisorOptions};
