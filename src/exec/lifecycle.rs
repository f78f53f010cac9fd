// src/exec/lifecycle.rs

//! Supervisor state machine.
//!
//! ```text
//! Idle -> Launching -> Running -> Finished(kind) -> Idle
//! Idle -> Finished(SpawnError) -> Idle              (request rejected)
//! Idle -> Launching -> Finished(SpawnError) -> Idle (spawn failed)
//! ```
//!
//! Pure data, no Tokio: the supervisor records every move through
//! [`SupervisorState::advance`] and refuses the ones not in the diagram.

use std::fmt;

use crate::model::Outcome;

/// Terminal kind of a run, without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalKind {
    Completed,
    Failed,
    Cancelled,
    TimedOut,
    SpawnError,
}

impl From<&Outcome> for TerminalKind {
    fn from(outcome: &Outcome) -> Self {
        match outcome {
            Outcome::Completed { .. } => TerminalKind::Completed,
            Outcome::Failed { .. } => TerminalKind::Failed,
            Outcome::Cancelled(_) => TerminalKind::Cancelled,
            Outcome::TimedOut => TerminalKind::TimedOut,
            Outcome::SpawnError(_) => TerminalKind::SpawnError,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Idle,
    Launching,
    Running,
    Finished(TerminalKind),
}

impl Default for SupervisorState {
    fn default() -> Self {
        SupervisorState::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: SupervisorState,
    pub to: SupervisorState,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid supervisor transition {:?} -> {:?}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}

impl SupervisorState {
    pub fn is_active(self) -> bool {
        matches!(self, SupervisorState::Launching | SupervisorState::Running)
    }

    pub fn can_advance_to(self, to: SupervisorState) -> bool {
        use SupervisorState::*;

        match (self, to) {
            (Idle, Launching) => true,
            (Idle, Finished(TerminalKind::SpawnError)) => true,
            (Launching, Running) => true,
            (Launching, Finished(TerminalKind::SpawnError)) => true,
            (Running, Finished(kind)) => kind != TerminalKind::SpawnError,
            (Finished(_), Idle) => true,
            _ => false,
        }
    }

    /// Move to `to`, or report why that move is not allowed.
    pub fn advance(&mut self, to: SupervisorState) -> Result<(), InvalidTransition> {
        if self.can_advance_to(to) {
            *self = to;
            Ok(())
        } else {
            Err(InvalidTransition { from: *self, to })
        }
    }
}
