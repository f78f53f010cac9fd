// src/exec/cancel.rs

//! Cancellation of a run.
//!
//! [`CancellationController`] is the shared, cloneable flag every worker of a
//! run observes. Only the first [`CancellationController::request`] wins; its
//! reason is the one reported in the terminal result.
//!
//! [`terminate_child`] performs the actual two-phase shutdown of the child:
//! a graceful termination request, a bounded grace period, then a forced
//! kill. The supervisor's waiter calls it once, after observing the flag.

use std::io;
use std::process::ExitStatus;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::types::CancelReason;

#[derive(Debug, Clone)]
pub struct CancellationController {
    tx: Arc<watch::Sender<Option<CancelReason>>>,
}

impl Default for CancellationController {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationController {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Request cancellation.
    ///
    /// Returns `true` only for the call that actually flipped the flag. Any
    /// later call, from any thread, is a no-op that returns `false`.
    pub fn request(&self, reason: CancelReason) -> bool {
        let won = self.tx.send_if_modified(|current| {
            if current.is_none() {
                *current = Some(reason);
                true
            } else {
                false
            }
        });

        if won {
            info!(%reason, "cancellation requested");
        } else {
            debug!(%reason, "cancellation already in progress; ignoring request");
        }
        won
    }

    pub fn is_cancelled(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The reason of the winning request, if any.
    pub fn reason(&self) -> Option<CancelReason> {
        *self.tx.borrow()
    }

    /// Resolve once cancellation has been requested.
    pub async fn cancelled(&self) -> CancelReason {
        let mut rx = self.tx.subscribe();
        // Copy the reason out; the borrowed `Ref` must not live across an await.
        let reason: Option<CancelReason> = rx.wait_for(Option::is_some).await.ok().and_then(|r| *r);
        match reason {
            Some(reason) => reason,
            // The sender lives in `self`, so it cannot be dropped while we
            // wait; never resolve if it somehow is.
            None => std::future::pending().await,
        }
    }
}

/// Stop `child`: ask politely, wait up to `grace`, then kill.
///
/// On unix the child is expected to lead its own process group, so the
/// signals reach anything it spawned as well.
pub async fn terminate_child(child: &mut Child, grace: Duration) -> io::Result<ExitStatus> {
    let Some(pid) = child.id() else {
        // Already reaped.
        return child.wait().await;
    };

    info!(pid, grace_ms = grace.as_millis() as u64, "requesting graceful termination");
    request_graceful(child, pid);

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => {
            debug!(pid, "process exited within grace period");
            status
        }
        Err(_) => {
            warn!(pid, "process still alive after grace period; killing");
            force_kill(child, pid);
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn request_graceful(_child: &mut Child, pid: u32) {
    use nix::sys::signal::{killpg, Signal};
    use nix::unistd::Pid;

    if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        debug!(pid, error = %e, "SIGTERM to process group failed");
    }
}

#[cfg(not(unix))]
fn request_graceful(child: &mut Child, pid: u32) {
    // No graceful signal available; the grace period just lets an already
    // exiting process finish.
    if let Err(e) = child.start_kill() {
        debug!(pid, error = %e, "terminate request failed");
    }
}

fn force_kill(child: &mut Child, pid: u32) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, error = %e, "SIGKILL to process group failed");
        }
    }

    if let Err(e) = child.start_kill() {
        debug!(pid, error = %e, "kill of child failed (already exited?)");
    }
}
