// src/exec/progress.rs

//! Synthetic progress for jobs that report none.
//!
//! [`ProgressEstimator`] is a small synchronous state machine: it only moves
//! forward, in fixed steps, and never passes its ceiling until the run is
//! confirmed successful. [`spawn_ticker`] drives it from a Tokio interval and
//! publishes every change as a [`ProgressSnapshot`].

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::exec::cancel::CancellationController;
use crate::model::{Notification, ProgressSnapshot, RunId};
use crate::sink::NotificationSink;

pub const LABEL_STARTING: &str = "Starting...";
pub const LABEL_RUNNING: &str = "In progress...";
pub const LABEL_FINALIZING: &str = "Finalizing...";
pub const LABEL_COMPLETED: &str = "Completed";
pub const LABEL_FAILED: &str = "Failed";
pub const LABEL_CANCELLED: &str = "Cancelled";

/// Percentage reported while the finished job is being wrapped up.
const FINALIZING_PERCENT: u8 = 98;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressOptions {
    /// Time between two steps.
    pub tick: Duration,
    /// Percentage added per tick.
    pub step: u8,
    /// Highest percentage reachable by ticking alone. Must be below 100.
    pub ceiling: u8,
}

impl Default for ProgressOptions {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            step: 1,
            ceiling: 95,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEstimator {
    options: ProgressOptions,
    percent: u8,
}

impl ProgressEstimator {
    pub fn new(options: ProgressOptions) -> Self {
        Self {
            options: ProgressOptions {
                ceiling: options.ceiling.min(99),
                ..options
            },
            percent: 0,
        }
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn ceiling(&self) -> u8 {
        self.options.ceiling
    }

    /// Start of a new run.
    pub fn reset(&mut self) -> u8 {
        self.percent = 0;
        self.percent
    }

    /// Advance by one step. Returns the new value, or `None` when already
    /// sitting at the ceiling.
    pub fn tick(&mut self) -> Option<u8> {
        let next = self
            .percent
            .saturating_add(self.options.step)
            .min(self.options.ceiling);
        if next > self.percent {
            self.percent = next;
            Some(next)
        } else {
            None
        }
    }

    /// The job finished successfully and is being wrapped up.
    pub fn finalize(&mut self) -> u8 {
        self.percent = self.percent.max(FINALIZING_PERCENT);
        self.percent
    }

    /// Success confirmed.
    pub fn complete(&mut self) -> u8 {
        self.percent = 100;
        self.percent
    }

    /// Failure or cancellation: drop back to zero rather than leave a stale
    /// value behind.
    pub fn abort(&mut self) -> u8 {
        self.percent = 0;
        self.percent
    }
}

/// Shared handle to an estimator, locked by the ticker and the supervisor.
pub type SharedEstimator = Arc<Mutex<ProgressEstimator>>;

/// Run `f` against the estimator, recovering from a poisoned lock.
pub fn with_estimator<T>(estimator: &SharedEstimator, f: impl FnOnce(&mut ProgressEstimator) -> T) -> T {
    let mut guard = estimator.lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut guard)
}

pub fn snapshot(run_id: RunId, percent: u8, label: &str) -> Notification {
    Notification::Progress(ProgressSnapshot {
        run_id,
        percent,
        label: label.to_string(),
    })
}

/// Tick `estimator` on its cadence until the run is cancelled or the
/// returned handle is aborted.
///
/// The first step happens one full tick after start; the initial 0% snapshot
/// is the supervisor's job.
pub fn spawn_ticker(
    estimator: SharedEstimator,
    run_id: RunId,
    sink: Arc<dyn NotificationSink>,
    cancel: CancellationController,
) -> JoinHandle<()> {
    let tick = with_estimator(&estimator, |e| e.options.tick);

    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick of a Tokio interval completes immediately.
        interval.tick().await;

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = cancel.cancelled() => break,
            }

            // Notify under the lock; finalize/abort take it too.
            with_estimator(&estimator, |e| {
                if let Some(percent) = e.tick() {
                    sink.notify(snapshot(run_id, percent, LABEL_RUNNING));
                }
            });
        }

        debug!(run_id, "progress ticker stopped");
    })
}
