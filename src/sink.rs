// src/sink.rs

//! Where supervisor notifications go.
//!
//! The supervisor only needs to hand a [`Notification`] over without
//! waiting: no acknowledgement, no backpressure. A console view, a progress
//! dialog or a test collector can all sit behind this trait.

use std::fmt;

use tokio::sync::mpsc;
use tracing::debug;

use crate::model::Notification;

/// Consumer of output lines, progress snapshots and terminal results.
///
/// `notify` is called from the supervisor's worker tasks and must not block.
/// Notifications of one run arrive in the order they were produced, with the
/// terminal `Finished` always last.
pub trait NotificationSink: Send + Sync {
    fn notify(&self, notification: Notification);
}

/// Forward notifications into an unbounded Tokio channel.
///
/// A closed receiver is not an error for the supervisor; the notification
/// is dropped.
impl NotificationSink for mpsc::UnboundedSender<Notification> {
    fn notify(&self, notification: Notification) {
        if self.send(notification).is_err() {
            debug!("notification receiver dropped; discarding notification");
        }
    }
}

/// Adapter turning a closure into a sink.
pub struct FnSink<F>(pub F);

impl<F> fmt::Debug for FnSink<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSink").finish_non_exhaustive()
    }
}

impl<F> NotificationSink for FnSink<F>
where
    F: Fn(Notification) + Send + Sync,
{
    fn notify(&self, notification: Notification) {
        (self.0)(notification)
    }
}

/// Convenience: a sink backed by a fresh unbounded channel.
pub fn channel_sink() -> (
    mpsc::UnboundedSender<Notification>,
    mpsc::UnboundedReceiver<Notification>,
) {
    mpsc::unbounded_channel()
}
