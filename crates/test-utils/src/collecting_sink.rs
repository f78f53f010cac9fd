use std::sync::{Arc, Mutex};

use tokio::sync::Notify;

use runwatch::model::{ExecutionResult, Notification, OutputEvent, ProgressSnapshot, RunId};
use runwatch::sink::NotificationSink;

/// A sink that records every notification, in delivery order.
///
/// Clones share the same record, so a test can hand one clone to the
/// supervisor and inspect another.
#[derive(Clone, Default)]
pub struct CollectingSink {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    received: Mutex<Vec<Notification>>,
    changed: Notify,
}

impl NotificationSink for CollectingSink {
    fn notify(&self, notification: Notification) {
        self.inner.received.lock().unwrap().push(notification);
        self.inner.changed.notify_waiters();
    }
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn all(&self) -> Vec<Notification> {
        self.inner.received.lock().unwrap().clone()
    }

    pub fn for_run(&self, run_id: RunId) -> Vec<Notification> {
        self.all()
            .into_iter()
            .filter(|n| n.run_id() == run_id)
            .collect()
    }

    pub fn outputs(&self) -> Vec<OutputEvent> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Output(e) => Some(e),
                _ => None,
            })
            .collect()
    }

    pub fn output_lines(&self) -> Vec<String> {
        self.outputs().into_iter().map(|e| e.line).collect()
    }

    pub fn progress(&self) -> Vec<ProgressSnapshot> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn results(&self) -> Vec<ExecutionResult> {
        self.all()
            .into_iter()
            .filter_map(|n| match n {
                Notification::Finished(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    /// Wait until at least `count` terminal results have arrived.
    pub async fn wait_for_results(&self, count: usize) -> Vec<ExecutionResult> {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            let results = self.results();
            if results.len() >= count {
                return results;
            }
            changed.await;
        }
    }

    /// Wait until some output line satisfies `pred`.
    pub async fn wait_for_line(&self, pred: impl Fn(&str) -> bool) {
        loop {
            let changed = self.inner.changed.notified();
            tokio::pin!(changed);
            changed.as_mut().enable();

            if self.outputs().iter().any(|e| pred(&e.line)) {
                return;
            }
            changed.await;
        }
    }
}
