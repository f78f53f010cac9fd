// src/exec/stream_reader.rs

//! Line reader for one output stream of a child process.
//!
//! Each reader runs on its own Tokio task, turns every line into an
//! [`OutputEvent`] and hands it to the sink straight away. A reader stops at
//! end-of-stream or as soon as the run is cancelled; a read error ends only
//! this reader, after emitting one diagnostic event.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::exec::cancel::CancellationController;
use crate::model::{Notification, OutputEvent, RunId};
use crate::sink::NotificationSink;
use crate::types::{Severity, StreamOrigin};

/// What a finished reader reports back to the supervisor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamSummary {
    pub lines: u64,
    /// The last lines read, oldest first, bounded by the reader's tail size.
    pub tail: Vec<String>,
    /// Set when the reader stopped on an I/O error.
    pub failed: bool,
}

impl StreamSummary {
    pub fn tail_text(&self) -> String {
        self.tail.join("\n")
    }
}

/// Everything a reader needs besides the stream itself.
#[derive(Clone)]
pub struct StreamReader {
    pub run_id: RunId,
    pub origin: StreamOrigin,
    /// Shared with the sibling reader so sequence numbers are unique per run.
    pub seq: Arc<AtomicU64>,
    pub sink: Arc<dyn NotificationSink>,
    pub cancel: CancellationController,
    /// How many trailing lines to keep for the summary (0 keeps none).
    pub tail_lines: usize,
}

impl StreamReader {
    /// Start reading `stream` on a new task.
    pub fn spawn<R>(self, stream: R) -> JoinHandle<StreamSummary>
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move { self.read_to_end(stream).await })
    }

    async fn read_to_end<R>(self, stream: R) -> StreamSummary
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(stream);
        let mut buf = Vec::new();
        let mut summary = StreamSummary::default();
        let mut tail = VecDeque::with_capacity(self.tail_lines);

        loop {
            buf.clear();
            let next = tokio::select! {
                // Prefer data that is already buffered over the cancel flag.
                biased;
                next = reader.read_until(b'\n', &mut buf) => next,
                _ = self.cancel.cancelled() => {
                    debug!(run_id = self.run_id, stream = %self.origin, "reader stopped by cancellation");
                    break;
                }
            };

            match next {
                Ok(0) => {
                    debug!(run_id = self.run_id, stream = %self.origin, lines = summary.lines, "stream reached end of file");
                    break;
                }
                Ok(_) => {
                    let line = decode_line(&buf);
                    summary.lines += 1;
                    if self.tail_lines > 0 {
                        if tail.len() == self.tail_lines {
                            tail.pop_front();
                        }
                        tail.push_back(line.clone());
                    }
                    self.emit(line);
                }
                Err(e) => {
                    warn!(run_id = self.run_id, stream = %self.origin, error = %e, "error reading stream");
                    summary.failed = true;
                    self.emit_with_severity(
                        format!("Error reading {}: {e}", self.origin),
                        Severity::Error,
                    );
                    break;
                }
            }
        }

        summary.tail = tail.into();
        summary
    }

    fn emit(&self, line: String) {
        let severity = Severity::classify(self.origin, &line);
        self.emit_with_severity(line, severity);
    }

    fn emit_with_severity(&self, line: String, severity: Severity) {
        let event = OutputEvent {
            run_id: self.run_id,
            origin: self.origin,
            line,
            severity,
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            timestamp: SystemTime::now(),
        };
        self.sink.notify(Notification::Output(event));
    }
}

/// Strip the line terminator and decode, replacing invalid UTF-8.
fn decode_line(buf: &[u8]) -> String {
    let mut end = buf.len();
    if end > 0 && buf[end - 1] == b'\n' {
        end -= 1;
        if end > 0 && buf[end - 1] == b'\r' {
            end -= 1;
        }
    }
    String::from_utf8_lossy(&buf[..end]).into_owned()
}
