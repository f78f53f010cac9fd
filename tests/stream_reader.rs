// tests/stream_reader.rs

mod common;
use crate::common::{CollectingSink, init_tracing, with_timeout};

use std::io::{self, Cursor};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::AtomicU64;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, ReadBuf};

use runwatch::exec::{CancellationController, StreamReader};
use runwatch::types::{CancelReason, Severity, StreamOrigin};

fn reader(origin: StreamOrigin, sink: &CollectingSink, tail_lines: usize) -> StreamReader {
    StreamReader {
        run_id: 1,
        origin,
        seq: Arc::new(AtomicU64::new(0)),
        sink: Arc::new(sink.clone()),
        cancel: CancellationController::new(),
        tail_lines,
    }
}

/// Yields some bytes, then fails.
struct BrokenPipe {
    sent: bool,
}

impl AsyncRead for BrokenPipe {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        if self.sent {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "pipe went away")))
        } else {
            self.sent = true;
            buf.put_slice(b"before failure\n");
            Poll::Ready(Ok(()))
        }
    }
}

#[tokio::test]
async fn lines_are_split_and_terminators_stripped() {
    init_tracing();
    let sink = CollectingSink::new();
    let input = Cursor::new(b"first\r\nsecond\n\nlast without newline".to_vec());

    let summary = with_timeout(reader(StreamOrigin::Stdout, &sink, 0).spawn(input))
        .await
        .unwrap();

    assert_eq!(
        sink.output_lines(),
        vec!["first", "second", "", "last without newline"]
    );
    assert_eq!(summary.lines, 4);
    assert!(summary.tail.is_empty());
    assert!(!summary.failed);
}

#[tokio::test]
async fn invalid_utf8_is_replaced_not_fatal() {
    init_tracing();
    let sink = CollectingSink::new();
    let input = Cursor::new(b"ok\nbad \xff\xfe bytes\nstill ok\n".to_vec());

    let summary = with_timeout(reader(StreamOrigin::Stdout, &sink, 0).spawn(input))
        .await
        .unwrap();

    let lines = sink.output_lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[1].starts_with("bad "));
    assert!(lines[1].contains('\u{FFFD}'));
    assert_eq!(lines[2], "still ok");
    assert!(!summary.failed);
}

#[tokio::test]
async fn tail_is_bounded() {
    init_tracing();
    let sink = CollectingSink::new();
    let input = Cursor::new(b"a\nb\nc\nd\n".to_vec());

    let summary = with_timeout(reader(StreamOrigin::Stderr, &sink, 3).spawn(input))
        .await
        .unwrap();

    assert_eq!(summary.tail, vec!["b", "c", "d"]);
    assert_eq!(summary.tail_text(), "b\nc\nd");
    assert!(sink.outputs().iter().all(|e| e.severity == Severity::Error));
}

#[tokio::test]
async fn read_error_emits_one_diagnostic_and_stops() {
    init_tracing();
    let sink = CollectingSink::new();

    let summary = with_timeout(
        reader(StreamOrigin::Stdout, &sink, 0).spawn(BrokenPipe { sent: false }),
    )
    .await
    .unwrap();

    assert!(summary.failed);
    let outputs = sink.outputs();
    assert_eq!(outputs.len(), 2);
    assert_eq!(outputs[0].line, "before failure");
    assert_eq!(outputs[1].severity, Severity::Error);
    assert!(outputs[1].line.starts_with("Error reading stdout:"), "{}", outputs[1].line);
    assert!(outputs[1].line.contains("pipe went away"));
}

#[tokio::test]
async fn cancellation_stops_a_reader_on_an_open_stream() {
    init_tracing();
    let sink = CollectingSink::new();
    let (mut writer, read_half) = tokio::io::duplex(64);
    let r = reader(StreamOrigin::Stdout, &sink, 0);
    let cancel = r.cancel.clone();

    let task = r.spawn(read_half);
    tokio::io::AsyncWriteExt::write_all(&mut writer, b"hello\n")
        .await
        .unwrap();
    with_timeout(sink.wait_for_line(|l| l == "hello")).await;

    // The writer stays open; only the cancel flag can end the reader.
    cancel.request(CancelReason::UserRequested);
    let summary = with_timeout(task).await.unwrap();

    assert_eq!(summary.lines, 1);
    drop(writer);
}

#[tokio::test]
async fn sibling_readers_share_sequence_numbers() {
    init_tracing();
    let sink = CollectingSink::new();
    let out = reader(StreamOrigin::Stdout, &sink, 0);
    let err = StreamReader {
        origin: StreamOrigin::Stderr,
        ..out.clone()
    };

    out.spawn(Cursor::new(b"1\n2\n".to_vec())).await.unwrap();
    err.spawn(Cursor::new(b"3\n4\n".to_vec())).await.unwrap();

    let seqs: Vec<u64> = sink.outputs().iter().map(|e| e.seq).collect();
    assert_eq!(seqs, vec![0, 1, 2, 3]);
}
