// tests/supervisor_outcomes.rs

#![cfg(unix)]

mod common;
use crate::common::builders::{OptionsBuilder, sh};
use crate::common::{init_tracing, supervisor_with_sink, with_timeout};

use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;

use runwatch::exec::SupervisorState;
use runwatch::model::{ExecutionRequest, Notification, Outcome};
use runwatch::types::{ExecutionMode, ProcessStatus, Severity, StreamOrigin};

#[tokio::test]
async fn empty_command_is_a_spawn_error_without_output() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let handle = supervisor
        .launch(ExecutionRequest::new(Vec::<String>::new()))
        .await;

    // Already decided by the time launch returns.
    assert!(handle.is_finished());
    let result = with_timeout(handle.wait()).await;
    assert!(matches!(result.outcome, Outcome::SpawnError(_)));
    assert_eq!(handle.status(), ProcessStatus::Terminated);
    assert_eq!(handle.pid(), None);

    assert!(sink.outputs().is_empty());
    assert_eq!(sink.results().len(), 1);
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn blank_executable_and_zero_timeout_are_rejected() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let blank = supervisor.launch(ExecutionRequest::new(["  ", "x"])).await;
    assert!(matches!(blank.wait().await.outcome, Outcome::SpawnError(_)));

    let zero = supervisor
        .launch(sh("echo never").with_timeout(Duration::ZERO))
        .await;
    assert!(matches!(zero.wait().await.outcome, Outcome::SpawnError(_)));

    assert!(sink.outputs().is_empty());
    assert_eq!(sink.results().len(), 2);
}

#[tokio::test]
async fn missing_executable_is_a_spawn_error() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let handle = supervisor
        .launch(ExecutionRequest::new(["runwatch-no-such-program-xyz"]))
        .await;
    let result = with_timeout(handle.wait()).await;

    match &result.outcome {
        Outcome::SpawnError(msg) => assert!(msg.contains("runwatch-no-such-program-xyz"), "{msg}"),
        other => panic!("expected SpawnError, got {other:?}"),
    }
    assert_eq!(result.process_exit_code(), 127);
    assert!(sink.outputs().is_empty());
}

#[tokio::test]
async fn missing_working_directory_is_a_spawn_error() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let request = sh("echo hi").with_working_dir(dir.path().join("does-not-exist"));
    let result = with_timeout(supervisor.launch(request).await.wait()).await;

    match &result.outcome {
        Outcome::SpawnError(msg) => assert!(msg.contains("does-not-exist"), "{msg}"),
        other => panic!("expected SpawnError, got {other:?}"),
    }
    assert!(sink.outputs().is_empty());
}

#[tokio::test]
async fn successful_run_streams_lines_then_completes() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let handle = supervisor.launch(sh("echo one; echo two; echo three")).await;
    assert!(handle.pid().is_some());

    let result = with_timeout(handle.wait()).await;
    assert_eq!(result.outcome, Outcome::Completed { exit_code: 0 });
    assert!(result.is_success());
    assert_eq!(handle.status(), ProcessStatus::Terminated);

    assert_eq!(sink.output_lines(), vec!["one", "two", "three"]);
    assert!(
        sink.outputs()
            .iter()
            .all(|e| e.origin == StreamOrigin::Stdout && e.severity == Severity::Normal)
    );
    // Interactive runs carry no synthetic progress.
    assert!(sink.progress().is_empty());
    assert!(!supervisor.is_running());
    assert_eq!(supervisor.state(), SupervisorState::Idle);
}

#[tokio::test]
async fn non_zero_exit_fails_with_stderr_tail() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let handle = supervisor.launch(sh("echo boom >&2; exit 7")).await;
    let result = with_timeout(handle.wait()).await;

    assert_eq!(
        result.outcome,
        Outcome::Failed {
            exit_code: 7,
            stderr_tail: "boom".to_string(),
        }
    );
    assert_eq!(result.process_exit_code(), 7);

    let outputs = sink.outputs();
    assert_eq!(outputs.len(), 1);
    assert_eq!(outputs[0].origin, StreamOrigin::Stderr);
    assert_eq!(outputs[0].severity, Severity::Error);
}

#[tokio::test]
async fn stderr_tail_keeps_only_the_last_lines() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let options = OptionsBuilder::new(dir.path()).stderr_tail_lines(2).build();
    let (supervisor, _sink) = supervisor_with_sink(options);

    let script = "for i in 1 2 3 4 5; do echo \"line $i\" >&2; done; exit 2";
    let result = with_timeout(supervisor.launch(sh(script)).await.wait()).await;

    assert_eq!(
        result.outcome,
        Outcome::Failed {
            exit_code: 2,
            stderr_tail: "line 4\nline 5".to_string(),
        }
    );
}

#[tokio::test]
async fn timeout_stops_the_run_after_partial_output() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let request = sh("echo A; sleep 5").with_timeout(Duration::from_secs(1));
    let handle = supervisor.launch(request).await;
    let result = with_timeout(handle.wait()).await;

    assert_eq!(result.outcome, Outcome::TimedOut);
    assert_eq!(result.process_exit_code(), 124);
    assert!(result.duration >= Duration::from_secs(1));
    assert!(result.duration < Duration::from_secs(4), "{:?}", result.duration);
    assert_eq!(sink.output_lines(), vec!["A"]);
}

#[tokio::test]
async fn stdout_lines_mentioning_error_are_flagged() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let script = "echo 'all good'; echo 'Fatal ERROR here'; echo 'error-free run'";
    with_timeout(supervisor.launch(sh(script)).await.wait()).await;

    let severities: Vec<Severity> = sink.outputs().iter().map(|e| e.severity).collect();
    assert_eq!(
        severities,
        vec![Severity::Normal, Severity::Error, Severity::Error]
    );
}

#[tokio::test]
async fn finished_is_the_last_notification_of_a_run() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let script = "for i in 1 2 3 4 5 6 7 8 9 10; do echo out $i; echo err $i >&2; done";
    let handle = supervisor.launch(sh(script)).await;
    with_timeout(handle.wait()).await;

    let all = sink.for_run(handle.run_id());
    assert!(matches!(all.last(), Some(Notification::Finished(_))));
    let finished = all
        .iter()
        .filter(|n| matches!(n, Notification::Finished(_)))
        .count();
    assert_eq!(finished, 1);
    assert_eq!(sink.outputs().len(), 20);
}

#[tokio::test]
async fn sequence_numbers_are_unique_and_ordered_per_stream() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let script = "for i in 1 2 3 4 5; do echo out $i; echo err $i >&2; done";
    with_timeout(supervisor.launch(sh(script)).await.wait()).await;

    let outputs = sink.outputs();
    let mut all: Vec<u64> = outputs.iter().map(|e| e.seq).collect();
    all.sort_unstable();
    all.dedup();
    assert_eq!(all.len(), outputs.len());

    for origin in [StreamOrigin::Stdout, StreamOrigin::Stderr] {
        let seqs: Vec<u64> = outputs
            .iter()
            .filter(|e| e.origin == origin)
            .map(|e| e.seq)
            .collect();
        assert_eq!(seqs.len(), 5);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "{origin}: {seqs:?}");
    }
}

#[tokio::test]
async fn environment_overrides_and_working_directory_apply() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let request = sh("echo \"$RUNWATCH_TEST_VALUE\"; pwd -P")
        .with_env("RUNWATCH_TEST_VALUE", "hello")
        .with_working_dir(work.path());
    let result = with_timeout(supervisor.launch(request).await.wait()).await;
    assert!(result.is_success());

    let expected_dir = std::fs::canonicalize(work.path()).unwrap();
    assert_eq!(
        sink.output_lines(),
        vec![
            "hello".to_string(),
            expected_dir.to_string_lossy().into_owned()
        ]
    );
}

#[tokio::test]
async fn run_ids_increase_across_launches() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let (supervisor, sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());

    let first = supervisor.launch(sh("echo first")).await;
    first.wait().await;
    let second = supervisor.launch(sh("echo second")).await;
    second.wait().await;

    assert!(second.run_id() > first.run_id());
    assert_eq!(sink.for_run(first.run_id()).len(), 2);
    assert_eq!(sink.for_run(second.run_id()).len(), 2);
    assert_eq!(
        supervisor.wait().await.map(|r| r.run_id),
        Some(second.run_id())
    );
}

#[tokio::test]
async fn wait_before_any_launch_is_none() {
    let dir = TempDir::new().unwrap();
    let (supervisor, _sink) = supervisor_with_sink(OptionsBuilder::new(dir.path()).build());
    assert!(supervisor.wait().await.is_none());
}

#[tokio::test]
async fn script_source_is_written_to_the_artifact_and_removed() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let options = OptionsBuilder::new(dir.path()).build();
    let artifact = options.artifact_path.clone();
    let (supervisor, sink) = supervisor_with_sink(options);

    let source = "test -f \"$0\" && echo present\necho from-script\n";
    let request = ExecutionRequest::script("sh", Vec::<String>::new(), source);
    let result = with_timeout(supervisor.launch(request).await.wait()).await;

    assert!(result.is_success(), "{:?}", result.outcome);
    assert_eq!(sink.output_lines(), vec!["present", "from-script"]);
    assert!(!artifact.exists());
}

#[tokio::test]
async fn relative_artifact_path_works_with_a_working_directory() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let work = TempDir::new().unwrap();
    let mut options = OptionsBuilder::new(dir.path()).build();
    let relative = PathBuf::from(format!("runwatch_rel_artifact_{}.sh", std::process::id()));
    options.artifact_path = relative.clone();
    let (supervisor, sink) = supervisor_with_sink(options);

    let request = ExecutionRequest::script("sh", Vec::<String>::new(), "echo from-script\n")
        .with_working_dir(work.path());
    let result = with_timeout(supervisor.launch(request).await.wait()).await;

    assert!(result.is_success(), "{:?}", result.outcome);
    assert_eq!(sink.output_lines(), vec!["from-script"]);
    assert!(!relative.exists());
}

#[tokio::test]
async fn script_source_requires_interactive_mode() {
    init_tracing();
    let dir = TempDir::new().unwrap();
    let options = OptionsBuilder::new(dir.path()).build();
    let artifact = options.artifact_path.clone();
    let (supervisor, _sink) = supervisor_with_sink(options);

    let request = ExecutionRequest::script("sh", Vec::<String>::new(), "echo hi\n")
        .with_mode(ExecutionMode::OpaqueBuild);
    let result = with_timeout(supervisor.launch(request).await.wait()).await;

    assert!(matches!(result.outcome, Outcome::SpawnError(_)));
    assert!(!artifact.exists());
}
