// src/exec/supervisor.rs

//! Lifecycle owner for one child process at a time.
//!
//! `launch` validates the request, spawns the child and starts its workers:
//!
//! - two [`StreamReader`]s (stdout, stderr)
//! - a progress ticker, for `opaque-build` requests only
//! - a watchdog, when the request carries a timeout
//!
//! A waiter task then owns the child until it exits or is cancelled, joins
//! the readers so no buffered output is lost, and publishes exactly one
//! [`ExecutionResult`], always after the run's last [`OutputEvent`].
//!
//! [`OutputEvent`]: crate::model::OutputEvent

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use std::{fmt, io};

use tokio::process::{Child, Command};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::errors::{Result, RunwatchError};
use crate::exec::artifact::{ScriptArtifact, default_artifact_path};
use crate::exec::cancel::{CancellationController, terminate_child};
use crate::exec::lifecycle::{SupervisorState, TerminalKind};
use crate::exec::progress::{self, ProgressEstimator, ProgressOptions, SharedEstimator};
use crate::exec::stream_reader::{StreamReader, StreamSummary};
use crate::model::{ExecutionRequest, ExecutionResult, Notification, Outcome, RunId};
use crate::sink::NotificationSink;
use crate::types::{CancelReason, ExecutionMode, ProcessStatus, StreamOrigin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorOptions {
    /// How long a cancelled child gets to exit before it is killed.
    pub grace_period: Duration,
    /// Number of trailing stderr lines carried by a `Failed` outcome.
    pub stderr_tail_lines: usize,
    /// Well-known path interactive scripts are written to.
    pub artifact_path: PathBuf,
    pub progress: ProgressOptions,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            grace_period: Duration::from_secs(1),
            stderr_tail_lines: 20,
            artifact_path: default_artifact_path(),
            progress: ProgressOptions::default(),
        }
    }
}

/// Read-only view of the child behind a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessHandle {
    pub pid: Option<u32>,
    pub status: ProcessStatus,
}

type SharedProcess = Arc<Mutex<ProcessHandle>>;

fn lock<T>(m: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Caller-side handle of one run.
#[derive(Debug, Clone)]
pub struct RunHandle {
    run_id: RunId,
    process: SharedProcess,
    result_rx: watch::Receiver<Option<ExecutionResult>>,
}

impl RunHandle {
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    pub fn pid(&self) -> Option<u32> {
        lock(&self.process).pid
    }

    pub fn status(&self) -> ProcessStatus {
        lock(&self.process).status
    }

    pub fn is_finished(&self) -> bool {
        self.result_rx.borrow().is_some()
    }

    /// The terminal result, if the run already ended.
    pub fn result(&self) -> Option<ExecutionResult> {
        self.result_rx.borrow().clone()
    }

    /// Wait for the terminal result.
    pub async fn wait(&self) -> ExecutionResult {
        let mut rx = self.result_rx.clone();
        let result: Option<ExecutionResult> = match rx.wait_for(Option::is_some).await {
            Ok(result) => (*result).clone(),
            Err(_) => self.result(),
        };
        result.unwrap_or_else(|| unreachable_result(self.run_id))
    }
}

/// The waiter always publishes before dropping its sender; this only covers
/// a runtime shutting down underneath us.
fn unreachable_result(run_id: RunId) -> ExecutionResult {
    ExecutionResult {
        run_id,
        outcome: Outcome::Failed {
            exit_code: -1,
            stderr_tail: "supervisor stopped before the run finished".to_string(),
        },
        duration: Duration::ZERO,
    }
}

/// Bookkeeping for the most recent run.
#[derive(Clone)]
struct ActiveRun {
    handle: RunHandle,
    controller: CancellationController,
}

/// State shared between the supervisor and its waiter tasks.
struct Shared {
    options: SupervisorOptions,
    sink: Arc<dyn NotificationSink>,
    state: Mutex<SupervisorState>,
    estimator: SharedEstimator,
}

impl Shared {
    fn advance(&self, to: SupervisorState) {
        let mut state = lock(&self.state);
        if let Err(e) = state.advance(to) {
            // Force it rather than wedge the supervisor.
            warn!(error = %e, "forcing supervisor state");
            *state = to;
        }
    }

    fn notify(&self, notification: Notification) {
        self.sink.notify(notification);
    }

    /// Publish the terminal result of a run and return to idle.
    ///
    /// Callers drop the run's script artifact before getting here.
    fn finish(
        &self,
        run_id: RunId,
        mode: ExecutionMode,
        started: Instant,
        outcome: Outcome,
        result_tx: &watch::Sender<Option<ExecutionResult>>,
    ) {
        if mode == ExecutionMode::OpaqueBuild {
            self.report_final_progress(run_id, &outcome);
        }

        let result = ExecutionResult {
            run_id,
            outcome,
            duration: started.elapsed(),
        };

        info!(
            run_id,
            outcome = %result.outcome,
            duration_ms = result.duration.as_millis() as u64,
            "run finished"
        );

        self.advance(SupervisorState::Finished(TerminalKind::from(&result.outcome)));
        self.advance(SupervisorState::Idle);
        self.notify(Notification::Finished(result.clone()));
        result_tx.send_replace(Some(result));
    }

    fn report_final_progress(&self, run_id: RunId, outcome: &Outcome) {
        progress::with_estimator(&self.estimator, |e| match outcome {
            Outcome::Completed { .. } => {
                let percent = e.finalize();
                self.notify(progress::snapshot(run_id, percent, progress::LABEL_FINALIZING));
                let percent = e.complete();
                self.notify(progress::snapshot(run_id, percent, progress::LABEL_COMPLETED));
            }
            Outcome::Cancelled(_) | Outcome::TimedOut => {
                let percent = e.abort();
                self.notify(progress::snapshot(run_id, percent, progress::LABEL_CANCELLED));
            }
            Outcome::Failed { .. } | Outcome::SpawnError(_) => {
                let percent = e.abort();
                self.notify(progress::snapshot(run_id, percent, progress::LABEL_FAILED));
            }
        });
    }
}

/// Owns the lifecycle of at most one child process at a time.
///
/// Share it behind an `Arc` to cancel from several tasks.
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
    next_run_id: AtomicU64,
    active: Mutex<Option<ActiveRun>>,
    launch_lock: tokio::sync::Mutex<()>,
}

impl fmt::Debug for ProcessSupervisor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessSupervisor")
            .field("options", &self.shared.options)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

impl ProcessSupervisor {
    pub fn new(options: SupervisorOptions, sink: Arc<dyn NotificationSink>) -> Self {
        let estimator = Arc::new(Mutex::new(ProgressEstimator::new(options.progress)));
        Self {
            shared: Arc::new(Shared {
                options,
                sink,
                state: Mutex::new(SupervisorState::Idle),
                estimator,
            }),
            next_run_id: AtomicU64::new(0),
            active: Mutex::new(None),
            launch_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn with_sink<S>(options: SupervisorOptions, sink: S) -> Self
    where
        S: NotificationSink + 'static,
    {
        Self::new(options, Arc::new(sink))
    }

    pub fn options(&self) -> &SupervisorOptions {
        &self.shared.options
    }

    pub fn state(&self) -> SupervisorState {
        *lock(&self.shared.state)
    }

    pub fn is_running(&self) -> bool {
        self.current().is_some_and(|run| !run.handle.is_finished())
    }

    fn current(&self) -> Option<ActiveRun> {
        lock(&self.active).clone()
    }

    /// Start a run.
    ///
    /// A run that is still active is cancelled (reason `Superseded`) and
    /// awaited first. An invalid request or a failed spawn produces a
    /// `SpawnError` result right away, with no workers started; the returned
    /// handle is then already finished.
    pub async fn launch(&self, request: ExecutionRequest) -> RunHandle {
        let _launching = self.launch_lock.lock().await;
        self.stop_current(CancelReason::Superseded).await;

        let run_id = self.next_run_id.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();
        let mode = request.mode();
        let process = Arc::new(Mutex::new(ProcessHandle {
            pid: None,
            status: ProcessStatus::Launching,
        }));
        let (result_tx, result_rx) = watch::channel(None);
        let handle = RunHandle {
            run_id,
            process: Arc::clone(&process),
            result_rx,
        };
        let controller = CancellationController::new();

        *lock(&self.active) = Some(ActiveRun {
            handle: handle.clone(),
            controller: controller.clone(),
        });
        progress::with_estimator(&self.shared.estimator, |e| e.reset());

        if let Err(e) = request.validate() {
            warn!(run_id, error = %e, "rejecting execution request");
            self.fail_spawn(run_id, mode, started, &process, e.describe(), &result_tx);
            return handle;
        }

        self.shared.advance(SupervisorState::Launching);
        info!(run_id, ?mode, command = ?request.command(), "launching run");

        let spawned = spawn_child(&request, &self.shared.options);
        let (mut child, artifact) = match spawned {
            Ok(spawned) => spawned,
            Err(e) => {
                error!(run_id, error = %e, "failed to spawn child process");
                self.fail_spawn(run_id, mode, started, &process, e.describe(), &result_tx);
                return handle;
            }
        };

        let pid = child.id();
        {
            let mut p = lock(&process);
            p.pid = pid;
            p.status = ProcessStatus::Running;
        }
        self.shared.advance(SupervisorState::Running);
        info!(run_id, pid = ?pid, "child process started");

        let shared = &self.shared;
        let seq = Arc::new(AtomicU64::new(0));
        let reader = |origin, tail_lines| StreamReader {
            run_id,
            origin,
            seq: Arc::clone(&seq),
            sink: Arc::clone(&shared.sink),
            cancel: controller.clone(),
            tail_lines,
        };

        let stdout = child
            .stdout
            .take()
            .map(|s| TaskGuard::new(reader(StreamOrigin::Stdout, 0).spawn(s)));
        let stderr = child.stderr.take().map(|s| {
            TaskGuard::new(
                reader(StreamOrigin::Stderr, shared.options.stderr_tail_lines).spawn(s),
            )
        });

        let ticker = (mode == ExecutionMode::OpaqueBuild).then(|| {
            shared.notify(progress::snapshot(run_id, 0, progress::LABEL_STARTING));
            TaskGuard::new(progress::spawn_ticker(
                Arc::clone(&shared.estimator),
                run_id,
                Arc::clone(&shared.sink),
                controller.clone(),
            ))
        });

        let watchdog = request
            .timeout()
            .map(|timeout| TaskGuard::new(spawn_watchdog(run_id, timeout, controller.clone())));

        let run = RunContext {
            run_id,
            child,
            artifact,
            controller,
            process,
            stdout,
            stderr,
            ticker,
            watchdog,
            grace: shared.options.grace_period,
        };

        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let cancel = run.controller.clone();
            let outcome = match tokio::spawn(run.drive()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(run_id, error = %e, "run waiter failed");
                    // Stop whatever is still reading or ticking.
                    cancel.request(CancelReason::UserRequested);
                    Outcome::Failed {
                        exit_code: -1,
                        stderr_tail: format!("supervisor error: {e}"),
                    }
                }
            };
            shared.finish(run_id, mode, started, outcome, &result_tx);
        });

        handle
    }

    /// Request cancellation of the active run.
    ///
    /// Returns `true` if this call started the shutdown. Calling it with no
    /// run, after the run finished, or while a shutdown is already under way
    /// does nothing and returns `false`. Never blocks.
    pub fn cancel(&self) -> bool {
        match self.current() {
            Some(run) if !run.handle.is_finished() => {
                run.controller.request(CancelReason::UserRequested)
            }
            _ => {
                debug!("cancel requested with no active run; ignoring");
                false
            }
        }
    }

    /// Wait for the most recent run to finish. `None` before the first launch.
    pub async fn wait(&self) -> Option<ExecutionResult> {
        match self.current() {
            Some(run) => Some(run.handle.wait().await),
            None => None,
        }
    }

    async fn stop_current(&self, reason: CancelReason) {
        let Some(run) = self.current() else {
            return;
        };
        if !run.handle.is_finished() {
            info!(run_id = run.handle.run_id, %reason, "stopping active run before launch");
            run.controller.request(reason);
        }
        run.handle.wait().await;
    }

    fn fail_spawn(
        &self,
        run_id: RunId,
        mode: ExecutionMode,
        started: Instant,
        process: &SharedProcess,
        message: String,
        result_tx: &watch::Sender<Option<ExecutionResult>>,
    ) {
        lock(process).status = ProcessStatus::Terminated;
        self.shared
            .finish(run_id, mode, started, Outcome::SpawnError(message), result_tx);
    }
}

/// Spawn the child described by `request`, writing its script artifact
/// first when it carries one.
fn spawn_child(
    request: &ExecutionRequest,
    options: &SupervisorOptions,
) -> Result<(Child, Option<ScriptArtifact>)> {
    let Some((program, args)) = request.command().split_first() else {
        return Err(RunwatchError::InvalidRequest(
            "command must not be empty".to_string(),
        ));
    };

    let artifact = request
        .script_source()
        .map(|source| ScriptArtifact::write(&options.artifact_path, source))
        .transpose()
        .map_err(|e| {
            RunwatchError::Other(anyhow::Error::new(e).context(format!(
                "writing script artifact {:?}",
                options.artifact_path
            )))
        })?;

    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(artifact) = &artifact {
        cmd.arg(artifact.path());
    }
    if let Some(dir) = request.working_dir() {
        cmd.current_dir(dir);
    }
    if let Some(env) = request.env() {
        cmd.envs(env);
    }

    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group, so termination reaches the whole tree.
    #[cfg(unix)]
    cmd.process_group(0);

    let child = cmd.spawn().map_err(|e| {
        RunwatchError::Other(anyhow::Error::new(e).context(format!("spawning '{program}'")))
    })?;

    Ok((child, artifact))
}

fn spawn_watchdog(
    run_id: RunId,
    timeout: Duration,
    controller: CancellationController,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => {
                info!(run_id, timeout_ms = timeout.as_millis() as u64, "timeout elapsed");
                controller.request(CancelReason::Timeout);
            }
            _ = controller.cancelled() => {}
        }
    })
}

/// A spawned worker that is aborted if its owner goes away without
/// joining it.
struct TaskGuard<T>(Option<JoinHandle<T>>);

impl<T> TaskGuard<T> {
    fn new(handle: JoinHandle<T>) -> Self {
        Self(Some(handle))
    }

    /// Wait for the worker to finish on its own.
    async fn join(mut self) -> Option<T> {
        let handle = self.0.take()?;
        match handle.await {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(error = %e, "worker task failed");
                None
            }
        }
    }

    /// Abort the worker and wait until it is gone.
    async fn stop(mut self) {
        if let Some(handle) = self.0.take() {
            handle.abort();
            let _ = handle.await;
        }
    }
}

impl<T> Drop for TaskGuard<T> {
    fn drop(&mut self) {
        if let Some(handle) = &self.0 {
            handle.abort();
        }
    }
}

/// Everything the waiter owns for one run.
struct RunContext {
    run_id: RunId,
    child: Child,
    artifact: Option<ScriptArtifact>,
    controller: CancellationController,
    process: SharedProcess,
    stdout: Option<TaskGuard<StreamSummary>>,
    stderr: Option<TaskGuard<StreamSummary>>,
    ticker: Option<TaskGuard<()>>,
    watchdog: Option<TaskGuard<()>>,
    grace: Duration,
}

impl RunContext {
    /// Wait for the child, drain its streams, stop the helpers and decide the
    /// outcome. The script artifact is removed before returning.
    async fn drive(mut self) -> Outcome {
        let run_id = self.run_id;

        let (status, cancelled) = tokio::select! {
            status = self.child.wait() => (status, None),
            reason = self.controller.cancelled() => {
                lock(&self.process).status = ProcessStatus::Terminating;
                info!(run_id, %reason, "terminating child process");
                (terminate_child(&mut self.child, self.grace).await, Some(reason))
            }
        };
        lock(&self.process).status = ProcessStatus::Terminated;

        match &status {
            Ok(s) => debug!(run_id, status = %s, "child process exited"),
            Err(e) => warn!(run_id, error = %e, "waiting for child process failed"),
        }

        // Readers stop at EOF, or immediately once the run is cancelled.
        let _stdout = join_reader(self.stdout.take()).await;
        let stderr = join_reader(self.stderr.take()).await;

        if let Some(ticker) = self.ticker.take() {
            ticker.stop().await;
        }
        if let Some(watchdog) = self.watchdog.take() {
            watchdog.stop().await;
        }
        drop(self.artifact.take());

        // A cancellation that lost the race against a natural exit does not
        // change the outcome.
        outcome_for(status, cancelled, &stderr)
    }
}

async fn join_reader(reader: Option<TaskGuard<StreamSummary>>) -> StreamSummary {
    match reader {
        Some(reader) => reader.join().await.unwrap_or_default(),
        None => StreamSummary::default(),
    }
}

fn outcome_for(
    status: io::Result<ExitStatus>,
    cancelled: Option<CancelReason>,
    stderr: &StreamSummary,
) -> Outcome {
    match (cancelled, status) {
        (Some(CancelReason::Timeout), _) => Outcome::TimedOut,
        (Some(reason), _) => Outcome::Cancelled(reason),
        (None, Ok(status)) if status.success() => Outcome::Completed { exit_code: 0 },
        (None, Ok(status)) => Outcome::Failed {
            exit_code: status.code().unwrap_or(-1),
            stderr_tail: stderr.tail_text(),
        },
        (None, Err(e)) => Outcome::Failed {
            exit_code: -1,
            stderr_tail: format!("waiting for child process: {e}"),
        },
    }
}
