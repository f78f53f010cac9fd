// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod model;
pub mod packaging;
pub mod sink;
pub mod types;

use std::fs;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::cli::{CliArgs, CliCommand, RunArgs};
use crate::config::ConfigFile;
use crate::config::loader::load_or_default;
use crate::exec::ProcessSupervisor;
use crate::model::{ExecutionRequest, ExecutionResult, Notification};
use crate::packaging::install_tool_request;
use crate::types::{ExecutionMode, Severity, StreamOrigin};

pub use crate::exec::{RunHandle, SupervisorOptions};
pub use crate::model::Outcome;
pub use crate::sink::NotificationSink;

/// High-level entry point used by `main.rs`.
///
/// Loads the config, turns the subcommand into one or more
/// `ExecutionRequest`s and runs them through a `ProcessSupervisor`, echoing
/// notifications to the terminal. Returns the exit code to report.
pub async fn run(args: CliArgs) -> Result<i32> {
    let cfg = load_or_default(args.config.as_deref())?;

    match args.command {
        CliCommand::Script { file, run } => {
            let source = fs::read_to_string(&file)
                .with_context(|| format!("reading script {:?}", file))?;
            let request = ExecutionRequest::script(
                &cfg.script.interpreter,
                cfg.script.interpreter_args.iter().cloned(),
                source,
            );
            let timeout = run.timeout.or(cfg.script.timeout_secs);
            let request = apply_run_args(request, &run, timeout);
            Ok(execute(&cfg, request).await.process_exit_code())
        }

        CliCommand::Exec {
            run,
            env,
            opaque,
            command,
        } => {
            let mode = if opaque {
                ExecutionMode::OpaqueBuild
            } else {
                ExecutionMode::InteractiveScript
            };
            let mut request = ExecutionRequest::new(command).with_mode(mode);
            for (key, value) in env {
                request = request.with_env(key, value);
            }
            let request = apply_run_args(request, &run, run.timeout);
            Ok(execute(&cfg, request).await.process_exit_code())
        }

        CliCommand::Build {
            timeout,
            dry_run,
            install,
        } => {
            let build = cfg
                .build
                .clone()
                .ok_or_else(|| anyhow!("config has no [build] section"))?;

            if dry_run {
                println!("{}", build.to_args().join(" "));
                return Ok(0);
            }

            if install {
                let result = execute(&cfg, install_tool_request(&build.python, "pyinstaller")).await;
                if !result.is_success() {
                    return Ok(result.process_exit_code());
                }
            }

            // `--timeout 0` disables the configured timeout, as for `script`.
            let request = build.to_request_with_timeout(timeout.or(build.timeout_secs));
            Ok(execute(&cfg, request).await.process_exit_code())
        }
    }
}

fn apply_run_args(
    mut request: ExecutionRequest,
    run: &RunArgs,
    timeout: Option<u64>,
) -> ExecutionRequest {
    if let Some(dir) = &run.cwd {
        request = request.with_working_dir(dir);
    }
    if let Some(secs) = timeout.filter(|s| *s > 0) {
        request = request.with_timeout_secs(secs);
    }
    request
}

/// Run one request to completion, printing its notifications.
///
/// Ctrl-C cancels the run (gracefully, then forcefully).
async fn execute(cfg: &ConfigFile, request: ExecutionRequest) -> ExecutionResult {
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    let supervisor = Arc::new(ProcessSupervisor::with_sink(cfg.supervisor_options(), tx));

    let ctrl_c = {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("Ctrl+C received; cancelling run");
            supervisor.cancel();
        })
    };

    let handle = supervisor.launch(request).await;
    debug!(run_id = handle.run_id(), pid = ?handle.pid(), "run launched");

    let mut result = None;
    while let Some(notification) = rx.recv().await {
        if let Notification::Finished(r) = notification {
            result = Some(r);
            break;
        }
        render(&notification);
    }
    ctrl_c.abort();

    let result = match result {
        Some(result) => result,
        None => handle.wait().await,
    };
    render_result(&result);
    result
}

/// Echo one notification to the terminal.
fn render(notification: &Notification) {
    match notification {
        Notification::Output(event) => match (event.origin, event.severity) {
            (StreamOrigin::Stdout, Severity::Normal) => {
                let mut out = std::io::stdout().lock();
                let _ = writeln!(out, "{}", event.line);
            }
            _ => eprintln!("ERROR: {}", event.line),
        },
        Notification::Progress(p) => eprintln!("[{:>3}%] {}", p.percent, p.label),
        Notification::Finished(result) => render_result(result),
    }
}

fn render_result(result: &ExecutionResult) {
    match &result.outcome {
        Outcome::Completed { .. } => {
            info!(duration_ms = result.duration.as_millis() as u64, "execution completed");
        }
        Outcome::Failed {
            exit_code,
            stderr_tail,
        } => {
            eprintln!("runwatch: process exited with code {exit_code}");
            if !stderr_tail.is_empty() {
                debug!(%stderr_tail, "stderr tail");
            }
        }
        other => eprintln!("runwatch: {other}"),
    }
}
