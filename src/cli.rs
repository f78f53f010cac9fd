// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// Command-line arguments for `runwatch`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "runwatch",
    version,
    about = "Run scripts and build tools as supervised child processes.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the config file (TOML).
    ///
    /// Default: `runwatch.toml` in the current working directory, if present.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `RUNWATCH_LOG` or a default level will be used.
    #[arg(long, global = true, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Clone, Subcommand)]
pub enum CliCommand {
    /// Run a script file with the configured interpreter.
    Script {
        /// Script to run.
        #[arg(value_name = "FILE")]
        file: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Run an arbitrary command.
    Exec {
        #[command(flatten)]
        run: RunArgs,

        /// Environment overrides, as KEY=VALUE.
        #[arg(long = "env", value_name = "KEY=VALUE", value_parser = parse_env_pair)]
        env: Vec<(String, String)>,

        /// Treat the command as an opaque build and show estimated progress.
        #[arg(long)]
        opaque: bool,

        /// Command and arguments.
        #[arg(last = true, required = true, value_name = "CMD")]
        command: Vec<String>,
    },

    /// Package the configured `[build]` script with PyInstaller.
    Build {
        /// Timeout in seconds, overriding `[build].timeout_secs`; `0` disables it.
        #[arg(long, value_name = "SECS")]
        timeout: Option<u64>,

        /// Print the packaging command instead of running it.
        #[arg(long)]
        dry_run: bool,

        /// Install PyInstaller with pip before building.
        #[arg(long)]
        install: bool,
    },
}

/// Options shared by `script` and `exec`.
#[derive(Debug, Clone, Args)]
pub struct RunArgs {
    /// Cancel the run after this many seconds; `0` means no timeout.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Working directory for the child process.
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

fn parse_env_pair(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{s}'")),
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
