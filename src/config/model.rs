// src/config/model.rs

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::exec::artifact::default_artifact_path;
use crate::exec::{ProgressOptions, SupervisorOptions};
use crate::packaging::PackagingOptions;

/// Configuration as read from a TOML file, before validation.
///
/// ```toml
/// [supervisor]
/// grace_period_ms = 1000
/// stderr_tail_lines = 20
///
/// [progress]
/// tick_ms = 1000
/// step = 1
/// ceiling = 95
///
/// [script]
/// interpreter = "python3"
/// interpreter_args = ["-u"]
///
/// [build]
/// script = "app.py"
/// hidden_imports = ["requests, yaml"]
/// ```
///
/// All sections are optional and have reasonable defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub progress: ProgressSection,

    #[serde(default)]
    pub script: ScriptSection,

    /// Packaging options; only needed by `runwatch build`.
    #[serde(default)]
    pub build: Option<PackagingOptions>,
}

/// Validated configuration.
///
/// Only obtainable through `TryFrom<RawConfigFile>` (or `Default`), so every
/// value in here has passed validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub supervisor: SupervisorSection,
    pub progress: ProgressSection,
    pub script: ScriptSection,
    pub build: Option<PackagingOptions>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(raw: RawConfigFile) -> Self {
        Self {
            supervisor: raw.supervisor,
            progress: raw.progress,
            script: raw.script,
            build: raw.build,
        }
    }

    /// Options for a `ProcessSupervisor` built from this config.
    pub fn supervisor_options(&self) -> SupervisorOptions {
        SupervisorOptions {
            grace_period: Duration::from_millis(self.supervisor.grace_period_ms),
            stderr_tail_lines: self.supervisor.stderr_tail_lines,
            artifact_path: self
                .supervisor
                .artifact_path
                .clone()
                .unwrap_or_else(default_artifact_path),
            progress: ProgressOptions {
                tick: Duration::from_millis(self.progress.tick_ms),
                step: self.progress.step,
                ceiling: self.progress.ceiling,
            },
        }
    }
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self::new_unchecked(RawConfigFile::default())
    }
}

/// `[supervisor]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorSection {
    /// Time a cancelled process gets to exit before it is killed.
    #[serde(default = "default_grace_period_ms")]
    pub grace_period_ms: u64,

    /// Number of trailing stderr lines reported with a failure.
    #[serde(default = "default_stderr_tail_lines")]
    pub stderr_tail_lines: usize,

    /// Where interactive scripts are written before running.
    ///
    /// Defaults to a fixed file name in the system temp directory.
    #[serde(default)]
    pub artifact_path: Option<PathBuf>,
}

fn default_grace_period_ms() -> u64 {
    1000
}

fn default_stderr_tail_lines() -> usize {
    20
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            grace_period_ms: default_grace_period_ms(),
            stderr_tail_lines: default_stderr_tail_lines(),
            artifact_path: None,
        }
    }
}

/// `[progress]` section: cadence and shape of synthetic build progress.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProgressSection {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    #[serde(default = "default_step")]
    pub step: u8,

    /// Highest percentage shown before the build is confirmed done.
    #[serde(default = "default_ceiling")]
    pub ceiling: u8,
}

fn default_tick_ms() -> u64 {
    1000
}

fn default_step() -> u8 {
    1
}

fn default_ceiling() -> u8 {
    95
}

impl Default for ProgressSection {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            step: default_step(),
            ceiling: default_ceiling(),
        }
    }
}

/// `[script]` section: how `runwatch script` runs a file.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScriptSection {
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Arguments placed between the interpreter and the script path.
    /// `-u` keeps Python's output unbuffered so lines stream as printed.
    #[serde(default = "default_interpreter_args")]
    pub interpreter_args: Vec<String>,

    /// Default timeout for script runs; absent or `0` means unbounded.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

fn default_interpreter() -> String {
    if cfg!(windows) { "python" } else { "python3" }.to_string()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-u".to_string()]
}

impl Default for ScriptSection {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            interpreter_args: default_interpreter_args(),
            timeout_secs: None,
        }
    }
}
