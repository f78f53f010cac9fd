// src/packaging.rs

//! Argument assembly for the packaging tool (PyInstaller).
//!
//! This is caller-side glue: it turns typed options into an argv and an
//! `opaque-build` [`ExecutionRequest`]. The supervisor never looks inside
//! that argv.
//!
//! Options map to flags as follows:
//!
//! | option             | flag(s)                                        |
//! |--------------------|------------------------------------------------|
//! | `bundle`           | `--onefile` / `--onedir`                       |
//! | `windowed`         | `--windowed` / `--console`                     |
//! | `output_dir`       | `--distpath D --workpath D/build --specpath D` |
//! | `icon`             | `--icon P` (if it exists)                      |
//! | `add_data`         | `--add-data SRC<sep>DEST` per existing path    |
//! | `add_binary`       | `--add-binary SRC<sep>.` per existing path     |
//! | `hidden_imports`   | `--hidden-import M` per comma-separated entry  |
//! | `exclude_modules`  | `--exclude-module M` per comma-separated entry |
//! | `clean` ...        | `--clean`, `--noconfirm`, `--strip`, `--upx-dir ""`, `--debug`, `--optimize=1`, `--no-pre-compress` |
//! | `runtime_hook`     | `--runtime-hook P` (if it exists)              |
//!
//! The script path always comes last.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::model::ExecutionRequest;
use crate::types::ExecutionMode;

/// Separator PyInstaller expects between source and destination.
pub const DATA_SEPARATOR: char = if cfg!(windows) { ';' } else { ':' };

/// Timeout applied to tool installation.
pub const INSTALL_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BundleMode {
    /// A single self-contained executable.
    #[default]
    OneFile,
    /// A directory holding the executable and its dependencies.
    OneDir,
}

/// `[build]` section of the config file.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PackagingOptions {
    #[serde(default = "default_python")]
    pub python: String,

    /// Entry script to package.
    pub script: PathBuf,

    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub bundle: BundleMode,

    /// Build a GUI app without a console window.
    #[serde(default)]
    pub windowed: bool,

    /// Directory the tool runs in; ignored when it does not exist.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub icon: Option<PathBuf>,

    #[serde(default)]
    pub add_data: Vec<PathBuf>,

    #[serde(default)]
    pub add_binary: Vec<PathBuf>,

    /// Module names; each entry may itself be a comma-separated list.
    #[serde(default)]
    pub hidden_imports: Vec<String>,

    #[serde(default)]
    pub exclude_modules: Vec<String>,

    #[serde(default)]
    pub clean: bool,

    #[serde(default)]
    pub noconfirm: bool,

    #[serde(default)]
    pub strip: bool,

    #[serde(default)]
    pub upx: bool,

    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub optimize: bool,

    #[serde(default)]
    pub no_precompress: bool,

    #[serde(default)]
    pub runtime_hook: Option<PathBuf>,

    /// `None` means no timeout; `0` is treated the same way.
    #[serde(default = "default_build_timeout")]
    pub timeout_secs: Option<u64>,
}

fn default_python() -> String {
    if cfg!(windows) { "python" } else { "python3" }.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("dist")
}

fn default_build_timeout() -> Option<u64> {
    Some(600)
}

impl PackagingOptions {
    /// Options with every flag off, for `script`.
    pub fn for_script(script: impl Into<PathBuf>) -> Self {
        Self {
            python: default_python(),
            script: script.into(),
            output_dir: default_output_dir(),
            bundle: BundleMode::default(),
            windowed: false,
            working_dir: None,
            icon: None,
            add_data: Vec::new(),
            add_binary: Vec::new(),
            hidden_imports: Vec::new(),
            exclude_modules: Vec::new(),
            clean: false,
            noconfirm: false,
            strip: false,
            upx: false,
            debug: false,
            optimize: false,
            no_precompress: false,
            runtime_hook: None,
            timeout_secs: default_build_timeout(),
        }
    }

    /// Full argv, interpreter first.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![
            self.python.clone(),
            "-m".to_string(),
            "PyInstaller".to_string(),
        ];

        args.push(
            match self.bundle {
                BundleMode::OneFile => "--onefile",
                BundleMode::OneDir => "--onedir",
            }
            .to_string(),
        );
        args.push(if self.windowed { "--windowed" } else { "--console" }.to_string());

        let out = &self.output_dir;
        args.extend([
            "--distpath".to_string(),
            path_arg(out),
            "--workpath".to_string(),
            path_arg(&out.join("build")),
            "--specpath".to_string(),
            path_arg(out),
        ]);

        if let Some(icon) = existing("icon", self.icon.as_deref()) {
            args.push("--icon".to_string());
            args.push(path_arg(icon));
        }

        for path in &self.add_data {
            let Some(path) = existing("data path", Some(path)) else {
                continue;
            };
            let dest = if path.is_dir() {
                path.file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| ".".to_string())
            } else {
                ".".to_string()
            };
            args.push("--add-data".to_string());
            args.push(format!("{}{DATA_SEPARATOR}{dest}", path_arg(path)));
        }

        for path in &self.add_binary {
            if let Some(path) = existing("binary", Some(path)) {
                args.push("--add-binary".to_string());
                args.push(format!("{}{DATA_SEPARATOR}.", path_arg(path)));
            }
        }

        for module in split_list(&self.hidden_imports) {
            args.push("--hidden-import".to_string());
            args.push(module);
        }
        for module in split_list(&self.exclude_modules) {
            args.push("--exclude-module".to_string());
            args.push(module);
        }

        let switches = [
            (self.clean, "--clean"),
            (self.noconfirm, "--noconfirm"),
            (self.strip, "--strip"),
        ];
        args.extend(switches.iter().filter(|(on, _)| *on).map(|(_, f)| f.to_string()));

        if self.upx {
            args.push("--upx-dir".to_string());
            args.push(String::new());
        }

        let switches = [
            (self.debug, "--debug"),
            (self.optimize, "--optimize=1"),
            (self.no_precompress, "--no-pre-compress"),
        ];
        args.extend(switches.iter().filter(|(on, _)| *on).map(|(_, f)| f.to_string()));

        if let Some(hook) = existing("runtime hook", self.runtime_hook.as_deref()) {
            args.push("--runtime-hook".to_string());
            args.push(path_arg(hook));
        }

        args.push(path_arg(&self.script));
        debug!(?args, "assembled packaging command");
        args
    }

    /// The packaging run as an `opaque-build` request.
    pub fn to_request(&self) -> ExecutionRequest {
        self.to_request_with_timeout(self.timeout_secs)
    }

    /// Like [`to_request`](Self::to_request) with `timeout_secs` in place of
    /// the configured one. `Some(0)` and `None` both mean unbounded.
    pub fn to_request_with_timeout(&self, timeout_secs: Option<u64>) -> ExecutionRequest {
        let mut request = ExecutionRequest::new(self.to_args()).with_mode(ExecutionMode::OpaqueBuild);

        if let Some(dir) = existing("working directory", self.working_dir.as_deref()) {
            request = request.with_working_dir(dir);
        }
        if let Some(secs) = timeout_secs.filter(|s| *s > 0) {
            request = request.with_timeout_secs(secs);
        }
        request
    }
}

/// `python -m pip install <package>`, bounded by [`INSTALL_TIMEOUT`].
pub fn install_tool_request(python: &str, package: &str) -> ExecutionRequest {
    ExecutionRequest::new([python, "-m", "pip", "install", package])
        .with_mode(ExecutionMode::OpaqueBuild)
        .with_timeout(INSTALL_TIMEOUT)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

fn existing<'a>(what: &str, path: Option<&'a Path>) -> Option<&'a Path> {
    let path = path?;
    if path.exists() {
        Some(path)
    } else {
        warn!(path = ?path, "{what} does not exist; skipping");
        None
    }
}

/// Split comma-separated entries, trimming and dropping empty names.
fn split_list(entries: &[String]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|entry| entry.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
