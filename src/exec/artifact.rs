// src/exec/artifact.rs

//! Transient script file for interactive-script runs.
//!
//! The script source is written to one well-known path before spawning and
//! removed when the guard is dropped, whichever way the run ends (including
//! a panic in the waiter task).

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

/// File name used inside the temp directory when no path is configured.
pub const DEFAULT_ARTIFACT_NAME: &str = "runwatch_script.py";

/// The default well-known artifact location.
pub fn default_artifact_path() -> PathBuf {
    std::env::temp_dir().join(DEFAULT_ARTIFACT_NAME)
}

#[derive(Debug)]
pub struct ScriptArtifact {
    path: PathBuf,
}

impl ScriptArtifact {
    /// Write `source` to `path`, overwriting whatever a previous run left.
    ///
    /// A relative `path` is resolved against the current directory; the
    /// child may run somewhere else.
    pub fn write(path: &Path, source: &str) -> io::Result<Self> {
        let path = std::path::absolute(path)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, source)?;
        debug!(path = ?path, bytes = source.len(), "wrote script artifact");

        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScriptArtifact {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!(path = ?self.path, "removed script artifact"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = ?self.path, error = %e, "failed to remove script artifact"),
        }
    }
}
