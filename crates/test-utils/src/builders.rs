#![allow(dead_code)]

use std::path::Path;
use std::time::Duration;

use runwatch::exec::{ProgressOptions, SupervisorOptions};
use runwatch::model::ExecutionRequest;

/// A request running `script` through `sh -c`.
pub fn sh(script: &str) -> ExecutionRequest {
    ExecutionRequest::new(["sh", "-c", script])
}

/// Builder for `SupervisorOptions` with test-friendly defaults:
/// short grace period, fast progress ticks, and the script artifact kept
/// inside `dir` so parallel tests never share it.
pub struct OptionsBuilder {
    options: SupervisorOptions,
}

impl OptionsBuilder {
    pub fn new(dir: &Path) -> Self {
        Self {
            options: SupervisorOptions {
                grace_period: Duration::from_millis(500),
                stderr_tail_lines: 20,
                artifact_path: dir.join("script_artifact.sh"),
                progress: ProgressOptions {
                    tick: Duration::from_millis(100),
                    step: 5,
                    ceiling: 95,
                },
            },
        }
    }

    pub fn grace_period(mut self, grace: Duration) -> Self {
        self.options.grace_period = grace;
        self
    }

    pub fn stderr_tail_lines(mut self, lines: usize) -> Self {
        self.options.stderr_tail_lines = lines;
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.options.progress.tick = tick;
        self
    }

    pub fn step(mut self, step: u8) -> Self {
        self.options.progress.step = step;
        self
    }

    pub fn ceiling(mut self, ceiling: u8) -> Self {
        self.options.progress.ceiling = ceiling;
        self
    }

    pub fn build(self) -> SupervisorOptions {
        self.options
    }
}
