// tests/common/mod.rs

#![allow(dead_code, unused_imports)]

pub use runwatch_test_utils::builders;
pub use runwatch_test_utils::{CollectingSink, init_tracing, with_timeout};

use std::sync::Arc;

use runwatch::exec::{ProcessSupervisor, SupervisorOptions};

/// A supervisor reporting into a fresh `CollectingSink`.
pub fn supervisor_with_sink(options: SupervisorOptions) -> (Arc<ProcessSupervisor>, CollectingSink) {
    let sink = CollectingSink::new();
    let supervisor = Arc::new(ProcessSupervisor::with_sink(options, sink.clone()));
    (supervisor, sink)
}
