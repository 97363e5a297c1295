//! The reconciliation scheduler.
//!
//! A single-threaded loop repeatedly evaluates the dependency graph and
//! drives every artifact to an up-to-date state: dispatching remote work
//! for ready artifacts, tracking in-flight jobs against a concurrency cap,
//! propagating dependency modification times up the graph, and counting
//! retries. The same graph walk also powers the read-only `show`, `dotml`
//! and `dump` modes.

use std::collections::{BTreeMap, BTreeSet};

pub mod modes;
pub mod scheduler;

pub use scheduler::{RunStats, ScheduleOptions, execute};

/// Errors that abort a scheduler run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// An artifact was dispatched more often than its retry budget allows.
    #[error("retries exhausted for {key}")]
    RetriesExhausted { key: String },

    /// The ready set and the in-flight set are both empty while artifacts
    /// remain pending: the residual graph is cyclic.
    #[error("dependency cycle among remaining artifacts:\n{report}")]
    DependencyCycle { report: String },

    /// A dump-mode file write failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Renders the residual pending map for a cycle report.
pub(crate) fn cycle_report(pending: &BTreeMap<String, BTreeSet<String>>) -> String {
    pending
        .iter()
        .map(|(key, deps)| {
            let deps: Vec<&str> = deps.iter().map(String::as_str).collect();
            format!("  {key} waiting on {}", deps.join(", "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
