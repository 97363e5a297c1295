//! The execute-mode control loop.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Duration;

use tracing::{info, warn};

use silo_backend::Session;
use silo_core::ArtifactGraph;

use crate::{EngineError, Result, cycle_report};

/// Tunables for one scheduler run.
#[derive(Debug, Clone)]
pub struct ScheduleOptions {
    /// Maximum simultaneously in-flight artifacts.
    pub max_concurrent: usize,
    /// Sleep between evaluation ticks.
    pub check_frequency: Duration,
    /// Retry budget per artifact beyond the first dispatch.
    pub max_retry: i64,
}

impl Default for ScheduleOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 10,
            check_frequency: Duration::from_secs(10),
            max_retry: 2,
        }
    }
}

/// Counters describing a finished run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    /// Evaluation ticks performed.
    pub ticks: u64,
    /// `create()` submissions performed.
    pub creates: u64,
    /// Highest number of simultaneously in-flight artifacts observed.
    pub max_in_flight: usize,
}

/// Seeds a key's retry counter on first dispatch and decrements it; going
/// below zero aborts the run.
fn handle_retries(
    retries: &mut HashMap<String, i64>,
    key: &str,
    max_retry: i64,
) -> Result<()> {
    let counter = retries.entry(key.to_string()).or_insert(max_retry);
    *counter -= 1;
    if *counter < 0 {
        return Err(EngineError::RetriesExhausted {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Drives every artifact in the graph to an up-to-date state.
///
/// Per tick: ready artifacts (empty pending set) are evaluated in key
/// order and dispatched, skipped, or retired; retired dependencies
/// propagate their modification times to their dependents; the loop then
/// sleeps the check interval. Terminates when the pending map drains,
/// aborts on retry exhaustion, and reports a cycle when neither ready nor
/// in-flight work remains.
pub fn execute(
    graph: &mut ArtifactGraph,
    cx: &Session,
    options: &ScheduleOptions,
) -> Result<RunStats> {
    let mut pending = graph.pending_map();
    let mut dep_mtime: HashMap<String, i64> = HashMap::new();
    let mut in_flight: BTreeSet<String> = BTreeSet::new();
    let mut retries: HashMap<String, i64> = HashMap::new();
    let mut stats = RunStats::default();

    while !pending.is_empty() {
        stats.ticks += 1;

        let ready: Vec<String> = pending
            .iter()
            .filter(|(_, deps)| deps.is_empty())
            .map(|(key, _)| key.clone())
            .collect();

        for key in &ready {
            evaluate(
                graph, cx, options, key, &mut pending, &dep_mtime, &mut in_flight, &mut retries,
                &mut stats,
            )?;
            stats.max_in_flight = stats.max_in_flight.max(in_flight.len());
            if in_flight.len() >= options.max_concurrent {
                break;
            }
        }

        retire_edges(graph, cx, &mut pending, &mut dep_mtime);

        if pending.is_empty() {
            break;
        }
        let any_ready = pending.values().any(BTreeSet::is_empty);
        if !any_ready && in_flight.is_empty() {
            return Err(EngineError::DependencyCycle {
                report: cycle_report(&pending),
            });
        }
        std::thread::sleep(options.check_frequency);
    }

    info!(
        ticks = stats.ticks,
        creates = stats.creates,
        "scheduler drained"
    );
    Ok(stats)
}

/// Evaluates one ready artifact: record it as in flight, dispatch a
/// create, retire it as up to date, or leave it pending for the next tick.
#[allow(clippy::too_many_arguments)]
fn evaluate(
    graph: &mut ArtifactGraph,
    cx: &Session,
    options: &ScheduleOptions,
    key: &str,
    pending: &mut BTreeMap<String, BTreeSet<String>>,
    dep_mtime: &HashMap<String, i64>,
    in_flight: &mut BTreeSet<String>,
    retries: &mut HashMap<String, i64>,
    stats: &mut RunStats,
) -> Result<()> {
    let artifact = graph.get_mut(key).expect("pending key is in graph");

    match artifact.is_running(cx) {
        Ok(true) => {
            info!(%artifact, "already running");
            in_flight.insert(key.to_string());
            return Ok(());
        }
        Ok(false) => {}
        Err(e) => {
            warn!(%artifact, error = %e, "job probe failed; will retry next tick");
            return Ok(());
        }
    }

    let exists = match artifact.exists(cx) {
        Ok(exists) => exists,
        Err(e) => {
            warn!(%artifact, error = %e, "existence probe failed; will retry next tick");
            return Ok(());
        }
    };

    let reason = if !exists {
        Some("does not exist")
    } else {
        match artifact.should_update(cx) {
            Ok(true) => Some("definition changed"),
            Ok(false) => {
                let mtime = match artifact.mtime_ms(cx) {
                    Ok(mtime) => mtime.unwrap_or(i64::MIN),
                    Err(e) => {
                        warn!(%artifact, error = %e, "mtime probe failed; will retry next tick");
                        return Ok(());
                    }
                };
                let newest_dep = dep_mtime.get(key).copied().unwrap_or(i64::MIN);
                if mtime < newest_dep {
                    Some("dependency is newer")
                } else {
                    None
                }
            }
            Err(e) => {
                warn!(%artifact, error = %e, "update probe failed; will retry next tick");
                return Ok(());
            }
        }
    };

    let Some(reason) = reason else {
        info!(%artifact, "up to date");
        pending.remove(key);
        in_flight.remove(key);
        return Ok(());
    };

    match artifact.ready_to_create(cx) {
        Ok(true) => {}
        Ok(false) => {
            info!(%artifact, "required input missing; waiting");
            return Ok(());
        }
        Err(e) => {
            warn!(%artifact, error = %e, "gate probe failed; will retry next tick");
            return Ok(());
        }
    }

    handle_retries(retries, key, options.max_retry)?;
    info!(%artifact, reason, "executing");
    match artifact.create(cx) {
        Ok(()) => {
            stats.creates += 1;
            in_flight.insert(key.to_string());
        }
        Err(e) => {
            warn!(%artifact, error = %e, "create failed; artifact stays pending");
        }
    }
    Ok(())
}

/// Removes satisfied dependencies from every pending set, folding the
/// retired dependency's modification time into the dependent's watermark.
fn retire_edges(
    graph: &ArtifactGraph,
    cx: &Session,
    pending: &mut BTreeMap<String, BTreeSet<String>>,
    dep_mtime: &mut HashMap<String, i64>,
) {
    let keys: Vec<String> = pending.keys().cloned().collect();
    let mut retired_mtimes: HashMap<String, i64> = HashMap::new();

    for key in keys {
        let satisfied: Vec<String> = pending[&key]
            .iter()
            .filter(|dep| !pending.contains_key(*dep))
            .cloned()
            .collect();
        for dep in satisfied {
            let mtime = *retired_mtimes.entry(dep.clone()).or_insert_with(|| {
                graph
                    .get(&dep)
                    .and_then(|a| a.mtime_ms(cx).ok().flatten())
                    .unwrap_or(i64::MIN)
            });
            let watermark = dep_mtime.entry(key.clone()).or_insert(i64::MIN);
            *watermark = (*watermark).max(mtime);
            pending.get_mut(&key).expect("key present").remove(&dep);
        }
    }
}
