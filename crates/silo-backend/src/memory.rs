//! In-memory backend used by the engine and loader test suites.
//!
//! The fake warehouse keeps a logical clock (milliseconds, advanced on
//! every mutation) so mtime ordering is observable, completes submitted
//! jobs after a configurable number of polls, and records every submission
//! so tests can assert on idempotence.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::error::{BackendError, Result};
use crate::traits::{ObjectStore, Warehouse};
use crate::types::{
    BlobInfo, DatasetInfo, ExtractJobSpec, FileLoadJobSpec, JobInfo, JobPage, JobState,
    QueryJobSpec, SchemaField, TableId, TableInfo, TableUpdate, UriLoadJobSpec,
};

// ---------------------------------------------------------------------------
// Warehouse
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct MemJob {
    info: JobInfo,
    polls_left: u32,
}

#[derive(Debug, Default)]
struct WarehouseState {
    clock_ms: i64,
    datasets: BTreeMap<String, DatasetInfo>,
    tables: BTreeMap<String, TableInfo>,
    jobs: Vec<MemJob>,
    submit_log: Vec<String>,
    fail_submits: HashMap<String, usize>,
}

impl WarehouseState {
    fn tick(&mut self) -> i64 {
        self.clock_ms += 1000;
        self.clock_ms
    }
}

/// In-memory [`Warehouse`] implementation.
pub struct MemoryWarehouse {
    state: Mutex<WarehouseState>,
    /// How many `job_state` polls a job stays in flight for.
    job_latency: u32,
}

impl Default for MemoryWarehouse {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryWarehouse {
    pub fn new() -> Self {
        Self::with_job_latency(1)
    }

    pub fn with_job_latency(job_latency: u32) -> Self {
        Self {
            state: Mutex::new(WarehouseState {
                clock_ms: 1_000_000,
                ..Default::default()
            }),
            job_latency,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, WarehouseState> {
        self.state.lock().expect("memory warehouse poisoned")
    }

    fn submit(&self, job_id: &str, destination: Option<TableId>) -> Result<()> {
        let mut state = self.lock();
        if let Some(dest) = &destination {
            if let Some(n) = state.fail_submits.get_mut(&dest.key()) {
                if *n > 0 {
                    *n -= 1;
                    return Err(BackendError::Service {
                        status: 500,
                        message: format!("injected failure for {dest}"),
                    });
                }
            }
        }
        state.submit_log.push(job_id.to_string());
        let info = JobInfo {
            id: job_id.to_string(),
            state: JobState::Running,
            destination,
            error: None,
        };
        let polls_left = self.job_latency;
        state.jobs.push(MemJob { info, polls_left });
        Ok(())
    }

    // -- Test helpers --------------------------------------------------------

    /// Seeds a table with the given description; bumps the clock.
    pub fn put_table(&self, table: &TableId, description: Option<&str>) {
        let mut state = self.lock();
        let mtime = state.tick();
        state.tables.insert(
            table.key(),
            TableInfo {
                mtime_ms: Some(mtime),
                description: description.map(str::to_string),
                expires_ms: None,
            },
        );
    }

    /// Seeds a dataset; bumps the clock.
    pub fn put_dataset(&self, dataset: &str) {
        let mut state = self.lock();
        let mtime = state.tick();
        state.datasets.insert(
            dataset.to_string(),
            DatasetInfo {
                mtime_ms: Some(mtime),
            },
        );
    }

    /// Makes the next `n` submissions targeting `dest_key` fail.
    pub fn fail_submits_for(&self, dest_key: &str, n: usize) {
        self.lock().fail_submits.insert(dest_key.to_string(), n);
    }

    /// Job ids in submission order.
    pub fn submit_log(&self) -> Vec<String> {
        self.lock().submit_log.clone()
    }

    pub fn submit_count(&self) -> usize {
        self.lock().submit_log.len()
    }

    /// Current description of a table, if it exists.
    pub fn description_of(&self, table: &TableId) -> Option<String> {
        self.lock()
            .tables
            .get(&table.key())
            .and_then(|t| t.description.clone())
    }

    /// Current mtime of a table, if it exists.
    pub fn mtime_of(&self, table: &TableId) -> Option<i64> {
        self.lock().tables.get(&table.key()).and_then(|t| t.mtime_ms)
    }
}

impl Warehouse for MemoryWarehouse {
    fn get_dataset(&self, _project: Option<&str>, dataset: &str) -> Result<Option<DatasetInfo>> {
        Ok(self.lock().datasets.get(dataset).cloned())
    }

    fn create_dataset(&self, _project: Option<&str>, dataset: &str) -> Result<()> {
        let mut state = self.lock();
        let mtime = state.tick();
        state.datasets.insert(
            dataset.to_string(),
            DatasetInfo {
                mtime_ms: Some(mtime),
            },
        );
        Ok(())
    }

    fn get_table(&self, table: &TableId) -> Result<Option<TableInfo>> {
        Ok(self.lock().tables.get(&table.key()).cloned())
    }

    fn delete_table(&self, table: &TableId) -> Result<()> {
        self.lock().tables.remove(&table.key());
        Ok(())
    }

    fn update_table(&self, table: &TableId, update: &TableUpdate) -> Result<()> {
        let mut state = self.lock();
        let mtime = state.tick();
        let entry = state
            .tables
            .get_mut(&table.key())
            .ok_or_else(|| BackendError::not_found("table", table.key()))?;
        if let Some(desc) = &update.description {
            entry.description = Some(desc.clone());
        }
        if let Some(expires) = update.expires_ms {
            entry.expires_ms = Some(expires);
        }
        entry.mtime_ms = Some(mtime);
        Ok(())
    }

    fn create_view(&self, table: &TableId, _query: &str, description: &str) -> Result<()> {
        let mut state = self.lock();
        let mtime = state.tick();
        state.tables.insert(
            table.key(),
            TableInfo {
                mtime_ms: Some(mtime),
                description: Some(description.to_string()),
                expires_ms: None,
            },
        );
        Ok(())
    }

    fn create_external_table(
        &self,
        table: &TableId,
        _config: &serde_json::Value,
        _schema: Option<&[SchemaField]>,
        description: &str,
    ) -> Result<()> {
        self.create_view(table, "", description)
    }

    fn submit_query(&self, spec: &QueryJobSpec) -> Result<()> {
        self.submit(&spec.job_id, Some(spec.destination.clone()))
    }

    fn load_from_file(&self, spec: &FileLoadJobSpec) -> Result<()> {
        self.submit(&spec.job_id, Some(spec.destination.clone()))
    }

    fn load_from_uris(&self, spec: &UriLoadJobSpec) -> Result<()> {
        self.submit(&spec.job_id, Some(spec.destination.clone()))
    }

    fn submit_extract(&self, spec: &ExtractJobSpec) -> Result<()> {
        self.submit(&spec.job_id, None)
    }

    fn list_jobs(
        &self,
        state_filter: Option<JobState>,
        _page_token: Option<&str>,
        max_results: usize,
    ) -> Result<JobPage> {
        let state = self.lock();
        let jobs = state
            .jobs
            .iter()
            .rev()
            .map(|j| j.info.clone())
            .filter(|j| state_filter.is_none_or(|s| j.state == s))
            .take(max_results)
            .collect();
        Ok(JobPage {
            jobs,
            next_page_token: None,
        })
    }

    fn job_state(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let mut state = self.lock();
        let Some(pos) = state.jobs.iter().position(|j| j.info.id == job_id) else {
            return Ok(None);
        };
        {
            let job = &mut state.jobs[pos];
            if job.info.state == JobState::Done {
                return Ok(Some(job.info.clone()));
            }
            if job.polls_left > 0 {
                job.polls_left -= 1;
                return Ok(Some(job.info.clone()));
            }
        }
        // Completion materializes the destination; a truncating write
        // keeps any existing description.
        let mtime = state.tick();
        let dest = state.jobs[pos].info.destination.clone();
        if let Some(dest) = dest {
            let description = state
                .tables
                .get(&dest.key())
                .and_then(|t| t.description.clone());
            state.tables.insert(
                dest.key(),
                TableInfo {
                    mtime_ms: Some(mtime),
                    description,
                    expires_ms: None,
                },
            );
        }
        state.jobs[pos].info.state = JobState::Done;
        Ok(Some(state.jobs[pos].info.clone()))
    }
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    clock_ms: i64,
    blobs: BTreeMap<String, i64>,
}

/// In-memory [`ObjectStore`] implementation.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    state: Mutex<StoreState>,
}

impl MemoryObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a blob with an explicit updated timestamp.
    pub fn put(&self, uri: &str, updated_ms: i64) {
        let mut state = self.state.lock().expect("memory store poisoned");
        state.blobs.insert(uri.to_string(), updated_ms);
    }
}

impl ObjectStore for MemoryObjectStore {
    fn blob_exists(&self, uri: &str) -> Result<bool> {
        let state = self.state.lock().expect("memory store poisoned");
        Ok(state.blobs.contains_key(uri))
    }

    fn list_blobs(&self, uri_prefix: &str) -> Result<Vec<BlobInfo>> {
        let state = self.state.lock().expect("memory store poisoned");
        Ok(state
            .blobs
            .iter()
            .filter(|(uri, _)| uri.starts_with(uri_prefix))
            .map(|(uri, updated_ms)| BlobInfo {
                uri: uri.clone(),
                updated_ms: *updated_ms,
            })
            .collect())
    }

    fn upload(&self, uri: &str, _bytes: &[u8]) -> Result<()> {
        let mut state = self.state.lock().expect("memory store poisoned");
        state.clock_ms += 1000;
        let now = state.clock_ms;
        state.blobs.insert(uri.to_string(), now);
        Ok(())
    }
}
