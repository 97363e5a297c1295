//! Startup recovery of in-flight remote jobs.
//!
//! A previous invocation may have left query or load jobs running. Before
//! scheduling, the engine pages through the warehouse job list and records
//! the first job seen per destination table; loaders attach these to the
//! artifacts they build so `is_running` observes work already in flight.

use std::collections::HashMap;

use tracing::info;

use crate::error::Result;
use crate::traits::Warehouse;
use crate::types::{JobInfo, JobState, TableId};

const PAGE_SIZE: usize = 1000;
const PAGE_LIMIT: usize = 5;

/// Jobs keyed by their destination table key.
#[derive(Debug, Default)]
pub struct JobRegistry {
    by_destination: HashMap<String, JobInfo>,
}

impl JobRegistry {
    /// A registry with no recovered jobs; used by the offline modes.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Scans recent pending and running jobs into a destination-keyed map.
    /// The first job encountered for a destination wins (listings are
    /// newest first).
    pub fn load(warehouse: &dyn Warehouse) -> Result<Self> {
        info!("starting jobs load");
        let mut registry = Self::default();
        for state in [JobState::Pending, JobState::Running] {
            registry.load_state(warehouse, state)?;
        }
        info!(jobs = registry.by_destination.len(), "finished jobs load");
        Ok(registry)
    }

    fn load_state(&mut self, warehouse: &dyn Warehouse, state: JobState) -> Result<()> {
        let mut page_token: Option<String> = None;
        for _ in 0..PAGE_LIMIT {
            let page = warehouse.list_jobs(Some(state), page_token.as_deref(), PAGE_SIZE)?;
            for job in page.jobs {
                let Some(dest) = &job.destination else {
                    continue;
                };
                self.by_destination.entry(dest.key()).or_insert(job);
            }
            match page.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(())
    }

    /// The recovered job writing `table`, if any.
    pub fn job_for(&self, table: &TableId) -> Option<&JobInfo> {
        self.by_destination.get(&table.key())
    }
}
