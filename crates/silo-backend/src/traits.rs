//! Warehouse, object-store and script-runner traits -- the contracts the
//! reconcile engine consumes.
//!
//! Consumers depend on these traits rather than on concrete implementations
//! so that alternative backends (the REST adapter, the in-memory fake) can
//! be substituted.

use std::path::PathBuf;
use std::sync::Arc;

use crate::error::Result;
use crate::types::{
    BlobInfo, DatasetInfo, ExtractJobSpec, FileLoadJobSpec, JobInfo, JobPage, JobState,
    QueryJobSpec, SchemaField, TableId, TableInfo, TableUpdate, UriLoadJobSpec,
};

// ---------------------------------------------------------------------------
// Warehouse
// ---------------------------------------------------------------------------

/// The managed data warehouse.
///
/// All job submissions are asynchronous on the remote side: `submit_*` and
/// `load_*` return once the job is accepted, and completion is observed by
/// polling [`Warehouse::job_state`] with the spec's `job_id`.
pub trait Warehouse: Send + Sync {
    fn get_dataset(&self, project: Option<&str>, dataset: &str) -> Result<Option<DatasetInfo>>;

    fn create_dataset(&self, project: Option<&str>, dataset: &str) -> Result<()>;

    /// Fetches table metadata; `None` when the table does not exist.
    fn get_table(&self, table: &TableId) -> Result<Option<TableInfo>>;

    fn delete_table(&self, table: &TableId) -> Result<()>;

    /// Writes the `Some` fields of `update`; bumps the table's mtime.
    fn update_table(&self, table: &TableId, update: &TableUpdate) -> Result<()>;

    /// Creates (or replaces) a view over `query`.
    fn create_view(&self, table: &TableId, query: &str, description: &str) -> Result<()>;

    /// Creates a table backed by an external storage configuration.
    fn create_external_table(
        &self,
        table: &TableId,
        config: &serde_json::Value,
        schema: Option<&[SchemaField]>,
        description: &str,
    ) -> Result<()>;

    fn submit_query(&self, spec: &QueryJobSpec) -> Result<()>;

    fn load_from_file(&self, spec: &FileLoadJobSpec) -> Result<()>;

    fn load_from_uris(&self, spec: &UriLoadJobSpec) -> Result<()>;

    fn submit_extract(&self, spec: &ExtractJobSpec) -> Result<()>;

    /// Lists jobs, newest first, optionally filtered by state.
    fn list_jobs(
        &self,
        state: Option<JobState>,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<JobPage>;

    /// Reloads one job; `None` when the id is unknown.
    fn job_state(&self, job_id: &str) -> Result<Option<JobInfo>>;
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// The cloud object store addressed by `gs://bucket/name` URIs.
pub trait ObjectStore: Send + Sync {
    fn blob_exists(&self, uri: &str) -> Result<bool>;

    /// Lists blobs whose URI starts with `uri_prefix`.
    fn list_blobs(&self, uri_prefix: &str) -> Result<Vec<BlobInfo>>;

    fn upload(&self, uri: &str, bytes: &[u8]) -> Result<()>;
}

/// Expands a URI pattern containing at most one `*` against the store.
///
/// Without a `*` the pattern is treated as a plain prefix. With one, the
/// part before it is the listing prefix and the part after it filters on
/// the URI suffix. Patterns with more than one `*` are rejected at load
/// time, so this returns an internal error for them.
pub fn match_uri_pattern(store: &dyn ObjectStore, pattern: &str) -> Result<Vec<BlobInfo>> {
    let mut parts = pattern.split('*');
    let prefix = parts.next().unwrap_or_default();
    let suffix = parts.next();
    if parts.next().is_some() {
        return Err(crate::BackendError::UriPattern(format!(
            "more than one '*' in {pattern}"
        )));
    }

    let blobs = store.list_blobs(prefix)?;
    Ok(match suffix {
        None | Some("") => blobs,
        Some(sfx) => blobs.into_iter().filter(|b| b.uri.ends_with(sfx)).collect(),
    })
}

// ---------------------------------------------------------------------------
// Script runner
// ---------------------------------------------------------------------------

/// Output of a table-producing script run.
#[derive(Debug)]
pub struct ScriptOutput {
    /// File holding the script's standard output.
    pub stdout_path: PathBuf,
    /// Keeps the scratch directory alive for as long as the output is used.
    pub scratch: tempfile::TempDir,
}

/// Runs user-supplied scripts whose stdout becomes a table payload.
pub trait ScriptRunner: Send + Sync {
    fn run(&self, script: &str) -> Result<ScriptOutput>;
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Process-wide bundle of adapter handles, shared across all artifacts.
#[derive(Clone)]
pub struct Session {
    pub warehouse: Arc<dyn Warehouse>,
    pub store: Arc<dyn ObjectStore>,
    pub scripts: Arc<dyn ScriptRunner>,
}

impl Session {
    pub fn new(
        warehouse: Arc<dyn Warehouse>,
        store: Arc<dyn ObjectStore>,
        scripts: Arc<dyn ScriptRunner>,
    ) -> Self {
        Self {
            warehouse,
            store,
            scripts,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;

    #[test]
    fn uri_pattern_star_suffix_filter() {
        let store = MemoryObjectStore::new();
        store.put("gs://b/path/part-0.gz", 10);
        store.put("gs://b/path/part-1.gz", 20);
        store.put("gs://b/path/manifest.json", 30);

        let hits = match_uri_pattern(&store, "gs://b/path/part-*.gz").unwrap();
        assert_eq!(hits.len(), 2);

        let all = match_uri_pattern(&store, "gs://b/path/").unwrap();
        assert_eq!(all.len(), 3);

        let err = match_uri_pattern(&store, "gs://b/*/part-*").unwrap_err();
        assert!(matches!(err, crate::BackendError::UriPattern(_)));
    }
}
