//! The artifact model.
//!
//! Every managed warehouse entity is one [`Artifact`] variant. The
//! scheduler drives artifacts through a common capability set: `key`,
//! `exists`, `mtime_ms`, `should_update`, `is_running`, `create`,
//! `depends_on` and `dump`. Remote work is submitted asynchronously;
//! completion is observed by polling job state through the session.

use std::io::BufRead;
use std::path::PathBuf;

use tracing::debug;

use silo_backend::traits::match_uri_pattern;
use silo_backend::types::{
    ExtractJobSpec, FileLoadJobSpec, LoadOptions, QueryJobSpec, SchemaField, SourceFormat, TableId,
    TableUpdate, UriLoadJobSpec,
};
use silo_backend::{Result, Session};

use crate::error::ModelError;
use crate::format::detect_source_format;
use crate::hashtag::{
    apply_tag, description_contains, external_config_hash_tag, file_hash_tag, query_hash_tag,
    script_hash_tag,
};
use crate::text::{contains_key, strict_substring};

/// Joins job-name parts with a trailing UUID so ids are unique per submit.
pub fn job_name(parts: &[&str]) -> String {
    let mut all: Vec<String> = parts.iter().map(|p| p.replace('.', "_")).collect();
    all.push(uuid::Uuid::new_v4().to_string());
    all.join("-")
}

const MS_PER_DAY: i64 = 86_400_000;

fn expires_from_days(days: i64) -> i64 {
    chrono::Utc::now().timestamp_millis() + days * MS_PER_DAY
}

// ---------------------------------------------------------------------------
// Variants
// ---------------------------------------------------------------------------

/// The containing namespace; created on demand, never updated.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub project: Option<String>,
    pub name: String,
}

/// A table materialized by running one or more queries.
#[derive(Debug, Clone)]
pub struct QueryTable {
    pub table: TableId,
    pub queries: Vec<String>,
    pub expiration_days: Option<i64>,
    /// Whether identical keys from other files merge by `union all`.
    pub unionable: bool,
    job_id: Option<String>,
    tag_written: bool,
    created: bool,
}

impl QueryTable {
    pub fn new(
        table: TableId,
        query: String,
        expiration_days: Option<i64>,
        unionable: bool,
        recovered_job: Option<String>,
    ) -> Self {
        Self {
            table,
            queries: vec![query],
            expiration_days,
            unionable,
            job_id: recovered_job,
            tag_written: false,
            created: false,
        }
    }

    /// The final query text; union siblings join with `union all`.
    pub fn final_query(&self) -> String {
        self.queries.join("\nunion all\n")
    }
}

/// A view over a rendered query; re-created whenever the query changes.
#[derive(Debug, Clone)]
pub struct View {
    pub table: TableId,
    pub queries: Vec<String>,
    pub unionable: bool,
    tag_written: bool,
}

impl View {
    pub fn new(table: TableId, query: String, unionable: bool) -> Self {
        Self {
            table,
            queries: vec![query],
            unionable,
            tag_written: false,
        }
    }

    pub fn final_query(&self) -> String {
        self.queries.join("\nunion all\n")
    }
}

/// A table loaded from a local data file plus schema sidecar.
#[derive(Debug, Clone)]
pub struct LocalDataLoad {
    pub table: TableId,
    pub data_path: PathBuf,
    pub schema: Vec<SchemaField>,
    pub source_format: SourceFormat,
    /// `filehash:<md5 data>:<md5 schema>`, computed at load time.
    hash_tag: String,
    job_id: Option<String>,
    tag_written: bool,
    created: bool,
}

impl LocalDataLoad {
    pub fn new(
        table: TableId,
        data_path: PathBuf,
        schema: Vec<SchemaField>,
        data_bytes: &[u8],
        schema_bytes: &[u8],
        recovered_job: Option<String>,
    ) -> Self {
        let first_line = data_bytes
            .split(|b| *b == b'\n')
            .next()
            .map(|l| String::from_utf8_lossy(l).into_owned())
            .unwrap_or_default();
        Self {
            table,
            data_path,
            schema,
            source_format: detect_source_format(&first_line),
            hash_tag: file_hash_tag(data_bytes, schema_bytes),
            job_id: recovered_job,
            tag_written: false,
            created: false,
        }
    }
}

/// A table loaded from object-store URIs.
#[derive(Debug, Clone)]
pub struct ObjectStoreLoad {
    pub table: TableId,
    /// Rendered payload: `gs://` lines plus any surrounding text.
    pub payload: String,
    pub schema: Option<Vec<SchemaField>>,
    pub options: LoadOptions,
    pub require_exists: Option<String>,
    pub expiration_days: Option<i64>,
    job_id: Option<String>,
    expires_written: bool,
}

impl ObjectStoreLoad {
    pub fn new(
        table: TableId,
        payload: String,
        schema: Option<Vec<SchemaField>>,
        options: LoadOptions,
        require_exists: Option<String>,
        expiration_days: Option<i64>,
        recovered_job: Option<String>,
    ) -> Self {
        Self {
            table,
            payload,
            schema,
            options,
            require_exists,
            expiration_days,
            job_id: recovered_job,
            expires_written: false,
        }
    }

    /// The object-store URIs named by the payload.
    pub fn uris(&self) -> Vec<String> {
        self.payload
            .lines()
            .map(str::trim)
            .filter(|l| l.starts_with("gs://"))
            .map(str::to_string)
            .collect()
    }

    /// Payload with object-store URIs scrubbed, for dependency scanning.
    fn scrubbed_payload(&self) -> String {
        self.payload
            .split_whitespace()
            .filter(|token| !token.starts_with("gs://"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// A table whose storage configuration is a user-supplied JSON object.
#[derive(Debug, Clone)]
pub struct ExternalTable {
    pub table: TableId,
    pub config: serde_json::Value,
    pub schema: Option<Vec<SchemaField>>,
    tag_written: bool,
}

impl ExternalTable {
    pub fn new(table: TableId, config: serde_json::Value, schema: Option<Vec<SchemaField>>) -> Self {
        Self {
            table,
            config,
            schema,
            tag_written: false,
        }
    }
}

/// A table loaded from the stdout of a user-supplied script.
#[derive(Debug, Clone)]
pub struct ScriptTable {
    pub table: TableId,
    pub script: String,
    pub schema: Vec<SchemaField>,
    job_id: Option<String>,
    tag_written: bool,
    created: bool,
}

impl ScriptTable {
    pub fn new(
        table: TableId,
        script: String,
        schema: Vec<SchemaField>,
        recovered_job: Option<String>,
    ) -> Self {
        Self {
            table,
            script,
            schema,
            job_id: recovered_job,
            tag_written: false,
            created: false,
        }
    }
}

/// An export of an existing table to object-store URIs.
#[derive(Debug, Clone)]
pub struct Extract {
    pub source: TableId,
    pub uri_patterns: Vec<String>,
    job_id: Option<String>,
}

impl Extract {
    /// Validates that no pattern carries more than one wildcard.
    pub fn new(source: TableId, uri_patterns: Vec<String>) -> std::result::Result<Self, ModelError> {
        for pattern in &uri_patterns {
            if pattern.matches('*').count() > 1 {
                return Err(ModelError::UriPattern(pattern.clone()));
            }
        }
        Ok(Self {
            source,
            uri_patterns,
            job_id: None,
        })
    }
}

// ---------------------------------------------------------------------------
// The artifact enum
// ---------------------------------------------------------------------------

/// One managed warehouse entity.
#[derive(Debug, Clone)]
pub enum Artifact {
    Dataset(Dataset),
    QueryTable(QueryTable),
    View(View),
    LocalDataLoad(LocalDataLoad),
    ObjectStoreLoad(ObjectStoreLoad),
    ExternalTable(ExternalTable),
    ScriptTable(ScriptTable),
    Extract(Extract),
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind(), self.key())
    }
}

impl Artifact {
    /// Short lowercase tag naming the variant, for logs and errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Dataset(_) => "dataset",
            Self::QueryTable(_) => "table",
            Self::View(_) => "view",
            Self::LocalDataLoad(_) => "localdata",
            Self::ObjectStoreLoad(_) => "storeload",
            Self::ExternalTable(_) => "external",
            Self::ScriptTable(_) => "script",
            Self::Extract(_) => "extract",
        }
    }

    /// The stable identity of this artifact within a run.
    pub fn key(&self) -> String {
        match self {
            Self::Dataset(d) => d.name.clone(),
            Self::QueryTable(a) => a.table.key(),
            Self::View(a) => a.table.key(),
            Self::LocalDataLoad(a) => a.table.key(),
            Self::ObjectStoreLoad(a) => a.table.key(),
            Self::ExternalTable(a) => a.table.key(),
            Self::ScriptTable(a) => a.table.key(),
            Self::Extract(e) => format!("extract.{}", e.source.key()),
        }
    }

    /// The destination table, for table-like variants.
    pub fn table_id(&self) -> Option<&TableId> {
        match self {
            Self::Dataset(_) | Self::Extract(_) => None,
            Self::QueryTable(a) => Some(&a.table),
            Self::View(a) => Some(&a.table),
            Self::LocalDataLoad(a) => Some(&a.table),
            Self::ObjectStoreLoad(a) => Some(&a.table),
            Self::ExternalTable(a) => Some(&a.table),
            Self::ScriptTable(a) => Some(&a.table),
        }
    }

    /// The dataset this artifact lives in (extracts report their source's).
    pub fn dataset_name(&self) -> &str {
        match self {
            Self::Dataset(d) => &d.name,
            Self::Extract(e) => &e.source.dataset,
            other => &other.table_id().expect("table-like artifact").dataset,
        }
    }

    /// The text scanned for references to other artifacts, when there is one.
    pub fn dependency_text(&self) -> Option<String> {
        match self {
            Self::Dataset(_) | Self::LocalDataLoad(_) | Self::Extract(_) => None,
            Self::QueryTable(a) => Some(a.final_query()),
            Self::View(a) => Some(a.final_query()),
            Self::ObjectStoreLoad(a) => Some(a.scrubbed_payload()),
            Self::ExternalTable(a) => Some(a.config.to_string()),
            Self::ScriptTable(a) => Some(a.script.clone()),
        }
    }

    // -- Dependency inference ------------------------------------------------

    /// Whether this artifact depends on `other`.
    ///
    /// Edges are derived, never declared: textual containment of the other
    /// key inside this artifact's normalized rendered text, dataset
    /// containment inside this key, or the extract-source rule. Never true
    /// for an artifact and itself.
    pub fn depends_on(&self, other: &Artifact) -> bool {
        if self.key() == other.key() {
            return false;
        }
        // Datasets are leaves.
        if matches!(self, Self::Dataset(_)) {
            return false;
        }
        // An extract follows its source table.
        if let Self::Extract(e) = self {
            if other.key() == e.source.key() {
                return true;
            }
        }
        if let Some(text) = self.dependency_text() {
            if contains_key(&text, &other.key()) {
                return true;
            }
        }
        // Every table-like artifact follows its containing dataset.
        if matches!(other, Self::Dataset(_)) && strict_substring(&other.key(), &self.key()) {
            return true;
        }
        false
    }

    // -- Remote observation --------------------------------------------------

    /// Whether the remote counterpart exists.
    pub fn exists(&self, cx: &Session) -> Result<bool> {
        match self {
            Self::Dataset(d) => Ok(cx
                .warehouse
                .get_dataset(d.project.as_deref(), &d.name)?
                .is_some()),
            Self::Extract(e) => {
                if e.uri_patterns.is_empty() {
                    return Ok(false);
                }
                for pattern in &e.uri_patterns {
                    if match_uri_pattern(cx.store.as_ref(), pattern)?.is_empty() {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            other => {
                let table = other.table_id().expect("table-like artifact");
                Ok(cx.warehouse.get_table(table)?.is_some())
            }
        }
    }

    /// Remote modification time in epoch milliseconds; `None` if absent.
    pub fn mtime_ms(&self, cx: &Session) -> Result<Option<i64>> {
        match self {
            Self::Dataset(d) => Ok(cx
                .warehouse
                .get_dataset(d.project.as_deref(), &d.name)?
                .and_then(|info| info.mtime_ms)),
            Self::Extract(e) => {
                let mut newest = None;
                for pattern in &e.uri_patterns {
                    for blob in match_uri_pattern(cx.store.as_ref(), pattern)? {
                        newest = newest.max(Some(blob.updated_ms));
                    }
                }
                Ok(newest)
            }
            other => {
                let table = other.table_id().expect("table-like artifact");
                Ok(cx.warehouse.get_table(table)?.and_then(|info| info.mtime_ms))
            }
        }
    }

    /// Whether the remote definition is out of date with the local one.
    ///
    /// Materializing variants compare their hash tag against the remote
    /// description, writing the tag (at most once per run) on first
    /// observation of a stale description. Staleness is reported as
    /// observed before that write, except for an artifact already created
    /// this run: its post-create observation only back-fills the tag.
    pub fn should_update(&mut self, cx: &Session) -> Result<bool> {
        match self {
            Self::Dataset(_) | Self::Extract(_) => Ok(false),
            Self::QueryTable(a) => {
                let tag = query_hash_tag(&a.final_query());
                let stale =
                    observe_and_tag(cx, &a.table, &tag, &mut a.tag_written, a.expiration_days)?;
                Ok(stale && !a.created)
            }
            Self::View(a) => {
                let tag = query_hash_tag(&a.final_query());
                observe_and_tag(cx, &a.table, &tag, &mut a.tag_written, None)
            }
            Self::LocalDataLoad(a) => {
                let tag = a.hash_tag.clone();
                let stale = observe_and_tag(cx, &a.table, &tag, &mut a.tag_written, None)?;
                Ok(stale && !a.created)
            }
            Self::ScriptTable(a) => {
                let tag = script_hash_tag(&a.script);
                let stale = observe_and_tag(cx, &a.table, &tag, &mut a.tag_written, None)?;
                Ok(stale && !a.created)
            }
            Self::ExternalTable(a) => {
                let tag = external_config_hash_tag(&a.config);
                observe_and_tag(cx, &a.table, &tag, &mut a.tag_written, None)
            }
            Self::ObjectStoreLoad(a) => {
                // Not part of the hash protocol, but a configured expiration
                // is still maintained lazily when the table is encountered.
                if let Some(days) = a.expiration_days {
                    if !a.expires_written {
                        if let Some(info) = cx.warehouse.get_table(&a.table)? {
                            if info.expires_ms.is_none() {
                                let update = TableUpdate {
                                    description: None,
                                    expires_ms: Some(expires_from_days(days)),
                                };
                                cx.warehouse.update_table(&a.table, &update)?;
                                a.expires_written = true;
                            }
                        }
                    }
                }
                Ok(false)
            }
        }
    }

    /// Whether remote work for this artifact is currently in flight.
    pub fn is_running(&self, cx: &Session) -> Result<bool> {
        let job_id = match self {
            Self::QueryTable(a) => a.job_id.as_deref(),
            Self::LocalDataLoad(a) => a.job_id.as_deref(),
            Self::ObjectStoreLoad(a) => a.job_id.as_deref(),
            Self::ScriptTable(a) => a.job_id.as_deref(),
            Self::Extract(e) => e.job_id.as_deref(),
            _ => None,
        };
        let Some(job_id) = job_id else {
            return Ok(false);
        };
        match cx.warehouse.job_state(job_id)? {
            Some(job) => {
                debug!(job = %job.id, state = job.state.as_str(), errors = ?job.error, "job probe");
                Ok(job.is_running())
            }
            None => Ok(false),
        }
    }

    /// Whether the artifact's preconditions allow dispatch this tick.
    ///
    /// Only object-store loads gate on anything: a configured
    /// `require_exists` blob that is absent defers the artifact without
    /// consuming a retry.
    pub fn ready_to_create(&self, cx: &Session) -> Result<bool> {
        match self {
            Self::ObjectStoreLoad(a) => match &a.require_exists {
                Some(uri) => cx.store.blob_exists(uri),
                None => Ok(true),
            },
            _ => Ok(true),
        }
    }

    // -- Creation ------------------------------------------------------------

    /// Submits the remote work that brings this artifact up to date.
    ///
    /// Asynchronous variants record the submitted job id so later
    /// `is_running` probes observe it; synchronous variants return once the
    /// remote entity exists.
    pub fn create(&mut self, cx: &Session) -> Result<()> {
        match self {
            Self::Dataset(d) => cx.warehouse.create_dataset(d.project.as_deref(), &d.name),
            Self::QueryTable(a) => {
                let job_id = job_name(&["create", &a.table.dataset, &a.table.table]);
                let spec = QueryJobSpec::for_table(job_id.clone(), a.final_query(), a.table.clone());
                cx.warehouse.submit_query(&spec)?;
                a.job_id = Some(job_id);
                a.created = true;
                Ok(())
            }
            Self::View(a) => {
                let tag = query_hash_tag(&a.final_query());
                if cx.warehouse.get_table(&a.table)?.is_some() {
                    cx.warehouse.delete_table(&a.table)?;
                }
                cx.warehouse.create_view(&a.table, &a.final_query(), &tag)?;
                a.tag_written = true;
                Ok(())
            }
            Self::LocalDataLoad(a) => {
                let job_id = job_name(&["load", &a.table.dataset, &a.table.table]);
                let spec = FileLoadJobSpec {
                    job_id: job_id.clone(),
                    destination: a.table.clone(),
                    path: a.data_path.clone(),
                    schema: a.schema.clone(),
                    source_format: a.source_format,
                };
                cx.warehouse.load_from_file(&spec)?;
                a.job_id = Some(job_id);
                a.created = true;
                Ok(())
            }
            Self::ObjectStoreLoad(a) => {
                let job_id = job_name(&["load", &a.table.dataset, &a.table.table]);
                let spec = UriLoadJobSpec {
                    job_id: job_id.clone(),
                    destination: a.table.clone(),
                    uris: a.uris(),
                    schema: a.schema.clone(),
                    options: a.options.clone(),
                };
                cx.warehouse.load_from_uris(&spec)?;
                a.job_id = Some(job_id);
                Ok(())
            }
            Self::ExternalTable(a) => {
                let tag = external_config_hash_tag(&a.config);
                if cx.warehouse.get_table(&a.table)?.is_some() {
                    cx.warehouse.delete_table(&a.table)?;
                }
                cx.warehouse
                    .create_external_table(&a.table, &a.config, a.schema.as_deref(), &tag)?;
                a.tag_written = true;
                Ok(())
            }
            Self::ScriptTable(a) => {
                let output = cx.scripts.run(&a.script)?;
                let source_format = detect_stdout_format(&output.stdout_path)?;
                let job_id = job_name(&["script", &a.table.dataset, &a.table.table]);
                let spec = FileLoadJobSpec {
                    job_id: job_id.clone(),
                    destination: a.table.clone(),
                    path: output.stdout_path.clone(),
                    schema: a.schema.clone(),
                    source_format,
                };
                cx.warehouse.load_from_file(&spec)?;
                a.job_id = Some(job_id);
                a.created = true;
                Ok(())
            }
            Self::Extract(e) => {
                let job_id = job_name(&["extract", &e.source.dataset, &e.source.table]);
                let spec = ExtractJobSpec {
                    job_id: job_id.clone(),
                    source: e.source.clone(),
                    destination_uris: e.uri_patterns.clone(),
                };
                cx.warehouse.submit_extract(&spec)?;
                e.job_id = Some(job_id);
                Ok(())
            }
        }
    }

    /// The rendered definition, for the dump mode.
    pub fn dump(&self) -> String {
        match self {
            Self::Dataset(_) => String::new(),
            Self::QueryTable(a) => a.final_query(),
            Self::View(a) => a.final_query(),
            Self::LocalDataLoad(a) => a.data_path.display().to_string(),
            Self::ObjectStoreLoad(a) => a.payload.clone(),
            Self::ExternalTable(a) => {
                serde_json::to_string_pretty(&a.config).unwrap_or_else(|_| a.config.to_string())
            }
            Self::ScriptTable(a) => a.script.clone(),
            Self::Extract(e) => e.uri_patterns.join("\n"),
        }
    }

    // -- Union merging -------------------------------------------------------

    /// Merges another artifact produced under the same key into this one.
    ///
    /// Only unionable query tables and views over the same destination
    /// merge; anything else is a duplicate-key error.
    pub fn merge_union(&mut self, other: Artifact) -> std::result::Result<(), ModelError> {
        let key = self.key();
        match (&mut *self, other) {
            (Self::QueryTable(a), Self::QueryTable(b))
                if a.unionable && b.unionable && a.table == b.table =>
            {
                a.queries.extend(b.queries);
                Ok(())
            }
            (Self::View(a), Self::View(b)) if a.unionable && b.unionable && a.table == b.table => {
                a.queries.extend(b.queries);
                Ok(())
            }
            _ => Err(ModelError::DuplicateKey(key)),
        }
    }
}

/// Reads the first line of a script's stdout to pick the load format.
fn detect_stdout_format(path: &std::path::Path) -> Result<SourceFormat> {
    let file = std::fs::File::open(path)?;
    let mut first_line = String::new();
    std::io::BufReader::new(file).read_line(&mut first_line)?;
    Ok(detect_source_format(&first_line))
}

/// Fetches the remote description, reports staleness, and writes the tag
/// (plus any configured expiration) at most once per run.
fn observe_and_tag(
    cx: &Session,
    table: &TableId,
    tag: &str,
    tag_written: &mut bool,
    expiration_days: Option<i64>,
) -> Result<bool> {
    let Some(info) = cx.warehouse.get_table(table)? else {
        return Ok(false);
    };
    let stale = !description_contains(info.description.as_deref(), tag);
    if stale && !*tag_written {
        let update = TableUpdate {
            description: Some(apply_tag(info.description.as_deref(), tag)),
            expires_ms: expiration_days.map(expires_from_days),
        };
        debug!(table = %table, "writing definition hash tag");
        cx.warehouse.update_table(table, &update)?;
        *tag_written = true;
    }
    Ok(stale)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
