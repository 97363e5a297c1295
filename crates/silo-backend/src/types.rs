//! Wire types shared by all backend implementations.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Identity of a warehouse table.
///
/// Keys derived from a `TableId` are always dot-joined `dataset.table`; the
/// project qualifies REST calls but never participates in key matching.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TableId {
    /// Owning project, if it differs from the client default.
    pub project: Option<String>,
    pub dataset: String,
    pub table: String,
}

impl TableId {
    pub fn new(project: Option<String>, dataset: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            project,
            dataset: dataset.into(),
            table: table.into(),
        }
    }

    /// The artifact key for this table: `dataset.table`.
    pub fn key(&self) -> String {
        format!("{}.{}", self.dataset, self.table)
    }

    /// The artifact key of the containing dataset.
    pub fn dataset_key(&self) -> &str {
        &self.dataset
    }
}

impl std::fmt::Display for TableId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.dataset, self.table)
    }
}

// ---------------------------------------------------------------------------
// Remote state observations
// ---------------------------------------------------------------------------

/// What the warehouse reports about an existing dataset.
#[derive(Debug, Clone, Default)]
pub struct DatasetInfo {
    /// Last-modified time in epoch milliseconds, if known.
    pub mtime_ms: Option<i64>,
}

/// What the warehouse reports about an existing table.
#[derive(Debug, Clone, Default)]
pub struct TableInfo {
    /// Last-modified time in epoch milliseconds, if known.
    pub mtime_ms: Option<i64>,
    /// Free-form description field; carries the definition hash tag.
    pub description: Option<String>,
    /// Expiration time in epoch milliseconds, if set.
    pub expires_ms: Option<i64>,
}

/// Partial update of a table; only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableUpdate {
    pub description: Option<String>,
    pub expires_ms: Option<i64>,
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// One field of a table schema; `RECORD` fields nest via `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaField {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<SchemaField>,
}

impl SchemaField {
    /// A nullable field with no description and no children.
    pub fn simple(name: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            field_type: field_type.into(),
            mode: None,
            description: None,
            fields: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Load options
// ---------------------------------------------------------------------------

/// Source file format for load jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SourceFormat {
    Avro,
    NewlineDelimitedJson,
    Csv,
    DatastoreBackup,
    Parquet,
    Orc,
}

impl SourceFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Avro => "AVRO",
            Self::NewlineDelimitedJson => "NEWLINE_DELIMITED_JSON",
            Self::Csv => "CSV",
            Self::DatastoreBackup => "DATASTORE_BACKUP",
            Self::Parquet => "PARQUET",
            Self::Orc => "ORC",
        }
    }

    /// Formats that embed their own schema; loads of these never require a
    /// schema sidecar.
    pub fn is_self_describing(&self) -> bool {
        matches!(self, Self::Parquet | Self::Orc)
    }
}

impl std::str::FromStr for SourceFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AVRO" => Ok(Self::Avro),
            "NEWLINE_DELIMITED_JSON" => Ok(Self::NewlineDelimitedJson),
            "CSV" => Ok(Self::Csv),
            "DATASTORE_BACKUP" => Ok(Self::DatastoreBackup),
            "PARQUET" => Ok(Self::Parquet),
            "ORC" => Ok(Self::Orc),
            other => Err(format!("unknown source_format: {other}")),
        }
    }
}

/// Write disposition for load jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WriteDisposition {
    WriteAppend,
    WriteEmpty,
    WriteTruncate,
}

impl WriteDisposition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::WriteAppend => "WRITE_APPEND",
            Self::WriteEmpty => "WRITE_EMPTY",
            Self::WriteTruncate => "WRITE_TRUNCATE",
        }
    }
}

impl std::str::FromStr for WriteDisposition {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "WRITE_APPEND" => Ok(Self::WriteAppend),
            "WRITE_EMPTY" => Ok(Self::WriteEmpty),
            "WRITE_TRUNCATE" => Ok(Self::WriteTruncate),
            other => Err(format!("unknown write_disposition: {other}")),
        }
    }
}

/// Option passthroughs honoured by URI load jobs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LoadOptions {
    pub source_format: Option<SourceFormat>,
    pub write_disposition: Option<WriteDisposition>,
    pub max_bad_records: Option<i64>,
    pub field_delimiter: Option<String>,
    pub skip_leading_rows: Option<i64>,
    pub allow_quoted_newlines: Option<bool>,
    pub encoding: Option<String>,
    pub quote_character: Option<String>,
    pub null_marker: Option<String>,
    pub ignore_unknown_values: Option<bool>,
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// Remote job lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Done,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Done => "DONE",
        }
    }

    /// The lowercase filter token used by job-list calls.
    pub fn filter_token(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
        }
    }
}

/// A job as reported by the warehouse.
#[derive(Debug, Clone)]
pub struct JobInfo {
    pub id: String,
    pub state: JobState,
    /// Destination table, when the job writes one.
    pub destination: Option<TableId>,
    /// Terminal error message, if the job failed.
    pub error: Option<String>,
}

impl JobInfo {
    /// A job counts as in flight until it reaches `DONE`.
    pub fn is_running(&self) -> bool {
        !matches!(self.state, JobState::Done)
    }
}

/// One page of a job listing.
#[derive(Debug, Clone, Default)]
pub struct JobPage {
    pub jobs: Vec<JobInfo>,
    pub next_page_token: Option<String>,
}

// ---------------------------------------------------------------------------
// Job submission specs
// ---------------------------------------------------------------------------

/// An async query job materializing a destination table.
#[derive(Debug, Clone)]
pub struct QueryJobSpec {
    pub job_id: String,
    pub query: String,
    pub destination: TableId,
    pub use_legacy_sql: bool,
    pub maximum_billing_tier: i64,
}

impl QueryJobSpec {
    /// Builds the fixed-shape query job the engine submits: large results
    /// on, no flattening, interactive priority, truncate write. The SQL
    /// dialect is legacy unless the query carries the `#standardsql` token.
    pub fn for_table(job_id: impl Into<String>, query: impl Into<String>, destination: TableId) -> Self {
        let query = query.into();
        let use_legacy_sql = !query.to_lowercase().contains("#standardsql");
        Self {
            job_id: job_id.into(),
            query,
            destination,
            use_legacy_sql,
            maximum_billing_tier: 2,
        }
    }
}

/// An async load job reading a local file.
#[derive(Debug, Clone)]
pub struct FileLoadJobSpec {
    pub job_id: String,
    pub destination: TableId,
    pub path: std::path::PathBuf,
    pub schema: Vec<SchemaField>,
    pub source_format: SourceFormat,
}

impl FileLoadJobSpec {
    /// CSV loads skip a single leading header row; other formats do not.
    pub fn skip_leading_rows(&self) -> Option<i64> {
        matches!(self.source_format, SourceFormat::Csv).then_some(1)
    }
}

/// An async load job reading object-store URIs.
#[derive(Debug, Clone)]
pub struct UriLoadJobSpec {
    pub job_id: String,
    pub destination: TableId,
    pub uris: Vec<String>,
    pub schema: Option<Vec<SchemaField>>,
    pub options: LoadOptions,
}

/// An async extract job exporting a table to object-store URIs.
#[derive(Debug, Clone)]
pub struct ExtractJobSpec {
    pub job_id: String,
    pub source: TableId,
    pub destination_uris: Vec<String>,
}

// ---------------------------------------------------------------------------
// Object store
// ---------------------------------------------------------------------------

/// One object in the object store.
#[derive(Debug, Clone)]
pub struct BlobInfo {
    /// Full `gs://bucket/name` URI.
    pub uri: String,
    /// Last-updated time in epoch milliseconds.
    pub updated_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn table_id_keys() {
        let t = TableId::new(Some("proj".into()), "ds", "tbl");
        assert_eq!(t.key(), "ds.tbl");
        assert_eq!(t.dataset_key(), "ds");
        assert_eq!(t.to_string(), "ds.tbl");
    }

    #[test]
    fn query_spec_legacy_sql_heuristic() {
        let dest = TableId::new(None, "ds", "t");
        let legacy = QueryJobSpec::for_table("j1", "select 1", dest.clone());
        assert!(legacy.use_legacy_sql);

        let standard = QueryJobSpec::for_table("j2", "#standardSQL\nselect 1", dest);
        assert!(!standard.use_legacy_sql);
    }

    #[test]
    fn source_format_parsing() {
        assert_eq!("CSV".parse::<SourceFormat>().unwrap(), SourceFormat::Csv);
        assert_eq!(
            "NEWLINE_DELIMITED_JSON".parse::<SourceFormat>().unwrap(),
            SourceFormat::NewlineDelimitedJson
        );
        assert!("TSV".parse::<SourceFormat>().is_err());
        assert!(SourceFormat::Parquet.is_self_describing());
        assert!(!SourceFormat::Csv.is_self_describing());
    }

    #[test]
    fn schema_field_serde_shape() {
        let json = r#"{"name":"a","type":"RECORD","mode":"REPEATED","fields":[{"name":"b","type":"STRING"}]}"#;
        let f: SchemaField = serde_json::from_str(json).unwrap();
        assert_eq!(f.name, "a");
        assert_eq!(f.fields.len(), 1);
        assert_eq!(f.fields[0].field_type, "STRING");

        let back = serde_json::to_value(&f).unwrap();
        assert_eq!(back["type"], "RECORD");
        // Empty child field lists are omitted entirely.
        assert!(back["fields"][0].get("fields").is_none());
    }

    #[test]
    fn csv_file_loads_skip_header() {
        let spec = FileLoadJobSpec {
            job_id: "j".into(),
            destination: TableId::new(None, "d", "t"),
            path: "/tmp/x".into(),
            schema: vec![],
            source_format: SourceFormat::Csv,
        };
        assert_eq!(spec.skip_leading_rows(), Some(1));
    }
}
