//! BigQuery v2 REST bindings for the [`Warehouse`] contract.

use serde_json::{Value, json};
use tracing::debug;
use ureq::Agent;

use silo_backend::types::{
    DatasetInfo, ExtractJobSpec, FileLoadJobSpec, JobInfo, JobPage, JobState, QueryJobSpec,
    SchemaField, TableId, TableInfo, TableUpdate, UriLoadJobSpec,
};
use silo_backend::{BackendError, Result, Warehouse};

use crate::auth::TokenProvider;
use crate::rest::{HttpResponse, agent, enc, millis_field, read_json, service_error, transport};

const BASE: &str = "https://bigquery.googleapis.com/bigquery/v2";
const UPLOAD_BASE: &str = "https://bigquery.googleapis.com/upload/bigquery/v2";

/// A blocking BigQuery client bound to a default project and location.
pub struct BigQueryClient {
    agent: Agent,
    project: String,
    location: String,
    auth: TokenProvider,
}

impl BigQueryClient {
    pub fn new(project: impl Into<String>, location: impl Into<String>) -> Self {
        Self {
            agent: agent(),
            project: project.into(),
            location: location.into(),
            auth: TokenProvider::new(),
        }
    }

    fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.auth.token()?))
    }

    fn project_of<'a>(&'a self, table: &'a TableId) -> &'a str {
        table.project.as_deref().unwrap_or(&self.project)
    }

    fn table_url(&self, table: &TableId) -> String {
        format!(
            "{BASE}/projects/{}/datasets/{}/tables/{}",
            enc(self.project_of(table)),
            enc(&table.dataset),
            enc(&table.table)
        )
    }

    fn table_reference(&self, table: &TableId) -> Value {
        json!({
            "projectId": self.project_of(table),
            "datasetId": table.dataset,
            "tableId": table.table,
        })
    }

    fn get(&self, url: &str) -> Result<HttpResponse> {
        self.agent
            .get(url)
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport)
    }

    fn post_json(&self, url: &str, body: &Value) -> Result<HttpResponse> {
        self.agent
            .post(url)
            .header("Authorization", &self.bearer()?)
            .send_json(body)
            .map_err(transport)
    }

    /// Inserts a job resource and verifies it was accepted.
    fn insert_job(&self, configuration: Value, job_id: &str) -> Result<()> {
        let url = format!("{BASE}/projects/{}/jobs", enc(&self.project));
        let body = json!({
            "jobReference": {
                "projectId": self.project,
                "jobId": job_id,
                "location": self.location,
            },
            "configuration": configuration,
        });
        debug!(job_id, "inserting job");
        let mut res = self.post_json(&url, &body)?;
        if !res.status().is_success() {
            return Err(service_error(&mut res));
        }
        Ok(())
    }
}

fn schema_json(fields: &[SchemaField]) -> Result<Value> {
    Ok(json!({ "fields": serde_json::to_value(fields)? }))
}

fn parse_state(value: &Value) -> JobState {
    match value.pointer("/status/state").and_then(Value::as_str) {
        Some("PENDING") => JobState::Pending,
        Some("RUNNING") => JobState::Running,
        _ => JobState::Done,
    }
}

fn parse_destination(value: &Value) -> Option<TableId> {
    let dest = value
        .pointer("/configuration/query/destinationTable")
        .or_else(|| value.pointer("/configuration/load/destinationTable"))?;
    Some(TableId::new(
        dest.get("projectId").and_then(Value::as_str).map(str::to_string),
        dest.get("datasetId").and_then(Value::as_str)?.to_string(),
        dest.get("tableId").and_then(Value::as_str)?.to_string(),
    ))
}

fn parse_job(value: &Value) -> Option<JobInfo> {
    Some(JobInfo {
        id: value
            .pointer("/jobReference/jobId")
            .and_then(Value::as_str)?
            .to_string(),
        state: parse_state(value),
        destination: parse_destination(value),
        error: value
            .pointer("/status/errorResult/message")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn load_configuration(spec: &UriLoadJobSpec, destination: Value) -> Result<Value> {
    let options = &spec.options;
    let mut load = json!({
        "destinationTable": destination,
        "sourceUris": spec.uris,
    });
    let map = load.as_object_mut().expect("object literal");
    if let Some(schema) = &spec.schema {
        map.insert("schema".to_string(), schema_json(schema)?);
    }
    if let Some(format) = options.source_format {
        map.insert("sourceFormat".to_string(), json!(format.as_str()));
    }
    if let Some(write) = options.write_disposition {
        map.insert("writeDisposition".to_string(), json!(write.as_str()));
    }
    if let Some(n) = options.max_bad_records {
        map.insert("maxBadRecords".to_string(), json!(n));
    }
    if let Some(d) = &options.field_delimiter {
        map.insert("fieldDelimiter".to_string(), json!(d));
    }
    if let Some(n) = options.skip_leading_rows {
        map.insert("skipLeadingRows".to_string(), json!(n));
    }
    if let Some(b) = options.allow_quoted_newlines {
        map.insert("allowQuotedNewlines".to_string(), json!(b));
    }
    if let Some(e) = &options.encoding {
        map.insert("encoding".to_string(), json!(e));
    }
    if let Some(q) = &options.quote_character {
        map.insert("quote".to_string(), json!(q));
    }
    if let Some(n) = &options.null_marker {
        map.insert("nullMarker".to_string(), json!(n));
    }
    if let Some(b) = options.ignore_unknown_values {
        map.insert("ignoreUnknownValues".to_string(), json!(b));
    }
    Ok(json!({ "load": load }))
}

impl Warehouse for BigQueryClient {
    fn get_dataset(&self, project: Option<&str>, dataset: &str) -> Result<Option<DatasetInfo>> {
        let project = project.unwrap_or(&self.project);
        let url = format!("{BASE}/projects/{}/datasets/{}", enc(project), enc(dataset));
        let mut res = self.get(&url)?;
        match res.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => {
                let body = read_json(&mut res)?;
                Ok(Some(DatasetInfo {
                    mtime_ms: millis_field(&body, "lastModifiedTime"),
                }))
            }
            _ => Err(service_error(&mut res)),
        }
    }

    fn create_dataset(&self, project: Option<&str>, dataset: &str) -> Result<()> {
        let project = project.unwrap_or(&self.project);
        let url = format!("{BASE}/projects/{}/datasets", enc(project));
        let body = json!({
            "datasetReference": { "projectId": project, "datasetId": dataset },
            "location": self.location,
        });
        let mut res = self.post_json(&url, &body)?;
        match res.status().as_u16() {
            // Already exists: another run won the race; that is fine.
            409 => Ok(()),
            s if (200..300).contains(&s) => Ok(()),
            _ => Err(service_error(&mut res)),
        }
    }

    fn get_table(&self, table: &TableId) -> Result<Option<TableInfo>> {
        let mut res = self.get(&self.table_url(table))?;
        match res.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => {
                let body = read_json(&mut res)?;
                Ok(Some(TableInfo {
                    mtime_ms: millis_field(&body, "lastModifiedTime"),
                    description: body
                        .get("description")
                        .and_then(Value::as_str)
                        .map(str::to_string),
                    expires_ms: millis_field(&body, "expirationTime"),
                }))
            }
            _ => Err(service_error(&mut res)),
        }
    }

    fn delete_table(&self, table: &TableId) -> Result<()> {
        let mut res = self
            .agent
            .delete(&self.table_url(table))
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport)?;
        match res.status().as_u16() {
            404 => Ok(()),
            s if (200..300).contains(&s) => Ok(()),
            _ => Err(service_error(&mut res)),
        }
    }

    fn update_table(&self, table: &TableId, update: &TableUpdate) -> Result<()> {
        let mut body = serde_json::Map::new();
        if let Some(description) = &update.description {
            body.insert("description".to_string(), json!(description));
        }
        if let Some(expires) = update.expires_ms {
            body.insert("expirationTime".to_string(), json!(expires.to_string()));
        }
        let mut res = self
            .agent
            .patch(&self.table_url(table))
            .header("Authorization", &self.bearer()?)
            .send_json(&Value::Object(body))
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(service_error(&mut res));
        }
        Ok(())
    }

    fn create_view(&self, table: &TableId, query: &str, description: &str) -> Result<()> {
        let url = format!(
            "{BASE}/projects/{}/datasets/{}/tables",
            enc(self.project_of(table)),
            enc(&table.dataset)
        );
        let use_legacy_sql = !query.to_lowercase().contains("#standardsql");
        let body = json!({
            "tableReference": self.table_reference(table),
            "description": description,
            "view": { "query": query, "useLegacySql": use_legacy_sql },
        });
        let mut res = self.post_json(&url, &body)?;
        if !res.status().is_success() {
            return Err(service_error(&mut res));
        }
        Ok(())
    }

    fn create_external_table(
        &self,
        table: &TableId,
        config: &Value,
        schema: Option<&[SchemaField]>,
        description: &str,
    ) -> Result<()> {
        let url = format!(
            "{BASE}/projects/{}/datasets/{}/tables",
            enc(self.project_of(table)),
            enc(&table.dataset)
        );
        let mut body = json!({
            "tableReference": self.table_reference(table),
            "description": description,
            "externalDataConfiguration": config,
        });
        if let Some(fields) = schema {
            body.as_object_mut()
                .expect("object literal")
                .insert("schema".to_string(), schema_json(fields)?);
        }
        let mut res = self.post_json(&url, &body)?;
        if !res.status().is_success() {
            return Err(service_error(&mut res));
        }
        Ok(())
    }

    fn submit_query(&self, spec: &QueryJobSpec) -> Result<()> {
        let configuration = json!({
            "query": {
                "query": spec.query,
                "destinationTable": self.table_reference(&spec.destination),
                "createDisposition": "CREATE_IF_NEEDED",
                "writeDisposition": "WRITE_TRUNCATE",
                "priority": "INTERACTIVE",
                "allowLargeResults": true,
                "flattenResults": false,
                "useLegacySql": spec.use_legacy_sql,
                "maximumBillingTier": spec.maximum_billing_tier,
            }
        });
        self.insert_job(configuration, &spec.job_id)
    }

    fn load_from_file(&self, spec: &FileLoadJobSpec) -> Result<()> {
        let data = std::fs::read(&spec.path)?;

        let mut load = json!({
            "destinationTable": self.table_reference(&spec.destination),
            "sourceFormat": spec.source_format.as_str(),
            "writeDisposition": "WRITE_TRUNCATE",
        });
        let map = load.as_object_mut().expect("object literal");
        if spec.schema.is_empty() {
            map.insert("autodetect".to_string(), json!(true));
        } else {
            map.insert("schema".to_string(), schema_json(&spec.schema)?);
        }
        if let Some(skip) = spec.skip_leading_rows() {
            map.insert("skipLeadingRows".to_string(), json!(skip));
        }
        let metadata = json!({
            "jobReference": {
                "projectId": self.project,
                "jobId": spec.job_id,
                "location": self.location,
            },
            "configuration": { "load": load },
        });

        // Multipart-related upload: JSON metadata part plus the payload.
        let boundary = "silo_upload_boundary";
        let mut body = Vec::with_capacity(data.len() + 512);
        body.extend_from_slice(
            format!(
                "--{boundary}\r\nContent-Type: application/json; charset=UTF-8\r\n\r\n{metadata}\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(
            format!("--{boundary}\r\nContent-Type: application/octet-stream\r\n\r\n").as_bytes(),
        );
        body.extend_from_slice(&data);
        body.extend_from_slice(format!("\r\n--{boundary}--\r\n").as_bytes());

        let url = format!(
            "{UPLOAD_BASE}/projects/{}/jobs?uploadType=multipart",
            enc(&self.project)
        );
        let mut res = self
            .agent
            .post(&url)
            .header("Authorization", &self.bearer()?)
            .header(
                "Content-Type",
                &format!("multipart/related; boundary={boundary}"),
            )
            .send(&body[..])
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(service_error(&mut res));
        }
        Ok(())
    }

    fn load_from_uris(&self, spec: &UriLoadJobSpec) -> Result<()> {
        let configuration =
            load_configuration(spec, self.table_reference(&spec.destination))?;
        self.insert_job(configuration, &spec.job_id)
    }

    fn submit_extract(&self, spec: &ExtractJobSpec) -> Result<()> {
        let configuration = json!({
            "extract": {
                "sourceTable": self.table_reference(&spec.source),
                "destinationUris": spec.destination_uris,
            }
        });
        self.insert_job(configuration, &spec.job_id)
    }

    fn list_jobs(
        &self,
        state: Option<JobState>,
        page_token: Option<&str>,
        max_results: usize,
    ) -> Result<JobPage> {
        let mut url = format!(
            "{BASE}/projects/{}/jobs?projection=full&maxResults={max_results}",
            enc(&self.project)
        );
        if let Some(state) = state {
            url.push_str(&format!("&stateFilter={}", state.filter_token()));
        }
        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", enc(token)));
        }
        let mut res = self.get(&url)?;
        if !res.status().is_success() {
            return Err(service_error(&mut res));
        }
        let body = read_json(&mut res)?;
        let jobs = body
            .get("jobs")
            .and_then(Value::as_array)
            .map(|jobs| jobs.iter().filter_map(parse_job).collect())
            .unwrap_or_default();
        Ok(JobPage {
            jobs,
            next_page_token: body
                .get("nextPageToken")
                .and_then(Value::as_str)
                .map(str::to_string),
        })
    }

    fn job_state(&self, job_id: &str) -> Result<Option<JobInfo>> {
        let url = format!(
            "{BASE}/projects/{}/jobs/{}?location={}",
            enc(&self.project),
            enc(job_id),
            enc(&self.location)
        );
        let mut res = self.get(&url)?;
        match res.status().as_u16() {
            404 => Ok(None),
            s if (200..300).contains(&s) => {
                let body = read_json(&mut res)?;
                if let Some(job) = parse_job(&body) {
                    if let Some(error) = &job.error {
                        debug!(job_id, error, "job reported an error");
                    }
                    Ok(Some(job))
                } else {
                    Err(BackendError::Internal(format!(
                        "malformed job resource for {job_id}"
                    )))
                }
            }
            _ => Err(service_error(&mut res)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use silo_backend::types::LoadOptions;

    #[test]
    fn job_resources_parse() {
        let v = json!({
            "jobReference": { "jobId": "create-ds-t-123" },
            "status": { "state": "RUNNING" },
            "configuration": { "query": { "destinationTable": {
                "projectId": "p", "datasetId": "ds", "tableId": "t"
            }}},
        });
        let job = parse_job(&v).unwrap();
        assert_eq!(job.id, "create-ds-t-123");
        assert_eq!(job.state, JobState::Running);
        assert_eq!(job.destination.unwrap().key(), "ds.t");
        assert!(job.error.is_none());
    }

    #[test]
    fn done_job_carries_error_result() {
        let v = json!({
            "jobReference": { "jobId": "j" },
            "status": { "state": "DONE", "errorResult": { "message": "boom" } },
        });
        let job = parse_job(&v).unwrap();
        assert!(!job.is_running());
        assert_eq!(job.error.as_deref(), Some("boom"));
    }

    #[test]
    fn uri_load_configuration_honours_options() {
        let spec = UriLoadJobSpec {
            job_id: "j".into(),
            destination: TableId::new(None, "ds", "t"),
            uris: vec!["gs://b/x-*".into()],
            schema: None,
            options: LoadOptions {
                source_format: Some("CSV".parse().unwrap()),
                max_bad_records: Some(5),
                field_delimiter: Some("\t".into()),
                allow_quoted_newlines: Some(true),
                ..LoadOptions::default()
            },
        };
        let cfg = load_configuration(&spec, json!({"datasetId": "ds", "tableId": "t"})).unwrap();
        assert_eq!(cfg["load"]["sourceFormat"], "CSV");
        assert_eq!(cfg["load"]["maxBadRecords"], 5);
        assert_eq!(cfg["load"]["fieldDelimiter"], "\t");
        assert_eq!(cfg["load"]["allowQuotedNewlines"], true);
        assert!(cfg["load"].get("schema").is_none());
    }
}
