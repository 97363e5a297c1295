//! GCS JSON API bindings for the [`ObjectStore`] contract.

use serde_json::Value;
use ureq::Agent;

use silo_backend::types::BlobInfo;
use silo_backend::{BackendError, ObjectStore, Result};

use crate::auth::TokenProvider;
use crate::rest::{agent, enc, read_json, service_error, transport};

const BASE: &str = "https://storage.googleapis.com/storage/v1";
const UPLOAD_BASE: &str = "https://storage.googleapis.com/upload/storage/v1";

/// A blocking GCS client.
pub struct GcsClient {
    agent: Agent,
    auth: TokenProvider,
}

impl Default for GcsClient {
    fn default() -> Self {
        Self::new()
    }
}

impl GcsClient {
    pub fn new() -> Self {
        Self {
            agent: agent(),
            auth: TokenProvider::new(),
        }
    }

    fn bearer(&self) -> Result<String> {
        Ok(format!("Bearer {}", self.auth.token()?))
    }
}

/// Splits a `gs://bucket/name` URI into bucket and object name. The name
/// may be empty (a bucket-wide prefix).
pub fn parse_uri(uri: &str) -> Result<(String, String)> {
    let rest = uri
        .strip_prefix("gs://")
        .ok_or_else(|| BackendError::UriPattern(format!("not a gs:// uri: {uri}")))?;
    match rest.split_once('/') {
        Some((bucket, object)) if !bucket.is_empty() => {
            Ok((bucket.to_string(), object.to_string()))
        }
        None if !rest.is_empty() => Ok((rest.to_string(), String::new())),
        _ => Err(BackendError::UriPattern(format!("missing bucket in {uri}"))),
    }
}

fn updated_ms(item: &Value) -> i64 {
    item.get("updated")
        .and_then(Value::as_str)
        .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.timestamp_millis())
        .unwrap_or(0)
}

impl ObjectStore for GcsClient {
    fn blob_exists(&self, uri: &str) -> Result<bool> {
        let (bucket, object) = parse_uri(uri)?;
        let url = format!("{BASE}/b/{}/o/{}", enc(&bucket), enc(&object));
        let mut res = self
            .agent
            .get(&url)
            .header("Authorization", &self.bearer()?)
            .call()
            .map_err(transport)?;
        match res.status().as_u16() {
            404 => Ok(false),
            s if (200..300).contains(&s) => Ok(true),
            _ => Err(service_error(&mut res)),
        }
    }

    fn list_blobs(&self, uri_prefix: &str) -> Result<Vec<BlobInfo>> {
        let (bucket, prefix) = parse_uri(uri_prefix)?;
        let mut blobs = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let mut url = format!("{BASE}/b/{}/o?prefix={}", enc(&bucket), enc(&prefix));
            if let Some(token) = &page_token {
                url.push_str(&format!("&pageToken={}", enc(token)));
            }
            let mut res = self
                .agent
                .get(&url)
                .header("Authorization", &self.bearer()?)
                .call()
                .map_err(transport)?;
            if !res.status().is_success() {
                return Err(service_error(&mut res));
            }
            let body = read_json(&mut res)?;
            if let Some(items) = body.get("items").and_then(Value::as_array) {
                for item in items {
                    let Some(name) = item.get("name").and_then(Value::as_str) else {
                        continue;
                    };
                    blobs.push(BlobInfo {
                        uri: format!("gs://{bucket}/{name}"),
                        updated_ms: updated_ms(item),
                    });
                }
            }
            match body.get("nextPageToken").and_then(Value::as_str) {
                Some(token) => page_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(blobs)
    }

    fn upload(&self, uri: &str, bytes: &[u8]) -> Result<()> {
        let (bucket, object) = parse_uri(uri)?;
        let url = format!(
            "{UPLOAD_BASE}/b/{}/o?uploadType=media&name={}",
            enc(&bucket),
            enc(&object)
        );
        let mut res = self
            .agent
            .post(&url)
            .header("Authorization", &self.bearer()?)
            .header("Content-Type", "application/octet-stream")
            .send(bytes)
            .map_err(transport)?;
        if !res.status().is_success() {
            return Err(service_error(&mut res));
        }
        Ok(())
    }
}
