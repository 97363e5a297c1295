//! Shared HTTP plumbing for the REST clients.

use std::time::Duration;

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use ureq::Agent;

use silo_backend::{BackendError, Result};

/// Characters left intact in URL path segments and query values.
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encodes one path segment or query value.
pub fn enc(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

/// An agent configured for the Google JSON APIs: statuses are inspected
/// by the callers, not turned into transport errors.
pub fn agent() -> Agent {
    Agent::config_builder()
        .http_status_as_error(false)
        .timeout_global(Some(Duration::from_secs(120)))
        .build()
        .new_agent()
}

pub type HttpResponse = ureq::http::Response<ureq::Body>;

/// Maps a transport-level failure.
pub fn transport(e: ureq::Error) -> BackendError {
    BackendError::Http(e.to_string())
}

/// Parses a successful response body as JSON.
pub fn read_json(res: &mut HttpResponse) -> Result<serde_json::Value> {
    res.body_mut()
        .read_json()
        .map_err(|e| BackendError::Http(e.to_string()))
}

/// Builds the service error for a non-2xx response, extracting the
/// `error.message` field when the body carries one.
pub fn service_error(res: &mut HttpResponse) -> BackendError {
    let status = res.status().as_u16();
    let body = res.body_mut().read_to_string().unwrap_or_default();
    let message = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| {
            v.pointer("/error/message")
                .and_then(|m| m.as_str())
                .map(str::to_string)
        })
        .unwrap_or(body);
    BackendError::Service { status, message }
}

/// Reads a millisecond-epoch timestamp field, which the APIs encode as a
/// decimal string.
pub fn millis_field(value: &serde_json::Value, field: &str) -> Option<i64> {
    value.get(field)?.as_str()?.parse().ok()
}
