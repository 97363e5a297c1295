//! REST implementations of the backend contracts.
//!
//! [`bigquery::BigQueryClient`] speaks the BigQuery v2 API and
//! [`gcs::GcsClient`] the GCS JSON API, both over blocking HTTP. Requests
//! authenticate with an OAuth access token resolved from the environment
//! or the local `gcloud` installation.

pub mod auth;
pub mod bigquery;
pub mod gcs;
mod rest;

pub use auth::{TokenProvider, resolve_project};
pub use bigquery::BigQueryClient;
pub use gcs::GcsClient;
