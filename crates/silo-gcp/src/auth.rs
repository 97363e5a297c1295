//! Access-token and project resolution.
//!
//! Tokens come from `SILO_ACCESS_TOKEN` when set, otherwise from
//! `gcloud auth print-access-token`, cached for most of their lifetime.
//! The active project resolves from an explicit value, the
//! `GOOGLE_CLOUD_PROJECT` environment variable, or the gcloud config.

use std::process::Command;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use silo_backend::{BackendError, Result};

const TOKEN_TTL: Duration = Duration::from_secs(45 * 60);

#[derive(Debug)]
struct CachedToken {
    token: String,
    fetched: Instant,
}

/// Resolves and caches OAuth access tokens.
#[derive(Debug, Default)]
pub struct TokenProvider {
    cached: Mutex<Option<CachedToken>>,
}

impl TokenProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// A currently-valid bearer token.
    pub fn token(&self) -> Result<String> {
        if let Ok(token) = std::env::var("SILO_ACCESS_TOKEN") {
            if !token.is_empty() {
                return Ok(token);
            }
        }

        let mut cached = self.cached.lock().expect("token cache poisoned");
        if let Some(c) = cached.as_ref() {
            if c.fetched.elapsed() < TOKEN_TTL {
                return Ok(c.token.clone());
            }
        }

        let token = gcloud_stdout(&["auth", "print-access-token"])?;
        if token.is_empty() {
            return Err(BackendError::Auth(
                "gcloud returned an empty access token".to_string(),
            ));
        }
        *cached = Some(CachedToken {
            token: token.clone(),
            fetched: Instant::now(),
        });
        Ok(token)
    }
}

/// The project requests run against.
pub fn resolve_project(explicit: Option<&str>) -> Result<String> {
    if let Some(project) = explicit {
        if !project.is_empty() {
            return Ok(project.to_string());
        }
    }
    if let Ok(project) = std::env::var("GOOGLE_CLOUD_PROJECT") {
        if !project.is_empty() {
            return Ok(project);
        }
    }
    let project = gcloud_stdout(&["config", "get-value", "project"])?;
    if project.is_empty() || project == "(unset)" {
        return Err(BackendError::Auth(
            "no project configured; pass --default-project or set GOOGLE_CLOUD_PROJECT".to_string(),
        ));
    }
    Ok(project)
}

fn gcloud_stdout(args: &[&str]) -> Result<String> {
    let output = Command::new("gcloud")
        .args(args)
        .output()
        .map_err(|e| BackendError::Auth(format!("failed to run gcloud: {e}")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(BackendError::Auth(format!(
            "gcloud {} failed: {}",
            args.join(" "),
            stderr.trim()
        )));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
