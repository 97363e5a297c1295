//! Sidecar reading with per-loader caching.
//!
//! A payload file `X.<suffix>` may carry `X.<suffix>.vars` (a JSON list of
//! variable objects) and `X.<suffix>.schema` sidecars. Each sidecar is read
//! once per loader instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use silo_template::VarMap;

use crate::{LoadError, Result};

/// Caches raw sidecar contents keyed by path.
#[derive(Debug, Default)]
pub struct SidecarCache {
    files: HashMap<PathBuf, String>,
}

impl SidecarCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// The file's content, reading it on first access.
    pub fn read(&mut self, path: &Path) -> Result<&str> {
        if !self.files.contains_key(path) {
            let content =
                std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
            self.files.insert(path.to_path_buf(), content);
        }
        Ok(self.files.get(path).expect("just inserted"))
    }

    /// The `.vars` sidecar for `payload_path`, parsed as a JSON list of
    /// objects. A missing file yields the single empty object unless
    /// `required` is set.
    pub fn vars(&mut self, payload_path: &Path, required: bool) -> Result<Vec<VarMap>> {
        let vars_path = sibling(payload_path, "vars");
        if !vars_path.exists() {
            if required {
                return Err(LoadError::MissingVarsFile { path: vars_path });
            }
            return Ok(vec![VarMap::new()]);
        }
        let content = self.read(&vars_path)?;

        // The file must be a list of objects, not a bare object or scalar.
        let parsed: serde_json::Value =
            serde_json::from_str(content).map_err(|e| LoadError::VarsJson {
                path: vars_path.clone(),
                source: e,
            })?;
        let Some(items) = parsed.as_array() else {
            return Err(LoadError::InvalidVarsFile { path: vars_path });
        };
        items
            .iter()
            .map(|item| {
                if !item.is_object() {
                    return Err(LoadError::InvalidVarsFile {
                        path: vars_path.clone(),
                    });
                }
                serde_json::from_value(item.clone()).map_err(|e| LoadError::VarsJson {
                    path: vars_path.clone(),
                    source: e,
                })
            })
            .collect()
    }

    /// The raw `.schema` sidecar for `payload_path`.
    pub fn schema(&mut self, payload_path: &Path) -> Result<String> {
        let schema_path = sibling(payload_path, "schema");
        if !schema_path.exists() {
            return Err(LoadError::MissingSchemaFile { path: schema_path });
        }
        Ok(self.read(&schema_path)?.trim().to_string())
    }

    /// Whether a schema sidecar exists for `payload_path`.
    pub fn has_schema(&self, payload_path: &Path) -> bool {
        sibling(payload_path, "schema").exists()
    }
}

/// `X.suffix` -> `X.suffix.<extra>`.
fn sibling(payload_path: &Path, extra: &str) -> PathBuf {
    let mut name = payload_path.as_os_str().to_os_string();
    name.push(".");
    name.push(extra);
    PathBuf::from(name)
}
