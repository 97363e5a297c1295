//! Default-variables file loading.
//!
//! The CLI can point at a JSON object of default variables shared by every
//! template expansion in the run (`--vars-file`). Values follow the same
//! shapes as `.vars` sidecar values.

use std::path::Path;

use silo_template::VarMap;

use crate::{LoadError, Result};

/// Loads a defaults file: a single JSON object of scalars and lists.
pub fn load_vars_file(path: &Path) -> Result<VarMap> {
    let content = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
    let parsed: serde_json::Value =
        serde_json::from_str(&content).map_err(|e| LoadError::VarsJson {
            path: path.into(),
            source: e,
        })?;
    if !parsed.is_object() {
        return Err(LoadError::InvalidDefaultVars { path: path.into() });
    }
    serde_json::from_value(parsed).map_err(|_| LoadError::InvalidDefaultVars { path: path.into() })
}
