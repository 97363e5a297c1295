//! Filename parsing for identity-bearing files.
//!
//! A payload file is either `<table>.<suffix>` (the default dataset
//! applies) or `<dataset>.<table>.<suffix>`. Anything with more dots is an
//! error.

use std::path::Path;

use crate::{LoadError, Result};

/// The final suffix of a file name, or an error if there is none.
pub fn suffix_of(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 || parts.last().is_none_or(|s| s.is_empty()) {
        return Err(LoadError::NoSuffix { path: path.into() });
    }
    Ok(parts[parts.len() - 1].to_string())
}

/// The name token the `filename` template variable binds to: the component
/// just before the suffix.
pub fn stem_of(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() < 2 {
        return Err(LoadError::NoSuffix { path: path.into() });
    }
    Ok(parts[parts.len() - 2].to_string())
}

/// The folder token: the name of the file's parent directory.
pub fn folder_of(path: &Path) -> String {
    path.parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or_default()
        .to_string()
}

/// Resolves `(dataset, table)` from a filename, using `default_dataset`
/// for the two-token form.
pub fn parse_dataset_table(path: &Path, default_dataset: Option<&str>) -> Result<(String, String)> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let tokens: Vec<&str> = name.split('.').collect();
    match tokens.len() {
        3 => Ok((tokens[0].to_string(), tokens[1].to_string())),
        2 => {
            let dataset = default_dataset.ok_or(LoadError::MissingDefaultDataset)?;
            Ok((dataset.to_string(), tokens[0].to_string()))
        }
        _ => Err(LoadError::InvalidFilename { path: path.into() }),
    }
}
