//! Reserved-variable parsing for load options and artifact settings.

use std::collections::BTreeMap;

use silo_backend::types::LoadOptions;

use crate::error::ModelError;

/// The resolved variables of one template expansion.
pub type ResolvedVars = BTreeMap<String, String>;

fn parse_bool(key: &str, value: &str) -> Result<bool, ModelError> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(ModelError::InvalidOption {
            key: key.to_string(),
            reason: format!("expected a boolean, got '{other}'"),
        }),
    }
}

fn parse_int(key: &str, value: &str) -> Result<i64, ModelError> {
    value.parse().map_err(|_| ModelError::InvalidOption {
        key: key.to_string(),
        reason: format!("expected an integer, got '{value}'"),
    })
}

/// Extracts the load-option passthroughs from a resolved vars map.
pub fn load_options_from_vars(vars: &ResolvedVars) -> Result<LoadOptions, ModelError> {
    let mut options = LoadOptions::default();
    for (key, value) in vars {
        match key.as_str() {
            "source_format" => {
                options.source_format =
                    Some(value.parse().map_err(|reason| ModelError::InvalidOption {
                        key: key.clone(),
                        reason,
                    })?);
            }
            "write_disposition" => {
                options.write_disposition =
                    Some(value.parse().map_err(|reason| ModelError::InvalidOption {
                        key: key.clone(),
                        reason,
                    })?);
            }
            "max_bad_records" => options.max_bad_records = Some(parse_int(key, value)?),
            "skip_leading_rows" => options.skip_leading_rows = Some(parse_int(key, value)?),
            "field_delimiter" => options.field_delimiter = Some(value.clone()),
            "allow_quoted_newlines" => {
                options.allow_quoted_newlines = Some(parse_bool(key, value)?);
            }
            "encoding" => options.encoding = Some(value.clone()),
            "quote_character" => options.quote_character = Some(value.clone()),
            "null_marker" => options.null_marker = Some(value.clone()),
            "ignore_unknown_values" => {
                options.ignore_unknown_values = Some(parse_bool(key, value)?);
            }
            _ => {}
        }
    }
    Ok(options)
}

/// Table expiration in days; unparseable values are ignored.
pub fn expiration_days(vars: &ResolvedVars) -> Option<i64> {
    vars.get("expiration").and_then(|v| v.parse().ok())
}

/// The gating blob URI, if the expansion declares one.
pub fn require_exists(vars: &ResolvedVars) -> Option<String> {
    vars.get("require_exists").cloned()
}
