//! Expansion of a variables array into fully-resolved mappings.

use chrono::NaiveDateTime;

use silo_template::value::{VarMap, VarValue};
use silo_template::{eval_tmpl_recurse, explode};

use crate::Result;

/// Expands each raw variables object into concrete mappings.
///
/// Per object: the derived `folder` and `filename` context is injected,
/// `table` defaults to the filename, remaining defaults are overlaid
/// (the object wins), list values are exploded into a cross-product, and
/// placeholders are resolved recursively.
pub fn expand_vars_array(
    raw: &[VarMap],
    folder: &str,
    filename: &str,
    defaults: &VarMap,
    now: NaiveDateTime,
) -> Result<Vec<std::collections::BTreeMap<String, String>>> {
    let mut out = Vec::new();
    for template in raw {
        let mut merged = template.clone();
        merged.insert("folder".to_string(), VarValue::from(folder));
        merged.insert("filename".to_string(), VarValue::from(filename));
        if !merged.contains_key("table") {
            merged.insert("table".to_string(), VarValue::from(filename));
        }
        for (key, value) in defaults {
            merged.entry(key.clone()).or_insert_with(|| value.clone());
        }

        for candidate in explode(&merged, now)? {
            out.push(eval_tmpl_recurse(candidate)?);
        }
    }
    Ok(out)
}
