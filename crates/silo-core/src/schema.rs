//! Schema sidecar parsing.
//!
//! A `.schema` sidecar holds either a JSON array of field descriptors
//! (recursive for `RECORD` fields) or the legacy comma-separated
//! `name:type` form.

use silo_backend::types::SchemaField;

use crate::error::ModelError;

/// Parses a schema string in either supported form.
pub fn parse_schema(schema: &str) -> Result<Vec<SchemaField>, ModelError> {
    let schema = schema.trim();

    // JSON form first.
    if let Ok(fields) = serde_json::from_str::<Vec<SchemaField>>(schema) {
        return Ok(fields);
    }

    // Legacy form: name:type,name:type,...
    let mut fields = Vec::new();
    for pair in schema.split(',') {
        let Some((name, field_type)) = pair.split_once(':') else {
            return Err(ModelError::InvalidSchema);
        };
        let name = name.trim();
        let field_type = field_type.trim();
        if name.is_empty() || field_type.is_empty() {
            return Err(ModelError::InvalidSchema);
        }
        fields.push(SchemaField::simple(name, field_type));
    }
    Ok(fields)
}
