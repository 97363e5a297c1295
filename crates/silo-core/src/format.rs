//! Source-format auto-detection for local payloads.

use silo_backend::types::SourceFormat;

/// Detects the format of a local data payload from its first line: JSON if
/// the first non-blank character opens an object or array, CSV otherwise.
pub fn detect_source_format(first_line: &str) -> SourceFormat {
    match first_line.trim_start().chars().next() {
        Some('{') | Some('[') => SourceFormat::NewlineDelimitedJson,
        _ => SourceFormat::Csv,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn json_and_csv_detection() {
        assert_eq!(
            detect_source_format("[1,2]"),
            SourceFormat::NewlineDelimitedJson
        );
        assert_eq!(
            detect_source_format("{\"a\": 1}"),
            SourceFormat::NewlineDelimitedJson
        );
        assert_eq!(detect_source_format("a,b"), SourceFormat::Csv);
        assert_eq!(detect_source_format(""), SourceFormat::Csv);
        assert_eq!(
            detect_source_format("  [1]"),
            SourceFormat::NewlineDelimitedJson
        );
    }
}
