//! The definition-hash protocol.
//!
//! Every materializing artifact embeds a short hash tag in its remote
//! description encoding the current definition. `should_update` asks
//! whether the remote description still carries the current tag; a rerun
//! against unchanged definitions therefore performs no work.

/// Lowercase hex MD5 digest of `data`.
pub fn md5_hex(data: &[u8]) -> String {
    format!("{:x}", md5::compute(data))
}

/// Tag for query-backed tables and views: `queryhash:<md5 of final query>`.
pub fn query_hash_tag(final_query: &str) -> String {
    format!("queryhash:{}", md5_hex(final_query.as_bytes()))
}

/// Tag for local data loads: `filehash:<md5 data>:<md5 schema>`.
pub fn file_hash_tag(data: &[u8], schema: &[u8]) -> String {
    format!("filehash:{}:{}", md5_hex(data), md5_hex(schema))
}

/// Tag for script tables: the bare digest of the script body.
pub fn script_hash_tag(script: &str) -> String {
    md5_hex(script.as_bytes())
}

/// Tag for external tables: the bare digest of the canonical (sorted-key)
/// JSON rendering of the storage configuration.
pub fn external_config_hash_tag(config: &serde_json::Value) -> String {
    md5_hex(config.to_string().as_bytes())
}

/// Whether a remote description carries `tag`.
pub fn description_contains(description: Option<&str>, tag: &str) -> bool {
    description.is_some_and(|d| d.contains(tag))
}

fn is_tag_line(line: &str) -> bool {
    let line = line.trim();
    line.starts_with("queryhash:")
        || line.starts_with("filehash:")
        || (line.len() == 32 && line.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Rewrites a description to carry `tag`, replacing any previous tag line
/// and preserving user-authored text.
pub fn apply_tag(existing: Option<&str>, tag: &str) -> String {
    let mut lines: Vec<&str> = existing
        .unwrap_or_default()
        .lines()
        .filter(|l| !is_tag_line(l))
        .collect();
    lines.push(tag);
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn query_hash_changes_with_text() {
        let a = query_hash_tag("select 1");
        let b = query_hash_tag("select 2");
        assert_ne!(a, b);
        assert!(a.starts_with("queryhash:"));
        assert_eq!(a.len(), "queryhash:".len() + 32);
    }

    #[test]
    fn canonical_json_is_key_order_independent() {
        let a: serde_json::Value =
            serde_json::from_str(r#"{"sourceUris":["gs://b/x"],"sourceFormat":"CSV"}"#).unwrap();
        let b: serde_json::Value =
            serde_json::from_str(r#"{"sourceFormat":"CSV","sourceUris":["gs://b/x"]}"#).unwrap();
        assert_eq!(external_config_hash_tag(&a), external_config_hash_tag(&b));
    }

    #[test]
    fn apply_tag_replaces_previous_tag_and_keeps_user_text() {
        let existing = "nightly events rollup\nqueryhash:00000000000000000000000000000000";
        let tag = query_hash_tag("select 1");
        let updated = apply_tag(Some(existing), &tag);
        assert_eq!(updated, format!("nightly events rollup\n{tag}"));
        assert!(description_contains(Some(&updated), &tag));
    }

    #[test]
    fn apply_tag_on_empty_description() {
        let tag = script_hash_tag("#!/bin/sh\necho 1");
        assert_eq!(apply_tag(None, &tag), tag);
        // Bare digests are recognized as tag lines on the next rewrite.
        assert_eq!(apply_tag(Some(&tag), "newtag"), "newtag");
    }

    #[test]
    fn file_hash_covers_both_files() {
        let a = file_hash_tag(b"data", b"schema");
        let b = file_hash_tag(b"data", b"schema2");
        let c = file_hash_tag(b"data2", b"schema");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
