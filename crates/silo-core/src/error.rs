//! Model-level error types.

/// Errors raised while building or merging artifacts.
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// A reserved variable held an unusable value.
    #[error("invalid value for '{key}': {reason}")]
    InvalidOption {
        /// The variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// A schema sidecar was neither a JSON field array nor `name:type` pairs.
    #[error(
        "schema should contain either a json schema definition or a string following the format col:type,col2:type"
    )]
    InvalidSchema,

    /// An object-store URI pattern used more than one wildcard.
    #[error("uri pattern may contain at most one '*': {0}")]
    UriPattern(String),

    /// Two expansions produced the same key and cannot be merged.
    #[error("duplicate artifact key: {0}")]
    DuplicateKey(String),
}
