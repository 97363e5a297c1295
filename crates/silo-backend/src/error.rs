//! Backend error types.

/// Errors that can occur while talking to the warehouse, the object store,
/// or a script subprocess.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    /// The requested remote entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// The kind of entity (e.g., "dataset", "table", "job").
        entity: String,
        /// The identifier that was looked up.
        id: String,
    },

    /// A transport-level HTTP failure (connection refused, timeout, ...).
    #[error("http error: {0}")]
    Http(String),

    /// The remote service answered with an error status.
    #[error("service error ({status}): {message}")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Error message extracted from the response body.
        message: String,
    },

    /// No usable access token could be resolved.
    #[error("auth error: {0}")]
    Auth(String),

    /// A table-producing script exited with a non-zero status.
    #[error("script exited with status {status}: {stderr}")]
    Script {
        /// Process exit status.
        status: i32,
        /// Captured standard error output.
        stderr: String,
    },

    /// An object-store URI pattern was malformed.
    #[error("invalid uri pattern: {0}")]
    UriPattern(String),

    /// A local I/O operation failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Catch-all for unexpected internal errors.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience alias used throughout the backend crates.
pub type Result<T> = std::result::Result<T, BackendError>;

impl BackendError {
    // -- Constructors --------------------------------------------------------

    /// Creates a [`BackendError::NotFound`] for the given entity kind and id.
    pub fn not_found(entity: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            id: id.into(),
        }
    }

    // -- Predicates ----------------------------------------------------------

    /// Returns `true` if this is a [`BackendError::NotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns `true` if the error is transient and the operation may
    /// succeed on a later tick (rate limiting, server errors, transport
    /// failures).
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) => true,
            Self::Service { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}
