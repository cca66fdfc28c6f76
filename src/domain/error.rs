//! Error handling types

use thiserror::Error;

/// Result type alias for operations that can fail
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the indexing and retrieval engine.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O operation error
    #[error("I/O error: {source}")]
    Io {
        /// The underlying I/O error
        #[from]
        source: std::io::Error,
    },

    /// JSON parsing or serialization error
    #[error("JSON parsing error: {source}")]
    Json {
        /// The underlying JSON error
        #[from]
        source: serde_json::Error,
    },

    /// Generic error from external sources
    #[error("Generic error: {0}")]
    Generic(#[from] Box<dyn std::error::Error + Send + Sync>),

    /// UTF-8 encoding/decoding error
    #[error("UTF-8 encoding error: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    /// Generic string-based error
    #[error("String error: {0}")]
    String(String),

    /// Resource not found error
    #[error("Not found: {resource}")]
    NotFound {
        /// The resource that was not found
        resource: String,
    },

    /// Invalid argument provided to a function
    #[error("Invalid argument: {message}")]
    InvalidArgument {
        /// Description of the invalid argument
        message: String,
    },

    /// Vector store operation error (collection, upsert, search, delete)
    #[error("Vector store error: {message}")]
    VectorDb {
        /// Description of the vector store error
        message: String,
    },

    /// Embedding provider operation error
    #[error("Embedding provider error: {message}")]
    Embedding {
        /// Description of the embedding provider error
        message: String,
    },

    /// Embedding inference failed for a specific input after retries were exhausted
    #[error("Embedding failed for {input}: {message}")]
    EmbeddingFailed {
        /// Identifier of the input that failed (file path, chunk id, ...)
        input: String,
        /// Description of the failure
        message: String,
    },

    /// Configuration-related error
    #[error("Configuration error: {message}")]
    Config {
        /// Description of the configuration error
        message: String,
    },

    /// Internal system error
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the internal error
        message: String,
    },

    /// Cache operation error
    #[error("Cache error: {message}")]
    Cache {
        /// Description of the cache error
        message: String,
    },

    /// A stored collection or cache entry's schema does not match what this
    /// version of the engine expects (e.g. vector dimension mismatch after a
    /// model change).
    #[error("Schema mismatch in {location}: expected {expected}, found {found}")]
    SchemaMismatch {
        /// Where the mismatch was found (collection name, cache namespace, ...)
        location: String,
        /// What was expected
        expected: String,
        /// What was actually found
        found: String,
    },

    /// A bounded resource (connection pool, worker slots, disk quota) is exhausted
    #[error("Resource exhausted: {resource} ({detail})")]
    ResourceExhausted {
        /// The resource that is exhausted
        resource: String,
        /// Additional detail (current/limit, backoff hint, ...)
        detail: String,
    },

    /// An operation exceeded its configured deadline
    #[error("Operation timed out after {elapsed_ms}ms: {operation}")]
    Timeout {
        /// The operation that timed out
        operation: String,
        /// How long the operation ran before being aborted
        elapsed_ms: u64,
    },

    /// A network/transport-level failure talking to an external dependency
    /// (vector store, object storage, ...).
    #[error("Transport error talking to {endpoint}: {message}")]
    TransportError {
        /// The endpoint that was being contacted
        endpoint: String,
        /// Description of the transport failure
        message: String,
    },

    /// Source file or chunk could not be parsed into an AST or fallback form
    #[error("Parse failed for {path}: {message}")]
    ParseFailed {
        /// Path of the file that failed to parse
        path: String,
        /// Description of the parse failure
        message: String,
    },

    /// Write attempted against a resource opened or configured as read-only
    #[error("Read-only: cannot write to {resource}")]
    ReadOnly {
        /// The resource that refused the write
        resource: String,
    },

    /// Optimistic concurrency conflict (concurrent writers raced on the same key)
    #[error("Conflict updating {resource}: {message}")]
    Conflict {
        /// The resource that conflicted
        resource: String,
        /// Description of the conflict
        message: String,
    },
}

impl Error {
    /// Create a generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic(message.into().into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a vector store error
    pub fn vector_db<S: Into<String>>(message: S) -> Self {
        Self::VectorDb {
            message: message.into(),
        }
    }

    /// Create an embedding provider error
    pub fn embedding<S: Into<String>>(message: S) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create an embedding-failed error for a specific input
    pub fn embedding_failed<S: Into<String>, M: Into<String>>(input: S, message: M) -> Self {
        Self::EmbeddingFailed {
            input: input.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            source: std::io::Error::other(message.into()),
        }
    }

    /// Create a configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a cache error
    pub fn cache<S: Into<String>>(message: S) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    /// Create a schema mismatch error
    pub fn schema_mismatch<L: Into<String>, E: Into<String>, F: Into<String>>(
        location: L,
        expected: E,
        found: F,
    ) -> Self {
        Self::SchemaMismatch {
            location: location.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a resource-exhausted error
    pub fn resource_exhausted<R: Into<String>, D: Into<String>>(resource: R, detail: D) -> Self {
        Self::ResourceExhausted {
            resource: resource.into(),
            detail: detail.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, elapsed_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_ms,
        }
    }

    /// Create a transport error
    pub fn transport<E: Into<String>, M: Into<String>>(endpoint: E, message: M) -> Self {
        Self::TransportError {
            endpoint: endpoint.into(),
            message: message.into(),
        }
    }

    /// Create a parse-failed error
    pub fn parse_failed<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::ParseFailed {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a read-only error
    pub fn read_only<S: Into<String>>(resource: S) -> Self {
        Self::ReadOnly {
            resource: resource.into(),
        }
    }

    /// Create a conflict error
    pub fn conflict<R: Into<String>, M: Into<String>>(resource: R, message: M) -> Self {
        Self::Conflict {
            resource: resource.into(),
            message: message.into(),
        }
    }

    /// A short, stable name for the error kind, suitable for metrics labels
    /// and structured log fields.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Io { .. } => "io",
            Self::Json { .. } => "json",
            Self::Generic(_) => "generic",
            Self::Utf8(_) => "utf8",
            Self::String(_) => "string",
            Self::NotFound { .. } => "not_found",
            Self::InvalidArgument { .. } => "invalid_argument",
            Self::VectorDb { .. } => "vector_db",
            Self::Embedding { .. } => "embedding",
            Self::EmbeddingFailed { .. } => "embedding_failed",
            Self::Config { .. } => "config",
            Self::Internal { .. } => "internal",
            Self::Cache { .. } => "cache",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::Timeout { .. } => "timeout",
            Self::TransportError { .. } => "transport",
            Self::ParseFailed { .. } => "parse_failed",
            Self::ReadOnly { .. } => "read_only",
            Self::Conflict { .. } => "conflict",
        }
    }

    /// Whether retrying the same operation may succeed (used by the
    /// connection pool and embedding engine retry loops).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::TransportError { .. } | Self::Timeout { .. } | Self::ResourceExhausted { .. }
        )
    }
}

impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Cache {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_name_is_stable_for_metrics_labels() {
        assert_eq!(Error::not_found("x").kind_name(), "not_found");
        assert_eq!(Error::timeout("search", 50).kind_name(), "timeout");
    }

    #[test]
    fn transport_and_timeout_are_retryable() {
        assert!(Error::transport("qdrant:6334", "connection reset").is_retryable());
        assert!(Error::timeout("embed", 1000).is_retryable());
        assert!(!Error::invalid_argument("bad alpha").is_retryable());
    }
}
