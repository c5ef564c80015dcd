//! Error types for the knowledge retriever.

use thiserror::Error;

/// Result type alias using KbError.
pub type Result<T> = std::result::Result<T, KbError>;

/// Errors that can occur while retrieving or streaming knowledge.
#[derive(Error, Debug)]
pub enum KbError {
    /// A lexical or vector service could not be reached.
    #[error("Backend unavailable ({backend}): {message}")]
    BackendUnavailable { backend: String, message: String },

    /// The embedding service failed to embed the query.
    #[error("Embedding error: {message}")]
    Embedding { message: String },

    /// The nearest-neighbor index rejected or failed the query.
    #[error("Index query error: {message}")]
    IndexQuery { message: String },

    /// Both retrieval signals failed.
    #[error("Retrieval failed: lexical: {lexical}; vector: {vector}")]
    RetrievalFailed { lexical: String, vector: String },

    /// A fused id could not be resolved in the chunk store.
    #[error("Chunk not found: {id}")]
    ChunkNotFound { id: String },

    /// The blocking producer behind a stream failed.
    #[error("Worker error: {message}")]
    BridgeWorker { message: String },

    /// Invalid argument provided.
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error.
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl KbError {
    /// Create a backend-unavailable error for the named backend.
    pub fn backend_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BackendUnavailable {
            backend: backend.into(),
            message: message.into(),
        }
    }

    /// Create an embedding error.
    pub fn embedding(message: impl Into<String>) -> Self {
        Self::Embedding {
            message: message.into(),
        }
    }

    /// Create an index query error.
    pub fn index_query(message: impl Into<String>) -> Self {
        Self::IndexQuery {
            message: message.into(),
        }
    }

    /// Create a worker error.
    pub fn bridge_worker(message: impl Into<String>) -> Self {
        Self::BridgeWorker {
            message: message.into(),
        }
    }

    /// Create an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error allows the query to continue on the other signal.
    pub fn is_degradable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable { .. } | Self::Embedding { .. } | Self::IndexQuery { .. }
        )
    }

    /// Get the stable error code reported to stream consumers.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::BackendUnavailable { .. } => "BACKEND_UNAVAILABLE",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::IndexQuery { .. } => "INDEX_QUERY_ERROR",
            Self::RetrievalFailed { .. } => "RETRIEVAL_FAILED",
            Self::ChunkNotFound { .. } => "CHUNK_NOT_FOUND",
            Self::BridgeWorker { .. } => "WORKER_ERROR",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = KbError::backend_unavailable("lexical", "connection refused");
        let text = err.to_string();
        assert!(text.contains("lexical"));
        assert!(text.contains("connection refused"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            KbError::ChunkNotFound {
                id: "x".to_string()
            }
            .error_code(),
            "CHUNK_NOT_FOUND"
        );
        assert_eq!(KbError::embedding("boom").error_code(), "EMBEDDING_ERROR");
        assert_eq!(KbError::index_query("boom").error_code(), "INDEX_QUERY_ERROR");
    }

    #[test]
    fn test_degradable() {
        assert!(KbError::backend_unavailable("vector", "down").is_degradable());
        assert!(KbError::embedding("down").is_degradable());
        assert!(!KbError::bridge_worker("panic").is_degradable());
        assert!(!KbError::config("bad").is_degradable());
    }
}
