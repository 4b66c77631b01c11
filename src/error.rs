//! Error types for corpus-qa

use thiserror::Error;

/// Result type for corpus-qa operations
pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure at the generative model boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GenerationError {
    /// Recoverable failure (network, timeout, rate limit) - eligible for retry
    #[error("transient generation failure: {0}")]
    Transient(String),

    /// Unrecoverable failure (bad credentials, malformed request) - never retried
    #[error("fatal generation failure: {0}")]
    Fatal(String),
}

/// Error types for pipeline operations
#[derive(Error, Debug)]
pub enum Error {
    /// Source document is empty or unreadable
    #[error("ingestion error: {0}")]
    Ingestion(String),

    /// Input text cannot be processed (empty query, whitespace-only chunk)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Index and embedder disagree on identity or setup
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Embedding dimension mismatch between index and embedder
    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index was configured with
        expected: usize,
        /// Dimension actually supplied
        actual: usize,
    },

    /// Search was attempted before the index was built
    #[error("index not built: search requires a completed build")]
    NotBuilt,

    /// Classified generation failure (single attempt)
    #[error("generation error: {0}")]
    Generation(#[from] GenerationError),

    /// Generation retries exhausted without a usable answer
    #[error("generation unavailable after {attempts} attempts")]
    GenerationUnavailable {
        /// Total attempts made, including the initial request
        attempts: u32,
    },

    /// Serialization error (persisted index)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this error is a transient generation failure worth retrying
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::Generation(GenerationError::Transient(_)))
    }
}
