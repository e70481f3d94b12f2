//! Error types for the embeddings system.

use thiserror::Error;

/// Result type alias for embedding operations.
pub type Result<T> = std::result::Result<T, EmbeddingError>;

/// Errors that can occur in the embeddings system.
///
/// Lookup misses and empty stores are not errors: they are reported as
/// `false`, `None` or an empty `Vec` by the operations that encounter them.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    /// An embedding disagrees with the dimensionality a store is locked to.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// The embedding provider could not produce an embedding (timeout,
    /// transport failure, missing credentials, non-success status).
    #[error("embedding provider unavailable: {0}")]
    ProviderUnavailable(String),

    /// Rate limit exceeded.
    #[error("rate limit exceeded, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    /// Invalid response from provider.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// A model catalog violates its invariants.
    #[error("invalid model catalog: {0}")]
    InvalidCatalog(String),

    /// Persisting or restoring the current model selection failed.
    #[error("persistence error: {0}")]
    Persistence(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
