//! Error types for the conversation retrieval engine.

use thiserror::Error;

/// Result type alias for retrieval operations.
pub type Result<T> = std::result::Result<T, RetrievalError>;

/// Errors that can occur in the retrieval engine.
#[derive(Error, Debug)]
pub enum RetrievalError {
    /// Embedding, store or model registry error.
    #[error("embedding error: {0}")]
    Embedding(#[from] chatvault_embeddings::EmbeddingError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// The chat export could not be parsed.
    #[error("import error: {0}")]
    Import(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
