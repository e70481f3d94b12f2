//! # Embeddings
//!
//! In-memory vector similarity search used to ground the chat assistant on
//! uploaded chat history.
//!
//! ## Features
//!
//! - **Embedding Generation**: deterministic hash embeddings, or a real
//!   embeddings API behind the same trait
//! - **Vector Store**: dimension-locked entries with exhaustive top-k search
//! - **Model Registry**: catalog of embedding models and the current choice
//! - **Caching**: skip re-embedding texts that were already seen
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Embeddings System                            │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ModelRegistry ──► EmbeddingProvider ──► VectorStore            │
//! │       │                   │                  │                  │
//! │       ▼                   ▼                  ▼                  │
//! │  SelectionStore     EmbeddingCache     rank_top_k / cosine      │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod entry;
pub mod error;
pub mod provider;
pub mod registry;
pub mod similarity;
pub mod store;

pub use cache::{CacheStats, CachedProvider, EmbeddingCache};
pub use entry::{Metadata, MetadataValue, SearchResult, VectorEntry};
pub use error::{EmbeddingError, Result};
pub use provider::{
    EmbeddingProvider, HashEmbeddingProvider, OpenAIProvider, check_batch_len, hash_embedding,
};
pub use registry::{
    EmbeddingModelConfig, FileSelectionStore, MemorySelectionStore, ModelRegistry,
    ModelSelectionStore, builtin_catalog,
};
pub use similarity::{RankedCandidate, cosine_similarity, rank_top_k};
pub use store::VectorStore;

/// A dense vector embedding.
pub type Embedding = Vec<f32>;
