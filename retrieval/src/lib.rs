//! # Conversation Retrieval
//!
//! Ingests exported chat histories into an in-memory vector store and
//! retrieves the messages that ground the chat assistant's replies.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                    Conversation Index                           │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                  │
//! │  ChatExport ──► embed_batch ──► VectorStore ◄── query / ground  │
//! │                     ▲               ▲                           │
//! │                     └── ModelRegistry (current model)           │
//! │                                                                  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use chatvault_retrieval::{ChatExport, ConversationIndex, RetrievalConfig};
//!
//! let index = ConversationIndex::new(RetrievalConfig::load("chatvault.toml")?)?;
//! index.ingest_export(&ChatExport::load("conversations.json")?).await?;
//!
//! let grounding = index.ground("What did we decide about the trip?").await?;
//! println!("{}", grounding.context);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod export;

pub use config::{EmbeddingConfig, EmbeddingProviderType, QueryConfig, RetrievalConfig};
pub use engine::{ConversationIndex, Grounding, IngestReport};
pub use error::{Result, RetrievalError};
pub use export::{ChatExport, Conversation, ExportedMessage};

// Re-export from dependencies for convenience
pub use chatvault_embeddings::{EmbeddingModelConfig, ModelRegistry, SearchResult, VectorStore};
