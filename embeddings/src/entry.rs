//! Stored entries, their metadata and search results.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::Embedding;

/// Open, string-keyed metadata attached to an entry.
///
/// The store never interprets it; it is handed back unchanged with every
/// search result.
pub type Metadata = BTreeMap<String, MetadataValue>;

/// A metadata value. Serializes as the plain JSON value it wraps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<MetadataValue>),
}

impl MetadataValue {
    /// Borrow the value as a string, if it is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<bool> for MetadataValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MetadataValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for MetadataValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl<T: Into<MetadataValue>> From<Vec<T>> for MetadataValue {
    fn from(values: Vec<T>) -> Self {
        Self::List(values.into_iter().map(Into::into).collect())
    }
}

/// A piece of text and its embedding, as held by a
/// [`VectorStore`](crate::VectorStore).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorEntry {
    /// Unique identifier.
    pub id: String,

    /// The original text.
    pub content: String,

    /// The embedding vector.
    pub embedding: Embedding,

    /// Pass-through metadata (role, group, timestamps, ...).
    #[serde(default)]
    pub metadata: Metadata,
}

impl VectorEntry {
    /// Create an entry with a fresh UUID and no metadata.
    pub fn new(content: impl Into<String>, embedding: Embedding) -> Self {
        Self::with_id(Uuid::new_v4().to_string(), content, embedding)
    }

    /// Create an entry with a caller-chosen ID.
    pub fn with_id(id: impl Into<String>, content: impl Into<String>, embedding: Embedding) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            embedding,
            metadata: Metadata::new(),
        }
    }

    /// Replace the metadata.
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Add a single metadata key.
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Dimensionality of the embedding.
    pub fn dimensions(&self) -> usize {
        self.embedding.len()
    }
}

/// One ranked hit from a similarity search.
///
/// The entry is shared with the store that produced it.
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// The matched entry.
    pub entry: Arc<VectorEntry>,

    /// Cosine similarity to the query, in [-1, 1].
    pub similarity: f32,
}

impl SearchResult {
    /// ID of the matched entry.
    pub fn id(&self) -> &str {
        &self.entry.id
    }
}
