//! In-memory vector store with exhaustive similarity search.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::entry::{Metadata, SearchResult, VectorEntry};
use crate::error::{EmbeddingError, Result};
use crate::provider::EmbeddingProvider;
use crate::registry::EmbeddingModelConfig;
use crate::similarity::rank_indices;

#[derive(Debug, Default)]
struct Inner {
    /// Entries in insertion order.
    entries: Vec<Arc<VectorEntry>>,

    /// Dimensionality every entry must have; `None` until locked.
    dimensions: Option<usize>,
}

/// Holds [`VectorEntry`]s of a single dimensionality and answers
/// nearest-neighbour queries by scanning all of them.
///
/// Inserts and clears are serialized behind a write lock. Searches share a
/// read lock, so each one ranks a consistent snapshot of the entries.
#[derive(Debug, Default)]
pub struct VectorStore {
    inner: RwLock<Inner>,
}

impl VectorStore {
    /// Create an empty store whose dimensionality is fixed by the first insert.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty store locked to the model's dimensionality.
    pub fn for_model(model: &EmbeddingModelConfig) -> Self {
        Self::with_dimensions(model.dimensions)
    }

    /// Create an empty store locked to `dimensions`.
    pub fn with_dimensions(dimensions: usize) -> Self {
        Self {
            inner: RwLock::new(Inner {
                entries: Vec::new(),
                dimensions: Some(dimensions),
            }),
        }
    }

    // Entries are immutable and only ever appended or cleared wholesale, so
    // a panic while holding the lock cannot leave them half-written.
    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add an entry.
    ///
    /// Fails with [`EmbeddingError::DimensionMismatch`] if the embedding
    /// length differs from the store's dimensionality; the store is left
    /// unchanged in that case.
    pub fn insert(&self, entry: VectorEntry) -> Result<Arc<VectorEntry>> {
        let mut inner = self.write();

        let actual = entry.embedding.len();
        match inner.dimensions {
            Some(expected) if expected != actual => {
                return Err(EmbeddingError::DimensionMismatch { expected, actual });
            }
            Some(_) => {}
            None => inner.dimensions = Some(actual),
        }

        let entry = Arc::new(entry);
        inner.entries.push(Arc::clone(&entry));
        debug!("Added entry to vector store: {}", entry.id);

        Ok(entry)
    }

    /// Embed `content` with `provider` and insert the result.
    pub async fn embed_and_insert<P>(
        &self,
        provider: &P,
        content: impl Into<String>,
        metadata: Metadata,
    ) -> Result<Arc<VectorEntry>>
    where
        P: EmbeddingProvider + ?Sized,
    {
        let content = content.into();
        let embedding = provider.embed(&content).await?;
        self.insert(VectorEntry::new(content, embedding).with_metadata(metadata))
    }

    /// The `limit` entries most similar to `query`, best first.
    ///
    /// Entries with equal similarity come back in insertion order. An empty
    /// store or a zero limit yields no results. If `query` and an entry
    /// differ in length, they are compared over their common prefix.
    pub fn search(&self, query: &[f32], limit: usize) -> Vec<SearchResult> {
        let inner = self.read();

        rank_indices(
            query,
            inner.entries.iter().map(|e| e.embedding.as_slice()),
            limit,
        )
        .into_iter()
        .map(|(i, similarity)| SearchResult {
            entry: Arc::clone(&inner.entries[i]),
            similarity,
        })
        .collect()
    }

    /// Like [`search`](Self::search), dropping results below `min_similarity`.
    pub fn search_with_threshold(
        &self,
        query: &[f32],
        limit: usize,
        min_similarity: f32,
    ) -> Vec<SearchResult> {
        let mut results = self.search(query, limit);
        results.retain(|r| r.similarity >= min_similarity);
        results
    }

    /// Remove every entry and release the dimensionality lock.
    pub fn clear(&self) {
        let mut inner = self.write();
        let removed = inner.entries.len();
        inner.entries.clear();
        inner.dimensions = None;
        info!("Cleared vector store ({removed} entries)");
    }

    /// Get an entry by ID.
    pub fn get(&self, id: &str) -> Option<Arc<VectorEntry>> {
        self.read().entries.iter().find(|e| e.id == id).cloned()
    }

    /// All entries, in insertion order.
    pub fn entries(&self) -> Vec<Arc<VectorEntry>> {
        self.read().entries.clone()
    }

    /// Get the number of entries in the store.
    pub fn len(&self) -> usize {
        self.read().entries.len()
    }

    /// Check if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.read().entries.is_empty()
    }

    /// The locked dimensionality, if any.
    pub fn dimensions(&self) -> Option<usize> {
        self.read().dimensions
    }

    /// Serialize the store to JSON.
    pub fn to_json(&self) -> Result<String> {
        let inner = self.read();
        let snapshot = SnapshotRef {
            dimensions: inner.dimensions,
            entries: inner.entries.iter().map(Arc::as_ref).collect(),
        };
        Ok(serde_json::to_string(&snapshot)?)
    }

    /// Load a store from JSON produced by [`to_json`](Self::to_json).
    pub fn from_json(json: &str) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_str(json)?;

        let store = match snapshot.dimensions {
            Some(dimensions) => Self::with_dimensions(dimensions),
            None => Self::new(),
        };
        for entry in snapshot.entries {
            store.insert(entry)?;
        }

        info!("Loaded {} entries into vector store", store.len());
        Ok(store)
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    dimensions: Option<usize>,
    entries: Vec<&'a VectorEntry>,
}

#[derive(Deserialize)]
struct Snapshot {
    dimensions: Option<usize>,
    entries: Vec<VectorEntry>,
}
