//! Embedding cache so repeated texts are only embedded once.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::provider::{EmbeddingProvider, check_batch_len};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    model: String,
    dimensions: usize,
    text: String,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    embedding: Embedding,
    /// Insertion sequence number, used to evict the oldest entry.
    inserted: u64,
}

/// Bounded in-memory cache of embeddings keyed by model, dimensionality and
/// text.
pub struct EmbeddingCache {
    cache: RwLock<HashMap<CacheKey, CacheEntry>>,
    max_entries: usize,
    next_seq: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl EmbeddingCache {
    /// Create a new cache holding at most `max_entries` embeddings.
    pub fn new(max_entries: usize) -> Self {
        Self {
            cache: RwLock::new(HashMap::new()),
            max_entries,
            next_seq: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(text: &str, model: &str, dimensions: usize) -> CacheKey {
        CacheKey {
            model: model.to_string(),
            dimensions,
            text: text.to_string(),
        }
    }

    /// Get an embedding from the cache.
    pub async fn get(&self, text: &str, model: &str, dimensions: usize) -> Option<Embedding> {
        let key = Self::key(text, model, dimensions);
        let found = self.cache.read().await.get(&key).map(|e| e.embedding.clone());

        let counter = if found.is_some() { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Put an embedding in the cache, evicting the oldest entry when full.
    pub async fn put(&self, text: &str, model: &str, embedding: Embedding) {
        if self.max_entries == 0 {
            return;
        }

        let key = Self::key(text, model, embedding.len());
        let entry = CacheEntry {
            embedding,
            inserted: self.next_seq.fetch_add(1, Ordering::Relaxed),
        };

        let mut cache = self.cache.write().await;
        if cache.len() >= self.max_entries && !cache.contains_key(&key) {
            if let Some(oldest) = cache
                .iter()
                .min_by_key(|(_, v)| v.inserted)
                .map(|(k, _)| k.clone())
            {
                cache.remove(&oldest);
            }
        }

        cache.insert(key, entry);
        debug!("Cached embedding for text (model: {model})");
    }

    /// Clear the entire cache.
    pub async fn clear(&self) {
        self.cache.write().await.clear();
        info!("Cleared embedding cache");
    }

    /// Get cache statistics.
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.cache.read().await.len(),
            max_entries: self.max_entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// Statistics about the embedding cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries in cache.
    pub entries: usize,

    /// Maximum cache size.
    pub max_entries: usize,

    /// Lookups answered from the cache.
    pub hits: u64,

    /// Lookups that had to go to the provider.
    pub misses: u64,
}

/// A provider wrapper that consults an [`EmbeddingCache`] first.
pub struct CachedProvider<P> {
    provider: P,
    cache: EmbeddingCache,
}

impl<P: EmbeddingProvider> CachedProvider<P> {
    /// Create a new cached provider.
    pub fn new(provider: P, cache: EmbeddingCache) -> Self {
        Self { provider, cache }
    }

    /// Get the underlying cache.
    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }
}

#[async_trait]
impl<P: EmbeddingProvider> EmbeddingProvider for CachedProvider<P> {
    fn name(&self) -> &str {
        self.provider.name()
    }

    fn model(&self) -> &str {
        self.provider.model()
    }

    fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        let (model, dimensions) = (self.provider.model(), self.provider.dimensions());

        if let Some(embedding) = self.cache.get(text, model, dimensions).await {
            debug!("Cache hit for embedding");
            return Ok(embedding);
        }

        let embedding = self.provider.embed(text).await?;
        self.cache.put(text, model, embedding.clone()).await;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let (model, dimensions) = (self.provider.model(), self.provider.dimensions());

        let mut results: Vec<Option<Embedding>> = Vec::with_capacity(texts.len());
        let mut missing = Vec::new();
        for (i, text) in texts.iter().enumerate() {
            let cached = self.cache.get(text, model, dimensions).await;
            if cached.is_none() {
                missing.push(i);
            }
            results.push(cached);
        }

        if !missing.is_empty() {
            let to_embed: Vec<String> = missing.iter().map(|&i| texts[i].clone()).collect();
            let fresh = self.provider.embed_batch(&to_embed).await?;
            check_batch_len(to_embed.len(), &fresh)?;
            for (i, embedding) in missing.into_iter().zip(fresh) {
                self.cache.put(&texts[i], model, embedding.clone()).await;
                results[i] = Some(embedding);
            }
        }

        results
            .into_iter()
            .map(|e| {
                e.ok_or_else(|| EmbeddingError::InvalidResponse("missing batch embedding".to_string()))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::HashEmbeddingProvider;
    use pretty_assertions::assert_eq;

    /// Returns one embedding fewer than asked for.
    struct ShortBatchProvider;

    #[async_trait]
    impl EmbeddingProvider for ShortBatchProvider {
        fn name(&self) -> &str {
            "short"
        }

        fn model(&self) -> &str {
            "short"
        }

        fn dimensions(&self) -> usize {
            2
        }

        async fn embed(&self, _text: &str) -> Result<Embedding> {
            Ok(vec![1.0, 0.0])
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
            Ok(vec![vec![1.0, 0.0]; texts.len().saturating_sub(1)])
        }
    }

    #[tokio::test]
    async fn test_cache_put_get() {
        let cache = EmbeddingCache::new(100);
        let embedding = vec![1.0, 2.0, 3.0];

        cache.put("hello", "model-1", embedding.clone()).await;

        assert_eq!(cache.get("hello", "model-1", 3).await, Some(embedding));
        assert_eq!(cache.get("hello", "model-2", 3).await, None);
        assert_eq!(cache.get("hello", "model-1", 4).await, None);
    }

    #[tokio::test]
    async fn test_cache_evicts_oldest() {
        let cache = EmbeddingCache::new(2);

        cache.put("a", "model", vec![1.0]).await;
        cache.put("b", "model", vec![2.0]).await;
        cache.put("c", "model", vec![3.0]).await;

        assert_eq!(cache.stats().await.entries, 2);
        assert_eq!(cache.get("a", "model", 1).await, None);
        assert_eq!(cache.get("c", "model", 1).await, Some(vec![3.0]));
    }

    #[tokio::test]
    async fn test_cached_provider_counts_hits() {
        let provider = CachedProvider::new(
            HashEmbeddingProvider::new("default", 8),
            EmbeddingCache::new(16),
        );

        let first = provider.embed("same text").await.unwrap();
        let second = provider.embed("same text").await.unwrap();
        assert_eq!(first, second);

        let stats = provider.cache().stats().await;
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entries, 1);
    }

    #[tokio::test]
    async fn test_cached_batch_fills_only_misses() {
        let provider = CachedProvider::new(
            HashEmbeddingProvider::new("default", 4),
            EmbeddingCache::new(16),
        );
        provider.embed("b").await.unwrap();

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let batch = provider.embed_batch(&texts).await.unwrap();

        assert_eq!(batch.len(), 3);
        assert_eq!(batch[2], crate::provider::hash_embedding("c", 4));
        assert_eq!(provider.cache().stats().await.entries, 3);
    }

    #[tokio::test]
    async fn test_short_batch_is_an_error() {
        let provider = CachedProvider::new(ShortBatchProvider, EmbeddingCache::new(16));

        let texts = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let err = provider.embed_batch(&texts).await.unwrap_err();
        assert!(matches!(err, EmbeddingError::InvalidResponse(_)));
        assert_eq!(provider.cache().stats().await.entries, 0);
    }
}
