//! Conversation index: ingest chat history, answer grounding queries.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, info};

use chatvault_embeddings::{
    CachedProvider, EmbeddingCache, EmbeddingModelConfig, EmbeddingProvider,
    FileSelectionStore, HashEmbeddingProvider, Metadata, MetadataValue, ModelRegistry,
    OpenAIProvider, SearchResult, VectorEntry, VectorStore, builtin_catalog, check_batch_len,
};

use crate::config::{EmbeddingConfig, EmbeddingProviderType, RetrievalConfig};
use crate::error::{Result, RetrievalError};
use crate::export::ChatExport;

/// Searchable index over uploaded chat messages.
///
/// Owns its model registry, embedding provider and vector store; nothing is
/// global, so several indexes can coexist.
pub struct ConversationIndex {
    config: RetrievalConfig,
    registry: ModelRegistry,
    provider: RwLock<Arc<dyn EmbeddingProvider>>,
    store: RwLock<Arc<VectorStore>>,
}

impl ConversationIndex {
    /// Open an index whose model selection is persisted under
    /// `config.data_dir`.
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        let registry = ModelRegistry::load(
            builtin_catalog(),
            FileSelectionStore::new(config.selection_path()),
        )?;
        Self::with_registry(config, registry)
    }

    /// Open an index over an existing registry.
    ///
    /// If the registry has no saved selection and `config.embedding.model`
    /// names a model, that model is selected first.
    pub fn with_registry(config: RetrievalConfig, registry: ModelRegistry) -> Result<Self> {
        config.validate()?;

        if let Some(model) = &config.embedding.model {
            let current = registry.current_model();
            let nothing_selected = registry.find(&current.id).is_none();
            if nothing_selected && !registry.set_current_model(model)? {
                return Err(RetrievalError::Config(format!(
                    "unknown embedding model: {model}"
                )));
            }
        }

        let model = registry.current_model();
        let provider = build_provider(&config.embedding, &model);
        info!(
            "Conversation index using {} ({} dimensions, {} provider)",
            model.id,
            model.dimensions,
            provider.name()
        );

        Ok(Self {
            config,
            registry,
            provider: RwLock::new(provider),
            store: RwLock::new(Arc::new(VectorStore::for_model(&model))),
        })
    }

    /// The active embedding model.
    pub fn current_model(&self) -> EmbeddingModelConfig {
        self.registry.current_model()
    }

    /// The model registry.
    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// The current vector store.
    pub async fn store(&self) -> Arc<VectorStore> {
        Arc::clone(&*self.store.read().await)
    }

    /// Number of indexed messages.
    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    /// Whether nothing has been indexed.
    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    /// Embed and index every non-blank message of an export.
    ///
    /// Messages are embedded in batches of `embedding.batch_size`. If a batch
    /// fails, the error is returned and earlier batches stay indexed.
    pub async fn ingest_export(&self, export: &ChatExport) -> Result<IngestReport> {
        let ingested_at = Utc::now().to_rfc3339();

        let mut pending = Vec::new();
        let mut skipped = 0;
        for (title, message) in export.messages() {
            if message.content.trim().is_empty() {
                skipped += 1;
                continue;
            }

            let mut metadata = Metadata::new();
            metadata.insert("role".to_string(), message.role.clone().into());
            metadata.insert("ingested_at".to_string(), ingested_at.clone().into());
            if let Some(title) = title {
                metadata.insert("conversation".to_string(), title.into());
            }
            if let Some(timestamp) = &message.timestamp {
                metadata.insert("timestamp".to_string(), timestamp.clone());
            }
            if let Some(group) = &message.group {
                metadata.insert("group".to_string(), group.clone().into());
            }

            pending.push(PendingEntry {
                id: message.id.clone(),
                content: message.content.clone(),
                metadata,
            });
        }

        let ingested = self.embed_and_store(pending).await?;
        info!("Ingested {ingested} messages ({skipped} skipped)");
        Ok(IngestReport { ingested, skipped })
    }

    /// Embed and index bare texts. Blank texts are skipped.
    pub async fn ingest_texts<S: AsRef<str>>(&self, texts: &[S]) -> Result<IngestReport> {
        let pending: Vec<PendingEntry> = texts
            .iter()
            .map(S::as_ref)
            .filter(|t| !t.trim().is_empty())
            .map(|t| PendingEntry {
                id: None,
                content: t.to_string(),
                metadata: Metadata::new(),
            })
            .collect();
        let skipped = texts.len() - pending.len();

        let ingested = self.embed_and_store(pending).await?;
        Ok(IngestReport { ingested, skipped })
    }

    async fn embed_and_store(&self, pending: Vec<PendingEntry>) -> Result<usize> {
        // Held for the whole ingest; a model switch must not swap the store
        // underneath us.
        let store = self.store.read().await;
        let provider = self.provider().await;

        let mut ingested = 0;
        for batch in pending.chunks(self.config.embedding.batch_size) {
            let texts: Vec<String> = batch.iter().map(|p| p.content.clone()).collect();
            let embeddings = provider.embed_batch(&texts).await?;
            check_batch_len(texts.len(), &embeddings)?;

            for (item, embedding) in batch.iter().zip(embeddings) {
                let entry = match &item.id {
                    Some(id) => VectorEntry::with_id(id.clone(), item.content.clone(), embedding),
                    None => VectorEntry::new(item.content.clone(), embedding),
                };
                store.insert(entry.with_metadata(item.metadata.clone()))?;
                ingested += 1;
            }
            debug!("Embedded batch of {} messages", batch.len());
        }

        Ok(ingested)
    }

    /// The `limit` messages most similar to `text`, dropping anything below
    /// `query.min_similarity`.
    pub async fn query(&self, text: &str, limit: usize) -> Result<Vec<SearchResult>> {
        let provider = self.provider().await;
        let query = provider.embed(text).await?;

        let results = self.store().await.search_with_threshold(
            &query,
            limit,
            self.config.query.min_similarity,
        );
        debug!("Query matched {} messages", results.len());
        Ok(results)
    }

    /// Retrieve the context used to ground an assistant reply to `text`.
    pub async fn ground(&self, text: &str) -> Result<Grounding> {
        let results = self.query(text, self.config.query.max_results).await?;
        let context = build_context(&results, self.config.query.context_char_budget);

        Ok(Grounding {
            query: text.to_string(),
            results,
            context,
        })
    }

    /// Switch to another catalog model and re-embed everything indexed so far.
    ///
    /// Returns `Ok(false)` for an unknown model, leaving the index untouched.
    /// Entry IDs, contents and metadata survive the switch. If re-embedding
    /// or persisting the selection fails, the previous model and store stay
    /// in place.
    pub async fn switch_model(&self, id: &str) -> Result<bool> {
        let Some(model) = self.registry.find(id).cloned() else {
            return Ok(false);
        };

        let provider = build_provider(&self.config.embedding, &model);
        self.reembed_with(&model, provider).await?;
        Ok(true)
    }

    async fn reembed_with(
        &self,
        model: &EmbeddingModelConfig,
        provider: Arc<dyn EmbeddingProvider>,
    ) -> Result<()> {
        let mut store_guard = self.store.write().await;
        let mut provider_guard = self.provider.write().await;

        let entries = store_guard.entries();

        let new_store = VectorStore::for_model(model);
        for batch in entries.chunks(self.config.embedding.batch_size) {
            let texts: Vec<String> = batch.iter().map(|e| e.content.clone()).collect();
            let embeddings = provider.embed_batch(&texts).await?;
            check_batch_len(texts.len(), &embeddings)?;
            for (entry, embedding) in batch.iter().zip(embeddings) {
                new_store.insert(
                    VectorEntry::with_id(entry.id.clone(), entry.content.clone(), embedding)
                        .with_metadata(entry.metadata.clone()),
                )?;
            }
        }

        self.registry.set_current_model(&model.id)?;
        *store_guard = Arc::new(new_store);
        *provider_guard = provider;

        info!("Re-embedded {} messages with {}", entries.len(), model.id);
        Ok(())
    }

    /// Drop every indexed message. The fresh store stays locked to the
    /// current model's dimensionality.
    pub async fn clear(&self) {
        let mut store = self.store.write().await;
        let removed = store.len();
        *store = Arc::new(VectorStore::for_model(&self.current_model()));
        info!("Cleared conversation index ({removed} messages)");
    }

    async fn provider(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&*self.provider.read().await)
    }
}

struct PendingEntry {
    id: Option<String>,
    content: String,
    metadata: Metadata,
}

/// Outcome of an ingest call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestReport {
    /// Messages embedded and stored.
    pub ingested: usize,

    /// Messages skipped because they had no content.
    pub skipped: usize,
}

/// Messages retrieved to ground a reply.
#[derive(Debug, Clone)]
pub struct Grounding {
    /// The user's message.
    pub query: String,

    /// Ranked matches, best first.
    pub results: Vec<SearchResult>,

    /// The matches rendered as `[role] content` lines.
    pub context: String,
}

impl Grounding {
    /// Whether nothing relevant was found.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Render results as `[role] content` lines until `budget` characters are
/// used up. A line that would overflow the budget ends the context.
fn build_context(results: &[SearchResult], budget: usize) -> String {
    let mut context = String::new();
    let mut used = 0;

    for result in results {
        let role = result
            .entry
            .metadata
            .get("role")
            .and_then(MetadataValue::as_str)
            .unwrap_or("message");
        let line = format!("[{role}] {}", result.entry.content);

        let separator = usize::from(!context.is_empty());
        let cost = line.chars().count() + separator;
        if used + cost > budget {
            break;
        }

        if separator == 1 {
            context.push('\n');
        }
        context.push_str(&line);
        used += cost;
    }

    context
}

/// Pick the provider for `model`. Only `openai-*` models go to the API, and
/// only when the OpenAI provider is configured; everything else is embedded
/// locally with hash embeddings.
fn build_provider(
    config: &EmbeddingConfig,
    model: &EmbeddingModelConfig,
) -> Arc<dyn EmbeddingProvider> {
    let remote =
        config.provider == EmbeddingProviderType::OpenAI && model.id.starts_with("openai-");

    if remote {
        let mut provider = OpenAIProvider::for_model(model)
            .with_timeout(Duration::from_secs(config.timeout_secs));
        if let Some(url) = &config.api_base_url {
            provider = provider.with_base_url(url.clone());
        }
        with_cache(provider, config)
    } else {
        with_cache(HashEmbeddingProvider::for_model(model), config)
    }
}

fn with_cache<P>(provider: P, config: &EmbeddingConfig) -> Arc<dyn EmbeddingProvider>
where
    P: EmbeddingProvider + 'static,
{
    if config.cache_enabled {
        Arc::new(CachedProvider::new(
            provider,
            EmbeddingCache::new(config.cache_max_entries),
        ))
    } else {
        Arc::new(provider)
    }
}
