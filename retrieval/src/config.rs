//! Configuration for the conversation retrieval engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, RetrievalError};

/// File inside `data_dir` holding the current embedding model.
const SELECTION_FILE: &str = "current_model.json";

/// Configuration for the conversation retrieval engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Directory for durable state (the current model selection).
    pub data_dir: PathBuf,

    /// Embedding provider configuration.
    pub embedding: EmbeddingConfig,

    /// Query processing configuration.
    pub query: QueryConfig,
}

impl RetrievalConfig {
    /// Create a new configuration with default values.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            embedding: EmbeddingConfig::default(),
            query: QueryConfig::default(),
        }
    }

    /// Parse a TOML document. Missing keys take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| RetrievalError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| RetrievalError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&content)
    }

    /// Set the embedding configuration.
    pub fn with_embedding(mut self, config: EmbeddingConfig) -> Self {
        self.embedding = config;
        self
    }

    /// Set the query configuration.
    pub fn with_query(mut self, config: QueryConfig) -> Self {
        self.query = config;
        self
    }

    /// Where the current model selection is persisted.
    pub fn selection_path(&self) -> PathBuf {
        self.data_dir.join(SELECTION_FILE)
    }

    /// Reject settings the engine cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.query.max_results == 0 {
            return Err(RetrievalError::Config(
                "query.max_results must be at least 1".to_string(),
            ));
        }
        if !(-1.0..=1.0).contains(&self.query.min_similarity) {
            return Err(RetrievalError::Config(format!(
                "query.min_similarity must be within [-1, 1], got {}",
                self.query.min_similarity
            )));
        }
        if self.embedding.timeout_secs == 0 {
            return Err(RetrievalError::Config(
                "embedding.timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.embedding.batch_size == 0 {
            return Err(RetrievalError::Config(
                "embedding.batch_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self::new(dirs::data_dir().unwrap_or_default().join("chatvault"))
    }
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// Which provider to use.
    pub provider: EmbeddingProviderType,

    /// Model to select on first start, when no selection has been saved.
    pub model: Option<String>,

    /// Timeout for a single embedding request, in seconds.
    pub timeout_secs: u64,

    /// Number of texts embedded per provider call during ingest.
    pub batch_size: usize,

    /// Whether to cache embeddings.
    pub cache_enabled: bool,

    /// Maximum cache size.
    pub cache_max_entries: usize,

    /// Override for the embeddings API base URL.
    pub api_base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderType::Hash,
            model: None,
            timeout_secs: 30,
            batch_size: 64,
            cache_enabled: true,
            cache_max_entries: 10000,
            api_base_url: None,
        }
    }
}

/// Type of embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingProviderType {
    /// Deterministic hash embeddings; no network.
    #[serde(rename = "hash")]
    Hash,
    /// OpenAI embeddings API, used for `openai-*` models.
    #[serde(rename = "openai")]
    OpenAI,
}

/// Configuration for query processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Number of results used to ground a response.
    pub max_results: usize,

    /// Results below this similarity are dropped.
    pub min_similarity: f32,

    /// Upper bound on the grounding context length, in characters.
    pub context_char_budget: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_results: 5,
            min_similarity: 0.0,
            context_char_budget: 2000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config = RetrievalConfig::from_toml_str(
            r#"
            data_dir = "/tmp/chatvault"

            [embedding]
            provider = "openai"
            model = "openai-text-embedding-3-large"

            [query]
            max_results = 3
            "#,
        )
        .unwrap();

        assert_eq!(config.data_dir, PathBuf::from("/tmp/chatvault"));
        assert_eq!(config.embedding.provider, EmbeddingProviderType::OpenAI);
        assert_eq!(
            config.embedding.model.as_deref(),
            Some("openai-text-embedding-3-large")
        );
        assert_eq!(config.embedding.timeout_secs, 30);
        assert_eq!(config.query.max_results, 3);
        assert_eq!(config.query.context_char_budget, 2000);
        assert_eq!(
            config.selection_path(),
            PathBuf::from("/tmp/chatvault/current_model.json")
        );
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = RetrievalConfig::from_toml_str("[query]\nmax_results = 0\n").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err = RetrievalConfig::from_toml_str("[query]\nmin_similarity = 1.5\n").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));

        let err = RetrievalConfig::from_toml_str("[embedding]\nprovider = \"cohere\"\n").unwrap_err();
        assert!(matches!(err, RetrievalError::Config(_)));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let path = temp_dir.path().join("chatvault.toml");
        std::fs::write(&path, "[embedding]\ncache_enabled = false\n").unwrap();

        let config = RetrievalConfig::load(&path).unwrap();
        assert!(!config.embedding.cache_enabled);

        assert!(RetrievalConfig::load(temp_dir.path().join("missing.toml")).is_err());
    }
}
