//! Embedding providers.
//!
//! [`HashEmbeddingProvider`] is the deterministic stand-in used by default;
//! [`OpenAIProvider`] talks to a real embeddings API. Both sit behind the
//! [`EmbeddingProvider`] trait so stores and rankers never depend on which
//! one produced a vector.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info};

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::registry::EmbeddingModelConfig;

/// Multiplier applied to `seed * (index + 1)` before taking the sine.
const HASH_FREQUENCY: f64 = 0.1;

/// Default timeout for network-backed providers.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deterministically map `text` to a vector of `dimensions` values in [0, 1].
///
/// The seed is the sum of the text's Unicode code points; component `i` is
/// `sin(seed * (i + 1) * 0.1) * 0.5 + 0.5`. The same input always yields a
/// bit-identical output. This carries no semantic meaning whatsoever.
pub fn hash_embedding(text: &str, dimensions: usize) -> Embedding {
    let seed: f64 = text.chars().map(|c| f64::from(u32::from(c))).sum();

    (0..dimensions)
        .map(|i| {
            let x = seed * (i as f64 + 1.0) * HASH_FREQUENCY;
            (x.sin() * 0.5 + 0.5) as f32
        })
        .collect()
}

/// Fail with [`EmbeddingError::InvalidResponse`] unless a batch call returned
/// exactly one embedding per input text.
pub fn check_batch_len(requested: usize, embeddings: &[Embedding]) -> Result<()> {
    if embeddings.len() != requested {
        return Err(EmbeddingError::InvalidResponse(format!(
            "expected {requested} embeddings, got {}",
            embeddings.len()
        )));
    }
    Ok(())
}

/// Trait for embedding providers.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Get the name of this provider.
    fn name(&self) -> &str;

    /// Identifier of the model this provider embeds with.
    fn model(&self) -> &str;

    /// Length of every vector this provider returns.
    fn dimensions(&self) -> usize;

    /// Generate an embedding for the given text.
    async fn embed(&self, text: &str) -> Result<Embedding>;

    /// Generate embeddings for multiple texts, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }
}

/// Provider backed by [`hash_embedding`]. Never fails.
#[derive(Debug, Clone)]
pub struct HashEmbeddingProvider {
    model: String,
    dimensions: usize,
}

impl HashEmbeddingProvider {
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            model: model.into(),
            dimensions,
        }
    }

    /// Build a provider producing vectors for the given model configuration.
    pub fn for_model(config: &EmbeddingModelConfig) -> Self {
        Self::new(config.id.clone(), config.dimensions)
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        Ok(hash_embedding(text, self.dimensions))
    }
}

/// OpenAI embedding provider.
///
/// Every request is bounded by a timeout. Failures are reported, never
/// retried.
pub struct OpenAIProvider {
    /// API key.
    api_key: Option<String>,

    /// API base URL.
    base_url: String,

    /// HTTP client.
    client: reqwest::Client,

    /// API-side model name, e.g. `text-embedding-3-small`.
    model: String,

    /// Expected output length.
    dimensions: usize,

    timeout: Duration,
}

impl OpenAIProvider {
    /// Create a new OpenAI provider. Picks up `OPENAI_API_KEY` if set.
    pub fn new(model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: model.into(),
            dimensions,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Build a provider for a catalog entry such as
    /// `openai-text-embedding-3-small`.
    pub fn for_model(config: &EmbeddingModelConfig) -> Self {
        let model = config.id.strip_prefix("openai-").unwrap_or(&config.id);
        Self::new(model, config.dimensions)
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the per-request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Whether an API key is configured.
    pub fn is_available(&self) -> bool {
        self.api_key.is_some()
    }

    // Only the v3 models accept a `dimensions` parameter.
    fn supports_dimensions(&self) -> bool {
        self.model.starts_with("text-embedding-3")
    }

    async fn request(&self, input: serde_json::Value) -> Result<OpenAIEmbeddingResponse> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| EmbeddingError::ProviderUnavailable("no API key configured".to_string()))?;

        let mut body = serde_json::json!({
            "input": input,
            "model": self.model,
        });
        if self.supports_dimensions() {
            body["dimensions"] = serde_json::json!(self.dimensions);
        }

        let send = async {
            let response = self
                .client
                .post(format!("{}/embeddings", self.base_url))
                .bearer_auth(api_key)
                .json(&body)
                .send()
                .await
                .map_err(|e| EmbeddingError::ProviderUnavailable(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60);

                return Err(EmbeddingError::RateLimited {
                    retry_after_secs: retry_after,
                });
            }

            if !status.is_success() {
                let error_text = response.text().await.unwrap_or_default();
                return Err(EmbeddingError::ProviderUnavailable(format!(
                    "API returned {status}: {error_text}"
                )));
            }

            response
                .json::<OpenAIEmbeddingResponse>()
                .await
                .map_err(|e| EmbeddingError::InvalidResponse(e.to_string()))
        };

        tokio::time::timeout(self.timeout, send)
            .await
            .map_err(|_| {
                EmbeddingError::ProviderUnavailable(format!(
                    "request timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
    }

    fn check_dimensions(&self, embedding: &Embedding) -> Result<()> {
        if embedding.len() != self.dimensions {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimensions,
                actual: embedding.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAIProvider {
    fn name(&self) -> &str {
        "openai"
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    async fn embed(&self, text: &str) -> Result<Embedding> {
        debug!("Generating embedding with model: {}", self.model);

        let result = self.request(serde_json::json!(text)).await?;
        let embedding = result
            .data
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::InvalidResponse("no embedding in response".to_string()))?
            .embedding;

        self.check_dimensions(&embedding)?;
        Ok(embedding)
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Embedding>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(
            "Generating batch embeddings for {} texts with model: {}",
            texts.len(),
            self.model
        );

        let mut result = self.request(serde_json::json!(texts)).await?;
        result.data.sort_by_key(|item| item.index);
        let embeddings: Vec<Embedding> = result.data.into_iter().map(|item| item.embedding).collect();
        check_batch_len(texts.len(), &embeddings)?;
        for embedding in &embeddings {
            self.check_dimensions(embedding)?;
        }

        info!("Generated {} batch embeddings", embeddings.len());
        Ok(embeddings)
    }
}

/// OpenAI API response format.
#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_hash_embedding_is_deterministic() {
        let a = hash_embedding("hello world", 64);
        let b = hash_embedding("hello world", 64);
        assert_eq!(a, b);
        assert!(a.iter().all(|v| (0.0..=1.0).contains(v)));
    }

    #[test]
    fn test_hash_embedding_length() {
        for d in [0, 1, 3, 384, 1536] {
            assert_eq!(hash_embedding("text", d).len(), d);
        }
        assert_eq!(hash_embedding("", 8).len(), 8);
    }

    #[test]
    fn test_hash_embedding_differs_by_text() {
        assert_ne!(hash_embedding("abc", 8), hash_embedding("abd", 8));
    }

    #[test]
    fn test_empty_text_embeds_to_midpoint() {
        // Seed 0 gives sin(0) for every component.
        assert_eq!(hash_embedding("", 3), vec![0.5, 0.5, 0.5]);
    }

    #[tokio::test]
    async fn test_hash_provider_batch_matches_single() {
        let provider = HashEmbeddingProvider::new("default", 16);
        let texts = vec!["one".to_string(), "two".to_string()];

        let batch = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1], provider.embed("two").await.unwrap());
    }

    #[test]
    fn test_openai_for_model_strips_prefix() {
        let config = EmbeddingModelConfig::new("openai-text-embedding-3-large", 3072);
        let provider = OpenAIProvider::for_model(&config);
        assert_eq!(provider.model(), "text-embedding-3-large");
        assert_eq!(provider.dimensions(), 3072);
    }

    #[tokio::test]
    async fn test_openai_provider_parses_embeddings() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .and(header("authorization", "Bearer test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.25, 0.5, 0.75], "index": 0}],
                "model": "text-embedding-3-small",
                "usage": {"prompt_tokens": 2, "total_tokens": 2}
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("text-embedding-3-small", 3)
            .with_api_key("test-key")
            .with_base_url(server.uri());

        let embedding = provider.embed("hello").await.unwrap();
        assert_eq!(embedding, vec![0.25, 0.5, 0.75]);
    }

    #[tokio::test]
    async fn test_openai_batch_is_reordered_by_index() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    {"embedding": [0.0, 1.0], "index": 1},
                    {"embedding": [1.0, 0.0], "index": 0}
                ],
                "model": "text-embedding-3-small"
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("text-embedding-3-small", 2)
            .with_api_key("test-key")
            .with_base_url(server.uri());

        let texts = vec!["first".to_string(), "second".to_string()];
        let embeddings = provider.embed_batch(&texts).await.unwrap();
        assert_eq!(embeddings, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
    }

    #[tokio::test]
    async fn test_openai_timeout_is_provider_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_delay(Duration::from_millis(500))
                    .set_body_json(serde_json::json!({"data": []})),
            )
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("text-embedding-3-small", 3)
            .with_api_key("test-key")
            .with_base_url(server.uri())
            .with_timeout(Duration::from_millis(50));

        let err = provider.embed("slow").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_openai_error_status_and_rate_limit() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("text-embedding-3-small", 3)
            .with_api_key("test-key")
            .with_base_url(server.uri());

        let err = provider.embed("busy").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::RateLimited {
                retry_after_secs: 7
            }
        ));

        let down = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&down)
            .await;

        let provider = OpenAIProvider::new("text-embedding-3-small", 3)
            .with_api_key("test-key")
            .with_base_url(down.uri());
        let err = provider.embed("down").await.unwrap_err();
        assert!(matches!(err, EmbeddingError::ProviderUnavailable(_)));
    }

    #[tokio::test]
    async fn test_openai_wrong_length_is_dimension_mismatch() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [{"embedding": [0.1, 0.2], "index": 0}],
                "model": "text-embedding-3-small"
            })))
            .mount(&server)
            .await;

        let provider = OpenAIProvider::new("text-embedding-3-small", 3)
            .with_api_key("test-key")
            .with_base_url(server.uri());

        let err = provider.embed("short").await.unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            }
        ));
    }
}
