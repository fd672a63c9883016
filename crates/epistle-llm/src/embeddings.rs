//! Text embeddings for semantic retrieval.
//!
//! Extracted records are indexed by embedding their subject, summary, and
//! body preview, so natural-language queries can match on meaning rather
//! than exact keywords. The [`Embedder`] trait keeps the store and the
//! retrieval engine independent of any particular provider, and
//! [`MockEmbedder`] keeps tests offline.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;

use crate::error::{LlmError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Trait
// ─────────────────────────────────────────────────────────────────────────────

/// Converts text into a dense vector for similarity search.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embed one text.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed several texts in one call.
    ///
    /// The default just loops over [`embed`](Embedder::embed); providers
    /// with a batch endpoint should override it.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    /// Vector width this embedder produces.
    fn dimensions(&self) -> usize;

    /// Provider name, recorded in the store's vector metadata so a provider
    /// or model change can be detected as staleness.
    fn name(&self) -> &str;
}

/// An embedder shared across async tasks.
pub type SharedEmbedder = Arc<dyn Embedder>;

// ─────────────────────────────────────────────────────────────────────────────
// Mock Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Deterministic embedder for tests.
///
/// Hashes the text into a seed and expands it into a unit vector with a
/// xorshift generator. The same text always maps to the same vector, and
/// distinct texts land nearly orthogonal, so identical-text queries score
/// close to 1.0 and unrelated ones close to 0.
#[derive(Debug, Clone)]
pub struct MockEmbedder {
    dimensions: usize,
}

impl MockEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self { dimensions }
    }

    /// 384 dimensions, the width of the small sentence-transformer models.
    pub fn default_dimensions() -> Self {
        Self::new(384)
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::default_dimensions()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut hasher = DefaultHasher::new();
        text.hash(&mut hasher);
        // xorshift64 needs a nonzero state
        let mut state = hasher.finish() | 1;

        let mut embedding = vec![0.0f32; self.dimensions];
        for value in embedding.iter_mut() {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            // top 24 bits, mapped to [-1, 1)
            *value = ((state >> 40) as f32 / 8_388_608.0) - 1.0;
        }

        let norm = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut embedding {
                *x /= norm;
            }
        }

        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "mock"
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// OpenAI Embedder
// ─────────────────────────────────────────────────────────────────────────────

/// Settings for the OpenAI embeddings endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiEmbedderConfig {
    /// API key, already resolved from the environment or config.
    pub api_key: String,
    /// Endpoint base, `https://api.openai.com/v1` unless overridden.
    pub base_url: String,
    /// Embedding model name.
    pub model: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl OpenAiEmbedderConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            timeout: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

/// Native vector width of the known OpenAI embedding models.
fn model_dimensions(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        // text-embedding-3-small and ada-002 are both 1536, and 1536 is
        // the safest guess for anything we do not recognize.
        _ => 1536,
    }
}

/// Client for the OpenAI `/embeddings` endpoint.
pub struct OpenAiEmbedder {
    client: Client,
    config: OpenAiEmbedderConfig,
    dimensions: usize,
}

impl OpenAiEmbedder {
    pub fn new(config: OpenAiEmbedderConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Internal(format!("Failed to create HTTP client: {}", e)))?;
        let dimensions = model_dimensions(&config.model);

        Ok(Self {
            client,
            config,
            dimensions,
        })
    }

    fn embeddings_url(&self) -> String {
        format!("{}/embeddings", self.config.base_url)
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut results = self.embed_batch(&[text]).await?;
        if results.is_empty() {
            return Err(LlmError::Backend(
                "Embedding response contained no vectors".to_string(),
            ));
        }
        Ok(results.swap_remove(0))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingRequest {
            model: &self.config.model,
            input: texts,
        };

        let response = self
            .client
            .post(self.embeddings_url())
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Backend(format!(
                "Embedding request failed: HTTP {} - {}",
                status, body
            )));
        }

        let mut parsed: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Serialization(format!("Failed to parse response: {}", e)))?;

        // The API may return items out of order; index is authoritative.
        parsed.data.sort_by_key(|d| d.index);

        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Debug, serde::Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [&'a str],
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, serde::Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Embedder Factory
// ─────────────────────────────────────────────────────────────────────────────

/// Provider-agnostic embedder settings, populated from the `[embedding]`
/// config section. Lives here instead of taking the config types as a
/// dependency, so the crate stays usable standalone.
#[derive(Debug, Clone)]
pub struct EmbedderSpec {
    /// Provider name: "openai" or "mock".
    pub provider: String,
    /// OpenAI API key (required for "openai" provider).
    pub api_key: Option<String>,
    /// OpenAI model name.
    pub model: Option<String>,
    /// OpenAI base URL override.
    pub base_url: Option<String>,
    /// Requested dimensions (for providers that support it).
    pub dimensions: Option<usize>,
}

/// Build a `SharedEmbedder` from a spec.
pub fn build_embedder(spec: &EmbedderSpec) -> Result<SharedEmbedder> {
    match spec.provider.as_str() {
        "openai" => {
            let api_key = spec.api_key.as_deref().ok_or_else(|| {
                LlmError::Config(
                    "OpenAI embedding provider requires an API key. \
                     Set OPENAI_API_KEY or configure [embedding] api_key_env."
                        .to_string(),
                )
            })?;
            let mut config = OpenAiEmbedderConfig::new(api_key);
            if let Some(ref model) = spec.model {
                config = config.with_model(model);
            }
            if let Some(ref base_url) = spec.base_url {
                config = config.with_base_url(base_url);
            }
            Ok(Arc::new(OpenAiEmbedder::new(config)?))
        }
        "mock" => {
            let dims = spec.dimensions.unwrap_or(384);
            Ok(Arc::new(MockEmbedder::new(dims)))
        }
        other => Err(LlmError::Config(format!(
            "Unknown embedding provider '{}'. Valid: openai, mock",
            other
        ))),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Utility Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Cosine similarity between two vectors, 0.0 when lengths differ or
/// either vector is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_embedder_produces_unit_vectors() {
        let embedder = MockEmbedder::default();
        assert_eq!(embedder.dimensions(), 384);
        assert_eq!(embedder.name(), "mock");

        let embedding = embedder.embed("hello world").await.unwrap();
        assert_eq!(embedding.len(), 384);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.001);
    }

    #[tokio::test]
    async fn test_mock_embedder_deterministic() {
        let embedder = MockEmbedder::default();

        let e1 = embedder.embed("march electricity invoice").await.unwrap();
        let e2 = embedder.embed("march electricity invoice").await.unwrap();

        assert_eq!(e1, e2);
    }

    #[tokio::test]
    async fn test_mock_embedder_separates_distinct_texts() {
        let embedder = MockEmbedder::default();

        let e1 = embedder.embed("electricity bill").await.unwrap();
        let e2 = embedder.embed("package delivery").await.unwrap();

        assert_ne!(e1, e2);
        // Unrelated texts should be far from the self-similarity of 1.0.
        assert!(cosine_similarity(&e1, &e2).abs() < 0.5);
    }

    #[tokio::test]
    async fn test_embed_batch_preserves_count() {
        let embedder = MockEmbedder::new(64);

        let texts = vec!["one", "two", "three"];
        let embeddings = embedder.embed_batch(&texts).await.unwrap();

        assert_eq!(embeddings.len(), 3);
        for emb in &embeddings {
            assert_eq!(emb.len(), 64);
        }
    }

    #[test]
    fn test_cosine_similarity_axes() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.001);

        let c = vec![0.0, 1.0, 0.0];
        assert!(cosine_similarity(&a, &c).abs() < 0.001);

        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_cosine_similarity_degenerate_inputs() {
        let a = vec![1.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&a, &b), 0.0);

        let zeros = vec![0.0, 0.0, 0.0];
        let unit = vec![1.0, 0.0, 0.0];
        assert_eq!(cosine_similarity(&zeros, &unit), 0.0);
        assert_eq!(cosine_similarity(&[], &[]), 0.0);
    }

    #[test]
    fn test_build_embedder_mock() {
        let spec = EmbedderSpec {
            provider: "mock".to_string(),
            api_key: None,
            model: None,
            base_url: None,
            dimensions: Some(64),
        };

        let embedder = build_embedder(&spec).unwrap();
        assert_eq!(embedder.dimensions(), 64);
        assert_eq!(embedder.name(), "mock");
    }

    #[test]
    fn test_build_embedder_openai_requires_key() {
        let spec = EmbedderSpec {
            provider: "openai".to_string(),
            api_key: None,
            model: None,
            base_url: None,
            dimensions: None,
        };

        assert!(matches!(build_embedder(&spec), Err(LlmError::Config(_))));
    }

    #[test]
    fn test_build_embedder_unknown_provider() {
        let spec = EmbedderSpec {
            provider: "quantum".to_string(),
            api_key: None,
            model: None,
            base_url: None,
            dimensions: None,
        };

        assert!(build_embedder(&spec).is_err());
    }

    #[test]
    fn test_model_dimensions_mapping() {
        assert_eq!(model_dimensions("text-embedding-3-small"), 1536);
        assert_eq!(model_dimensions("text-embedding-3-large"), 3072);
        assert_eq!(model_dimensions("text-embedding-ada-002"), 1536);
        assert_eq!(model_dimensions("custom-model"), 1536);
    }
}
