//! # Embedding client
//!
//! Batch text-to-vector embeddings against an OpenAI-compatible provider.
//! Order of the output vectors matches the order of the input texts.

use async_openai::config::OpenAIConfig;
use async_openai::types::CreateEmbeddingRequestArgs;
use async_openai::Client;
use async_trait::async_trait;

use crate::error::EmbeddingError;

/// Embedding contract, implemented by the OpenAI-backed client and by a
/// deterministic fake in tests.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        let mut batch = self.embed_batch(&[text.to_string()]).await?;
        batch.pop().ok_or(EmbeddingError::Empty)
    }
}

/// OpenAI-backed [`Embedder`].
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
    dimensions: u32,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, model: impl Into<String>, dimensions: usize) -> Self {
        let config = OpenAIConfig::new().with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.into(),
            dimensions: dimensions as u32,
        }
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .dimensions(self.dimensions)
            .build()
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| EmbeddingError::Request(e.to_string()))?;

        if response.data.is_empty() {
            return Err(EmbeddingError::Empty);
        }

        let mut ordered = response.data;
        ordered.sort_by_key(|d| d.index);
        Ok(ordered.into_iter().map(|d| d.embedding).collect())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;

    /// Deterministic [`Embedder`] for tests: each text maps to a vector
    /// derived from its byte length, so equal-length texts collide (this
    /// is intentional — tests only assert on ordering and count, not on
    /// semantic similarity).
    #[derive(Clone, Default)]
    pub struct FakeEmbedder {
        pub fail: bool,
    }

    #[async_trait]
    impl Embedder for FakeEmbedder {
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
            if self.fail {
                return Err(EmbeddingError::Request("injected failure".to_string()));
            }
            Ok(texts
                .iter()
                .map(|t| vec![t.len() as f32, 1.0])
                .collect())
        }
    }
}
