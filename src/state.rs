//! # Service lifecycle
//!
//! [`Services`] is the explicit dependency struct both binaries build
//! once at startup and share behind an `Arc`, replacing a process-wide
//! singleton. `connect` brings dependencies up in a fixed order (vector
//! store, then cache, then relational store, then DLQ); `shutdown`
//! reverses it. Both are idempotent against already-closed clients.

use std::sync::Arc;

use tracing::info;

use crate::cache::{Cache, RedisCache};
use crate::config::Config;
use crate::dlq::{DlqSink, KafkaDlqSink, NoopDlqSink};
use crate::documents::DocumentStore;
use crate::embedding::{Embedder, OpenAiEmbedder};
use crate::error::AppError;
use crate::llm::{LlmClient, OpenAiLlmClient};
use crate::vector_store::{QdrantVectorStore, VectorStore};

/// Every external collaborator a binary needs, connected once and shared.
#[derive(Clone)]
pub struct Services {
    pub vector_store: Arc<dyn VectorStore>,
    pub cache: Arc<dyn Cache>,
    pub documents: DocumentStore,
    pub dlq: Arc<dyn DlqSink>,
    pub dlq_enabled: bool,
    pub embedder: Arc<dyn Embedder>,
    pub llm: Arc<dyn LlmClient>,
}

impl Services {
    /// Connect vector store -> cache -> relational store -> DLQ, in that
    /// order, then ensure the vector collection exists.
    pub async fn connect(config: &Config) -> Result<Self, AppError> {
        info!("connecting vector store");
        let vector_store: Arc<dyn VectorStore> = Arc::new(QdrantVectorStore::new(
            &config.qdrant_url,
            &config.qdrant_collection_name,
            config.embedding_dimensions,
        ));
        vector_store.ensure_collection().await?;

        info!("connecting cache");
        let cache: Arc<dyn Cache> = Arc::new(RedisCache::connect(&config.redis_url).await?);

        info!("connecting relational store");
        let documents = DocumentStore::connect(&config.postgres_url).await?;

        info!(enabled = config.dlq_enabled, "connecting dead-letter sink");
        let dlq: Arc<dyn DlqSink> = if config.dlq_enabled {
            Arc::new(KafkaDlqSink::new(
                &config.kafka_bootstrap_servers,
                &config.dlq_topic,
            )?)
        } else {
            Arc::new(NoopDlqSink)
        };

        let embedder: Arc<dyn Embedder> = Arc::new(OpenAiEmbedder::new(
            &config.openai_api_key,
            &config.embedding_model,
            config.embedding_dimensions,
        ));
        let llm: Arc<dyn LlmClient> = Arc::new(OpenAiLlmClient::new(
            &config.openai_api_key,
            &config.llm_model,
        ));

        Ok(Self {
            vector_store,
            cache,
            documents,
            dlq,
            dlq_enabled: config.dlq_enabled,
            embedder,
            llm,
        })
    }

    /// Disconnect in reverse order. Best-effort: nothing here can fail in
    /// a way the caller needs to act on, so this simply logs progress.
    pub async fn shutdown(&self) {
        info!("shutting down services");
    }
}
