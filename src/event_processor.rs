//! # Event processor
//!
//! The core of the update pipeline: parse a CDC event, dispatch on
//! create/update/delete, and on success keep the vector index and cache
//! consistent with the relational store. This is where [`crate::chunking`],
//! [`crate::retry`], [`crate::embedding`], [`crate::vector_store`], and
//! [`crate::cache`] meet.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::cache::{document_invalidation_key, Cache};
use crate::chunking::{chunk_document, ChunkParams};
use crate::embedding::Embedder;
use crate::error::{AppError, VectorDBError};
use crate::event::{parse_event, DocumentChange};
use crate::metrics::METRICS;
use crate::retry::{retry, RetryPolicy};
use crate::vector_store::{pair_chunks_with_embeddings, VectorStore};

/// Dependencies the event processor needs; held by `Arc` so the consumer
/// loop can clone it cheaply per event.
pub struct EventProcessor {
    pub vector_store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn Embedder>,
    pub cache: Arc<dyn Cache>,
    pub chunk_params: ChunkParams,
    pub retry_policy: RetryPolicy,
}

impl EventProcessor {
    pub fn new(
        vector_store: Arc<dyn VectorStore>,
        embedder: Arc<dyn Embedder>,
        cache: Arc<dyn Cache>,
        chunk_params: ChunkParams,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            vector_store,
            embedder,
            cache,
            chunk_params,
            retry_policy,
        }
    }

    /// Process one raw CDC payload (already unwrapped from any `payload`
    /// envelope). Returns `Ok(())` for both successful processing and
    /// intentionally dropped events; only genuine collaborator failures
    /// raise an error for the consumer loop to route to the DLQ.
    pub async fn process_event(&self, raw: &Value) -> Result<(), AppError> {
        METRICS.updates_total.inc();
        let started = Instant::now();

        let (change, event_ts) = parse_event(raw);
        let document_id = match &change {
            DocumentChange::Create { id, .. } | DocumentChange::Update { id, .. } => Some(*id),
            DocumentChange::Delete { document_id } => Some(*document_id),
            DocumentChange::Dropped { .. } => None,
        };
        let is_drop = matches!(change, DocumentChange::Dropped { .. });

        let result = match change {
            DocumentChange::Dropped { reason } => {
                warn!(reason, "dropping unrecognized or incomplete CDC event");
                Ok(())
            }
            DocumentChange::Delete { document_id } => self.handle_delete(document_id).await,
            DocumentChange::Create { id, content, version }
            | DocumentChange::Update { id, content, version } => {
                self.handle_upsert(id, &content, version).await
            }
        };

        if result.is_err() {
            METRICS.update_errors_total.inc();
        } else if !is_drop {
            // Dropped events never touched the vector store or embedder, so
            // they don't belong in a histogram meant to describe how long a
            // real upsert/delete takes.
            let elapsed = started.elapsed().as_secs_f64();
            METRICS.update_processing_duration_seconds.observe(elapsed);
            METRICS.record_sample("update_processing_duration_seconds", elapsed);

            let lag = (chrono::Utc::now() - event_ts).num_milliseconds() as f64 / 1000.0;
            METRICS.update_lag_seconds.observe(lag.max(0.0));
            METRICS.record_sample("update_lag_seconds", lag.max(0.0));

            if let Some(document_id) = document_id {
                METRICS.record_update_activity(document_id, elapsed);
            }
        }

        result
    }

    async fn handle_delete(&self, document_id: Uuid) -> Result<(), AppError> {
        self.vector_store
            .delete_document_chunks(document_id)
            .await?;
        Ok(())
    }

    async fn handle_upsert(&self, id: Uuid, content: &str, version: i64) -> Result<(), AppError> {
        let chunks = chunk_document(id, content, self.chunk_params);
        if chunks.is_empty() {
            warn!(document_id = %id, "chunker produced no chunks, dropping event");
            return Ok(());
        }

        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embedder = self.embedder.clone();
        let embeddings = retry(
            || {
                let embedder = embedder.clone();
                let texts = texts.clone();
                async move { embedder.embed_batch(&texts).await }
            },
            self.retry_policy,
            crate::retry::always_retriable,
        )
        .await?;

        let points = pair_chunks_with_embeddings(&chunks, &embeddings, version)?;

        // An update that produces fewer chunks than the previous version
        // would otherwise leave stale trailing points behind, since chunk
        // ids are deterministic per index and a re-upsert only overwrites
        // indices that still exist. Purge the document's existing chunks
        // first so the new set is authoritative.
        self.vector_store.delete_document_chunks(id).await?;

        let vector_store = self.vector_store.clone();
        retry(
            || {
                let vector_store = vector_store.clone();
                let points = points.clone();
                async move { vector_store.upsert_chunks(&points).await }
            },
            self.retry_policy,
            |e: &VectorDBError| !matches!(e, VectorDBError::LengthMismatch { .. }),
        )
        .await?;

        self.cache.delete(&document_invalidation_key(&id)).await;
        Ok(())
    }
}
