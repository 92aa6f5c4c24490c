//! # Vector store client
//!
//! Talks to Qdrant over its plain REST API via `reqwest` rather than a
//! dedicated client crate — the same choice the production RAG services
//! in this codebase's lineage make, since the REST surface is small and a
//! client crate would only add an indirection layer over JSON we already
//! control both ends of.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

use crate::error::VectorDBError;

/// A single chunk upserted into the vector store.
#[derive(Debug, Clone)]
pub struct VectorPoint {
    pub id: Uuid,
    pub embedding: Vec<f32>,
    pub document_id: Uuid,
    pub content: String,
    pub chunk_index: usize,
    pub version: i64,
}

/// A scored match returned from search.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchMatch {
    pub id: Uuid,
    pub document_id: Uuid,
    pub content: String,
    pub score: f32,
    pub version: i64,
}

/// Vector store contract. `ensure_collection` is idempotent; callers
/// invoke it once at startup. All writes are idempotent on `id`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    async fn ensure_collection(&self) -> Result<(), VectorDBError>;

    async fn upsert_chunks(&self, points: &[VectorPoint]) -> Result<(), VectorDBError>;

    async fn delete_document_chunks(&self, document_id: Uuid) -> Result<(), VectorDBError>;

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_version: Option<i64>,
    ) -> Result<Vec<SearchMatch>, VectorDBError>;
}

/// Build [`VectorPoint`]s from parallel chunk/embedding slices, raising
/// [`VectorDBError::LengthMismatch`] when they disagree in length.
pub fn pair_chunks_with_embeddings(
    chunks: &[crate::chunking::Chunk],
    embeddings: &[Vec<f32>],
    version: i64,
) -> Result<Vec<VectorPoint>, VectorDBError> {
    if chunks.len() != embeddings.len() {
        return Err(VectorDBError::LengthMismatch {
            chunks: chunks.len(),
            embeddings: embeddings.len(),
        });
    }
    Ok(chunks
        .iter()
        .zip(embeddings.iter())
        .map(|(chunk, embedding)| VectorPoint {
            id: chunk.id,
            embedding: embedding.clone(),
            document_id: chunk.document_id,
            content: chunk.content.clone(),
            chunk_index: chunk.chunk_index,
            version,
        })
        .collect())
}

/// Qdrant-backed [`VectorStore`] over its HTTP API.
pub struct QdrantVectorStore {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dimensions: usize,
}

impl QdrantVectorStore {
    pub fn new(base_url: impl Into<String>, collection: impl Into<String>, dimensions: usize) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("reqwest client builds with static config");
        Self {
            client,
            base_url: base_url.into(),
            collection: collection.into(),
            dimensions,
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/collections/{}{}",
            self.base_url.trim_end_matches('/'),
            self.collection,
            path
        )
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn ensure_collection(&self) -> Result<(), VectorDBError> {
        let exists = self
            .client
            .get(self.url(""))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false);
        if exists {
            return Ok(());
        }

        let body = json!({
            "vectors": { "size": self.dimensions, "distance": "Cosine" }
        });
        let resp = self
            .client
            .put(self.url(""))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorDBError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VectorDBError::Request(format!(
                "collection create returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn upsert_chunks(&self, points: &[VectorPoint]) -> Result<(), VectorDBError> {
        let payload_points: Vec<_> = points
            .iter()
            .map(|p| {
                json!({
                    "id": p.id,
                    "vector": p.embedding,
                    "payload": {
                        "document_id": p.document_id,
                        "content": p.content,
                        "chunk_index": p.chunk_index,
                        "version": p.version,
                    }
                })
            })
            .collect();

        let resp = self
            .client
            .put(self.url("/points"))
            .json(&json!({ "points": payload_points }))
            .send()
            .await
            .map_err(|e| VectorDBError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VectorDBError::Request(format!(
                "upsert returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn delete_document_chunks(&self, document_id: Uuid) -> Result<(), VectorDBError> {
        let body = json!({
            "filter": {
                "must": [{ "key": "document_id", "match": { "value": document_id } }]
            }
        });
        let resp = self
            .client
            .post(self.url("/points/delete"))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorDBError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VectorDBError::Request(format!(
                "delete returned {}",
                resp.status()
            )));
        }
        Ok(())
    }

    async fn search(
        &self,
        embedding: &[f32],
        top_k: usize,
        min_version: Option<i64>,
    ) -> Result<Vec<SearchMatch>, VectorDBError> {
        let mut body = json!({
            "vector": embedding,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(min_version) = min_version {
            body["filter"] = json!({
                "must": [{ "key": "version", "range": { "gte": min_version } }]
            });
        }

        let resp = self
            .client
            .post(self.url("/points/search"))
            .json(&body)
            .send()
            .await
            .map_err(|e| VectorDBError::Request(e.to_string()))?;
        if !resp.status().is_success() {
            return Err(VectorDBError::Request(format!(
                "search returned {}",
                resp.status()
            )));
        }

        let decoded: QdrantSearchResponse = resp
            .json()
            .await
            .map_err(|e| VectorDBError::Decode(e.to_string()))?;

        Ok(decoded
            .result
            .into_iter()
            .filter_map(|r| {
                let document_id = r.payload.document_id;
                Some(SearchMatch {
                    id: r.id,
                    document_id,
                    content: r.payload.content,
                    score: r.score,
                    version: r.payload.version,
                })
            })
            .collect())
    }
}

#[derive(Debug, Deserialize)]
struct QdrantSearchResponse {
    result: Vec<QdrantScoredPoint>,
}

#[derive(Debug, Deserialize)]
struct QdrantScoredPoint {
    id: Uuid,
    score: f32,
    payload: QdrantPayload,
}

#[derive(Debug, Deserialize)]
struct QdrantPayload {
    document_id: Uuid,
    content: String,
    version: i64,
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// In-memory [`VectorStore`] for event-processor and query-processor tests.
    #[derive(Clone, Default)]
    pub struct FakeVectorStore {
        points: Arc<Mutex<Vec<VectorPoint>>>,
    }

    impl FakeVectorStore {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn points(&self) -> Vec<VectorPoint> {
            self.points.lock().clone()
        }

        pub fn seed_matches(&self, points: Vec<VectorPoint>) {
            *self.points.lock() = points;
        }
    }

    #[async_trait]
    impl VectorStore for FakeVectorStore {
        async fn ensure_collection(&self) -> Result<(), VectorDBError> {
            Ok(())
        }

        async fn upsert_chunks(&self, new_points: &[VectorPoint]) -> Result<(), VectorDBError> {
            let mut points = self.points.lock();
            for p in new_points {
                points.retain(|existing| existing.id != p.id);
                points.push(p.clone());
            }
            Ok(())
        }

        async fn delete_document_chunks(&self, document_id: Uuid) -> Result<(), VectorDBError> {
            self.points.lock().retain(|p| p.document_id != document_id);
            Ok(())
        }

        async fn search(
            &self,
            _embedding: &[f32],
            top_k: usize,
            min_version: Option<i64>,
        ) -> Result<Vec<SearchMatch>, VectorDBError> {
            let points = self.points.lock();
            let matches = points
                .iter()
                .filter(|p| min_version.map_or(true, |v| p.version >= v))
                .take(top_k)
                .map(|p| SearchMatch {
                    id: p.id,
                    document_id: p.document_id,
                    content: p.content.clone(),
                    score: 0.5,
                    version: p.version,
                })
                .collect();
            Ok(matches)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeVectorStore;
    use super::*;
    use crate::chunking::chunk_document;
    use crate::chunking::ChunkParams;

    #[test]
    fn length_mismatch_is_rejected() {
        let doc = Uuid::new_v4();
        let chunks = chunk_document(doc, "hello world", ChunkParams::default());
        let result = pair_chunks_with_embeddings(&chunks, &[], 1);
        assert!(matches!(result, Err(VectorDBError::LengthMismatch { .. })));
    }

    #[tokio::test]
    async fn upsert_then_search_round_trips() {
        let store = FakeVectorStore::new();
        let doc = Uuid::new_v4();
        let chunks = chunk_document(doc, "hello world", ChunkParams::default());
        let embeddings = vec![vec![0.1, 0.2]; chunks.len()];
        let points = pair_chunks_with_embeddings(&chunks, &embeddings, 1).unwrap();
        store.upsert_chunks(&points).await.unwrap();

        let matches = store.search(&[0.1, 0.2], 10, None).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].document_id, doc);
    }

    #[tokio::test]
    async fn delete_purges_all_points_for_document() {
        let store = FakeVectorStore::new();
        let doc = Uuid::new_v4();
        let chunks = chunk_document(doc, "alpha beta gamma delta", ChunkParams::default());
        let embeddings = vec![vec![0.0]; chunks.len()];
        let points = pair_chunks_with_embeddings(&chunks, &embeddings, 1).unwrap();
        store.upsert_chunks(&points).await.unwrap();

        store.delete_document_chunks(doc).await.unwrap();

        let matches = store.search(&[0.0], 10, None).await.unwrap();
        assert!(matches.iter().all(|m| m.document_id != doc));
    }

    #[tokio::test]
    async fn reupsert_replaces_rather_than_duplicates() {
        let store = FakeVectorStore::new();
        let doc = Uuid::new_v4();
        let chunks = chunk_document(doc, "hello world", ChunkParams::default());
        let embeddings = vec![vec![0.1]; chunks.len()];
        let points_v1 = pair_chunks_with_embeddings(&chunks, &embeddings, 1).unwrap();
        store.upsert_chunks(&points_v1).await.unwrap();
        let points_v2 = pair_chunks_with_embeddings(&chunks, &embeddings, 2).unwrap();
        store.upsert_chunks(&points_v2).await.unwrap();

        assert_eq!(store.points().len(), chunks.len());
        assert!(store.points().iter().all(|p| p.version == 2));
    }
}
