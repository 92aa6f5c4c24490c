//! End-to-end scenarios for the update and query pipelines, driven
//! against the in-crate fakes for the vector store, embedder, LLM, and
//! cache rather than live infrastructure.

use std::sync::Arc;
use std::time::Duration;

use ragsync::cache::fake::FakeCache;
use ragsync::chunking::ChunkParams;
use ragsync::embedding::fake::FakeEmbedder;
use ragsync::event_processor::EventProcessor;
use ragsync::llm::fake::FakeLlmClient;
use ragsync::llm::StructuredAnswer;
use ragsync::query_processor::{QueryProcessor, QueryRequest};
use ragsync::retry::RetryPolicy;
use ragsync::vector_store::fake::FakeVectorStore;
use serde_json::json;
use uuid::Uuid;

fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 2,
        initial_delay: Duration::from_millis(0),
        multiplier: 1.0,
    }
}

#[tokio::test]
async fn create_then_query_finds_the_document() {
    let vector_store = FakeVectorStore::new();
    let cache = FakeCache::new();
    let processor = EventProcessor::new(
        Arc::new(vector_store.clone()),
        Arc::new(FakeEmbedder::default()),
        Arc::new(cache.clone()),
        ChunkParams::default(),
        fast_retry(),
    );

    let document_id = Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap();
    let create_event = json!({
        "op": "c",
        "id": document_id.to_string(),
        "content": "RAG stands for Retrieval-Augmented Generation.",
        "version": 1,
    });
    processor.process_event(&create_event).await.unwrap();

    let points = vector_store.points();
    assert_eq!(points.len(), 1);
    let expected_chunk_id = ragsync::chunking::chunk_id(document_id, 0);
    assert_eq!(points[0].id, expected_chunk_id);
    assert_eq!(points[0].version, 1);

    let llm = FakeLlmClient::with_answer(StructuredAnswer {
        answer: "RAG combines retrieval with generation.".to_string(),
        confidence: 0.8,
        citations: vec![document_id.to_string()],
        is_complete: true,
    });
    let query_processor = QueryProcessor::new(
        Arc::new(vector_store),
        Arc::new(FakeEmbedder::default()),
        Arc::new(llm),
        Arc::new(cache),
        Duration::from_secs(3600),
    );

    let response = query_processor
        .process_query(&QueryRequest {
            query: "What is RAG?".to_string(),
            top_k: 5,
            page: 1,
            page_size: 10,
        })
        .await
        .unwrap();

    assert_eq!(response.sources.len(), 1);
    assert_eq!(response.sources[0].document_id, document_id);
    assert!((0.0..=1.0).contains(&response.confidence));
}

#[tokio::test]
async fn update_bumps_version_without_duplicating_points() {
    let vector_store = FakeVectorStore::new();
    let processor = EventProcessor::new(
        Arc::new(vector_store.clone()),
        Arc::new(FakeEmbedder::default()),
        Arc::new(FakeCache::new()),
        ChunkParams::default(),
        fast_retry(),
    );

    let document_id = Uuid::new_v4();
    processor
        .process_event(&json!({
            "op": "c", "id": document_id.to_string(), "content": "first revision", "version": 1,
        }))
        .await
        .unwrap();
    processor
        .process_event(&json!({
            "op": "u", "id": document_id.to_string(), "content": "second revision", "version": 2,
        }))
        .await
        .unwrap();

    let points = vector_store.points();
    assert_eq!(points.len(), 1);
    assert_eq!(points[0].version, 2);
}

#[tokio::test]
async fn delete_purges_the_document_from_search_results() {
    let vector_store = FakeVectorStore::new();
    let processor = EventProcessor::new(
        Arc::new(vector_store.clone()),
        Arc::new(FakeEmbedder::default()),
        Arc::new(FakeCache::new()),
        ChunkParams::default(),
        fast_retry(),
    );

    let document_id = Uuid::new_v4();
    processor
        .process_event(&json!({
            "op": "c", "id": document_id.to_string(), "content": "ephemeral", "version": 1,
        }))
        .await
        .unwrap();
    processor
        .process_event(&json!({ "op": "d", "id": document_id.to_string() }))
        .await
        .unwrap();

    let matches = vector_store.search(&[0.0], 10, None).await.unwrap();
    assert!(matches.iter().all(|m| m.document_id != document_id));
}

#[tokio::test]
async fn poison_event_with_exhausted_embedding_retries_surfaces_an_error() {
    let processor = EventProcessor::new(
        Arc::new(FakeVectorStore::new()),
        Arc::new(FakeEmbedder { fail: true }),
        Arc::new(FakeCache::new()),
        ChunkParams::default(),
        fast_retry(),
    );

    let document_id = Uuid::new_v4();
    let event = json!({
        "op": "c", "id": document_id.to_string(), "content": "will never embed", "version": 1,
    });
    let result = processor.process_event(&event).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn event_missing_after_id_is_dropped_silently() {
    let processor = EventProcessor::new(
        Arc::new(FakeVectorStore::new()),
        Arc::new(FakeEmbedder::default()),
        Arc::new(FakeCache::new()),
        ChunkParams::default(),
        fast_retry(),
    );

    let event = json!({ "op": "c", "content": "no id field present" });
    processor.process_event(&event).await.unwrap();
}
