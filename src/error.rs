//! # Error Taxonomy
//!
//! One `thiserror` enum per external collaborator, plus a top-level
//! [`AppError`] that the HTTP layer converts into a response. Each
//! collaborator error converts into `AppError` via `#[from]`, so call
//! sites can use `?` across module boundaries without manual mapping.

use thiserror::Error;

/// Errors raised by the vector store client.
#[derive(Error, Debug)]
pub enum VectorDBError {
    /// The chunk and embedding vectors passed to an upsert had different lengths.
    #[error("chunk/embedding length mismatch: {chunks} chunks vs {embeddings} embeddings")]
    LengthMismatch { chunks: usize, embeddings: usize },

    /// The backend rejected the request or was unreachable.
    #[error("vector store request failed: {0}")]
    Request(String),

    /// The response body could not be decoded.
    #[error("vector store response decode error: {0}")]
    Decode(String),
}

/// Errors raised by the embedding client.
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("embedding request failed: {0}")]
    Request(String),

    #[error("embedding provider returned no vectors")]
    Empty,
}

/// Errors raised by the LLM client.
#[derive(Error, Debug)]
pub enum LLMError {
    #[error("llm request failed: {0}")]
    Request(String),

    /// The model's response was empty, non-JSON, or did not match the expected schema.
    /// `raw` is truncated to 200 characters to keep logs bounded.
    #[error("llm returned an unparsable response: {raw}")]
    Parse { raw: String },
}

/// Errors raised by the cache.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache write failed: {0}")]
    Write(String),

    #[error("cache serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Errors raised by the event bus client (consumer or producer side).
#[derive(Error, Debug)]
pub enum KafkaError {
    #[error("kafka error: {0}")]
    Client(String),
}

/// Errors raised by the dead-letter sink.
#[derive(Error, Debug)]
pub enum DLQError {
    #[error("dead-letter send failed: {0}")]
    Send(String),
}

/// Errors raised by the relational store.
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("database query failed: {0}")]
    Query(#[from] sqlx::Error),

    #[error("document not found: {0}")]
    NotFound(uuid::Uuid),

    #[error("update requires at least one of title or content")]
    EmptyUpdate,
}

/// Unified application error, the HTTP boundary's currency.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    VectorDB(#[from] VectorDBError),

    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    #[error(transparent)]
    Llm(#[from] LLMError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Kafka(#[from] KafkaError),

    #[error(transparent)]
    Dlq(#[from] DLQError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("{0}")]
    BadRequest(String),

    /// A `/query` failure, rendered with the literal "Query failed: "
    /// prefix the HTTP boundary requires for this endpoint.
    #[error("Query failed: {0}")]
    QueryFailed(Box<AppError>),
}
