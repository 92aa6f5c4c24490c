//! # ragsync
//!
//! CDC-driven vector index synchronization and retrieval-augmented query
//! service, split across two binaries that share this library:
//!
//! - `update-service` consumes change-data-capture events and keeps a
//!   vector index consistent with the `documents` relational table.
//! - `query-service` answers natural-language questions against that
//!   index using an LLM, with confidence-gated citations.
//!
//! ## Architecture
//!
//! Both binaries connect the same set of dependencies (vector store,
//! cache, relational store, event bus) through [`state::Services`], a
//! single explicit struct rather than a process-wide singleton, and wire
//! them behind an `axum` router. The core logic of each pipeline lives in
//! [`event_processor`] and [`query_processor`] respectively and is
//! exercised directly in tests against fake trait implementations, with
//! no network required.
//!
//! ## Example Usage
//!
//! ```no_run
//! use ragsync::config::Config;
//! use ragsync::state::Services;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env()?;
//!     let services = Services::connect(&config).await?;
//!     services.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod batch;
pub mod cache;
pub mod chunking;
pub mod config;
pub mod consumer;
pub mod dlq;
pub mod documents;
pub mod embedding;
pub mod error;
pub mod event;
pub mod event_processor;
pub mod health;
pub mod http;
pub mod llm;
pub mod metrics;
pub mod query_processor;
pub mod retry;
pub mod state;
pub mod vector_store;

/// Crate version, surfaced in the startup banner and `/health` responses.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Crate name, surfaced in the startup banner.
pub const NAME: &str = env!("CARGO_PKG_NAME");
