//! # Dead-letter sink
//!
//! Appends poison events to a secondary topic so the consumer loop can
//! keep making progress instead of blocking on a single bad message.
//! Errors raised here are logged by the caller, never retried in-band.

use async_trait::async_trait;
use chrono::Utc;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::ClientConfig;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;

use crate::error::DLQError;

/// Envelope written to the dead-letter topic.
#[derive(Debug, Serialize)]
pub struct DeadLetter<'a> {
    pub original_event: &'a Value,
    pub error: String,
    pub original_topic: String,
    pub offset: i64,
    pub partition: i32,
    pub timestamp: chrono::DateTime<Utc>,
}

/// Dead-letter contract. [`NoopDlqSink`] satisfies it when the DLQ is
/// disabled by configuration.
#[async_trait]
pub trait DlqSink: Send + Sync {
    async fn send_failed_event(
        &self,
        original_event: &Value,
        error: String,
        original_topic: &str,
        offset: i64,
        partition: i32,
    ) -> Result<(), DLQError>;
}

/// Kafka-backed [`DlqSink`].
pub struct KafkaDlqSink {
    producer: FutureProducer,
    topic: String,
}

impl KafkaDlqSink {
    pub fn new(bootstrap_servers: &str, topic: impl Into<String>) -> Result<Self, DLQError> {
        let producer = ClientConfig::new()
            .set("bootstrap.servers", bootstrap_servers)
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|e| DLQError::Send(e.to_string()))?;
        Ok(Self {
            producer,
            topic: topic.into(),
        })
    }
}

#[async_trait]
impl DlqSink for KafkaDlqSink {
    async fn send_failed_event(
        &self,
        original_event: &Value,
        error: String,
        original_topic: &str,
        offset: i64,
        partition: i32,
    ) -> Result<(), DLQError> {
        let envelope = DeadLetter {
            original_event,
            error,
            original_topic: original_topic.to_string(),
            offset,
            partition,
            timestamp: Utc::now(),
        };
        let payload = serde_json::to_vec(&envelope).map_err(|e| DLQError::Send(e.to_string()))?;

        self.producer
            .send(
                FutureRecord::<(), _>::to(&self.topic).payload(&payload),
                Duration::from_secs(5),
            )
            .await
            .map_err(|(e, _)| DLQError::Send(e.to_string()))?;
        Ok(())
    }
}

/// No-op [`DlqSink`] used when `DLQ_ENABLED=false`.
#[derive(Default)]
pub struct NoopDlqSink;

#[async_trait]
impl DlqSink for NoopDlqSink {
    async fn send_failed_event(
        &self,
        _original_event: &Value,
        _error: String,
        _original_topic: &str,
        _offset: i64,
        _partition: i32,
    ) -> Result<(), DLQError> {
        Ok(())
    }
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Records every send for assertion in consumer/event-processor tests.
    #[derive(Clone, Default)]
    pub struct FakeDlqSink {
        pub sent: Arc<Mutex<Vec<(Value, String)>>>,
    }

    impl FakeDlqSink {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn count(&self) -> usize {
            self.sent.lock().len()
        }
    }

    #[async_trait]
    impl DlqSink for FakeDlqSink {
        async fn send_failed_event(
            &self,
            original_event: &Value,
            error: String,
            _original_topic: &str,
            _offset: i64,
            _partition: i32,
        ) -> Result<(), DLQError> {
            self.sent.lock().push((original_event.clone(), error));
            Ok(())
        }
    }
}
