//! # Event consumer loop
//!
//! Drives [`crate::event_processor::EventProcessor`] from the event bus.
//! Per-partition ordering comes for free from running a single
//! `StreamConsumer` drained sequentially on one task; failures are routed
//! to the dead-letter sink rather than killing the loop.

use std::sync::Arc;

use futures::StreamExt;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message};
use serde_json::Value;
use tracing::{error, warn};

use crate::dlq::DlqSink;
use crate::event_processor::EventProcessor;

/// Builds a [`StreamConsumer`] subscribed to `topic` in the fixed
/// `update-service` consumer group, with auto-commit enabled.
pub fn build_consumer(
    bootstrap_servers: &str,
    topic: &str,
) -> Result<StreamConsumer, rdkafka::error::KafkaError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("group.id", "update-service")
        .set("enable.auto.commit", "true")
        .set("auto.offset.reset", "earliest")
        .create()?;
    consumer.subscribe(&[topic])?;
    Ok(consumer)
}

/// Drive `processor` from `consumer` until the stream ends (it does not,
/// in production — this returns only on a fatal consumer-level error).
pub async fn run(
    consumer: StreamConsumer,
    processor: Arc<EventProcessor>,
    dlq: Arc<dyn DlqSink>,
    topic: String,
) {
    let mut stream = consumer.stream();
    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(err) => {
                error!(error = %err, "kafka stream error");
                continue;
            }
        };

        let Some(payload) = message.payload() else {
            warn!("skipping message with empty payload");
            continue;
        };

        let value: Value = match serde_json::from_slice(payload) {
            Ok(v) => v,
            Err(err) => {
                warn!(error = %err, "skipping message with unparsable json payload");
                continue;
            }
        };

        let unwrapped = unwrap_envelope(value);
        if !unwrapped.is_object() {
            warn!("skipping message whose payload is not a json object");
            continue;
        }

        if let Err(err) = processor.process_event(&unwrapped).await {
            let error_message = err.to_string();
            if let Err(dlq_err) = dlq
                .send_failed_event(
                    &unwrapped,
                    error_message,
                    &topic,
                    message.offset(),
                    message.partition(),
                )
                .await
            {
                error!(error = %dlq_err, "dead-letter send itself failed, dropping event");
            }
        }
    }
}

/// Cheap connectivity probe for `/health` and `/ready`: open a consumer
/// against `bootstrap_servers`, confirm it can reach the cluster, then
/// drop it. Mirrors `build_consumer` but subscribes to nothing and is
/// never streamed from.
pub async fn check_event_bus(bootstrap_servers: &str) -> Result<(), rdkafka::error::KafkaError> {
    let consumer: StreamConsumer = ClientConfig::new()
        .set("bootstrap.servers", bootstrap_servers)
        .set("group.id", "update-service-healthcheck")
        .set("enable.auto.commit", "false")
        .create()?;
    consumer
        .fetch_metadata(None, std::time::Duration::from_secs(5))
        .map(|_| ())
}

/// Unwrap a Debezium-connector-style `{"payload": {...}}` envelope; pass
/// through unchanged otherwise.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut obj) if obj.contains_key("payload") => {
            obj.remove("payload").unwrap_or(Value::Null)
        }
        other => other,
    }
}
