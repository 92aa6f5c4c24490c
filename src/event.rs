//! # CDC event normalization
//!
//! Converts the dynamic wire payload — Debezium-shaped or flattened, with
//! `__`-prefixed metadata keys — into [`DocumentChange`], a sum type. The
//! rest of the update pipeline matches on this enum instead of probing a
//! `serde_json::Value` map at every step.

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A CDC event, normalized into the shape the event processor dispatches on.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentChange {
    Create {
        id: Uuid,
        content: String,
        version: i64,
    },
    Update {
        id: Uuid,
        content: String,
        version: i64,
    },
    Delete {
        document_id: Uuid,
    },
    /// The event carried no actionable document fields, or its `op` was
    /// unrecognized; it should be logged and dropped.
    Dropped { reason: &'static str },
}

/// Parse a raw CDC payload (already unwrapped from any `payload` envelope)
/// into a [`DocumentChange`]. Never fails: malformed events become
/// `Dropped` with a reason rather than propagating an error, matching the
/// "warn and drop" policy for unparseable events.
pub fn parse_event(raw: &Value) -> (DocumentChange, DateTime<Utc>) {
    let Some(obj) = raw.as_object() else {
        return (
            DocumentChange::Dropped {
                reason: "not a json object",
            },
            Utc::now(),
        );
    };

    let deleted = obj
        .get("__deleted")
        .and_then(Value::as_str)
        .map(|v| v == "true")
        .unwrap_or(false);

    let mut op = obj
        .get("__op")
        .and_then(Value::as_str)
        .or_else(|| obj.get("op").and_then(Value::as_str))
        .unwrap_or("c")
        .to_string();
    if deleted {
        op = "d".to_string();
    }

    let ts_ms = obj
        .get("__source_ts_ms")
        .and_then(Value::as_i64)
        .or_else(|| obj.get("ts_ms").and_then(Value::as_i64));
    let ts = ts_ms
        .and_then(|ms| DateTime::<Utc>::from_timestamp_millis(ms))
        .unwrap_or_else(Utc::now);

    let filtered: serde_json::Map<String, Value> = obj
        .iter()
        .filter(|(k, _)| !k.starts_with("__"))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    if filtered.is_empty() {
        return (
            DocumentChange::Dropped {
                reason: "no document fields present",
            },
            ts,
        );
    }

    let side = Value::Object(filtered);

    let change = match op.as_str() {
        "d" => match side_field_uuid(&side, "id") {
            Some(document_id) => DocumentChange::Delete { document_id },
            None => DocumentChange::Dropped {
                reason: "delete event missing id",
            },
        },
        "c" | "u" => {
            let Some(id) = side_field_uuid(&side, "id") else {
                return (
                    DocumentChange::Dropped {
                        reason: "create/update event missing id",
                    },
                    ts,
                );
            };
            let content = side
                .get("content")
                .and_then(Value::as_str)
                .unwrap_or("")
                .to_string();
            if content.is_empty() {
                return (
                    DocumentChange::Dropped {
                        reason: "create/update event missing content",
                    },
                    ts,
                );
            }
            let version = side.get("version").and_then(Value::as_i64).unwrap_or(1);
            if op == "c" {
                DocumentChange::Create { id, content, version }
            } else {
                DocumentChange::Update { id, content, version }
            }
        }
        _ => DocumentChange::Dropped {
            reason: "unrecognized op",
        },
    };

    (change, ts)
}

fn side_field_uuid(side: &Value, field: &str) -> Option<Uuid> {
    side.get(field)
        .and_then(Value::as_str)
        .and_then(|s| Uuid::parse_str(s).ok())
}
