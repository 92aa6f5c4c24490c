//! # Cache
//!
//! A small key-value cache abstraction with one deliberate asymmetry:
//! reads fail open (any backend error is treated as a miss), writes fail
//! closed (an explicit `set`/`set_json` surfaces its error). This keeps
//! the query path available under cache degradation while still letting
//! callers detect misconfiguration when they ask to write. `delete` is
//! always best-effort, matching its use as a fire-and-forget invalidation
//! hint.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::CacheError;

/// Cache contract implemented by the Redis-backed client and by fakes in
/// tests for [`crate::query_processor`] and [`crate::event_processor`].
/// Kept to plain string operations so `Arc<dyn Cache>` stays object-safe;
/// the JSON convenience wrappers below take `&dyn Cache` instead of living
/// on the trait.
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError>;
    async fn delete(&self, key: &str);
}

/// Fetch and deserialize a JSON value, treating a malformed cached value
/// the same as a miss.
pub async fn get_json<T: DeserializeOwned>(cache: &dyn Cache, key: &str) -> Option<T> {
    let raw = cache.get(key).await?;
    match serde_json::from_str(&raw) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(key, error = %err, "discarding malformed cached value");
            None
        }
    }
}

/// Serialize and store a JSON value, surfacing serialization or write errors.
pub async fn set_json<T: Serialize + Sync>(
    cache: &dyn Cache,
    key: &str,
    value: &T,
    ttl: Duration,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    cache.set(key, &raw, ttl).await
}

/// Redis-backed [`Cache`] implementation using a connection-managed client
/// that transparently reconnects, matching the teacher's pooled-connection
/// convention in `database::connection_pool`.
#[derive(Clone)]
pub struct RedisCache {
    manager: ConnectionManager,
}

impl RedisCache {
    /// Connect to `url`, applying a 5 second connect timeout.
    pub async fn connect(url: &str) -> Result<Self, CacheError> {
        let client =
            redis::Client::open(url).map_err(|e| CacheError::Write(e.to_string()))?;
        let manager = tokio::time::timeout(
            Duration::from_secs(5),
            ConnectionManager::new(client),
        )
        .await
        .map_err(|_| CacheError::Write("redis connect timed out".to_string()))?
        .map_err(|e| CacheError::Write(e.to_string()))?;
        Ok(Self { manager })
    }
}

#[async_trait]
impl Cache for RedisCache {
    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.manager.clone();
        match conn.get::<_, Option<String>>(key).await {
            Ok(value) => value,
            Err(err) => {
                warn!(key, error = %err, "cache read failed, treating as miss");
                None
            }
        }
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), CacheError> {
        let mut conn = self.manager.clone();
        conn.set_ex::<_, _, ()>(key, value, ttl.as_secs().max(1))
            .await
            .map_err(|e| CacheError::Write(e.to_string()))
    }

    async fn delete(&self, key: &str) {
        let mut conn = self.manager.clone();
        if let Err(err) = conn.del::<_, ()>(key).await {
            warn!(key, error = %err, "best-effort cache delete failed");
        }
    }
}

/// The fixed prefix for cached query responses:
/// `query_response:v2:{top_k}:{md5(query)}`. `top_k` is folded into the
/// key (rather than just the query text) so that two requests for the
/// same question at different result counts don't collide on one
/// cached answer.
pub fn query_response_key(query: &str, top_k: usize) -> String {
    let digest = md5::compute(query.as_bytes());
    format!("query_response:v2:{top_k}:{digest:x}")
}

/// The key the update pipeline invalidates on every successful create/update.
/// Kept intentionally distinct from [`query_response_key`] — see Open
/// Questions in the design notes: this invalidation does not currently
/// reach cached query responses, which expire by TTL only.
pub fn document_invalidation_key(document_id: &uuid::Uuid) -> String {
    format!("query:{document_id}")
}

#[cfg(any(test, feature = "test-support"))]
pub mod fake {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::Arc;

    /// In-memory [`Cache`] for tests, with an optional injected write failure.
    #[derive(Clone, Default)]
    pub struct FakeCache {
        store: Arc<Mutex<HashMap<String, String>>>,
        fail_writes: Arc<Mutex<bool>>,
    }

    impl FakeCache {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_fail_writes(&self, fail: bool) {
            *self.fail_writes.lock() = fail;
        }

        pub fn contains(&self, key: &str) -> bool {
            self.store.lock().contains_key(key)
        }
    }

    #[async_trait]
    impl Cache for FakeCache {
        async fn get(&self, key: &str) -> Option<String> {
            self.store.lock().get(key).cloned()
        }

        async fn set(&self, key: &str, value: &str, _ttl: Duration) -> Result<(), CacheError> {
            if *self.fail_writes.lock() {
                return Err(CacheError::Write("injected failure".to_string()));
            }
            self.store.lock().insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) {
            self.store.lock().remove(key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeCache;
    use super::*;

    #[tokio::test]
    async fn round_trips_json() {
        let cache = FakeCache::new();
        set_json(&cache, "k", &vec![1, 2, 3], Duration::from_secs(60))
            .await
            .unwrap();
        let got: Option<Vec<i32>> = get_json(&cache, "k").await;
        assert_eq!(got, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn malformed_json_is_treated_as_miss() {
        let cache = FakeCache::new();
        cache
            .set("k", "not json", Duration::from_secs(60))
            .await
            .unwrap();
        let got: Option<Vec<i32>> = get_json(&cache, "k").await;
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn write_failure_surfaces() {
        let cache = FakeCache::new();
        cache.set_fail_writes(true);
        let result = cache.set("k", "v", Duration::from_secs(60)).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn delete_is_best_effort_and_never_fails_the_caller() {
        let cache = FakeCache::new();
        cache.delete("missing-key").await;
    }

    #[test]
    fn query_response_key_is_stable_for_same_query_and_top_k() {
        assert_eq!(query_response_key("hello", 5), query_response_key("hello", 5));
        assert_ne!(query_response_key("hello", 5), query_response_key("world", 5));
        assert_ne!(query_response_key("hello", 5), query_response_key("hello", 10));
        assert!(query_response_key("hello", 5).starts_with("query_response:v2:"));
    }
}
