//! Key-value store used by the candidate cache and the generator guard.
//!
//! Two backends implement [`KvStore`]: [`RedisStore`] (shared across
//! processes) and [`MemoryStore`] (in-process). [`connect_store`] picks one.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub mod memory;
pub mod redis_store;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("store operation '{op}' timed out after {timeout_ms}ms")]
    Timeout { op: &'static str, timeout_ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Atomically set `key` only when it does not exist. Returns whether the
    /// value was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool>;

    /// Delete `key` only when it currently holds `expected`.
    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool>;

    fn backend_name(&self) -> &'static str;
}

/// Connect to Redis when a URL is given, otherwise (or on failure) use the
/// in-process store.
pub async fn connect_store(redis_url: Option<&str>, op_timeout: Duration) -> Arc<dyn KvStore> {
    let Some(url) = redis_url.filter(|u| !u.trim().is_empty()) else {
        info!("No REDIS_URL configured, using in-process store");
        return Arc::new(MemoryStore::new());
    };

    match RedisStore::connect(url, op_timeout).await {
        Ok(store) => {
            info!("Connected to Redis store");
            Arc::new(store)
        }
        Err(e) => {
            warn!("Redis store unavailable ({}), using in-process store", e);
            Arc::new(MemoryStore::new())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_store_without_url_is_memory() {
        let store = connect_store(None, Duration::from_millis(100)).await;
        assert_eq!(store.backend_name(), "memory");
        let store = connect_store(Some("  "), Duration::from_millis(100)).await;
        assert_eq!(store.backend_name(), "memory");
    }

    #[tokio::test]
    async fn test_connect_store_with_bad_url_falls_back() {
        let store = connect_store(Some("not-a-redis-url"), Duration::from_millis(100)).await;
        assert_eq!(store.backend_name(), "memory");
    }
}
