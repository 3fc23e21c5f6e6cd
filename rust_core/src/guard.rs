//! Admission gate for expensive parlay generation.
//!
//! A resource key owns `max_concurrent` slots (`{namespace}:{key}:slot:{i}`).
//! A lease claims a free slot with set-if-absent plus expiry, so a crashed
//! holder frees its slot after the TTL. Release is compare-and-delete on the
//! lease token. When the shared store errors, the guard falls back to an
//! in-process store with the same slot layout.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{ParlayError, ParlayResult};
use crate::store::{KvStore, MemoryStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    pub namespace: String,
    pub max_concurrent: usize,
    pub lease_ttl: Duration,
    pub acquire_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            namespace: "parlay:guard".to_string(),
            max_concurrent: 4,
            lease_ttl: Duration::from_secs(120),
            acquire_timeout: Duration::from_secs(5),
            poll_interval: Duration::from_millis(100),
        }
    }
}

/// Ephemeral admission ticket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratorLease {
    pub resource_key: String,
    pub token: String,
    pub ttl: Duration,
    pub slot: usize,
    pub backend: &'static str,
}

pub struct GeneratorGuard {
    primary: Arc<dyn KvStore>,
    local: MemoryStore,
    config: GuardConfig,
}

impl GeneratorGuard {
    pub fn new(primary: Arc<dyn KvStore>, config: GuardConfig) -> Self {
        Self {
            primary,
            local: MemoryStore::new(),
            config,
        }
    }

    pub fn config(&self) -> &GuardConfig {
        &self.config
    }

    fn slot_key(&self, key: &str, slot: usize) -> String {
        format!("{}:{}:slot:{}", self.config.namespace, key, slot)
    }

    /// Claim a free slot, or `None` when all slots are taken.
    pub async fn try_acquire(&self, key: &str, ttl: Duration) -> Option<GeneratorLease> {
        let token = Uuid::new_v4().to_string();

        for slot in 0..self.config.max_concurrent {
            let slot_key = self.slot_key(key, slot);
            match self.primary.set_if_absent(&slot_key, &token, ttl).await {
                Ok(true) => {
                    return Some(self.lease(key, token, ttl, slot, self.primary.backend_name()));
                }
                Ok(false) => continue,
                Err(e) => {
                    warn!(
                        "Guard store {} failed for '{}' ({}), using local slots",
                        self.primary.backend_name(),
                        key,
                        e
                    );
                    return self.try_acquire_local(key, token, ttl).await;
                }
            }
        }

        debug!("All {} slots taken for '{}'", self.config.max_concurrent, key);
        None
    }

    async fn try_acquire_local(&self, key: &str, token: String, ttl: Duration) -> Option<GeneratorLease> {
        for slot in 0..self.config.max_concurrent {
            let slot_key = self.slot_key(key, slot);
            if let Ok(true) = self.local.set_if_absent(&slot_key, &token, ttl).await {
                return Some(self.lease(key, token, ttl, slot, self.local.backend_name()));
            }
        }
        None
    }

    fn lease(&self, key: &str, token: String, ttl: Duration, slot: usize, backend: &'static str) -> GeneratorLease {
        GeneratorLease {
            resource_key: key.to_string(),
            token,
            ttl,
            slot,
            backend,
        }
    }

    /// Poll for a slot until `timeout`, then fail with a retryable `Busy`.
    pub async fn acquire(&self, key: &str, ttl: Duration, timeout: Duration) -> ParlayResult<GeneratorLease> {
        let started = Instant::now();
        loop {
            if let Some(lease) = self.try_acquire(key, ttl).await {
                return Ok(lease);
            }
            let waited = started.elapsed();
            if waited >= timeout {
                return Err(ParlayError::Busy {
                    resource: key.to_string(),
                    waited_ms: waited.as_millis() as u64,
                });
            }
            let remaining = timeout - waited;
            tokio::time::sleep(self.config.poll_interval.min(remaining)).await;
        }
    }

    /// Release the slot holding `token`. Unknown or already released tokens
    /// are a no-op; returns whether a slot was freed.
    pub async fn release(&self, key: &str, token: &str) -> bool {
        for slot in 0..self.config.max_concurrent {
            let slot_key = self.slot_key(key, slot);
            match self.primary.delete_if_equals(&slot_key, token).await {
                Ok(true) => return true,
                Ok(false) => {}
                Err(e) => {
                    warn!(
                        "Guard store {} failed releasing '{}' ({}), checking local slots",
                        self.primary.backend_name(),
                        key,
                        e
                    );
                    break;
                }
            }
        }

        for slot in 0..self.config.max_concurrent {
            let slot_key = self.slot_key(key, slot);
            if let Ok(true) = self.local.delete_if_equals(&slot_key, token).await {
                return true;
            }
        }
        false
    }

    /// Run `work` while holding a lease with the configured TTL and acquire
    /// timeout. The lease is released whether `work` succeeds or fails.
    pub async fn run<T, F>(&self, key: &str, work: F) -> ParlayResult<T>
    where
        F: Future<Output = ParlayResult<T>>,
    {
        let lease = self
            .acquire(key, self.config.lease_ttl, self.config.acquire_timeout)
            .await?;
        let result = work.await;
        self.release(&lease.resource_key, &lease.token).await;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{StoreError, StoreResult};
    use async_trait::async_trait;

    struct DownStore;

    #[async_trait]
    impl KvStore for DownStore {
        async fn get(&self, _key: &str) -> StoreResult<Option<String>> {
            Err(StoreError::Timeout { op: "get", timeout_ms: 1 })
        }
        async fn set_with_ttl(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<()> {
            Err(StoreError::Timeout { op: "set", timeout_ms: 1 })
        }
        async fn set_if_absent(&self, _key: &str, _value: &str, _ttl: Duration) -> StoreResult<bool> {
            Err(StoreError::Timeout { op: "set_nx", timeout_ms: 1 })
        }
        async fn delete_if_equals(&self, _key: &str, _expected: &str) -> StoreResult<bool> {
            Err(StoreError::Timeout { op: "compare_and_delete", timeout_ms: 1 })
        }
        fn backend_name(&self) -> &'static str {
            "down"
        }
    }

    fn guard(primary: Arc<dyn KvStore>, max: usize) -> GeneratorGuard {
        GeneratorGuard::new(
            primary,
            GuardConfig {
                max_concurrent: max,
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn test_capacity_and_single_release() {
        let guard = guard(Arc::new(MemoryStore::new()), 3);
        let ttl = Duration::from_secs(60);

        let mut leases = Vec::new();
        for _ in 0..3 {
            leases.push(guard.try_acquire("gen", ttl).await.unwrap());
        }
        assert!(guard.try_acquire("gen", ttl).await.is_none());

        assert!(guard.release("gen", &leases[1].token).await);
        assert!(guard.try_acquire("gen", ttl).await.is_some());
        assert!(guard.try_acquire("gen", ttl).await.is_none());
    }

    #[tokio::test]
    async fn test_release_unknown_token_is_noop() {
        let guard = guard(Arc::new(MemoryStore::new()), 1);
        let lease = guard.try_acquire("gen", Duration::from_secs(60)).await.unwrap();
        assert!(!guard.release("gen", "not-a-token").await);
        assert!(guard.release("gen", &lease.token).await);
        assert!(!guard.release("gen", &lease.token).await);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let guard = guard(Arc::new(MemoryStore::new()), 1);
        let ttl = Duration::from_secs(60);
        assert!(guard.try_acquire("a", ttl).await.is_some());
        assert!(guard.try_acquire("b", ttl).await.is_some());
        assert!(guard.try_acquire("a", ttl).await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lease_expires_after_ttl() {
        let guard = guard(Arc::new(MemoryStore::new()), 1);
        assert!(guard.try_acquire("gen", Duration::from_secs(10)).await.is_some());
        assert!(guard.try_acquire("gen", Duration::from_secs(10)).await.is_none());
        tokio::time::advance(Duration::from_secs(11)).await;
        assert!(guard.try_acquire("gen", Duration::from_secs(10)).await.is_some());
    }

    #[tokio::test]
    async fn test_store_failure_falls_back_to_local_slots() {
        let guard = guard(Arc::new(DownStore), 2);
        let ttl = Duration::from_secs(60);
        let first = guard.try_acquire("gen", ttl).await.unwrap();
        assert_eq!(first.backend, "memory");
        assert!(guard.try_acquire("gen", ttl).await.is_some());
        assert!(guard.try_acquire("gen", ttl).await.is_none());
        assert!(guard.release("gen", &first.token).await);
        assert!(guard.try_acquire("gen", ttl).await.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_times_out_with_busy() {
        let guard = guard(Arc::new(MemoryStore::new()), 1);
        let ttl = Duration::from_secs(60);
        let _held = guard.try_acquire("gen", ttl).await.unwrap();

        let err = guard
            .acquire("gen", ttl, Duration::from_millis(500))
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_run_releases_on_error() {
        let guard = guard(Arc::new(MemoryStore::new()), 1);
        let result: ParlayResult<()> = guard
            .run("gen", async { Err(ParlayError::EmptyParlay) })
            .await;
        assert!(result.is_err());
        assert!(guard.try_acquire("gen", Duration::from_secs(60)).await.is_some());
    }
}
