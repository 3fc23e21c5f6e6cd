use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::models::{CandidateLeg, Sport};
use crate::store::{KvStore, MemoryStore, StoreError};

/// Identity of one candidate pool.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// `None` means all sports
    pub sport: Option<Sport>,
    pub date: NaiveDate,
    pub week: Option<u32>,
    pub include_player_props: bool,
}

impl CacheKey {
    pub fn render(&self, namespace: &str) -> String {
        let sport = self.sport.map(|s| s.as_str()).unwrap_or("all");
        let week = self
            .week
            .map(|w| w.to_string())
            .unwrap_or_else(|| "all".to_string());
        format!(
            "{}:{}:{}:{}:props={}",
            namespace, sport, self.date, week, self.include_player_props
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtls {
    /// All-sports queries are the widest and go stale fastest
    pub all_sports: Duration,
    /// Single sport, full week range
    pub week: Duration,
    /// Single sport, rolling window (narrower than a week)
    pub rolling: Duration,
}

impl Default for CacheTtls {
    fn default() -> Self {
        Self {
            all_sports: Duration::from_secs(45),
            week: Duration::from_secs(60),
            rolling: Duration::from_secs(90),
        }
    }
}

impl CacheTtls {
    pub fn ttl_for(&self, key: &CacheKey) -> Duration {
        if key.sport.is_none() {
            self.all_sports
        } else if key.week.is_some() {
            self.week
        } else {
            self.rolling
        }
    }
}

/// Ranked candidate pools, shared through the store with an in-process
/// fallback. Last writer wins.
pub struct CandidateLegCache {
    primary: Arc<dyn KvStore>,
    local: MemoryStore,
    namespace: String,
    ttls: CacheTtls,
}

impl CandidateLegCache {
    pub fn new(primary: Arc<dyn KvStore>, ttls: CacheTtls) -> Self {
        Self {
            primary,
            local: MemoryStore::new(),
            namespace: "parlay:candidates".to_string(),
            ttls,
        }
    }

    pub fn ttls(&self) -> &CacheTtls {
        &self.ttls
    }

    pub async fn get(&self, key: &CacheKey) -> Option<Vec<CandidateLeg>> {
        let rendered = key.render(&self.namespace);
        let raw = match self.primary.get(&rendered).await {
            Ok(raw) => raw,
            Err(e) => {
                warn!("Candidate cache read failed ({}), using local cache", e);
                self.local.get(&rendered).await.ok().flatten()
            }
        }?;

        match serde_json::from_str(&raw) {
            Ok(legs) => Some(legs),
            Err(e) => {
                warn!("Discarding undecodable candidate cache entry {}: {}", rendered, e);
                None
            }
        }
    }

    pub async fn put(&self, key: &CacheKey, legs: &[CandidateLeg]) {
        let rendered = key.render(&self.namespace);
        let ttl = self.ttls.ttl_for(key);
        let payload = match serde_json::to_string(legs) {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Candidate cache write skipped: {}", StoreError::from(e));
                return;
            }
        };

        if let Err(e) = self.primary.set_with_ttl(&rendered, &payload, ttl).await {
            warn!("Candidate cache write failed ({}), using local cache", e);
            if let Err(e) = self.local.set_with_ttl(&rendered, &payload, ttl).await {
                warn!("Local candidate cache write failed: {}", e);
            }
            return;
        }
        debug!("Cached {} candidate legs under {} for {:?}", legs.len(), rendered, ttl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StoreResult;
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

    fn key(sport: Option<Sport>, week: Option<u32>) -> CacheKey {
        CacheKey {
            sport,
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            week,
            include_player_props: false,
        }
    }

    #[test]
    fn test_key_rendering() {
        assert_eq!(
            key(Some(Sport::NFL), Some(7)).render("ns"),
            "ns:NFL:2026-10-19:7:props=false"
        );
        assert_eq!(key(None, None).render("ns"), "ns:all:2026-10-19:all:props=false");
    }

    #[test]
    fn test_wider_queries_get_shorter_ttls() {
        let ttls = CacheTtls::default();
        let all = ttls.ttl_for(&key(None, None));
        let rolling = ttls.ttl_for(&key(Some(Sport::NBA), None));
        let week = ttls.ttl_for(&key(Some(Sport::NFL), Some(3)));
        assert!(all < week && week < rolling);
        assert!(all >= Duration::from_secs(45) && rolling <= Duration::from_secs(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_entries_expire_after_ttl() {
        let cache = CandidateLegCache::new(Arc::new(MemoryStore::new()), CacheTtls::default());
        let k = key(None, None);
        cache.put(&k, &[]).await;
        assert_eq!(cache.get(&k).await, Some(Vec::new()));
        tokio::time::advance(Duration::from_secs(46)).await;
        assert_eq!(cache.get(&k).await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_store_outage_falls_back_to_local_cache() {
        let cache = CandidateLegCache::new(Arc::new(DownStore), CacheTtls::default());
        let k = key(Some(Sport::NFL), Some(3));
        assert_eq!(cache.get(&k).await, None);

        cache.put(&k, &[]).await;
        assert_eq!(cache.get(&k).await, Some(Vec::new()));

        tokio::time::advance(CacheTtls::default().week + Duration::from_secs(1)).await;
        assert_eq!(cache.get(&k).await, None);
    }
}
