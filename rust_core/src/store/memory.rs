use async_trait::async_trait;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::time::Duration;
use tokio::time::Instant;

use super::{KvStore, StoreResult};

struct Entry {
    value: String,
    expires_at: Instant,
}

/// In-process store with per-key expiry on the tokio clock.
///
/// Expired entries are dropped when touched and swept on every write.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<FxHashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live (unexpired) entry count.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

}

fn purge_expired(entries: &mut FxHashMap<String, Entry>, now: Instant) {
    entries.retain(|_, e| e.expires_at > now);
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        match entries.get(key) {
            Some(e) if e.expires_at > now => Ok(Some(e.value.clone())),
            Some(_) => {
                entries.remove(key);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn set_with_ttl(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, now);
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        purge_expired(&mut entries, now);
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(true)
    }

    async fn delete_if_equals(&self, key: &str, expected: &str) -> StoreResult<bool> {
        let now = Instant::now();
        let mut entries = self.entries.lock();
        let matches = entries
            .get(key)
            .map(|e| e.expires_at > now && e.value == expected)
            .unwrap_or(false);
        if matches {
            entries.remove(key);
        }
        Ok(matches)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
