use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::{CalibrationMap, CalibrationStore};

struct CachedMap {
    map: Option<Arc<CalibrationMap>>,
    loaded_at: Instant,
}

/// Serves the latest calibration map, reloading it from the store at most
/// once per `cache_ttl`. Only one task reloads at a time; the others keep
/// using the map they already have.
pub struct CalibrationService {
    store: Arc<dyn CalibrationStore>,
    cache_ttl: Duration,
    cached: RwLock<Option<CachedMap>>,
    refresh: Mutex<()>,
}

impl CalibrationService {
    pub fn new(store: Arc<dyn CalibrationStore>, cache_ttl: Duration) -> Self {
        Self {
            store,
            cache_ttl,
            cached: RwLock::new(None),
            refresh: Mutex::new(()),
        }
    }

    fn fresh_map(&self) -> Option<Option<Arc<CalibrationMap>>> {
        let cached = self.cached.read();
        cached
            .as_ref()
            .filter(|c| c.loaded_at.elapsed() < self.cache_ttl)
            .map(|c| c.map.clone())
    }

    fn stale_map(&self) -> Option<Arc<CalibrationMap>> {
        self.cached.read().as_ref().and_then(|c| c.map.clone())
    }

    pub async fn current_map(&self) -> Option<Arc<CalibrationMap>> {
        if let Some(map) = self.fresh_map() {
            return map;
        }

        let Ok(_guard) = self.refresh.try_lock() else {
            debug!("Calibration reload in progress, using cached map");
            return self.stale_map();
        };

        // Another task may have finished a reload while we waited
        if let Some(map) = self.fresh_map() {
            return map;
        }

        let map = match self.store.latest_bins().await {
            Ok(bins) => CalibrationMap::from_bins(&bins).map(Arc::new),
            Err(e) => {
                warn!("Calibration reload failed, keeping previous map: {:#}", e);
                self.stale_map()
            }
        };

        *self.cached.write() = Some(CachedMap {
            map: map.clone(),
            loaded_at: Instant::now(),
        });
        map
    }

    /// Calibrated probability, identity when no map exists.
    pub async fn calibrate(&self, raw_prob: f64) -> f64 {
        let map = self.current_map().await;
        super::calibrate(map.as_deref(), raw_prob)
    }

    /// Replace the cached map, e.g. right after training.
    pub fn install(&self, map: CalibrationMap) {
        *self.cached.write() = Some(CachedMap {
            map: Some(Arc::new(map)),
            loaded_at: Instant::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationBin, CalibrationSample};
    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use chrono::Utc;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::sync::Notify;

    struct CountingStore {
        bins: parking_lot::Mutex<Vec<CalibrationBin>>,
        loads: AtomicUsize,
        fail: AtomicBool,
        hold: AtomicBool,
        release: Notify,
    }

    #[async_trait]
    impl CalibrationStore for CountingStore {
        async fn load_samples(&self) -> Result<Vec<CalibrationSample>> {
            Ok(Vec::new())
        }
        async fn save_bins(&self, bins: &[CalibrationBin]) -> Result<()> {
            *self.bins.lock() = bins.to_vec();
            Ok(())
        }
        async fn latest_bins(&self) -> Result<Vec<CalibrationBin>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if self.hold.load(Ordering::SeqCst) {
                self.release.notified().await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(anyhow!("connection reset"));
            }
            Ok(self.bins.lock().clone())
        }
    }

    fn store(bins: Vec<CalibrationBin>) -> Arc<CountingStore> {
        Arc::new(CountingStore {
            bins: parking_lot::Mutex::new(bins),
            loads: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            hold: AtomicBool::new(false),
            release: Notify::new(),
        })
    }

    fn bin(idx: usize, rate: f64) -> CalibrationBin {
        CalibrationBin {
            bin_index: idx,
            bin_low: idx as f64 / 10.0,
            bin_high: (idx + 1) as f64 / 10.0,
            empirical_hit_rate: rate,
            sample_count: 12,
            trained_at: Utc::now(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_map_is_cached_until_ttl() {
        let store = store(vec![bin(6, 0.58)]);
        let service = CalibrationService::new(store.clone(), Duration::from_secs(3600));

        assert_eq!(service.calibrate(0.64).await, 0.58);
        assert_eq!(service.calibrate(0.61).await, 0.58);
        assert_eq!(store.loads.load(Ordering::SeqCst), 1);

        tokio::time::advance(Duration::from_secs(3601)).await;
        service.calibrate(0.64).await;
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_no_bins_means_identity() {
        let service = CalibrationService::new(store(Vec::new()), Duration::from_secs(3600));
        assert_eq!(service.calibrate(0.71).await, 0.71);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_reload_keeps_previous_map() {
        let store = store(vec![bin(6, 0.58)]);
        let service = CalibrationService::new(store.clone(), Duration::from_secs(60));
        assert_eq!(service.calibrate(0.64).await, 0.58);

        store.fail.store(true, Ordering::SeqCst);
        tokio::time::advance(Duration::from_secs(61)).await;
        assert_eq!(service.calibrate(0.64).await, 0.58);
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);

        // The failed reload still restarts the TTL
        assert_eq!(service.calibrate(0.64).await, 0.58);
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookup_uses_cached_map_during_reload() {
        let store = store(vec![bin(6, 0.58)]);
        let service = Arc::new(CalibrationService::new(store.clone(), Duration::from_secs(60)));
        assert_eq!(service.calibrate(0.64).await, 0.58);

        tokio::time::advance(Duration::from_secs(61)).await;
        *store.bins.lock() = vec![bin(6, 0.70)];
        store.hold.store(true, Ordering::SeqCst);

        let reloading = {
            let service = service.clone();
            tokio::spawn(async move { service.calibrate(0.64).await })
        };
        while store.loads.load(Ordering::SeqCst) < 2 {
            tokio::task::yield_now().await;
        }

        assert_eq!(service.calibrate(0.64).await, 0.58);
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);

        store.release.notify_one();
        assert_eq!(reloading.await.unwrap(), 0.70);
        assert_eq!(service.calibrate(0.64).await, 0.70);
        assert_eq!(store.loads.load(Ordering::SeqCst), 2);
    }
}
