use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{brier_score, train_bins, CalibrationMap, CalibrationService, CalibrationStore};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingReport {
    pub samples: usize,
    pub populated_bins: usize,
    pub brier_raw: f64,
    pub brier_calibrated: f64,
    pub trained_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrainingOutcome {
    /// Not enough resolved predictions; existing bins untouched
    Skipped { samples: usize },
    Trained(TrainingReport),
}

pub struct CalibrationTrainer {
    store: Arc<dyn CalibrationStore>,
    service: Arc<CalibrationService>,
    min_samples: usize,
}

impl CalibrationTrainer {
    pub fn new(
        store: Arc<dyn CalibrationStore>,
        service: Arc<CalibrationService>,
        min_samples: usize,
    ) -> Self {
        Self {
            store,
            service,
            min_samples,
        }
    }

    /// Run one training cycle.
    pub async fn train_once(&self) -> Result<TrainingOutcome> {
        let samples = self
            .store
            .load_samples()
            .await
            .context("Failed to load calibration samples")?;

        let trained_at = Utc::now();
        let Some(bins) = train_bins(&samples, self.min_samples, trained_at) else {
            warn!(
                "Calibration skipped: {} samples, need {}",
                samples.len(),
                self.min_samples
            );
            return Ok(TrainingOutcome::Skipped {
                samples: samples.len(),
            });
        };

        self.store
            .save_bins(&bins)
            .await
            .context("Failed to save calibration bins")?;

        let Some(map) = CalibrationMap::from_bins(&bins) else {
            return Ok(TrainingOutcome::Skipped {
                samples: samples.len(),
            });
        };

        let report = TrainingReport {
            samples: samples.len(),
            populated_bins: bins.iter().filter(|b| b.sample_count > 0).count(),
            brier_raw: brier_score(&samples, |p| p),
            brier_calibrated: brier_score(&samples, |p| map.calibrate(p)),
            trained_at,
        };

        info!(
            "Calibration trained on {} samples: {} populated bins, brier {:.4} -> {:.4}",
            report.samples, report.populated_bins, report.brier_raw, report.brier_calibrated
        );

        self.service.install(map);
        Ok(TrainingOutcome::Trained(report))
    }

    /// Train on a fixed interval forever. The first cycle runs immediately.
    pub fn start_background(self: Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!("Starting calibration training loop (interval: {:?})", interval);
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.train_once().await {
                    error!("Calibration cycle failed: {:#}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::{CalibrationBin, CalibrationSample, MIN_TRAINING_SAMPLES};
    use parking_lot::Mutex;

    struct FakeStore {
        samples: Vec<CalibrationSample>,
        saved: Mutex<Vec<Vec<CalibrationBin>>>,
    }

    #[async_trait::async_trait]
    impl CalibrationStore for FakeStore {
        async fn load_samples(&self) -> Result<Vec<CalibrationSample>> {
            Ok(self.samples.clone())
        }
        async fn save_bins(&self, bins: &[CalibrationBin]) -> Result<()> {
            self.saved.lock().push(bins.to_vec());
            Ok(())
        }
        async fn latest_bins(&self) -> Result<Vec<CalibrationBin>> {
            Ok(self.saved.lock().last().cloned().unwrap_or_default())
        }
    }

    fn trainer(samples: Vec<CalibrationSample>) -> (Arc<FakeStore>, Arc<CalibrationService>, CalibrationTrainer) {
        let store = Arc::new(FakeStore {
            samples,
            saved: Mutex::new(Vec::new()),
        });
        let service = Arc::new(CalibrationService::new(store.clone(), Duration::from_secs(3600)));
        let trainer = CalibrationTrainer::new(store.clone(), service.clone(), MIN_TRAINING_SAMPLES);
        (store, service, trainer)
    }

    fn overconfident(n: usize) -> Vec<CalibrationSample> {
        // Predicted 0.75 but only half hit
        (0..n)
            .map(|i| CalibrationSample {
                predicted_prob: 0.75,
                was_correct: i % 2 == 0,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_insufficient_samples_skip_without_saving() {
        let (store, service, trainer) = trainer(overconfident(30));
        let outcome = trainer.train_once().await.unwrap();
        assert_eq!(outcome, TrainingOutcome::Skipped { samples: 30 });
        assert!(store.saved.lock().is_empty());
        assert_eq!(service.calibrate(0.75).await, 0.75);
    }

    #[tokio::test]
    async fn test_training_saves_installs_and_improves_brier() {
        let (store, service, trainer) = trainer(overconfident(60));
        let outcome = trainer.train_once().await.unwrap();

        let TrainingOutcome::Trained(report) = outcome else {
            panic!("expected a trained outcome");
        };
        assert_eq!(report.samples, 60);
        assert_eq!(report.populated_bins, 1);
        assert!(report.brier_calibrated < report.brier_raw);
        assert_eq!(store.saved.lock().len(), 1);
        assert!((service.calibrate(0.78).await - 0.5).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_skipped_cycle_keeps_previous_map() {
        let (_store, service, trainer) = trainer(overconfident(60));
        trainer.train_once().await.unwrap();

        let thin_store = Arc::new(FakeStore {
            samples: overconfident(10),
            saved: Mutex::new(Vec::new()),
        });
        let thin = CalibrationTrainer::new(thin_store, service.clone(), MIN_TRAINING_SAMPLES);
        thin.train_once().await.unwrap();
        assert!((service.calibrate(0.78).await - 0.5).abs() < 1e-12);
    }
}
