//! Empirical probability calibration.
//!
//! Predictions are bucketed into ten equal-width bins over `[0, 1]`; each
//! bin's hit rate becomes the calibrated probability for any raw prediction
//! that falls in it. A bin set is always written and read as a whole,
//! identified by its shared `trained_at`.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod service;
pub mod trainer;

pub use service::CalibrationService;
pub use trainer::{CalibrationTrainer, TrainingOutcome, TrainingReport};

pub const NUM_BINS: usize = 10;
pub const MIN_TRAINING_SAMPLES: usize = 50;
/// Hit rate reported for bins without samples.
pub const EMPTY_BIN_RATE: f64 = 0.5;

/// A resolved historical prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSample {
    pub predicted_prob: f64,
    pub was_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationBin {
    pub bin_index: usize,
    pub bin_low: f64,
    pub bin_high: f64,
    pub empirical_hit_rate: f64,
    pub sample_count: u64,
    pub trained_at: DateTime<Utc>,
}

/// Bin holding `prob`; 1.0 lands in the last bin.
pub fn bin_index(prob: f64) -> usize {
    let p = if prob.is_finite() { prob.clamp(0.0, 1.0) } else { 0.5 };
    ((p * NUM_BINS as f64).floor() as usize).min(NUM_BINS - 1)
}

/// Fit a fresh bin set, or `None` when there are fewer than `min_samples`.
pub fn train_bins(
    samples: &[CalibrationSample],
    min_samples: usize,
    trained_at: DateTime<Utc>,
) -> Option<Vec<CalibrationBin>> {
    if samples.len() < min_samples {
        return None;
    }

    let mut hits = [0u64; NUM_BINS];
    let mut counts = [0u64; NUM_BINS];
    for sample in samples {
        let idx = bin_index(sample.predicted_prob);
        counts[idx] += 1;
        if sample.was_correct {
            hits[idx] += 1;
        }
    }

    let width = 1.0 / NUM_BINS as f64;
    let bins = (0..NUM_BINS)
        .map(|i| CalibrationBin {
            bin_index: i,
            bin_low: i as f64 * width,
            bin_high: (i + 1) as f64 * width,
            empirical_hit_rate: if counts[i] == 0 {
                EMPTY_BIN_RATE
            } else {
                hits[i] as f64 / counts[i] as f64
            },
            sample_count: counts[i],
            trained_at,
        })
        .collect();
    Some(bins)
}

/// Lookup table built from one bin set.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationMap {
    rates: [Option<f64>; NUM_BINS],
    trained_at: DateTime<Utc>,
}

impl CalibrationMap {
    /// `None` for an empty bin set.
    pub fn from_bins(bins: &[CalibrationBin]) -> Option<Self> {
        let trained_at = bins.iter().map(|b| b.trained_at).max()?;
        let mut rates = [None; NUM_BINS];
        for bin in bins.iter().filter(|b| b.trained_at == trained_at) {
            if bin.bin_index < NUM_BINS {
                rates[bin.bin_index] = Some(bin.empirical_hit_rate);
            }
        }
        Some(Self { rates, trained_at })
    }

    pub fn trained_at(&self) -> DateTime<Utc> {
        self.trained_at
    }

    /// Calibrated probability; a bin missing from the set leaves `raw_prob`
    /// unchanged.
    pub fn calibrate(&self, raw_prob: f64) -> f64 {
        self.rates[bin_index(raw_prob)].unwrap_or(raw_prob)
    }
}

/// Calibrate against an optional map; identity without one.
pub fn calibrate(map: Option<&CalibrationMap>, raw_prob: f64) -> f64 {
    match map {
        Some(map) => map.calibrate(raw_prob),
        None => raw_prob,
    }
}

/// Mean squared error of `predict` against realised outcomes.
pub fn brier_score<F>(samples: &[CalibrationSample], predict: F) -> f64
where
    F: Fn(f64) -> f64,
{
    if samples.is_empty() {
        return 0.0;
    }
    let total: f64 = samples
        .iter()
        .map(|s| {
            let outcome = if s.was_correct { 1.0 } else { 0.0 };
            (predict(s.predicted_prob) - outcome).powi(2)
        })
        .sum();
    total / samples.len() as f64
}

/// Persistence for calibration inputs and outputs.
#[async_trait]
pub trait CalibrationStore: Send + Sync {
    /// Every resolved `(predicted_prob, was_correct)` pair.
    async fn load_samples(&self) -> Result<Vec<CalibrationSample>>;

    /// Persist a complete bin set; all bins share one `trained_at`.
    async fn save_bins(&self, bins: &[CalibrationBin]) -> Result<()>;

    /// The bin set with the greatest `trained_at`, empty if none exists.
    async fn latest_bins(&self) -> Result<Vec<CalibrationBin>>;
}
