//! Calibration samples and bin sets.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::info;

use crate::calibration::{CalibrationBin, CalibrationSample, CalibrationStore};

#[derive(Debug, Clone, sqlx::FromRow)]
struct SampleRecord {
    predicted_probability: f64,
    was_correct: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
struct BinRecord {
    bin_index: i32,
    bin_low: f64,
    bin_high: f64,
    empirical_hit_rate: f64,
    sample_count: i64,
    trained_at: DateTime<Utc>,
}

impl From<BinRecord> for CalibrationBin {
    fn from(r: BinRecord) -> Self {
        Self {
            bin_index: r.bin_index.max(0) as usize,
            bin_low: r.bin_low,
            bin_high: r.bin_high,
            empirical_hit_rate: r.empirical_hit_rate,
            sample_count: r.sample_count.max(0) as u64,
            trained_at: r.trained_at,
        }
    }
}

pub struct PgCalibrationStore {
    pool: PgPool,
}

impl PgCalibrationStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CalibrationStore for PgCalibrationStore {
    async fn load_samples(&self) -> Result<Vec<CalibrationSample>> {
        let records = sqlx::query_as::<_, SampleRecord>(
            r#"
            SELECT predicted_probability, was_correct
            FROM prediction_outcomes
            WHERE was_correct IS NOT NULL
              AND predicted_probability IS NOT NULL
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load prediction outcomes")?;

        Ok(records
            .into_iter()
            .map(|r| CalibrationSample {
                predicted_prob: r.predicted_probability,
                was_correct: r.was_correct,
            })
            .collect())
    }

    async fn save_bins(&self, bins: &[CalibrationBin]) -> Result<()> {
        let Some(trained_at) = bins.first().map(|b| b.trained_at) else {
            return Ok(());
        };

        let mut tx = self
            .pool
            .begin()
            .await
            .context("Failed to begin calibration transaction")?;

        for bin in bins {
            sqlx::query(
                r#"
                INSERT INTO calibration_bins (
                    bin_index, bin_low, bin_high, empirical_hit_rate, sample_count, trained_at
                ) VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(bin.bin_index as i32)
            .bind(bin.bin_low)
            .bind(bin.bin_high)
            .bind(bin.empirical_hit_rate)
            .bind(bin.sample_count as i64)
            .bind(trained_at)
            .execute(&mut *tx)
            .await
            .context("Failed to insert calibration bin")?;
        }

        tx.commit()
            .await
            .context("Failed to commit calibration bins")?;

        info!("Saved {} calibration bins (trained_at {})", bins.len(), trained_at);
        Ok(())
    }

    async fn latest_bins(&self) -> Result<Vec<CalibrationBin>> {
        let records = sqlx::query_as::<_, BinRecord>(
            r#"
            SELECT bin_index, bin_low, bin_high, empirical_hit_rate, sample_count, trained_at
            FROM calibration_bins
            WHERE trained_at = (SELECT max(trained_at) FROM calibration_bins)
            ORDER BY bin_index
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to load calibration bins")?;

        Ok(records.into_iter().map(CalibrationBin::from).collect())
    }
}
