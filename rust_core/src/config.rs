//! Engine configuration
//!
//! Every tunable is read from the environment with a typed default.
//! `EngineConfig::load()` applies a `.env` file first.

use chrono::{DateTime, Utc};
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use crate::candidates::{CacheTtls, CandidateConfig, WindowConfig};
use crate::correlation::{SimulationConfig, DEFAULT_SAME_GAME_CORRELATION};
use crate::db::DbPoolConfig;
use crate::error::{ParlayError, ParlayResult};
use crate::guard::GuardConfig;

fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    // Correlation
    /// Coefficient applied to every same-game leg pair (default: 0.3)
    pub same_game_correlation: f64,
    pub simulation: SimulationConfig,

    // Admission
    pub guard: GuardConfig,

    // Calibration
    /// Time between training cycles (default: 6h)
    pub calibration_interval: Duration,
    /// Below this many resolved predictions a cycle is skipped (default: 50)
    pub calibration_min_samples: usize,
    /// How long a loaded map is reused before reloading (default: 1h)
    pub calibration_cache_ttl: Duration,

    // Candidates
    pub candidates: CandidateConfig,

    // Infrastructure
    pub redis_url: Option<String>,
    pub redis_op_timeout: Duration,
    pub database_url: Option<String>,
    pub db_pool: DbPoolConfig,
}

impl EngineConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let guard_defaults = GuardConfig::default();
        let sim_defaults = SimulationConfig::default();
        let candidate_defaults = CandidateConfig::default();
        let window_defaults = WindowConfig::default();
        let ttl_defaults = CacheTtls::default();

        let preferred_bookmakers = env::var("PREFERRED_BOOKMAKERS")
            .ok()
            .map(|v| {
                v.split(',')
                    .map(|b| b.trim().to_lowercase())
                    .filter(|b| !b.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|books| !books.is_empty())
            .unwrap_or(candidate_defaults.preferred_bookmakers);

        let season_week_one_start = env::var("SEASON_WEEK_ONE_START")
            .ok()
            .and_then(|v| DateTime::parse_from_rfc3339(v.trim()).ok())
            .map(|dt| dt.with_timezone(&Utc));

        Self {
            same_game_correlation: env_parse(
                "PARLAY_SAME_GAME_CORRELATION",
                DEFAULT_SAME_GAME_CORRELATION,
            ),
            simulation: SimulationConfig {
                conservative_samples: env_parse(
                    "PARLAY_MC_SAMPLES_CONSERVATIVE",
                    sim_defaults.conservative_samples,
                ),
                balanced_samples: env_parse("PARLAY_MC_SAMPLES_BALANCED", sim_defaults.balanced_samples),
                aggressive_samples: env_parse(
                    "PARLAY_MC_SAMPLES_AGGRESSIVE",
                    sim_defaults.aggressive_samples,
                ),
            },

            guard: GuardConfig {
                namespace: env::var("PARLAY_GUARD_NAMESPACE").unwrap_or(guard_defaults.namespace),
                max_concurrent: env_parse("PARLAY_GUARD_MAX_CONCURRENT", guard_defaults.max_concurrent),
                lease_ttl: Duration::from_secs(env_parse(
                    "PARLAY_GUARD_LEASE_TTL_SECS",
                    guard_defaults.lease_ttl.as_secs(),
                )),
                acquire_timeout: Duration::from_millis(env_parse(
                    "PARLAY_GUARD_ACQUIRE_TIMEOUT_MS",
                    guard_defaults.acquire_timeout.as_millis() as u64,
                )),
                poll_interval: Duration::from_millis(env_parse(
                    "PARLAY_GUARD_POLL_INTERVAL_MS",
                    guard_defaults.poll_interval.as_millis() as u64,
                )),
            },

            calibration_interval: Duration::from_secs(env_parse("CALIBRATION_INTERVAL_SECS", 6 * 3600)),
            calibration_min_samples: env_parse(
                "CALIBRATION_MIN_SAMPLES",
                crate::calibration::MIN_TRAINING_SAMPLES,
            ),
            calibration_cache_ttl: Duration::from_secs(env_parse("CALIBRATION_CACHE_TTL_SECS", 3600)),

            candidates: CandidateConfig {
                window: WindowConfig {
                    lookback_hours: env_parse("CANDIDATE_LOOKBACK_HOURS", window_defaults.lookback_hours),
                    lookahead_hours: env_parse(
                        "CANDIDATE_LOOKAHEAD_HOURS",
                        window_defaults.lookahead_hours,
                    ),
                    season_week_one_start,
                },
                preferred_bookmakers,
                max_odds_rows: env_parse("CANDIDATE_MAX_ODDS_ROWS", candidate_defaults.max_odds_rows),
                max_pool_size: env_parse("CANDIDATE_MAX_POOL_SIZE", candidate_defaults.max_pool_size),
                lookup_timeout: Duration::from_millis(env_parse(
                    "SIGNAL_LOOKUP_TIMEOUT_MS",
                    candidate_defaults.lookup_timeout.as_millis() as u64,
                )),
                stale_after: Duration::from_secs(env_parse(
                    "ODDS_STALE_AFTER_SECS",
                    candidate_defaults.stale_after.as_secs(),
                )),
                cache_ttls: CacheTtls {
                    all_sports: Duration::from_secs(env_parse(
                        "CANDIDATE_CACHE_TTL_ALL_SECS",
                        ttl_defaults.all_sports.as_secs(),
                    )),
                    rolling: Duration::from_secs(env_parse(
                        "CANDIDATE_CACHE_TTL_ROLLING_SECS",
                        ttl_defaults.rolling.as_secs(),
                    )),
                    week: Duration::from_secs(env_parse(
                        "CANDIDATE_CACHE_TTL_WEEK_SECS",
                        ttl_defaults.week.as_secs(),
                    )),
                },
            },

            redis_url: env::var("REDIS_URL").ok().filter(|v| !v.trim().is_empty()),
            redis_op_timeout: Duration::from_millis(env_parse("REDIS_OP_TIMEOUT_MS", 250)),
            database_url: env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty()),
            db_pool: DbPoolConfig::from_env_with_defaults(DbPoolConfig::default()),
        }
    }

    /// Apply `.env` (if present), then read the environment.
    pub fn load() -> ParlayResult<Self> {
        dotenv::dotenv().ok();
        let config = Self::from_env();
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ParlayResult<()> {
        let fail = |msg: String| Err(ParlayError::Config(msg));

        if !(0.0..1.0).contains(&self.same_game_correlation) {
            return fail(format!(
                "PARLAY_SAME_GAME_CORRELATION must be in [0, 1), got {}",
                self.same_game_correlation
            ));
        }
        if self.simulation.conservative_samples == 0
            || self.simulation.balanced_samples == 0
            || self.simulation.aggressive_samples == 0
        {
            return fail("Monte Carlo sample counts must be positive".to_string());
        }
        if self.guard.max_concurrent == 0 {
            return fail("PARLAY_GUARD_MAX_CONCURRENT must be at least 1".to_string());
        }
        if self.guard.lease_ttl.is_zero() || self.guard.poll_interval.is_zero() {
            return fail("guard lease TTL and poll interval must be positive".to_string());
        }
        if self.calibration_interval.is_zero() {
            return fail("CALIBRATION_INTERVAL_SECS must be positive".to_string());
        }
        let window = &self.candidates.window;
        if window.lookback_hours < 0 || window.lookahead_hours <= 0 {
            return fail(format!(
                "candidate window invalid: lookback {}h, lookahead {}h",
                window.lookback_hours, window.lookahead_hours
            ));
        }
        if self.candidates.max_odds_rows == 0 || self.candidates.max_pool_size == 0 {
            return fail("candidate row and pool caps must be positive".to_string());
        }
        Ok(())
    }

    /// Log current configuration (useful at startup)
    pub fn log_config(&self) {
        info!("EngineConfig loaded:");
        info!("  same_game_correlation: {:.2}", self.same_game_correlation);
        info!(
            "  mc_samples: conservative={} balanced={} aggressive={}",
            self.simulation.conservative_samples,
            self.simulation.balanced_samples,
            self.simulation.aggressive_samples
        );
        info!(
            "  guard: max_concurrent={} lease_ttl={:?} acquire_timeout={:?}",
            self.guard.max_concurrent, self.guard.lease_ttl, self.guard.acquire_timeout
        );
        info!(
            "  calibration: interval={:?} min_samples={} cache_ttl={:?}",
            self.calibration_interval, self.calibration_min_samples, self.calibration_cache_ttl
        );
        info!(
            "  candidates: window=-{}h/+{}h bookmakers={:?} max_rows={}",
            self.candidates.window.lookback_hours,
            self.candidates.window.lookahead_hours,
            self.candidates.preferred_bookmakers,
            self.candidates.max_odds_rows
        );
        info!("  redis: {}", if self.redis_url.is_some() { "configured" } else { "in-process" });
        info!("  database: {}", if self.database_url.is_some() { "configured" } else { "not set" });
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = EngineConfig::from_env();
        assert!(config.validate().is_ok());
        assert_eq!(config.simulation.conservative_samples, 50_000);
        assert_eq!(config.calibration_min_samples, 50);
        assert_eq!(config.calibration_interval, Duration::from_secs(21_600));
    }

    #[test]
    fn test_validate_rejects_unit_correlation() {
        let mut config = EngineConfig::from_env();
        config.same_game_correlation = 1.0;
        assert!(matches!(config.validate(), Err(ParlayError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_capacity() {
        let mut config = EngineConfig::from_env();
        config.guard.max_concurrent = 0;
        assert!(config.validate().is_err());
    }
}
