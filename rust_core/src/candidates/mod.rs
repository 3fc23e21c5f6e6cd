//! Candidate leg pool: fetch, price, rank and cache.
//!
//! The pipeline per query is:
//! resolve window -> scheduled games -> odds for preferred bookmakers (row
//! capped) -> best price per `(game, market, outcome)` -> per-game signals ->
//! heuristics -> confidence blend -> calibration -> rank. The ranked pool is
//! cached whole; `min_confidence` and then the leg cap are applied on the way
//! out so one cached pool serves every threshold.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::calibration::{self, CalibrationMap, CalibrationService};
use crate::confidence::{ConfidenceEngine, ConfidenceMeter};
use crate::heuristics::{HeuristicsAdjuster, LegContext};
use crate::models::{CandidateLeg, Game, Leg, LegSide, OddsRow, Sport};
use crate::odds;
use crate::signals::{
    lookup_with_timeout, GameSignals, InjuryProvider, NullInjuries, NullTeamStats, NullWeather,
    WeatherProvider,
};
use crate::team_strength::TeamStrengthService;

pub mod cache;
pub mod status;
pub mod window;

pub use cache::{CacheKey, CacheTtls, CandidateLegCache};
pub use status::is_scheduled_status;
pub use window::{TimeWindow, WindowConfig, WindowKind};

/// Adjusted probabilities are kept off the extremes.
const PROB_FLOOR: f64 = 0.01;
const PROB_CEILING: f64 = 0.99;
const MIN_FRESHNESS: f64 = 0.3;
const MIN_SAMPLE_SCORE: f64 = 0.3;
const UNKNOWN_SAMPLE_SCORE: f64 = 0.5;
/// Games played at which the sample-size score saturates.
const FULL_SAMPLE_GAMES: f64 = 20.0;

// ============================================================================
// Persistence collaborator
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct OddsQuery {
    pub game_ids: Vec<String>,
    pub bookmakers: Vec<String>,
    pub max_rows: usize,
    pub include_player_props: bool,
}

/// Read-only access to games and odds.
#[async_trait]
pub trait OddsRepository: Send + Sync {
    /// Games commencing inside `window`, optionally for one sport.
    async fn fetch_games(&self, window: &TimeWindow, sport: Option<Sport>) -> Result<Vec<Game>>;

    /// Latest odds rows for the given games, at most `max_rows`.
    async fn fetch_odds(&self, query: &OddsQuery) -> Result<Vec<OddsRow>>;
}

// ============================================================================
// Service
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateConfig {
    pub window: WindowConfig,
    pub preferred_bookmakers: Vec<String>,
    pub max_odds_rows: usize,
    /// Upper bound on legs returned per query, applied after the confidence filter
    pub max_pool_size: usize,
    pub lookup_timeout: Duration,
    /// Age at which a price's freshness score bottoms out
    pub stale_after: Duration,
    pub cache_ttls: CacheTtls,
}

impl Default for CandidateConfig {
    fn default() -> Self {
        Self {
            window: WindowConfig::default(),
            preferred_bookmakers: vec![
                "draftkings".to_string(),
                "fanduel".to_string(),
                "betmgm".to_string(),
                "caesars".to_string(),
            ],
            max_odds_rows: 5000,
            max_pool_size: 500,
            lookup_timeout: Duration::from_secs(2),
            stale_after: Duration::from_secs(12 * 3600),
            cache_ttls: CacheTtls::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateQuery {
    /// `None` queries every sport
    pub sport: Option<Sport>,
    /// Minimum `confidence_score`, either as a fraction (`0.55`) or percent (`55`)
    pub min_confidence: f64,
    pub max_legs: usize,
    pub week: Option<u32>,
    pub include_player_props: bool,
    pub now_utc: DateTime<Utc>,
}

impl CandidateQuery {
    pub fn cache_key(&self) -> CacheKey {
        CacheKey {
            sport: self.sport,
            date: self.now_utc.date_naive(),
            week: self.week,
            include_player_props: self.include_player_props,
        }
    }
}

pub struct CandidateLegService {
    repo: Arc<dyn OddsRepository>,
    calibration: Arc<CalibrationService>,
    cache: CandidateLegCache,
    strength: Arc<TeamStrengthService>,
    weather: Arc<dyn WeatherProvider>,
    injuries: Arc<dyn InjuryProvider>,
    heuristics: HeuristicsAdjuster,
    confidence: ConfidenceEngine,
    config: CandidateConfig,
}

impl CandidateLegService {
    /// Service with no external signals; add them with the `with_*` methods.
    pub fn new(
        repo: Arc<dyn OddsRepository>,
        calibration: Arc<CalibrationService>,
        cache: CandidateLegCache,
        config: CandidateConfig,
    ) -> Self {
        let strength = Arc::new(TeamStrengthService::new(
            Arc::new(NullTeamStats),
            config.lookup_timeout,
        ));
        Self {
            repo,
            calibration,
            cache,
            strength,
            weather: Arc::new(NullWeather),
            injuries: Arc::new(NullInjuries),
            heuristics: HeuristicsAdjuster::default(),
            confidence: ConfidenceEngine::default(),
            config,
        }
    }

    pub fn with_team_strength(mut self, strength: Arc<TeamStrengthService>) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_weather(mut self, weather: Arc<dyn WeatherProvider>) -> Self {
        self.weather = weather;
        self
    }

    pub fn with_injuries(mut self, injuries: Arc<dyn InjuryProvider>) -> Self {
        self.injuries = injuries;
        self
    }

    pub fn with_heuristics(mut self, heuristics: HeuristicsAdjuster) -> Self {
        self.heuristics = heuristics;
        self
    }

    pub fn with_confidence(mut self, confidence: ConfidenceEngine) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn config(&self) -> &CandidateConfig {
        &self.config
    }

    /// Ranked legs for `query`. Repository failures yield an empty list.
    pub async fn get_candidate_legs(&self, query: &CandidateQuery) -> Vec<CandidateLeg> {
        let key = query.cache_key();

        if let Some(pool) = self.cache.get(&key).await {
            debug!("Candidate cache hit ({} legs)", pool.len());
            return self.select(pool, query);
        }

        let pool = match self.build_pool(query).await {
            Ok(pool) => pool,
            Err(e) => {
                warn!("Candidate pool unavailable, odds repository failed: {:#}", e);
                return Vec::new();
            }
        };

        self.cache.put(&key, &pool).await;
        self.select(pool, query)
    }

    fn select(&self, pool: Vec<CandidateLeg>, query: &CandidateQuery) -> Vec<CandidateLeg> {
        let cap = query.max_legs.min(self.config.max_pool_size);
        select(pool, query.min_confidence, cap)
    }

    async fn build_pool(&self, query: &CandidateQuery) -> Result<Vec<CandidateLeg>> {
        let games = self.resolve_games(query).await?;
        if games.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<OddsRow> = self
            .repo
            .fetch_odds(&OddsQuery {
                game_ids: games.iter().map(|g| g.game_id.clone()).collect(),
                bookmakers: self.config.preferred_bookmakers.clone(),
                max_rows: self.config.max_odds_rows,
                include_player_props: query.include_player_props,
            })
            .await?
            .into_iter()
            .filter(|row| query.include_player_props || !row.market_type.is_player_prop())
            .collect();

        let fair = odds::no_vig_probabilities(&rows);
        let best = best_price_rows(&rows, &fair);
        let map = self.calibration.current_map().await;

        let mut pool = Vec::new();
        let mut skipped = 0usize;
        for game in &games {
            let Some(indices) = best.get(game.game_id.as_str()) else {
                skipped += 1;
                continue;
            };
            let signals = self.game_signals(game).await;
            for &idx in indices {
                let fair_prob = match &fair[idx] {
                    Ok(p) => *p,
                    Err(_) => continue,
                };
                if let Some(candidate) =
                    self.price_row(game, &rows[idx], fair_prob, &signals, map.as_deref(), query.now_utc)
                {
                    pool.push(candidate);
                }
            }
        }

        rank(&mut pool);

        info!(
            "Built candidate pool: {} legs from {} games ({} without odds), {} odds rows",
            pool.len(),
            games.len() - skipped,
            skipped,
            rows.len()
        );
        Ok(pool)
    }

    /// Week window when requested and populated, otherwise the rolling window.
    async fn resolve_games(&self, query: &CandidateQuery) -> Result<Vec<Game>> {
        if let Some(week) = query.week {
            match self.config.window.week(week) {
                Some(window) => {
                    let games = self.scheduled_games(&window, query.sport).await?;
                    if !games.is_empty() {
                        return Ok(games);
                    }
                    info!("No games in week {}, falling back to rolling window", week);
                }
                None => debug!("Week {} requested without a season start, using rolling window", week),
            }
        }
        let window = self.config.window.rolling(query.now_utc);
        self.scheduled_games(&window, query.sport).await
    }

    async fn scheduled_games(&self, window: &TimeWindow, sport: Option<Sport>) -> Result<Vec<Game>> {
        let games = self.repo.fetch_games(window, sport).await?;
        Ok(games
            .into_iter()
            .filter(|g| is_scheduled_status(&g.status))
            .collect())
    }

    async fn game_signals(&self, game: &Game) -> GameSignals {
        let timeout = self.config.lookup_timeout;
        let weather = async {
            if game.is_outdoor() {
                lookup_with_timeout("weather", timeout, self.weather.forecast(game)).await
            } else {
                None
            }
        };
        let (strength, weather, injuries) = tokio::join!(
            self.strength.get_team_strength(&game.home_team, &game.away_team),
            weather,
            lookup_with_timeout("injuries", timeout, self.injuries.injuries(game)),
        );

        let min_games_played = strength
            .as_ref()
            .map(|s| s.team1_games_played.min(s.team2_games_played));
        GameSignals {
            strength,
            weather,
            injuries: injuries.unwrap_or_default(),
            min_games_played,
        }
    }

    fn price_row(
        &self,
        game: &Game,
        row: &OddsRow,
        fair_prob: f64,
        signals: &GameSignals,
        map: Option<&CalibrationMap>,
        now: DateTime<Utc>,
    ) -> Option<CandidateLeg> {
        let ctx = LegContext {
            game,
            market_type: &row.market_type,
            side: LegSide::resolve(&row.outcome, game),
            signals,
        };
        let adjustment = self.heuristics.adjust_with_breakdown(fair_prob, &ctx);

        let freshness_score = freshness_score(row.updated_at, now, self.config.stale_after);
        let sample_size_score = sample_size_score(signals.min_games_played);
        let blend = self.confidence.blend(
            adjustment.final_prob,
            fair_prob,
            freshness_score,
            sample_size_score,
        );
        let adjusted = calibration::calibrate(map, blend.final_prob).clamp(PROB_FLOOR, PROB_CEILING);

        let leg = match Leg::from_american(
            &row.game_id,
            row.market_type.clone(),
            &row.outcome,
            row.point,
            row.american_odds,
            adjusted,
        ) {
            Ok(leg) => leg
                .with_fair_implied(fair_prob)
                .with_participant(row.participant.clone()),
            Err(e) => {
                debug!("Dropping odds row {}/{}: {}", row.game_id, row.outcome, e);
                return None;
            }
        };

        let explanation = format!(
            "{}; heuristics {:+.3} (strength {:+.3}, situational {:+.3}, weather {:+.3}, injuries {:+.3}); calibrated {:.1}%",
            blend.explanation,
            adjustment.final_prob - fair_prob,
            adjustment.strength,
            adjustment.situational,
            adjustment.weather,
            adjustment.injury,
            adjusted * 100.0
        );

        Some(CandidateLeg {
            value_score: leg.edge,
            confidence_meter: ConfidenceMeter::from_probability(adjusted),
            leg,
            sport: game.sport,
            home_team: game.home_team.clone(),
            away_team: game.away_team.clone(),
            commence_time: game.commence_time,
            bookmaker: row.bookmaker.clone(),
            freshness_score,
            sample_size_score,
            explanation,
        })
    }
}

/// Index of the best-priced row per `(game, market, participant, outcome)`,
/// grouped by game.
fn best_price_rows<'a>(
    rows: &'a [OddsRow],
    fair: &[crate::error::ParlayResult<f64>],
) -> FxHashMap<&'a str, Vec<usize>> {
    type PriceKey<'r> = (&'r str, String, Option<String>, String);
    let mut best: BTreeMap<PriceKey<'a>, (usize, f64)> = BTreeMap::new();
    for (idx, row) in rows.iter().enumerate() {
        if fair[idx].is_err() {
            continue;
        }
        let Ok(decimal) = odds::american_to_decimal(row.american_odds) else {
            continue;
        };
        let key = (
            row.game_id.as_str(),
            row.market_type.key().to_string(),
            row.participant_key(),
            row.outcome.trim().to_lowercase(),
        );
        match best.get(&key) {
            Some((_, current)) if *current >= decimal => {}
            _ => {
                best.insert(key, (idx, decimal));
            }
        }
    }

    let mut by_game: FxHashMap<&str, Vec<usize>> = FxHashMap::default();
    for ((game_id, _, _, _), (idx, _)) in best {
        by_game.entry(game_id).or_default().push(idx);
    }
    by_game
}

/// 1.0 for a brand-new price, decaying linearly to a floor at `stale_after`.
pub fn freshness_score(updated_at: DateTime<Utc>, now: DateTime<Utc>, stale_after: Duration) -> f64 {
    let age_secs = (now - updated_at).num_seconds().max(0) as f64;
    let horizon = stale_after.as_secs_f64().max(1.0);
    (1.0 - age_secs / horizon).clamp(MIN_FRESHNESS, 1.0)
}

/// Confidence in team records from the smaller games-played count.
pub fn sample_size_score(min_games_played: Option<u32>) -> f64 {
    match min_games_played {
        Some(games) => (games as f64 / FULL_SAMPLE_GAMES).clamp(MIN_SAMPLE_SCORE, 1.0),
        None => UNKNOWN_SAMPLE_SCORE,
    }
}

/// Best value first; confidence, then leg key, break ties.
fn rank(pool: &mut [CandidateLeg]) {
    pool.sort_by(|a, b| {
        b.value_score
            .total_cmp(&a.value_score)
            .then_with(|| b.leg.confidence_score.total_cmp(&a.leg.confidence_score))
            .then_with(|| a.leg.key().cmp(&b.leg.key()))
    });
}

fn select(pool: Vec<CandidateLeg>, min_confidence: f64, max_legs: usize) -> Vec<CandidateLeg> {
    let threshold = if min_confidence <= 1.0 {
        min_confidence * 100.0
    } else {
        min_confidence
    };
    pool.into_iter()
        .filter(|c| c.leg.confidence_score >= threshold)
        .take(max_legs)
        .collect()
}
