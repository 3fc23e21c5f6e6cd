//! Parlay generation end to end: admission, candidate selection, assembly
//! and correlated pricing.

use chrono::{DateTime, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::info;

use crate::candidates::{CandidateLegService, CandidateQuery};
use crate::correlation::CorrelatedParlayProbabilityCalculator;
use crate::error::{ParlayError, ParlayResult};
use crate::guard::GeneratorGuard;
use crate::models::{CandidateLeg, Leg, RiskProfile, Sport};
use crate::odds;

pub const MAX_PARLAY_LEGS: usize = 15;
/// Candidates requested per wanted leg, leaving room for assembly rules.
const CANDIDATES_PER_LEG: usize = 10;
/// Guard key shared by every generator instance.
pub const GUARD_RESOURCE: &str = "parlay-generate";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayRequest {
    pub sport: Option<Sport>,
    pub num_legs: usize,
    pub risk_profile: RiskProfile,
    pub week: Option<u32>,
    pub include_player_props: bool,
    /// Overrides the risk profile's per-leg minimum
    pub min_confidence: Option<f64>,
    pub rng_seed: Option<u64>,
    pub now_utc: DateTime<Utc>,
}

impl ParlayRequest {
    pub fn new(sport: Option<Sport>, num_legs: usize, risk_profile: RiskProfile) -> Self {
        Self {
            sport,
            num_legs,
            risk_profile,
            week: None,
            include_player_props: false,
            min_confidence: None,
            rng_seed: None,
            now_utc: Utc::now(),
        }
    }

    fn validate(&self) -> ParlayResult<()> {
        if self.num_legs == 0 {
            return Err(ParlayError::EmptyParlay);
        }
        if self.num_legs > MAX_PARLAY_LEGS {
            return Err(ParlayError::InvalidRequest(format!(
                "num_legs {} exceeds maximum of {}",
                self.num_legs, MAX_PARLAY_LEGS
            )));
        }
        if let Some(min) = self.min_confidence {
            if !min.is_finite() || min < 0.0 || min > 100.0 {
                return Err(ParlayError::InvalidRequest(format!(
                    "min_confidence {} outside [0, 100]",
                    min
                )));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlaySuggestion {
    pub legs: Vec<CandidateLeg>,
    pub risk_profile: RiskProfile,
    /// Joint hit probability with same-game correlation
    pub probability: f64,
    pub independent_probability: f64,
    /// Relative change in probability from same-game correlation
    pub correlation_lift: f64,
    pub combined_decimal_odds: f64,
    pub combined_american_odds: Option<i32>,
    /// Probability implied by the combined price
    pub implied_probability: f64,
    pub edge: f64,
    /// Expected profit per unit staked
    pub expected_value: f64,
    pub correlated_games: usize,
    pub generated_at: DateTime<Utc>,
}

/// Greedy selection over a ranked pool: at most one leg per market of a
/// game, at most `max_legs_per_game` legs per game, and no leg below the
/// profile's minimum probability.
pub fn assemble_parlay(
    candidates: &[CandidateLeg],
    num_legs: usize,
    risk_profile: RiskProfile,
) -> Vec<CandidateLeg> {
    let min_prob = risk_profile.min_leg_probability();
    let per_game = risk_profile.max_legs_per_game();

    let mut used_markets: HashSet<(String, String, Option<String>)> = HashSet::new();
    let mut per_game_count: FxHashMap<String, usize> = FxHashMap::default();
    let mut selected = Vec::with_capacity(num_legs);

    for candidate in candidates {
        if selected.len() == num_legs {
            break;
        }
        let leg = &candidate.leg;
        if leg.adjusted_prob < min_prob {
            continue;
        }
        let market = (
            leg.game_id.clone(),
            leg.market_type.key().to_string(),
            leg.participant.clone(),
        );
        if used_markets.contains(&market) {
            continue;
        }
        let count = per_game_count.entry(leg.game_id.clone()).or_insert(0);
        if *count >= per_game {
            continue;
        }
        *count += 1;
        used_markets.insert(market);
        selected.push(candidate.clone());
    }
    selected
}

pub struct ParlayGenerator {
    guard: Arc<GeneratorGuard>,
    candidates: Arc<CandidateLegService>,
    calculator: CorrelatedParlayProbabilityCalculator,
}

impl ParlayGenerator {
    pub fn new(
        guard: Arc<GeneratorGuard>,
        candidates: Arc<CandidateLegService>,
        calculator: CorrelatedParlayProbabilityCalculator,
    ) -> Self {
        Self {
            guard,
            candidates,
            calculator,
        }
    }

    /// Build and price one parlay. Fails with a retryable `Busy` when no
    /// generation slot frees up in time.
    pub async fn generate(&self, request: &ParlayRequest) -> ParlayResult<ParlaySuggestion> {
        request.validate()?;
        self.guard
            .run(GUARD_RESOURCE, self.generate_unguarded(request))
            .await
    }

    async fn generate_unguarded(&self, request: &ParlayRequest) -> ParlayResult<ParlaySuggestion> {
        let profile = request.risk_profile;
        let query = CandidateQuery {
            sport: request.sport,
            min_confidence: request
                .min_confidence
                .unwrap_or_else(|| profile.min_leg_probability()),
            max_legs: request.num_legs * CANDIDATES_PER_LEG,
            week: request.week,
            include_player_props: request.include_player_props,
            now_utc: request.now_utc,
        };

        let pool = self.candidates.get_candidate_legs(&query).await;
        let selected = assemble_parlay(&pool, request.num_legs, profile);
        if selected.len() < request.num_legs {
            return Err(ParlayError::InsufficientLegs {
                requested: request.num_legs,
                available: selected.len(),
            });
        }

        let legs: Vec<Leg> = selected.iter().map(|c| c.leg.clone()).collect();
        let priced = self
            .calculator
            .calculate_detailed(&legs, profile, request.rng_seed)?;

        let combined_decimal_odds: f64 = legs.iter().map(|l| l.decimal_odds).product();
        let implied_probability = 1.0 / combined_decimal_odds;
        let suggestion = ParlaySuggestion {
            risk_profile: profile,
            probability: priced.probability,
            independent_probability: priced.independent_probability,
            correlation_lift: priced.correlation_lift(),
            combined_decimal_odds,
            combined_american_odds: odds::decimal_to_american(combined_decimal_odds).ok(),
            implied_probability,
            edge: priced.probability - implied_probability,
            expected_value: priced.probability * combined_decimal_odds - 1.0,
            correlated_games: priced.groups.iter().filter(|g| g.leg_keys.len() > 1).count(),
            generated_at: Utc::now(),
            legs: selected,
        };

        info!(
            "Generated {}-leg {} parlay: p={:.4} (independent {:.4}, lift {:+.1}%), odds {:.2}, EV {:+.3}",
            request.num_legs,
            profile.as_str(),
            suggestion.probability,
            suggestion.independent_probability,
            suggestion.correlation_lift * 100.0,
            suggestion.combined_decimal_odds,
            suggestion.expected_value
        );
        Ok(suggestion)
    }
}
