// Shared models for the parlay engine
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::confidence::ConfidenceMeter;
use crate::error::{ParlayError, ParlayResult};
use crate::odds;

pub mod market_type;

pub use market_type::MarketType;

// ============================================================================
// Sport
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Sport {
    NFL,
    NCAAF,
    NBA,
    NCAAB,
    NHL,
    MLB,
    MLS,
    #[serde(rename = "SOCCER")]
    Soccer,
}

impl Sport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sport::NFL => "NFL",
            Sport::NCAAF => "NCAAF",
            Sport::NBA => "NBA",
            Sport::NCAAB => "NCAAB",
            Sport::NHL => "NHL",
            Sport::MLB => "MLB",
            Sport::MLS => "MLS",
            Sport::Soccer => "SOCCER",
        }
    }

    /// Parse either a short code (`nfl`) or an odds-provider sport key
    /// (`americanfootball_nfl`, `soccer_epl`).
    pub fn from_key(key: &str) -> Option<Self> {
        let key = key.trim().to_lowercase();
        let sport = match key.as_str() {
            "nfl" | "americanfootball_nfl" => Sport::NFL,
            "ncaaf" | "americanfootball_ncaaf" => Sport::NCAAF,
            "nba" | "basketball_nba" => Sport::NBA,
            "ncaab" | "basketball_ncaab" => Sport::NCAAB,
            "nhl" | "icehockey_nhl" => Sport::NHL,
            "mlb" | "baseball_mlb" => Sport::MLB,
            "mls" | "soccer_usa_mls" => Sport::MLS,
            k if k == "soccer" || k.starts_with("soccer_") => Sport::Soccer,
            _ => return None,
        };
        Some(sport)
    }

    /// Provider sport key used in persistence queries.
    pub fn provider_key(&self) -> &'static str {
        match self {
            Sport::NFL => "americanfootball_nfl",
            Sport::NCAAF => "americanfootball_ncaaf",
            Sport::NBA => "basketball_nba",
            Sport::NCAAB => "basketball_ncaab",
            Sport::NHL => "icehockey_nhl",
            Sport::MLB => "baseball_mlb",
            Sport::MLS => "soccer_usa_mls",
            Sport::Soccer => "soccer",
        }
    }

    /// Whether games are normally played outdoors (weather can matter).
    pub fn typically_outdoor(&self) -> bool {
        matches!(
            self,
            Sport::NFL | Sport::NCAAF | Sport::MLB | Sport::MLS | Sport::Soccer
        )
    }
}

// ============================================================================
// Risk Profile
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskProfile {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl RiskProfile {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskProfile::Conservative => "conservative",
            RiskProfile::Balanced => "balanced",
            RiskProfile::Aggressive => "aggressive",
        }
    }

    /// Lowest per-leg adjusted probability parlay assembly will accept.
    pub fn min_leg_probability(&self) -> f64 {
        match self {
            RiskProfile::Conservative => 0.55,
            RiskProfile::Balanced => 0.45,
            RiskProfile::Aggressive => 0.30,
        }
    }

    /// Maximum legs drawn from one game.
    pub fn max_legs_per_game(&self) -> usize {
        match self {
            RiskProfile::Conservative => 1,
            RiskProfile::Balanced => 2,
            RiskProfile::Aggressive => 3,
        }
    }
}

// ============================================================================
// Market Rows (persistence collaborator output)
// ============================================================================

/// Game metadata needed to price legs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Game {
    pub game_id: String,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub status: String,
    /// `Some(true)` for domes and arenas, `None` when the venue is unknown
    pub venue_indoor: Option<bool>,
    pub home_rest_days: Option<i32>,
    pub away_rest_days: Option<i32>,
}

impl Game {
    pub fn is_outdoor(&self) -> bool {
        match self.venue_indoor {
            Some(indoor) => !indoor,
            None => self.sport.typically_outdoor(),
        }
    }
}

/// One bookmaker price for one outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OddsRow {
    pub game_id: String,
    pub market_type: MarketType,
    pub bookmaker: String,
    pub outcome: String,
    pub point: Option<f64>,
    pub american_odds: i32,
    /// Player (or other subject) a prop is priced on; `None` for game markets
    pub participant: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl OddsRow {
    /// Normalised participant used in grouping keys.
    pub fn participant_key(&self) -> Option<String> {
        participant_key(self.participant.as_deref())
    }
}

fn participant_key(participant: Option<&str>) -> Option<String> {
    participant
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
}

/// Which side of a game an outcome backs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegSide {
    Home,
    Away,
    Over,
    Under,
    Other,
}

impl LegSide {
    pub fn resolve(outcome: &str, game: &Game) -> Self {
        let outcome = outcome.trim();
        if outcome.eq_ignore_ascii_case(&game.home_team) {
            LegSide::Home
        } else if outcome.eq_ignore_ascii_case(&game.away_team) {
            LegSide::Away
        } else if outcome.eq_ignore_ascii_case("over") {
            LegSide::Over
        } else if outcome.eq_ignore_ascii_case("under") {
            LegSide::Under
        } else {
            LegSide::Other
        }
    }

    pub fn is_team(&self) -> bool {
        matches!(self, LegSide::Home | LegSide::Away)
    }
}

// ============================================================================
// Legs
// ============================================================================

/// A single priced selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Leg {
    pub game_id: String,
    pub market_type: MarketType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant: Option<String>,
    pub outcome: String,
    pub point: Option<f64>,
    pub american_odds: i32,
    pub decimal_odds: f64,
    pub implied_prob: f64,
    pub adjusted_prob: f64,
    pub edge: f64,
    pub confidence_score: f64,
}

impl Leg {
    /// Build a leg from a raw price and a model probability. The implied
    /// probability here still carries the bookmaker margin.
    pub fn from_american(
        game_id: &str,
        market_type: MarketType,
        outcome: &str,
        point: Option<f64>,
        american_odds: i32,
        adjusted_prob: f64,
    ) -> ParlayResult<Self> {
        let decimal_odds = odds::american_to_decimal(american_odds)?;
        let implied_prob = 1.0 / decimal_odds;
        let leg = Self {
            game_id: game_id.to_string(),
            market_type,
            participant: None,
            outcome: outcome.to_string(),
            point,
            american_odds,
            decimal_odds,
            implied_prob,
            adjusted_prob,
            edge: adjusted_prob - implied_prob,
            confidence_score: adjusted_prob * 100.0,
        };
        leg.validate()?;
        Ok(leg)
    }

    /// Replace the margin-inclusive implied probability with the no-vig one
    /// and recompute the edge against it.
    pub fn with_fair_implied(mut self, fair_implied_prob: f64) -> Self {
        self.implied_prob = fair_implied_prob;
        self.edge = self.adjusted_prob - fair_implied_prob;
        self
    }

    pub fn with_participant(mut self, participant: Option<String>) -> Self {
        self.participant = participant;
        self
    }

    /// Canonical identifier; sorting on it gives an order-independent view of
    /// a leg set.
    pub fn key(&self) -> String {
        let mut key = format!("{}|{}", self.game_id, self.market_type.key());
        if let Some(participant) = participant_key(self.participant.as_deref()) {
            key.push('|');
            key.push_str(&participant);
        }
        key.push('|');
        key.push_str(&self.outcome.to_lowercase());
        if let Some(point) = self.point {
            key.push_str(&format!("|{:+.1}", point));
        }
        key
    }

    /// Boundary check applied before any leg reaches the simulation.
    pub fn validate(&self) -> ParlayResult<()> {
        let invalid = |reason: String| ParlayError::InvalidLeg {
            leg: self.key(),
            reason,
        };
        if self.game_id.trim().is_empty() {
            return Err(invalid("empty game_id".to_string()));
        }
        if !self.adjusted_prob.is_finite() || self.adjusted_prob <= 0.0 || self.adjusted_prob >= 1.0 {
            return Err(invalid(format!(
                "adjusted_prob {} outside (0, 1)",
                self.adjusted_prob
            )));
        }
        if !self.decimal_odds.is_finite() || self.decimal_odds <= 1.0 {
            return Err(invalid(format!(
                "decimal_odds {} must exceed 1.0",
                self.decimal_odds
            )));
        }
        Ok(())
    }
}

/// A leg with the ranking metadata used to build the candidate pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateLeg {
    pub leg: Leg,
    pub sport: Sport,
    pub home_team: String,
    pub away_team: String,
    pub commence_time: DateTime<Utc>,
    pub bookmaker: String,
    pub value_score: f64,
    pub freshness_score: f64,
    pub sample_size_score: f64,
    pub confidence_meter: ConfidenceMeter,
    pub explanation: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn game() -> Game {
        Game {
            game_id: "g1".to_string(),
            sport: Sport::NFL,
            home_team: "Kansas City Chiefs".to_string(),
            away_team: "Buffalo Bills".to_string(),
            commence_time: Utc.with_ymd_and_hms(2026, 10, 25, 17, 0, 0).unwrap(),
            status: "scheduled".to_string(),
            venue_indoor: None,
            home_rest_days: None,
            away_rest_days: None,
        }
    }

    #[test]
    fn test_sport_from_key() {
        assert_eq!(Sport::from_key("americanfootball_nfl"), Some(Sport::NFL));
        assert_eq!(Sport::from_key("NBA"), Some(Sport::NBA));
        assert_eq!(Sport::from_key("soccer_epl"), Some(Sport::Soccer));
        assert_eq!(Sport::from_key("cricket_ipl"), None);
    }

    #[test]
    fn test_leg_side_resolution() {
        let g = game();
        assert_eq!(LegSide::resolve("kansas city chiefs", &g), LegSide::Home);
        assert_eq!(LegSide::resolve("Buffalo Bills", &g), LegSide::Away);
        assert_eq!(LegSide::resolve("Over", &g), LegSide::Over);
        assert_eq!(LegSide::resolve("Patrick Mahomes", &g), LegSide::Other);
    }

    #[test]
    fn test_outdoor_uses_venue_over_sport_default() {
        let mut g = game();
        assert!(g.is_outdoor());
        g.venue_indoor = Some(true);
        assert!(!g.is_outdoor());
    }

    #[test]
    fn test_leg_from_american() {
        let leg = Leg::from_american("g1", MarketType::Moneyline, "KC", None, -150, 0.65).unwrap();
        assert!((leg.decimal_odds - 1.6667).abs() < 1e-3);
        assert!((leg.implied_prob - 0.6).abs() < 1e-9);
        assert!((leg.edge - 0.05).abs() < 1e-9);
    }

    #[test]
    fn test_leg_rejects_bad_probability() {
        let result = Leg::from_american("g1", MarketType::Moneyline, "KC", None, -150, 1.2);
        assert!(matches!(result, Err(ParlayError::InvalidLeg { .. })));
    }

    #[test]
    fn test_leg_key_is_case_insensitive_on_outcome() {
        let a = Leg::from_american("g1", MarketType::Total, "Over", Some(47.5), -110, 0.5).unwrap();
        let b = Leg::from_american("g1", MarketType::Total, "over", Some(47.5), -110, 0.5).unwrap();
        assert_eq!(a.key(), b.key());
        assert_eq!(a.key(), "g1|totals|over|+47.5");
    }

    #[test]
    fn test_leg_key_separates_prop_participants() {
        let prop = MarketType::from_key("player_points");
        let tatum = Leg::from_american("g1", prop.clone(), "Over", Some(24.5), -110, 0.5)
            .unwrap()
            .with_participant(Some("Jayson Tatum".to_string()));
        let brown = Leg::from_american("g1", prop, "Over", Some(24.5), -110, 0.5)
            .unwrap()
            .with_participant(Some("Jaylen Brown".to_string()));
        assert_ne!(tatum.key(), brown.key());
        assert_eq!(tatum.key(), "g1|player_points|jayson tatum|over|+24.5");
    }

    #[test]
    fn test_risk_profile_limits_tighten_with_caution() {
        assert!(
            RiskProfile::Conservative.min_leg_probability()
                > RiskProfile::Aggressive.min_leg_probability()
        );
        assert_eq!(RiskProfile::default(), RiskProfile::Balanced);
    }
}
