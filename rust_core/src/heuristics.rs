//! Heuristic adjustment of a no-vig market probability.
//!
//! Adjustments are applied in a fixed order so the same inputs always give
//! the same output:
//!
//! 1. no-vig implied probability of the backed side
//! 2. team strength (`strength_diff * 0.05`, signed toward the backed side)
//! 3. sport situational hook (venue, rest)
//! 4. weather (±0.02, outdoor games with material conditions)
//! 5. injuries (−0.03 high / −0.015 medium on the backed side, mirrored for
//!    the opponent)
//! 6. market-inefficiency pull toward 0.5 for prices far from it
//! 7. tail damping (×0.98 above 0.85 implied, ×1.02 below 0.15 implied)
//! 8. clamp to `[0.01, 0.99]`
//!
//! A signal that is missing contributes exactly zero.

use serde::{Deserialize, Serialize};

use crate::models::{Game, LegSide, MarketType, Sport};
use crate::signals::{GameSignals, InjuryImpact};

/// Everything the adjuster needs to know about one leg.
#[derive(Debug, Clone, Copy)]
pub struct LegContext<'a> {
    pub game: &'a Game,
    pub market_type: &'a MarketType,
    pub side: LegSide,
    pub signals: &'a GameSignals,
}

impl LegContext<'_> {
    /// +1 for the home side, -1 for the away side, 0 otherwise.
    fn team_sign(&self) -> f64 {
        if !self.market_type.is_team_side() {
            return 0.0;
        }
        match self.side {
            LegSide::Home => 1.0,
            LegSide::Away => -1.0,
            _ => 0.0,
        }
    }

    fn backed_and_opponent_rest(&self) -> Option<(i32, i32)> {
        let home = self.game.home_rest_days?;
        let away = self.game.away_rest_days?;
        match self.side {
            LegSide::Home => Some((home, away)),
            LegSide::Away => Some((away, home)),
            _ => None,
        }
    }
}

// ============================================================================
// Situational hooks
// ============================================================================

/// Sport-specific situational adjustment (venue, rest, travel).
pub trait SituationalAdjustment: Send + Sync {
    fn supports(&self, sport: Sport) -> bool;
    fn adjust(&self, ctx: &LegContext<'_>) -> f64;
    fn name(&self) -> &str;
}

/// Home edge plus rest differential, with an optional back-to-back penalty.
pub struct RestAndVenueAdjustment {
    name: &'static str,
    sports: Vec<Sport>,
    home_edge: f64,
    rest_day_value: f64,
    max_rest_days_counted: i32,
    back_to_back_penalty: f64,
}

impl RestAndVenueAdjustment {
    pub fn football() -> Self {
        Self {
            name: "football",
            sports: vec![Sport::NFL, Sport::NCAAF],
            home_edge: 0.015,
            rest_day_value: 0.004,
            max_rest_days_counted: 4,
            back_to_back_penalty: 0.0,
        }
    }

    pub fn basketball() -> Self {
        Self {
            name: "basketball",
            sports: vec![Sport::NBA, Sport::NCAAB],
            home_edge: 0.012,
            rest_day_value: 0.005,
            max_rest_days_counted: 2,
            back_to_back_penalty: 0.02,
        }
    }

    pub fn hockey() -> Self {
        Self {
            name: "hockey",
            sports: vec![Sport::NHL],
            home_edge: 0.01,
            rest_day_value: 0.004,
            max_rest_days_counted: 2,
            back_to_back_penalty: 0.015,
        }
    }

    pub fn baseball() -> Self {
        Self {
            name: "baseball",
            sports: vec![Sport::MLB],
            home_edge: 0.006,
            rest_day_value: 0.0,
            max_rest_days_counted: 0,
            back_to_back_penalty: 0.0,
        }
    }

    pub fn soccer() -> Self {
        Self {
            name: "soccer",
            sports: vec![Sport::MLS, Sport::Soccer],
            home_edge: 0.012,
            rest_day_value: 0.003,
            max_rest_days_counted: 3,
            back_to_back_penalty: 0.0,
        }
    }
}

impl SituationalAdjustment for RestAndVenueAdjustment {
    fn supports(&self, sport: Sport) -> bool {
        self.sports.contains(&sport)
    }

    fn adjust(&self, ctx: &LegContext<'_>) -> f64 {
        let sign = ctx.team_sign();
        if sign == 0.0 {
            return 0.0;
        }

        let mut adj = sign * self.home_edge;

        if let Some((own, opp)) = ctx.backed_and_opponent_rest() {
            let cap = self.max_rest_days_counted;
            let diff = (own.clamp(0, cap) - opp.clamp(0, cap)) as f64;
            adj += diff * self.rest_day_value;
            if own == 0 {
                adj -= self.back_to_back_penalty;
            }
            if opp == 0 {
                adj += self.back_to_back_penalty;
            }
        }
        adj
    }

    fn name(&self) -> &str {
        self.name
    }
}

/// Picks the first registered hook that supports the game's sport.
pub struct SituationalRegistry {
    hooks: Vec<Box<dyn SituationalAdjustment>>,
}

impl SituationalRegistry {
    pub fn new() -> Self {
        let hooks: Vec<Box<dyn SituationalAdjustment>> = vec![
            Box::new(RestAndVenueAdjustment::football()),
            Box::new(RestAndVenueAdjustment::basketball()),
            Box::new(RestAndVenueAdjustment::hockey()),
            Box::new(RestAndVenueAdjustment::baseball()),
            Box::new(RestAndVenueAdjustment::soccer()),
        ];
        Self { hooks }
    }

    pub fn empty() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Later registrations take precedence over the defaults.
    pub fn register(&mut self, hook: Box<dyn SituationalAdjustment>) {
        self.hooks.insert(0, hook);
    }

    pub fn adjustment(&self, ctx: &LegContext<'_>) -> f64 {
        self.hooks
            .iter()
            .find(|hook| hook.supports(ctx.game.sport))
            .map(|hook| hook.adjust(ctx))
            .unwrap_or(0.0)
    }
}

impl Default for SituationalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Adjuster
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeuristicsConfig {
    pub strength_weight: f64,
    pub weather_adjustment: f64,
    pub injury_high: f64,
    pub injury_medium: f64,
    /// Net injury adjustment is bounded by this magnitude
    pub injury_cap: f64,
    /// Distance from 0.5 beyond which the inefficiency pull starts
    pub inefficiency_threshold: f64,
    pub inefficiency_rate: f64,
    pub inefficiency_cap: f64,
    pub high_tail: f64,
    pub low_tail: f64,
    pub high_tail_factor: f64,
    pub low_tail_factor: f64,
    pub floor: f64,
    pub ceiling: f64,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            strength_weight: 0.05,
            weather_adjustment: 0.02,
            injury_high: 0.03,
            injury_medium: 0.015,
            injury_cap: 0.09,
            inefficiency_threshold: 0.30,
            inefficiency_rate: 0.10,
            inefficiency_cap: 0.02,
            high_tail: 0.85,
            low_tail: 0.15,
            high_tail_factor: 0.98,
            low_tail_factor: 1.02,
            floor: 0.01,
            ceiling: 0.99,
        }
    }
}

/// Per-step contributions, for explanations and debugging.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdjustmentBreakdown {
    pub start: f64,
    pub strength: f64,
    pub situational: f64,
    pub weather: f64,
    pub injury: f64,
    pub inefficiency: f64,
    pub tail_factor: f64,
    pub final_prob: f64,
}

pub struct HeuristicsAdjuster {
    config: HeuristicsConfig,
    situational: SituationalRegistry,
}

impl HeuristicsAdjuster {
    pub fn new(config: HeuristicsConfig, situational: SituationalRegistry) -> Self {
        Self {
            config,
            situational,
        }
    }

    pub fn adjust(&self, implied_prob: f64, ctx: &LegContext<'_>) -> f64 {
        self.adjust_with_breakdown(implied_prob, ctx).final_prob
    }

    pub fn adjust_with_breakdown(&self, implied_prob: f64, ctx: &LegContext<'_>) -> AdjustmentBreakdown {
        let cfg = &self.config;
        let start = implied_prob.clamp(0.0, 1.0);

        let strength = ctx
            .signals
            .strength
            .as_ref()
            .map(|s| ctx.team_sign() * s.strength_diff * cfg.strength_weight)
            .unwrap_or(0.0);

        let situational = self.situational.adjustment(ctx);
        let weather = self.weather_adjustment(start, ctx);
        let injury = self.injury_adjustment(ctx);

        let mut p = start + strength + situational + weather + injury;

        let distance = (p - 0.5).abs();
        let inefficiency = if distance > cfg.inefficiency_threshold {
            let pull = ((distance - cfg.inefficiency_threshold) * cfg.inefficiency_rate)
                .min(cfg.inefficiency_cap);
            -(p - 0.5).signum() * pull
        } else {
            0.0
        };
        p += inefficiency;

        let tail_factor = if start > cfg.high_tail {
            cfg.high_tail_factor
        } else if start < cfg.low_tail {
            cfg.low_tail_factor
        } else {
            1.0
        };
        p *= tail_factor;

        AdjustmentBreakdown {
            start,
            strength,
            situational,
            weather,
            injury,
            inefficiency,
            tail_factor,
            final_prob: p.clamp(cfg.floor, cfg.ceiling),
        }
    }

    fn weather_adjustment(&self, start: f64, ctx: &LegContext<'_>) -> f64 {
        let material = ctx
            .signals
            .weather
            .as_ref()
            .map(|w| w.is_material())
            .unwrap_or(false);
        if !material || !ctx.game.is_outdoor() {
            return 0.0;
        }
        let w = self.config.weather_adjustment;
        match ctx.side {
            LegSide::Under => w,
            LegSide::Over => -w,
            LegSide::Home | LegSide::Away if ctx.market_type.is_team_side() => {
                // Bad weather compresses outcomes toward a coin flip
                if start > 0.5 {
                    -w
                } else if start < 0.5 {
                    w
                } else {
                    0.0
                }
            }
            _ => 0.0,
        }
    }

    fn injury_adjustment(&self, ctx: &LegContext<'_>) -> f64 {
        let sign = ctx.team_sign();
        if sign == 0.0 {
            return 0.0;
        }
        let cfg = &self.config;
        let mut home_penalty = 0.0;
        for injury in &ctx.signals.injuries {
            let value = match injury.impact {
                InjuryImpact::High => cfg.injury_high,
                InjuryImpact::Medium => cfg.injury_medium,
                InjuryImpact::Low => 0.0,
            };
            if injury.team.eq_ignore_ascii_case(&ctx.game.home_team) {
                home_penalty -= value;
            } else if injury.team.eq_ignore_ascii_case(&ctx.game.away_team) {
                home_penalty += value;
            }
        }
        (sign * home_penalty).clamp(-cfg.injury_cap, cfg.injury_cap)
    }
}

impl Default for HeuristicsAdjuster {
    fn default() -> Self {
        Self::new(HeuristicsConfig::default(), SituationalRegistry::new())
    }
}
