//! Betting market taxonomy.
//!
//! Odds providers key markets with short strings (`h2h`, `spreads`, `totals`,
//! `player_points`, ...). Everything downstream works with [`MarketType`] and
//! only converts back to the provider key at the persistence boundary.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Market a leg is priced in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketType {
    /// Straight winner (`h2h`)
    Moneyline,
    /// Point spread / handicap
    Spread,
    /// Game total over/under
    Total,
    /// Player proposition, keyed by the provider market key
    PlayerProp(String),
    /// Anything else the provider sends
    Other(String),
}

impl MarketType {
    /// Parse a provider market key.
    pub fn from_key(key: &str) -> Self {
        let key = key.trim().to_lowercase();
        match key.as_str() {
            "h2h" | "moneyline" | "ml" => Self::Moneyline,
            "spreads" | "spread" | "handicap" => Self::Spread,
            "totals" | "total" | "over_under" => Self::Total,
            k if k.starts_with("player_") => Self::PlayerProp(k.to_string()),
            k => Self::Other(k.to_string()),
        }
    }

    /// Provider market key.
    pub fn key(&self) -> &str {
        match self {
            Self::Moneyline => "h2h",
            Self::Spread => "spreads",
            Self::Total => "totals",
            Self::PlayerProp(k) | Self::Other(k) => k.as_str(),
        }
    }

    pub fn is_player_prop(&self) -> bool {
        matches!(self, Self::PlayerProp(_))
    }

    /// Markets whose outcomes name a team (team strength and injuries apply).
    pub fn is_team_side(&self) -> bool {
        matches!(self, Self::Moneyline | Self::Spread)
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_key_aliases() {
        assert_eq!(MarketType::from_key("h2h"), MarketType::Moneyline);
        assert_eq!(MarketType::from_key("Spreads"), MarketType::Spread);
        assert_eq!(MarketType::from_key(" totals "), MarketType::Total);
        assert_eq!(
            MarketType::from_key("player_pass_yds"),
            MarketType::PlayerProp("player_pass_yds".to_string())
        );
        assert_eq!(
            MarketType::from_key("alternate_spreads"),
            MarketType::Other("alternate_spreads".to_string())
        );
    }

    #[test]
    fn test_key_round_trip_for_core_markets() {
        for key in ["h2h", "spreads", "totals"] {
            assert_eq!(MarketType::from_key(key).key(), key);
        }
    }

    #[test]
    fn test_team_side_markets() {
        assert!(MarketType::Moneyline.is_team_side());
        assert!(MarketType::Spread.is_team_side());
        assert!(!MarketType::Total.is_team_side());
        assert!(MarketType::PlayerProp("player_points".into()).is_player_prop());
    }
}
