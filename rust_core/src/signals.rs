//! External data collaborators: team records, weather and injuries.
//!
//! Every provider answers `Option`; a missing answer means "no adjustment".
//! Providers that are not configured are replaced by the `Null*` types at
//! construction time so adjustment code never branches on presence.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::models::Game;

/// Season record and recent results for one team.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamRecord {
    pub wins: u32,
    pub losses: u32,
    /// Most recent result first, `true` = win
    pub recent_results: Vec<bool>,
}

impl TeamRecord {
    pub fn games_played(&self) -> u32 {
        self.wins + self.losses
    }

    pub fn win_pct(&self) -> f64 {
        let played = self.games_played();
        if played == 0 {
            0.5
        } else {
            self.wins as f64 / played as f64
        }
    }

    /// Wins over the last `window` games.
    pub fn recent_wins(&self, window: usize) -> u32 {
        self.recent_results
            .iter()
            .take(window)
            .filter(|won| **won)
            .count() as u32
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherReport {
    pub wind_mph: f64,
    pub precipitation_prob: f64,
    pub temperature_f: f64,
}

impl WeatherReport {
    /// Conditions strong enough to suppress scoring and favour underdogs.
    pub fn is_material(&self) -> bool {
        self.wind_mph >= 15.0 || self.precipitation_prob >= 0.5 || self.temperature_f <= 20.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InjuryImpact {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InjuryReport {
    pub team: String,
    pub player: String,
    pub impact: InjuryImpact,
}

#[async_trait]
pub trait TeamStatsProvider: Send + Sync {
    async fn team_record(&self, team: &str) -> Option<TeamRecord>;
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn forecast(&self, game: &Game) -> Option<WeatherReport>;
}

#[async_trait]
pub trait InjuryProvider: Send + Sync {
    async fn injuries(&self, game: &Game) -> Option<Vec<InjuryReport>>;
}

pub struct NullTeamStats;

#[async_trait]
impl TeamStatsProvider for NullTeamStats {
    async fn team_record(&self, _team: &str) -> Option<TeamRecord> {
        None
    }
}

pub struct NullWeather;

#[async_trait]
impl WeatherProvider for NullWeather {
    async fn forecast(&self, _game: &Game) -> Option<WeatherReport> {
        None
    }
}

pub struct NullInjuries;

#[async_trait]
impl InjuryProvider for NullInjuries {
    async fn injuries(&self, _game: &Game) -> Option<Vec<InjuryReport>> {
        None
    }
}

/// Await a provider lookup, turning a timeout into `None`.
pub async fn lookup_with_timeout<T, F>(label: &str, timeout: Duration, fut: F) -> Option<T>
where
    F: Future<Output = Option<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(value) => value,
        Err(_) => {
            warn!(
                "{} lookup timed out after {}ms, continuing without it",
                label,
                timeout.as_millis()
            );
            None
        }
    }
}

/// Signals gathered once per game and shared by all of its legs.
#[derive(Debug, Clone, Default)]
pub struct GameSignals {
    pub strength: Option<crate::team_strength::TeamStrength>,
    pub weather: Option<WeatherReport>,
    pub injuries: Vec<InjuryReport>,
    /// Fewer of the two teams' games played, when both are known
    pub min_games_played: Option<u32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowStats;

    #[async_trait]
    impl TeamStatsProvider for SlowStats {
        async fn team_record(&self, _team: &str) -> Option<TeamRecord> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Some(TeamRecord {
                wins: 1,
                losses: 0,
                recent_results: vec![true],
            })
        }
    }

    #[test]
    fn test_team_record_stats() {
        let record = TeamRecord {
            wins: 6,
            losses: 2,
            recent_results: vec![true, true, false, true, false, true, true],
        };
        assert!((record.win_pct() - 0.75).abs() < 1e-9);
        assert_eq!(record.recent_wins(5), 3);
        assert_eq!(record.games_played(), 8);
    }

    #[test]
    fn test_empty_record_is_neutral() {
        let record = TeamRecord {
            wins: 0,
            losses: 0,
            recent_results: vec![],
        };
        assert_eq!(record.win_pct(), 0.5);
        assert_eq!(record.recent_wins(5), 0);
    }

    #[test]
    fn test_weather_materiality() {
        let calm = WeatherReport {
            wind_mph: 5.0,
            precipitation_prob: 0.1,
            temperature_f: 60.0,
        };
        assert!(!calm.is_material());
        let windy = WeatherReport {
            wind_mph: 22.0,
            ..calm.clone()
        };
        assert!(windy.is_material());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_timeout_yields_none() {
        let provider = SlowStats;
        let result = lookup_with_timeout(
            "team stats",
            Duration::from_millis(200),
            provider.team_record("KC"),
        )
        .await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_null_providers_return_none() {
        assert!(NullTeamStats.team_record("KC").await.is_none());
    }
}
