//! Comparative team strength with a per-pair memo.
//!
//! The memo is keyed by the unordered team pair (lowercased, sorted), so
//! `(A, B)` and `(B, A)` share one entry; the stored value is oriented to the
//! sorted order and flipped on the way out. Recomputing an entry is harmless,
//! concurrent writers simply overwrite each other with equal values.

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::signals::{lookup_with_timeout, TeamRecord, TeamStatsProvider};

/// Games counted as "recent form".
pub const RECENT_FORM_WINDOW: usize = 5;
/// Weight of one recent-win difference relative to win percentage.
pub const RECENT_FORM_WEIGHT: f64 = 0.1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamStrength {
    pub team1_win_pct: f64,
    pub team2_win_pct: f64,
    /// Wins in the last five games
    pub team1_recent_form: u32,
    pub team2_recent_form: u32,
    /// Positive when team 1 is stronger
    pub strength_diff: f64,
    pub team1_games_played: u32,
    pub team2_games_played: u32,
}

impl TeamStrength {
    pub fn from_records(team1: &TeamRecord, team2: &TeamRecord) -> Self {
        let team1_win_pct = team1.win_pct();
        let team2_win_pct = team2.win_pct();
        let team1_recent_form = team1.recent_wins(RECENT_FORM_WINDOW);
        let team2_recent_form = team2.recent_wins(RECENT_FORM_WINDOW);
        let strength_diff = (team1_win_pct - team2_win_pct)
            + RECENT_FORM_WEIGHT * (team1_recent_form as f64 - team2_recent_form as f64);
        Self {
            team1_win_pct,
            team2_win_pct,
            team1_recent_form,
            team2_recent_form,
            strength_diff,
            team1_games_played: team1.games_played(),
            team2_games_played: team2.games_played(),
        }
    }

    /// Same comparison seen from the other team.
    pub fn swapped(&self) -> Self {
        Self {
            team1_win_pct: self.team2_win_pct,
            team2_win_pct: self.team1_win_pct,
            team1_recent_form: self.team2_recent_form,
            team2_recent_form: self.team1_recent_form,
            strength_diff: -self.strength_diff,
            team1_games_played: self.team2_games_played,
            team2_games_played: self.team1_games_played,
        }
    }
}

/// Memo key for an unordered pair, and whether `(a, b)` is the reverse of
/// the stored orientation.
fn pair_key(team_a: &str, team_b: &str) -> (String, bool) {
    let a = team_a.trim().to_lowercase();
    let b = team_b.trim().to_lowercase();
    if a <= b {
        (format!("{}:{}", a, b), false)
    } else {
        (format!("{}:{}", b, a), true)
    }
}

pub struct TeamStrengthService {
    stats: Arc<dyn TeamStatsProvider>,
    lookup_timeout: Duration,
    memo: RwLock<FxHashMap<String, TeamStrength>>,
}

impl TeamStrengthService {
    pub fn new(stats: Arc<dyn TeamStatsProvider>, lookup_timeout: Duration) -> Self {
        Self {
            stats,
            lookup_timeout,
            memo: RwLock::new(FxHashMap::default()),
        }
    }

    /// Strength of `team_a` relative to `team_b`.
    ///
    /// `None` when either record is unavailable; that outcome is not memoized
    /// so a later call can still succeed.
    pub async fn get_team_strength(&self, team_a: &str, team_b: &str) -> Option<TeamStrength> {
        let (key, reversed) = pair_key(team_a, team_b);

        if let Some(hit) = self.memo.read().get(&key).cloned() {
            return Some(if reversed { hit.swapped() } else { hit });
        }

        let (first, second) = if reversed {
            (team_b, team_a)
        } else {
            (team_a, team_b)
        };

        let (first_record, second_record) = tokio::join!(
            lookup_with_timeout("team stats", self.lookup_timeout, self.stats.team_record(first)),
            lookup_with_timeout("team stats", self.lookup_timeout, self.stats.team_record(second)),
        );

        let (Some(first_record), Some(second_record)) = (first_record, second_record) else {
            debug!("No team strength for {} vs {}: stats unavailable", team_a, team_b);
            return None;
        };

        let strength = TeamStrength::from_records(&first_record, &second_record);
        self.memo.write().insert(key, strength.clone());

        Some(if reversed { strength.swapped() } else { strength })
    }

    /// Number of memoized pairs.
    pub fn len(&self) -> usize {
        self.memo.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedStats {
        records: HashMap<String, TeamRecord>,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TeamStatsProvider for FixedStats {
        async fn team_record(&self, team: &str) -> Option<TeamRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.records.get(team).cloned()
        }
    }

    fn provider() -> Arc<FixedStats> {
        let mut records = HashMap::new();
        records.insert(
            "KC".to_string(),
            TeamRecord {
                wins: 8,
                losses: 2,
                recent_results: vec![true, true, true, true, false],
            },
        );
        records.insert(
            "BUF".to_string(),
            TeamRecord {
                wins: 5,
                losses: 5,
                recent_results: vec![true, false, false, true, false],
            },
        );
        Arc::new(FixedStats {
            records,
            calls: AtomicUsize::new(0),
        })
    }

    #[tokio::test]
    async fn test_strength_diff_formula() {
        let service = TeamStrengthService::new(provider(), Duration::from_secs(1));
        let s = service.get_team_strength("KC", "BUF").await.unwrap();
        // (0.8 - 0.5) + 0.1 * (4 - 2) = 0.5
        assert!((s.strength_diff - 0.5).abs() < 1e-9);
        assert_eq!(s.team1_recent_form, 4);
        assert_eq!(s.team2_recent_form, 2);
    }

    #[tokio::test]
    async fn test_memo_is_shared_by_unordered_pair() {
        let stats = provider();
        let service = TeamStrengthService::new(stats.clone(), Duration::from_secs(1));

        let forward = service.get_team_strength("KC", "BUF").await.unwrap();
        let calls_after_first = stats.calls.load(Ordering::SeqCst);
        let backward = service.get_team_strength("BUF", "KC").await.unwrap();

        assert_eq!(stats.calls.load(Ordering::SeqCst), calls_after_first);
        assert_eq!(service.len(), 1);
        assert!((forward.strength_diff + backward.strength_diff).abs() < 1e-12);
        assert_eq!(forward.team1_win_pct, backward.team2_win_pct);
    }

    #[tokio::test]
    async fn test_missing_stats_is_none_and_not_memoized() {
        let service = TeamStrengthService::new(provider(), Duration::from_secs(1));
        assert!(service.get_team_strength("KC", "NYJ").await.is_none());
        assert!(service.is_empty());
    }

    #[test]
    fn test_pair_key_orientation() {
        assert_eq!(pair_key("KC", "BUF"), ("buf:kc".to_string(), true));
        assert_eq!(pair_key("buf", "kc"), ("buf:kc".to_string(), false));
    }
}
