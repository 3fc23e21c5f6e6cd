use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WindowKind {
    Rolling,
    Week(u32),
}

/// Commence-time range searched for games.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub kind: WindowKind,
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        t >= self.start && t < self.end
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    pub lookback_hours: i64,
    pub lookahead_hours: i64,
    /// Kickoff of week 1; week windows are unavailable without it
    pub season_week_one_start: Option<DateTime<Utc>>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            lookback_hours: 3,
            lookahead_hours: 72,
            season_week_one_start: None,
        }
    }
}

impl WindowConfig {
    pub fn rolling(&self, now: DateTime<Utc>) -> TimeWindow {
        TimeWindow {
            start: now - Duration::hours(self.lookback_hours),
            end: now + Duration::hours(self.lookahead_hours),
            kind: WindowKind::Rolling,
        }
    }

    /// Seven-day window for `week` (1-based).
    pub fn week(&self, week: u32) -> Option<TimeWindow> {
        let season_start = self.season_week_one_start?;
        if week == 0 {
            return None;
        }
        let start = season_start + Duration::weeks(week as i64 - 1);
        Some(TimeWindow {
            start,
            end: start + Duration::weeks(1),
            kind: WindowKind::Week(week),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_rolling_window() {
        let now = Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap();
        let w = WindowConfig::default().rolling(now);
        assert_eq!(w.start, now - Duration::hours(3));
        assert_eq!(w.end, now + Duration::hours(72));
        assert!(w.contains(now));
        assert_eq!(w.kind, WindowKind::Rolling);
    }

    #[test]
    fn test_week_window() {
        let cfg = WindowConfig {
            season_week_one_start: Some(Utc.with_ymd_and_hms(2026, 9, 8, 0, 0, 0).unwrap()),
            ..Default::default()
        };
        let w = cfg.week(7).unwrap();
        assert_eq!(w.start, Utc.with_ymd_and_hms(2026, 10, 20, 0, 0, 0).unwrap());
        assert_eq!(w.end, Utc.with_ymd_and_hms(2026, 10, 27, 0, 0, 0).unwrap());
        assert!(cfg.week(0).is_none());
        assert!(WindowConfig::default().week(3).is_none());
    }
}
