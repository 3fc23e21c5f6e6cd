//! Price conversion and margin removal.
//!
//! American odds are the provider format. A market's outcomes are grouped by
//! `(bookmaker, game, market, participant, |point|)` so both sides of a spread (`-3.5` / `+3.5`) and
//! both sides of a total share a group, then normalised to sum to one.

use std::collections::HashMap;

use crate::error::{ParlayError, ParlayResult};
use crate::models::OddsRow;

/// Convert American odds to decimal odds.
///
/// `|odds| < 100` is not a valid American price.
pub fn american_to_decimal(american: i32) -> ParlayResult<f64> {
    if american.unsigned_abs() < 100 {
        return Err(ParlayError::InvalidOdds(format!(
            "american odds {} must be <= -100 or >= +100",
            american
        )));
    }
    let odds = american as f64;
    Ok(if odds > 0.0 {
        1.0 + odds / 100.0
    } else {
        1.0 + 100.0 / odds.abs()
    })
}

/// Convert decimal odds back to the nearest American price.
pub fn decimal_to_american(decimal: f64) -> ParlayResult<i32> {
    if !decimal.is_finite() || decimal <= 1.0 {
        return Err(ParlayError::InvalidOdds(format!(
            "decimal odds {} must exceed 1.0",
            decimal
        )));
    }
    let american = if decimal >= 2.0 {
        (decimal - 1.0) * 100.0
    } else {
        -100.0 / (decimal - 1.0)
    };
    Ok(american.round() as i32)
}

/// Implied probability of an American price, margin included.
pub fn implied_probability(american: i32) -> ParlayResult<f64> {
    Ok(1.0 / american_to_decimal(american)?)
}

/// Remove the bookmaker margin from a set of mutually exclusive outcomes.
///
/// A single outcome is returned unchanged (nothing to normalise against).
pub fn remove_vig(implied: &[f64]) -> Vec<f64> {
    let total: f64 = implied.iter().sum();
    if implied.len() < 2 || total <= 0.0 {
        return implied.to_vec();
    }
    implied.iter().map(|p| p / total).collect()
}

/// Bookmaker overround (sum of implied probabilities minus one).
pub fn overround(implied: &[f64]) -> f64 {
    implied.iter().sum::<f64>() - 1.0
}

/// Key grouping the outcomes of one market line. Player props are split
/// per participant so each player's Over/Under forms its own market.
fn market_line_key(row: &OddsRow) -> String {
    let mut key = format!("{}|{}|{}", row.bookmaker, row.game_id, row.market_type.key());
    if let Some(participant) = row.participant_key() {
        key.push('|');
        key.push_str(&participant);
    }
    if let Some(point) = row.point {
        key.push_str(&format!("|{:.1}", point.abs()));
    }
    key
}

/// No-vig probability for every row, index-aligned with `rows`.
///
/// Rows whose price is invalid are reported as errors in place so the caller
/// can drop them at the boundary.
pub fn no_vig_probabilities(rows: &[OddsRow]) -> Vec<ParlayResult<f64>> {
    let mut groups: HashMap<String, Vec<usize>> = HashMap::new();
    for (idx, row) in rows.iter().enumerate() {
        groups.entry(market_line_key(row)).or_default().push(idx);
    }

    let mut out: Vec<ParlayResult<f64>> = rows
        .iter()
        .map(|row| implied_probability(row.american_odds))
        .collect();

    for indices in groups.values() {
        let valid: Vec<usize> = indices
            .iter()
            .copied()
            .filter(|i| out[*i].is_ok())
            .collect();
        let implied: Vec<f64> = valid
            .iter()
            .map(|i| *out[*i].as_ref().unwrap_or(&0.0))
            .collect();
        for (i, p) in valid.iter().zip(remove_vig(&implied)) {
            out[*i] = Ok(p);
        }
    }
    out
}
