//! Blend of model probability and market-implied probability.
//!
//! The model weight shrinks with stale data and thin samples, and is always
//! kept inside `[min_w, max_w]` so neither source is ever ignored entirely.

use serde::{Deserialize, Serialize};

/// Discrete confidence bucket over the blended probability (percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ConfidenceMeter {
    /// Below 50%
    Low,
    #[serde(rename = "50-60")]
    Fifty,
    #[serde(rename = "60-70")]
    Sixty,
    #[serde(rename = "70-80")]
    Seventy,
    #[serde(rename = "80-90")]
    Eighty,
    #[serde(rename = "90+")]
    NinetyPlus,
}

impl ConfidenceMeter {
    pub fn from_probability(prob: f64) -> Self {
        let pct = prob * 100.0;
        if pct >= 90.0 {
            ConfidenceMeter::NinetyPlus
        } else if pct >= 80.0 {
            ConfidenceMeter::Eighty
        } else if pct >= 70.0 {
            ConfidenceMeter::Seventy
        } else if pct >= 60.0 {
            ConfidenceMeter::Sixty
        } else if pct >= 50.0 {
            ConfidenceMeter::Fifty
        } else {
            ConfidenceMeter::Low
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ConfidenceMeter::Low => "<50",
            ConfidenceMeter::Fifty => "50-60",
            ConfidenceMeter::Sixty => "60-70",
            ConfidenceMeter::Seventy => "70-80",
            ConfidenceMeter::Eighty => "80-90",
            ConfidenceMeter::NinetyPlus => "90+",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlendResult {
    pub final_prob: f64,
    pub confidence_meter: ConfidenceMeter,
    pub explanation: String,
    pub w_used: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ConfidenceEngine {
    pub base_w: f64,
    pub min_w: f64,
    pub max_w: f64,
}

impl Default for ConfidenceEngine {
    fn default() -> Self {
        Self {
            base_w: 0.6,
            min_w: 0.2,
            max_w: 0.9,
        }
    }
}

impl ConfidenceEngine {
    pub fn new(base_w: f64, min_w: f64, max_w: f64) -> Self {
        Self { base_w, min_w, max_w }
    }

    /// Model weight for the given data quality scores.
    pub fn weight(&self, data_freshness_score: f64, sample_size_score: f64) -> f64 {
        let freshness = sanitize_score(data_freshness_score);
        let sample_size = sanitize_score(sample_size_score);
        (self.base_w * freshness * sample_size).clamp(self.min_w, self.max_w)
    }

    pub fn blend(
        &self,
        model_prob: f64,
        implied_prob: f64,
        data_freshness_score: f64,
        sample_size_score: f64,
    ) -> BlendResult {
        let w = self.weight(data_freshness_score, sample_size_score);
        let model = sanitize_prob(model_prob);
        let implied = sanitize_prob(implied_prob);
        let final_prob = (w * model + (1.0 - w) * implied).clamp(0.0, 1.0);
        let confidence_meter = ConfidenceMeter::from_probability(final_prob);

        let explanation = format!(
            "model {:.1}% vs market {:.1}% blended at w={:.2} (freshness {:.2}, sample {:.2}) -> {:.1}% [{}]",
            model * 100.0,
            implied * 100.0,
            w,
            sanitize_score(data_freshness_score),
            sanitize_score(sample_size_score),
            final_prob * 100.0,
            confidence_meter.label()
        );

        BlendResult {
            final_prob,
            confidence_meter,
            explanation,
            w_used: w,
        }
    }
}

/// Scores are multiplicative factors; non-finite or negative input counts as 0.
fn sanitize_score(score: f64) -> f64 {
    if score.is_finite() {
        score.max(0.0)
    } else {
        0.0
    }
}

fn sanitize_prob(prob: f64) -> f64 {
    if prob.is_finite() {
        prob.clamp(0.0, 1.0)
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blend_with_full_quality_data() {
        let engine = ConfidenceEngine::default();
        let result = engine.blend(0.70, 0.60, 1.0, 1.0);
        assert!((result.w_used - 0.6).abs() < 1e-12);
        // 0.6 * 0.7 + 0.4 * 0.6 = 0.66
        assert!((result.final_prob - 0.66).abs() < 1e-12);
        assert_eq!(result.confidence_meter, ConfidenceMeter::Sixty);
    }

    #[test]
    fn test_weight_floors_at_min_w() {
        let engine = ConfidenceEngine::default();
        let result = engine.blend(0.9, 0.5, 0.1, 0.1);
        assert!((result.w_used - 0.2).abs() < 1e-12);
    }

    #[test]
    fn test_weight_caps_at_max_w() {
        let engine = ConfidenceEngine::default();
        assert!((engine.weight(5.0, 5.0) - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_blend_bounds_hold_for_hostile_inputs() {
        let engine = ConfidenceEngine::default();
        let inputs = [
            (1.5, -0.2, 1.0, 1.0),
            (f64::NAN, 0.4, f64::INFINITY, 0.5),
            (0.0, 1.0, -3.0, 2.0),
            (0.99, 0.99, 0.7, 0.8),
        ];
        for (model, implied, fresh, sample) in inputs {
            let r = engine.blend(model, implied, fresh, sample);
            assert!((0.0..=1.0).contains(&r.final_prob), "{:?}", r);
            assert!(r.w_used >= engine.min_w && r.w_used <= engine.max_w);
        }
    }

    #[test]
    fn test_lower_freshness_never_increases_weight() {
        let engine = ConfidenceEngine::default();
        for sample in [0.3, 0.6, 1.0, 1.4] {
            let mut previous = f64::INFINITY;
            for step in (0..=20).rev() {
                let freshness = step as f64 / 10.0;
                let w = engine.weight(freshness, sample);
                assert!(w <= previous);
                previous = w;
            }
        }
    }

    #[test]
    fn test_blend_is_pure() {
        let engine = ConfidenceEngine::default();
        assert_eq!(
            engine.blend(0.63, 0.58, 0.8, 0.9),
            engine.blend(0.63, 0.58, 0.8, 0.9)
        );
    }

    #[test]
    fn test_meter_buckets() {
        assert_eq!(ConfidenceMeter::from_probability(0.55), ConfidenceMeter::Fifty);
        assert_eq!(ConfidenceMeter::from_probability(0.70), ConfidenceMeter::Seventy);
        assert_eq!(ConfidenceMeter::from_probability(0.95), ConfidenceMeter::NinetyPlus);
        assert_eq!(ConfidenceMeter::from_probability(0.42), ConfidenceMeter::Low);
    }
}
