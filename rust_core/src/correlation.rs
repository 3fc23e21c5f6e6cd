//! Joint hit probability of a parlay with same-game correlation.
//!
//! Legs are partitioned by `game_id`. Each game with two or more legs is
//! simulated as a correlated multivariate normal (leg `i` hits when
//! `z_i < Φ⁻¹(p_i)`); single-leg games contribute their probability exactly.
//! The parlay probability is the product over games.
//!
//! Without an explicit seed, every group is seeded from a hash of the sorted
//! leg keys, so the same leg set gives the same answer in any input order.

use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use tracing::{debug, warn};

use crate::error::{ParlayError, ParlayResult};
use crate::models::{Leg, RiskProfile};
use crate::stats::{cholesky, norm_inv};

pub const DEFAULT_SAME_GAME_CORRELATION: f64 = 0.3;
/// Coefficients are kept strictly below 1 so the matrix stays factorizable.
pub const MAX_SAME_GAME_CORRELATION: f64 = 0.99;

/// Off-diagonal shrink factor applied when factorization fails.
const SHRINK_FACTOR: f64 = 0.9;
const MAX_SHRINK_ATTEMPTS: usize = 20;

// ============================================================================
// Correlation model
// ============================================================================

/// Symmetric `n x n` correlation matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationMatrix {
    n: usize,
    values: Vec<f64>,
}

impl CorrelationMatrix {
    pub fn identity(n: usize) -> Self {
        let mut values = vec![0.0; n * n];
        for i in 0..n {
            values[i * n + i] = 1.0;
        }
        Self { n, values }
    }

    pub fn dim(&self) -> usize {
        self.n
    }

    pub fn get(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.values
    }

    fn shrink(&mut self, factor: f64) {
        for i in 0..self.n {
            for j in 0..self.n {
                if i != j {
                    self.values[i * self.n + j] *= factor;
                }
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ParlayCorrelationModel {
    same_game_correlation: f64,
}

impl ParlayCorrelationModel {
    /// Out-of-range coefficients are clamped to `[0, 0.99]`.
    pub fn new(same_game_correlation: f64) -> Self {
        let coefficient = if same_game_correlation.is_finite() {
            same_game_correlation.clamp(0.0, MAX_SAME_GAME_CORRELATION)
        } else {
            DEFAULT_SAME_GAME_CORRELATION
        };
        Self {
            same_game_correlation: coefficient,
        }
    }

    pub fn same_game_correlation(&self) -> f64 {
        self.same_game_correlation
    }

    pub fn pair_correlation(&self, a: &Leg, b: &Leg) -> f64 {
        if a.game_id == b.game_id {
            self.same_game_correlation
        } else {
            0.0
        }
    }

    pub fn build_correlation_matrix(&self, legs: &[&Leg]) -> CorrelationMatrix {
        let mut matrix = CorrelationMatrix::identity(legs.len());
        let n = legs.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let rho = self.pair_correlation(legs[i], legs[j]);
                matrix.values[i * n + j] = rho;
                matrix.values[j * n + i] = rho;
            }
        }
        matrix
    }
}

impl Default for ParlayCorrelationModel {
    fn default() -> Self {
        Self::new(DEFAULT_SAME_GAME_CORRELATION)
    }
}

// ============================================================================
// Simulation
// ============================================================================

/// Monte Carlo sample counts per risk profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SimulationConfig {
    pub conservative_samples: usize,
    pub balanced_samples: usize,
    pub aggressive_samples: usize,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            conservative_samples: 50_000,
            balanced_samples: 20_000,
            aggressive_samples: 10_000,
        }
    }
}

impl SimulationConfig {
    pub fn samples_for(&self, profile: RiskProfile) -> usize {
        let samples = match profile {
            RiskProfile::Conservative => self.conservative_samples,
            RiskProfile::Balanced => self.balanced_samples,
            RiskProfile::Aggressive => self.aggressive_samples,
        };
        samples.max(1)
    }
}

/// Probability of one correlation group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupProbability {
    pub game_id: String,
    pub leg_keys: Vec<String>,
    pub probability: f64,
    /// Zero when the group was priced exactly
    pub samples: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParlayProbability {
    pub probability: f64,
    /// Product of leg probabilities as if every leg were independent
    pub independent_probability: f64,
    pub groups: Vec<GroupProbability>,
}

impl ParlayProbability {
    /// Relative uplift (or drag) from correlation.
    pub fn correlation_lift(&self) -> f64 {
        if self.independent_probability > 0.0 {
            self.probability / self.independent_probability - 1.0
        } else {
            0.0
        }
    }
}

pub struct CorrelatedParlayProbabilityCalculator {
    model: ParlayCorrelationModel,
    simulation: SimulationConfig,
}

impl CorrelatedParlayProbabilityCalculator {
    pub fn new(model: ParlayCorrelationModel, simulation: SimulationConfig) -> Self {
        Self { model, simulation }
    }

    pub fn model(&self) -> &ParlayCorrelationModel {
        &self.model
    }

    pub fn calculate(
        &self,
        legs: &[Leg],
        risk_profile: RiskProfile,
        rng_seed: Option<u64>,
    ) -> ParlayResult<f64> {
        Ok(self.calculate_detailed(legs, risk_profile, rng_seed)?.probability)
    }

    pub fn calculate_detailed(
        &self,
        legs: &[Leg],
        risk_profile: RiskProfile,
        rng_seed: Option<u64>,
    ) -> ParlayResult<ParlayProbability> {
        if legs.is_empty() {
            return Err(ParlayError::EmptyParlay);
        }
        for leg in legs {
            leg.validate()?;
        }

        let mut by_game: BTreeMap<&str, Vec<&Leg>> = BTreeMap::new();
        for leg in legs {
            by_game.entry(leg.game_id.as_str()).or_default().push(leg);
        }
        for group in by_game.values_mut() {
            group.sort_by_key(|leg| leg.key());
        }

        let base_seed = rng_seed.unwrap_or_else(|| canonical_seed(legs));
        let samples = self.simulation.samples_for(risk_profile);

        let mut groups = Vec::with_capacity(by_game.len());
        let mut probability: f64 = 1.0;
        for (game_id, group) in &by_game {
            let leg_keys: Vec<String> = group.iter().map(|leg| leg.key()).collect();
            let group_prob = if group.len() == 1 {
                GroupProbability {
                    game_id: game_id.to_string(),
                    leg_keys,
                    probability: group[0].adjusted_prob,
                    samples: 0,
                }
            } else {
                let seed = group_seed(base_seed, game_id);
                let p = self.simulate_group(group, samples, seed);
                GroupProbability {
                    game_id: game_id.to_string(),
                    leg_keys,
                    probability: p,
                    samples,
                }
            };
            probability *= group_prob.probability;
            groups.push(group_prob);
        }

        let independent_probability: f64 = legs.iter().map(|leg| leg.adjusted_prob).product();

        debug!(
            "Parlay of {} legs over {} games: p={:.4} (independent {:.4})",
            legs.len(),
            groups.len(),
            probability,
            independent_probability
        );

        Ok(ParlayProbability {
            probability: probability.clamp(0.0, 1.0),
            independent_probability,
            groups,
        })
    }

    fn simulate_group(&self, legs: &[&Leg], samples: usize, seed: u64) -> f64 {
        let n = legs.len();
        let mut matrix = self.model.build_correlation_matrix(legs);

        let mut factor = cholesky(matrix.as_slice(), n);
        let mut attempts = 0;
        while factor.is_none() && attempts < MAX_SHRINK_ATTEMPTS {
            matrix.shrink(SHRINK_FACTOR);
            factor = cholesky(matrix.as_slice(), n);
            attempts += 1;
        }
        let l = match factor {
            Some(l) => l,
            None => {
                warn!(
                    "Correlation matrix for {} legs not factorizable, treating group as independent",
                    n
                );
                return legs.iter().map(|leg| leg.adjusted_prob).product();
            }
        };

        let thresholds: Vec<f64> = legs.iter().map(|leg| norm_inv(leg.adjusted_prob)).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        let mut e = vec![0.0; n];
        let mut hits = 0usize;

        for _ in 0..samples {
            for slot in e.iter_mut() {
                *slot = StandardNormal.sample(&mut rng);
            }
            let all_hit = (0..n).all(|i| {
                let z: f64 = (0..=i).map(|k| l[i * n + k] * e[k]).sum();
                z < thresholds[i]
            });
            if all_hit {
                hits += 1;
            }
        }

        hits as f64 / samples as f64
    }
}

impl Default for CorrelatedParlayProbabilityCalculator {
    fn default() -> Self {
        Self::new(ParlayCorrelationModel::default(), SimulationConfig::default())
    }
}

fn hash_to_u64(hasher: Sha256) -> u64 {
    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(bytes)
}

/// Seed derived from the sorted leg keys; independent of input order.
fn canonical_seed(legs: &[Leg]) -> u64 {
    let mut keys: Vec<String> = legs.iter().map(|leg| leg.key()).collect();
    keys.sort();
    let mut hasher = Sha256::new();
    for key in &keys {
        hasher.update(key.as_bytes());
        hasher.update(b"\n");
    }
    hash_to_u64(hasher)
}

fn group_seed(base: u64, game_id: &str) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(base.to_le_bytes());
    hasher.update(game_id.as_bytes());
    hash_to_u64(hasher)
}
