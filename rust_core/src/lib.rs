//! Parlay Core - parlay construction with correlated leg probabilities.
//!
//! This crate provides:
//! - Odds conversion and margin removal
//! - Heuristic probability adjustments (team strength, situational, weather, injuries)
//! - Calibration of model probabilities against observed outcomes
//! - Candidate leg discovery with a shared result cache
//! - Same-game correlation via a Gaussian copula Monte Carlo
//! - Distributed concurrency guard for parlay generation

pub mod calibration;
pub mod candidates;
pub mod confidence;
pub mod config;
pub mod correlation;
pub mod db;
pub mod engine;
pub mod error;
pub mod guard;
pub mod heuristics;
pub mod models;
pub mod odds;
pub mod signals;
pub mod stats;
pub mod store;
pub mod team_strength;

pub use calibration::{CalibrationMap, CalibrationService, CalibrationStore, CalibrationTrainer};
pub use candidates::{CandidateLegService, CandidateQuery, OddsRepository};
pub use config::EngineConfig;
pub use correlation::{CorrelatedParlayProbabilityCalculator, ParlayCorrelationModel};
pub use engine::{ParlayGenerator, ParlayRequest, ParlaySuggestion};
pub use error::{ParlayError, ParlayResult};
pub use guard::{GeneratorGuard, GuardConfig};
pub use models::*;
pub use store::{KvStore, MemoryStore};
