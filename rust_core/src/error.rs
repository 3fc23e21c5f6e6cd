//! Error taxonomy for the parlay engine.
//!
//! Only invalid input, configuration problems and guard saturation surface to
//! callers. Signal, store and persistence failures are absorbed where they
//! happen and logged instead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParlayError {
    #[error("invalid odds: {0}")]
    InvalidOdds(String),

    #[error("invalid leg {leg}: {reason}")]
    InvalidLeg { leg: String, reason: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("parlay must contain at least one leg")]
    EmptyParlay,

    #[error("not enough candidate legs: requested {requested}, available {available}")]
    InsufficientLegs { requested: usize, available: usize },

    #[error("generator busy: no slot for '{resource}' within {waited_ms}ms")]
    Busy { resource: String, waited_ms: u64 },

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ParlayError {
    /// Busy is a normal saturation outcome; the caller may retry later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ParlayError::Busy { .. })
    }
}

pub type ParlayResult<T> = Result<T, ParlayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_busy_is_retryable() {
        let busy = ParlayError::Busy {
            resource: "parlay-generate".to_string(),
            waited_ms: 500,
        };
        assert!(busy.is_retryable());
        assert!(!ParlayError::EmptyParlay.is_retryable());
        assert!(!ParlayError::InvalidOdds("-50".to_string()).is_retryable());
    }

    #[test]
    fn test_error_messages_are_descriptive() {
        let err = ParlayError::InvalidLeg {
            leg: "g1:h2h:KC".to_string(),
            reason: "adjusted_prob 1.2 outside (0, 1)".to_string(),
        };
        assert!(err.to_string().contains("g1:h2h:KC"));
        assert!(err.to_string().contains("outside"));
    }
}
