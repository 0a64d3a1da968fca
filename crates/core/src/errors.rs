use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::pipeline::PipelineState;

/// Construction-time failures. These indicate programmer or data errors and
/// are never retried.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("confidence {value} is outside [0, 1]")]
    ConfidenceOutOfRange { value: f64 },
    #[error("timestamp {timestamp} is later than reference time {now}")]
    FutureTimestamp { timestamp: DateTime<Utc>, now: DateTime<Utc> },
    #[error("{field} must not be empty")]
    EmptyList { field: &'static str },
    #[error("half-life must be a positive number of days, got {value}")]
    InvalidHalfLife { value: f64 },
    #[error("hole number {value} is outside 1..={max}")]
    HoleOutOfRange { value: u8, max: u8 },
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum DomainError {
    #[error("invalid pipeline transition from {from:?} to {to:?}")]
    InvalidPipelineTransition { from: PipelineState, to: PipelineState },
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[cfg(test)]
mod tests {
    use crate::errors::{DomainError, ValidationError};
    use crate::pipeline::PipelineState;

    #[test]
    fn validation_error_converts_into_domain_error() {
        let error = DomainError::from(ValidationError::EmptyList { field: "missing" });
        assert!(matches!(error, DomainError::Validation(ValidationError::EmptyList { .. })));
        assert_eq!(error.to_string(), "missing must not be empty");
    }

    #[test]
    fn transition_error_names_both_states() {
        let error = DomainError::InvalidPipelineTransition {
            from: PipelineState::Idle,
            to: PipelineState::Routing,
        };
        assert_eq!(error.to_string(), "invalid pipeline transition from Idle to Routing");
    }
}
