//! Error taxonomy of the hedging core.

use thiserror::Error;

use crate::types::{DataSource, DegradedReason};

/// Errors raised inside a decision cycle.
///
/// None of these is process-fatal: data errors degrade the operating state,
/// execution errors are contained in the sequencer's outcome.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HedgeError {
    /// A required read failed after its retries, or timed out.
    #[error("{origin} unavailable: {message}")]
    DataUnavailable { origin: DataSource, message: String },

    /// Fetched data violates a snapshot invariant.
    #[error("invalid snapshot: {0}")]
    InvalidSnapshot(String),

    /// Retryable venue failure that outlasted the retry budget.
    #[error("transient execution failure: {0}")]
    ExecutionTransient(String),

    /// Venue failure that is never retried; the abort kind says which.
    #[error("execution rejected: {0}")]
    ExecutionRejected(String),

    /// Live position diverged from the one the action was computed against.
    #[error("stale action: assumed perp size {assumed}, live {live}")]
    StaleAction { assumed: f64, live: f64 },

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl HedgeError {
    /// The degradation this error forces on the operating state, if any.
    pub fn degraded_reason(&self) -> Option<DegradedReason> {
        match self {
            HedgeError::DataUnavailable { origin, .. } => {
                Some(DegradedReason::DataUnavailable(*origin))
            }
            HedgeError::InvalidSnapshot(_) => Some(DegradedReason::InvalidSnapshot),
            _ => None,
        }
    }
}
