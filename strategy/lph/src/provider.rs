//! Collaborator seams of the hedging core.
//!
//! The core only talks to the outside world through these traits. Real
//! implementations live in [`crate::adapters`]; tests plug in fakes.

use std::fmt;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::HedgeEvent;

pub use utils::Clock;

/// LP position as reported by an [`LpDataProvider`], already oriented base/quote.
#[derive(Debug, Clone, PartialEq)]
pub struct LpPosition {
    /// Lower range bound, quote per base
    pub lower_price: f64,
    /// Upper range bound, quote per base
    pub upper_price: f64,
    /// Liquidity in human units, zero if unknown
    pub liquidity: f64,
    pub base_amount: f64,
    pub quote_amount: f64,
}

/// Perp position as reported by a [`PerpVenue`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PerpPosition {
    /// Signed size in base units, negative = short
    pub size: f64,
    pub entry_price: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Buy,
    Sell,
}

/// One perp-affecting submission.
#[derive(Debug, Clone, PartialEq)]
pub enum PerpOperation {
    CancelOpenOrders,
    PlaceMarket {
        side: Side,
        /// Base units, already rounded to the venue step
        quantity: f64,
        reduce_only: bool,
    },
}

/// One LP-affecting submission.
#[derive(Debug, Clone, PartialEq)]
pub enum LpOperation {
    /// Remove every unit of liquidity from the position
    DecreaseLiquidity { position_id: String },
    /// Collect withdrawn tokens and fees to the owner
    Collect { position_id: String },
}

impl fmt::Display for PerpOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PerpOperation::CancelOpenOrders => write!(f, "cancel open orders"),
            PerpOperation::PlaceMarket {
                side,
                quantity,
                reduce_only,
            } => write!(
                f,
                "market {:?} {}{}",
                side,
                quantity,
                if *reduce_only { " reduce-only" } else { "" }
            ),
        }
    }
}

impl fmt::Display for LpOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LpOperation::DecreaseLiquidity { position_id } => {
                write!(f, "decrease liquidity of {}", position_id)
            }
            LpOperation::Collect { position_id } => write!(f, "collect {}", position_id),
        }
    }
}

/// Venue acknowledgement of a submission.
#[derive(Debug, Clone, PartialEq)]
pub struct Confirmation {
    /// Order id or transaction hash
    pub reference: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitErrorKind {
    /// Retry may succeed (network, busy, rate limit)
    Transient,
    Rejected,
    InsufficientMargin,
    /// The venue may or may not have applied the operation
    Unknown,
}

/// Failed submission, classified for the retry state machine.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct SubmitError {
    pub kind: SubmitErrorKind,
    pub message: String,
}

impl SubmitError {
    pub fn new(kind: SubmitErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Transient, message)
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self::new(SubmitErrorKind::Rejected, message)
    }
}

#[async_trait]
pub trait LpDataProvider: Send + Sync {
    async fn get_position(&self, position_id: &str) -> Result<LpPosition>;
}

#[async_trait]
pub trait PerpVenue: Send + Sync {
    async fn get_position(&self) -> Result<PerpPosition>;

    /// Funding rate per funding interval, signed.
    async fn get_funding(&self) -> Result<f64>;

    async fn submit(&self, op: &PerpOperation) -> std::result::Result<Confirmation, SubmitError>;
}

#[async_trait]
pub trait LpVenue: Send + Sync {
    async fn submit(&self, op: &LpOperation) -> std::result::Result<Confirmation, SubmitError>;
}

#[async_trait]
pub trait PriceOracle: Send + Sync {
    async fn get_spot_price(&self, pair: &str) -> Result<f64>;
}

/// Sink for hedge events. Must return promptly; delivery happens elsewhere.
pub trait Notifier: Send + Sync {
    fn notify(&self, event: &HedgeEvent);
}
