//! Shared types for LP Hedging strategy.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::HedgeError;

/// Operating mode. Set only by configuration or operator input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Observe, decide and log; never submit
    #[default]
    Spectator,
    /// Submit perp-affecting operations
    Active,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Spectator => write!(f, "spectator"),
            Mode::Active => write!(f, "active"),
        }
    }
}

/// External read feeding a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSource {
    LpPosition,
    PerpPosition,
    Funding,
    SpotPrice,
}

impl fmt::Display for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::LpPosition => write!(f, "lp position"),
            DataSource::PerpPosition => write!(f, "perp position"),
            DataSource::Funding => write!(f, "funding rate"),
            DataSource::SpotPrice => write!(f, "spot price"),
        }
    }
}

/// Why the operating state is degraded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DegradedReason {
    DataUnavailable(DataSource),
    InvalidSnapshot,
    ExecutionFailing,
    /// Set by an operator; cleared only by an operator
    Manual,
}

impl DegradedReason {
    /// Data problems may heal on their own after a quiet period; the others need an operator.
    pub fn auto_recoverable(&self) -> bool {
        matches!(
            self,
            DegradedReason::DataUnavailable(_) | DegradedReason::InvalidSnapshot
        )
    }
}

impl fmt::Display for DegradedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DegradedReason::DataUnavailable(source) => write!(f, "{} unavailable", source),
            DegradedReason::InvalidSnapshot => write!(f, "invalid snapshot"),
            DegradedReason::ExecutionFailing => write!(f, "execution failing"),
            DegradedReason::Manual => write!(f, "manual hold"),
        }
    }
}

/// Immutable per-cycle view of the LP, the perp and prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionSnapshot {
    /// Unix timestamp in milliseconds at which the cycle started
    pub timestamp: i64,
    /// Lower bound of the LP range, quote per base
    pub lp_lower_price: f64,
    /// Upper bound of the LP range, quote per base
    pub lp_upper_price: f64,
    /// LP liquidity in human units (zero when the provider only reports amounts)
    pub lp_liquidity: f64,
    /// Base tokens currently pooled
    pub lp_token_a_amount: f64,
    /// Quote tokens currently pooled
    pub lp_token_b_amount: f64,
    /// Signed perp size in base units, negative = short
    pub perp_size: f64,
    pub perp_entry_price: f64,
    /// Spot price of base in quote
    pub spot_price: f64,
    /// Signed funding rate per funding interval
    pub funding_rate: f64,
}

impl PositionSnapshot {
    /// Checks the snapshot invariants.
    pub fn validate(&self) -> Result<(), HedgeError> {
        let finite = [
            self.lp_lower_price,
            self.lp_upper_price,
            self.lp_liquidity,
            self.lp_token_a_amount,
            self.lp_token_b_amount,
            self.perp_size,
            self.perp_entry_price,
            self.spot_price,
            self.funding_rate,
        ]
        .iter()
        .all(|v| v.is_finite());
        if !finite {
            return Err(HedgeError::InvalidSnapshot("non-finite value".to_string()));
        }
        if self.lp_lower_price <= 0.0 || self.lp_lower_price >= self.lp_upper_price {
            return Err(HedgeError::InvalidSnapshot(format!(
                "range [{}, {}] is empty or non-positive",
                self.lp_lower_price, self.lp_upper_price
            )));
        }
        if self.lp_liquidity < 0.0 || self.lp_token_a_amount < 0.0 || self.lp_token_b_amount < 0.0 {
            return Err(HedgeError::InvalidSnapshot(
                "negative liquidity or token amount".to_string(),
            ));
        }
        if self.spot_price <= 0.0 {
            return Err(HedgeError::InvalidSnapshot(format!(
                "non-positive spot price {}",
                self.spot_price
            )));
        }
        Ok(())
    }
}

/// Net directional exposure derived from one snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExposureResult {
    pub timestamp: i64,
    /// Base units implied by the LP at spot
    pub lp_base_amount: f64,
    /// Quote units implied by the LP at spot
    pub lp_quote_amount: f64,
    /// LP value in quote at spot
    pub reference_notional: f64,
    pub perp_size: f64,
    pub spot_price: f64,
    pub funding_rate: f64,
    /// Whether spot lies inside the LP range (bounds included)
    pub in_range: bool,
    /// lp_base_amount + perp_size
    pub net_delta: f64,
    /// Value of net_delta as a fraction of reference_notional
    pub delta_pct: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionKind {
    NoOp,
    IncreaseShort,
    DecreaseShort,
    ClosePerp,
    AdjustLp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReasonCode {
    DeltaAboveBand,
    DeltaBelowBand,
    WithinBand,
    FundingExtreme,
    Cooldown,
    DataDegraded,
    RangeExit,
}

/// Decision output, consumed within the same cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgeAction {
    pub kind: ActionKind,
    /// Absolute perp size to end up with
    pub target_perp_size: f64,
    /// Perp size the decision was computed against
    pub assumed_perp_size: f64,
    pub reason: ReasonCode,
}

impl HedgeAction {
    pub fn no_op(reason: ReasonCode, current_perp_size: f64) -> Self {
        Self {
            kind: ActionKind::NoOp,
            target_perp_size: current_perp_size,
            assumed_perp_size: current_perp_size,
            reason,
        }
    }

    pub fn is_no_op(&self) -> bool {
        self.kind == ActionKind::NoOp
    }

    pub fn touches_lp(&self) -> bool {
        self.kind == ActionKind::AdjustLp
    }
}

/// Why a sequence stopped early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AbortKind {
    /// Live state diverged from the assumed state
    Stale,
    Rejected,
    InsufficientMargin,
    /// Venue answered in a way that leaves the result unknown
    Unknown,
    /// Transient failures outlasted the retry budget
    TransientExhausted,
    /// Stop signal received between operations
    Cancelled,
}

impl AbortKind {
    /// Counts towards the consecutive-failure ceiling.
    pub fn is_failure(&self) -> bool {
        !matches!(self, AbortKind::Stale | AbortKind::Cancelled)
    }
}

/// Result of handing one action to the sequencer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Nothing to do
    Skipped,
    /// Spectator mode: logged and notified only
    Simulated,
    /// Gated off (LP executions disabled or no LP venue)
    Blocked { reason: String },
    Succeeded { operations: usize },
    Aborted {
        kind: AbortKind,
        /// Operations confirmed before the abort
        completed: usize,
        message: String,
    },
}

impl ExecutionOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Succeeded { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, ExecutionOutcome::Aborted { kind, .. } if kind.is_failure())
    }
}

/// Last action taken, kept for audit and hysteresis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub action: HedgeAction,
    pub outcome: ExecutionOutcome,
    pub timestamp: i64,
}

/// Structured event for downstream notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HedgeEvent {
    ActionOutcome {
        mode: Mode,
        action: HedgeAction,
        outcome: ExecutionOutcome,
        timestamp: i64,
    },
    Degraded {
        reason: DegradedReason,
        timestamp: i64,
    },
    Recovered {
        timestamp: i64,
    },
    ModeChanged {
        from: Mode,
        to: Mode,
        timestamp: i64,
    },
}

impl HedgeEvent {
    /// Debounce key: events sharing a key are rate limited together.
    pub fn key(&self) -> String {
        match self {
            HedgeEvent::ActionOutcome { action, outcome, .. } => {
                format!("outcome:{:?}:{}", action.kind, outcome_key(outcome))
            }
            HedgeEvent::Degraded { reason, .. } => format!("degraded:{:?}", reason),
            HedgeEvent::Recovered { .. } => "recovered".to_string(),
            HedgeEvent::ModeChanged { .. } => "mode".to_string(),
        }
    }

    /// Human readable one-liner for chat delivery.
    pub fn to_message(&self, base_symbol: &str) -> String {
        match self {
            HedgeEvent::ActionOutcome {
                mode,
                action,
                outcome,
                ..
            } => format!(
                "[{}] {:?} ({:?}): perp {:.4} -> {:.4} {} | {}",
                mode,
                action.kind,
                action.reason,
                action.assumed_perp_size,
                action.target_perp_size,
                base_symbol,
                outcome_label(outcome)
            ),
            HedgeEvent::Degraded { reason, .. } => {
                format!("Hedging paused: {}. No adjustments until recovery.", reason)
            }
            HedgeEvent::Recovered { .. } => "Data restored, hedging resumed.".to_string(),
            HedgeEvent::ModeChanged { from, to, .. } => {
                format!("Mode changed: {} -> {}", from, to)
            }
        }
    }
}

/// Outcome class for debouncing; free-text details stay out of the key.
fn outcome_key(outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Skipped => "skipped".to_string(),
        ExecutionOutcome::Simulated => "simulated".to_string(),
        ExecutionOutcome::Blocked { .. } => "blocked".to_string(),
        ExecutionOutcome::Succeeded { .. } => "succeeded".to_string(),
        ExecutionOutcome::Aborted { kind, .. } => format!("aborted:{:?}", kind),
    }
}

fn outcome_label(outcome: &ExecutionOutcome) -> String {
    match outcome {
        ExecutionOutcome::Skipped => "skipped".to_string(),
        ExecutionOutcome::Simulated => "simulated, not submitted".to_string(),
        ExecutionOutcome::Blocked { reason } => format!("blocked: {}", reason),
        ExecutionOutcome::Succeeded { operations } => format!("done ({} ops)", operations),
        ExecutionOutcome::Aborted { kind, message, .. } => {
            format!("aborted {:?}: {}", kind, message)
        }
    }
}

/// Monitoring snapshot: the raw snapshot plus its derived exposure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    pub snapshot: PositionSnapshot,
    pub exposure: ExposureResult,
}

impl MonitoringSnapshot {
    /// Status message for chat delivery.
    pub fn to_message(&self, base_symbol: &str) -> String {
        let s = &self.snapshot;
        let e = &self.exposure;
        format!(
            "LP [{:.2}, {:.2}] {} | spot {:.2}\n\
             LP: {:.4} {} + {:.2} quote (value {:.2})\n\
             Perp: {:.4} {} @ {:.2} | funding {:.5}\n\
             Net delta: {:.4} {} ({:.2}%)",
            s.lp_lower_price,
            s.lp_upper_price,
            if e.in_range { "in range" } else { "OUT OF RANGE" },
            s.spot_price,
            e.lp_base_amount,
            base_symbol,
            e.lp_quote_amount,
            e.reference_notional,
            s.perp_size,
            base_symbol,
            s.perp_entry_price,
            s.funding_rate,
            e.net_delta,
            base_symbol,
            e.delta_pct * 100.0,
        )
    }
}

/// Everything one cycle saw and did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleReport {
    pub mode: Mode,
    /// Absent when the snapshot could not be built
    pub monitoring: Option<MonitoringSnapshot>,
    pub action: HedgeAction,
    pub outcome: ExecutionOutcome,
}
