//! Configuration types for the LP hedging strategy.
//!
//! Policy thresholds have no built-in defaults: they are strategy parameters
//! and must come from the operator's config. Execution and tracker knobs fall
//! back to conservative defaults.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use utils::Backoff;

use crate::error::HedgeError;
use crate::types::Mode;

/// Configuration for LPHStrategy (parameters only; collaborators are passed to `LPHStrategy::new`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LPHStrategyConfig {
    /// Operating mode at startup. Spectator never submits anything.
    #[serde(default)]
    pub mode: Mode,
    /// Perp venue symbol (e.g., "ETHUSDT"), also the pair asked of the price oracle
    pub symbol: String,
    /// LP position identifier understood by the LP data provider
    pub position_id: String,
    pub policy: HedgePolicyConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub tracker: TrackerConfig,
}

/// Hedge Policy thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HedgePolicyConfig {
    /// Half-width of the dead-band on |delta_pct| (0.02 = 2% of LP value)
    pub dead_band_pct: f64,
    /// Where inside the band a rebalance lands, as a fraction of `dead_band_pct` on the side of the breach
    pub recenter_fraction: f64,
    /// |funding rate| per funding interval above which no adjustment is made
    pub funding_extreme_threshold: f64,
    /// Seconds after a successful adjustment during which no new one is made
    pub cooldown_secs: u64,
    /// Smallest hedge notional (quote) worth holding; smaller targets round to zero
    pub min_perp_notional: f64,
    /// Largest hedge notional (quote) ever targeted
    pub max_perp_notional: f64,
    /// Largest change of perp size (base units) in one adjustment
    pub max_single_adjustment: f64,
    /// Size differences at or below this (base units) count as no change
    #[serde(default = "default_size_epsilon")]
    pub size_epsilon: f64,
    /// Emit AdjustLp when the price has left the LP range and the hedge is in band
    #[serde(default)]
    pub recenter_lp_on_range_exit: bool,
}

/// Execution Sequencer settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// LP-affecting operations need this even in Active mode
    pub enable_lp_executions: bool,
    /// Cancel resting orders before resizing
    pub cancel_open_orders: bool,
    /// Attempts per operation, including the first
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_max_ms: u64,
    /// Timeout applied to each external call
    pub call_timeout_ms: u64,
    /// Consecutive failed sequences before the state degrades to ExecutionFailing
    pub max_consecutive_failures: u32,
    /// Tolerated difference (base units) between the assumed and live perp size
    pub stale_epsilon: f64,
    /// Venue quantity step; order sizes are rounded to it
    pub quantity_step: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            enable_lp_executions: false,
            cancel_open_orders: true,
            max_attempts: 5,
            backoff_base_ms: 2_000,
            backoff_max_ms: 30_000,
            call_timeout_ms: 10_000,
            max_consecutive_failures: 3,
            stale_epsilon: 1e-6,
            quantity_step: 0.001,
        }
    }
}

impl ExecutionConfig {
    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.backoff_base_ms),
            Duration::from_millis(self.backoff_max_ms),
            self.max_attempts,
        )
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }
}

/// Operating State Tracker settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Time without degradation signals required before data health recovers
    pub recovery_quiet_period_secs: u64,
    /// Snapshots kept in the rolling history
    pub history_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            recovery_quiet_period_secs: 60,
            history_capacity: 120,
        }
    }
}

fn default_size_epsilon() -> f64 {
    1e-6
}

impl LPHStrategyConfig {
    /// Rejects configurations the decision logic cannot run with.
    pub fn validate(&self) -> Result<(), HedgeError> {
        let p = &self.policy;
        let e = &self.execution;
        let checks: [(bool, &str); 13] = [
            (!self.symbol.trim().is_empty(), "symbol must not be empty"),
            (!self.position_id.trim().is_empty(), "position_id must not be empty"),
            (p.dead_band_pct > 0.0, "policy.dead_band_pct must be > 0"),
            (
                (0.0..1.0).contains(&p.recenter_fraction),
                "policy.recenter_fraction must be in [0, 1)",
            ),
            (
                p.funding_extreme_threshold > 0.0,
                "policy.funding_extreme_threshold must be > 0",
            ),
            (p.min_perp_notional >= 0.0, "policy.min_perp_notional must be >= 0"),
            (
                p.max_perp_notional > p.min_perp_notional,
                "policy.max_perp_notional must exceed min_perp_notional",
            ),
            (
                p.max_single_adjustment > 0.0,
                "policy.max_single_adjustment must be > 0",
            ),
            (p.size_epsilon >= 0.0, "policy.size_epsilon must be >= 0"),
            (e.max_attempts >= 1, "execution.max_attempts must be >= 1"),
            (
                e.max_consecutive_failures >= 1,
                "execution.max_consecutive_failures must be >= 1",
            ),
            (e.quantity_step > 0.0, "execution.quantity_step must be > 0"),
            (
                e.stale_epsilon.is_finite() && e.stale_epsilon >= 0.0,
                "execution.stale_epsilon must be finite and >= 0",
            ),
        ];
        match checks.iter().find(|(ok, _)| !ok) {
            Some((_, msg)) => Err(HedgeError::InvalidConfig(msg.to_string())),
            None => Ok(()),
        }
    }
}
