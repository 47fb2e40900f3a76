//! Hedge Policy: maps an exposure and the operating state to one action.
//!
//! `decide` is pure. "Now" is the exposure's timestamp, so the same inputs
//! always give the same action.

use crate::config::HedgePolicyConfig;
use crate::exposure::NOTIONAL_EPSILON;
use crate::state::HedgeState;
use crate::types::{ActionKind, ExposureResult, HedgeAction, ReasonCode};

/// Decides the hedge action for one cycle. Rules are checked in order; the first match wins.
pub fn decide(exposure: &ExposureResult, state: &HedgeState, config: &HedgePolicyConfig) -> HedgeAction {
    let current = exposure.perp_size;

    if !state.is_healthy() {
        return HedgeAction::no_op(ReasonCode::DataDegraded, current);
    }
    if exposure.timestamp < state.cooldown_until() {
        return HedgeAction::no_op(ReasonCode::Cooldown, current);
    }
    if exposure.funding_rate.abs() > config.funding_extreme_threshold {
        return HedgeAction::no_op(ReasonCode::FundingExtreme, current);
    }
    if exposure.delta_pct.abs() <= config.dead_band_pct {
        if !exposure.in_range
            && config.recenter_lp_on_range_exit
            && exposure.reference_notional > NOTIONAL_EPSILON
        {
            return HedgeAction {
                kind: ActionKind::AdjustLp,
                target_perp_size: current,
                assumed_perp_size: current,
                reason: ReasonCode::RangeExit,
            };
        }
        return HedgeAction::no_op(ReasonCode::WithinBand, current);
    }

    let target = target_perp_size(exposure, config);
    if (target - current).abs() <= config.size_epsilon {
        return HedgeAction::no_op(ReasonCode::Cooldown, current);
    }

    let kind = if target == 0.0 {
        ActionKind::ClosePerp
    } else if target < current {
        ActionKind::IncreaseShort
    } else {
        ActionKind::DecreaseShort
    };
    let reason = if exposure.delta_pct > 0.0 {
        ReasonCode::DeltaAboveBand
    } else {
        ReasonCode::DeltaBelowBand
    };

    HedgeAction {
        kind,
        target_perp_size: target,
        assumed_perp_size: current,
        reason,
    }
}

/// Perp size that moves the net delta back inside the band, on the side of the breach, clamped.
fn target_perp_size(exposure: &ExposureResult, config: &HedgePolicyConfig) -> f64 {
    let spot = exposure.spot_price;
    let current = exposure.perp_size;

    let target_pct = exposure.delta_pct.signum() * config.dead_band_pct * config.recenter_fraction;
    let target_net = target_pct * exposure.reference_notional / spot;
    let desired = target_net - exposure.lp_base_amount;

    // never aim long, then bound the step; a long perp is unwound one step at a time
    let step = config.max_single_adjustment;
    let mut target = desired.min(0.0).clamp(current - step, current + step);
    if target > 0.0 {
        return target;
    }
    if -target * spot > config.max_perp_notional {
        target = -config.max_perp_notional / spot;
    }
    if -target * spot < config.min_perp_notional {
        target = 0.0;
    }
    target
}
