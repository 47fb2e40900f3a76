//! Exposure Calculator: net directional exposure of LP plus perp.

use crate::types::{ExposureResult, PositionSnapshot};

/// Notional below which `delta_pct` is reported as zero.
pub const NOTIONAL_EPSILON: f64 = 1e-9;

/// Computes the exposure of `snapshot`. Pure.
pub fn compute(snapshot: &PositionSnapshot) -> ExposureResult {
    let spot = snapshot.spot_price;
    let (lp_base_amount, lp_quote_amount) = if snapshot.lp_liquidity > 0.0 {
        lp_amounts_at(
            snapshot.lp_liquidity,
            spot,
            snapshot.lp_lower_price,
            snapshot.lp_upper_price,
        )
    } else {
        (snapshot.lp_token_a_amount, snapshot.lp_token_b_amount)
    };

    let reference_notional = lp_base_amount * spot + lp_quote_amount;
    let net_delta = lp_base_amount + snapshot.perp_size;
    let delta_pct = if reference_notional.abs() > NOTIONAL_EPSILON {
        net_delta * spot / reference_notional
    } else {
        0.0
    };

    ExposureResult {
        timestamp: snapshot.timestamp,
        lp_base_amount,
        lp_quote_amount,
        reference_notional,
        perp_size: snapshot.perp_size,
        spot_price: spot,
        funding_rate: snapshot.funding_rate,
        in_range: spot >= snapshot.lp_lower_price && spot <= snapshot.lp_upper_price,
        net_delta,
        delta_pct,
    }
}

/// Base and quote held by `liquidity` at `price` in `[lower, upper]`.
///
/// Base: `L * (1/sqrt(P) - 1/sqrt(Pu))`, quote: `L * (sqrt(P) - sqrt(Pl))`,
/// with P clamped to the range.
pub fn lp_amounts_at(liquidity: f64, price: f64, lower: f64, upper: f64) -> (f64, f64) {
    let sqrt_p = price.clamp(lower, upper).sqrt();
    let base = liquidity * (1.0 / sqrt_p - 1.0 / upper.sqrt());
    let quote = liquidity * (sqrt_p - lower.sqrt());
    (base.max(0.0), quote.max(0.0))
}
