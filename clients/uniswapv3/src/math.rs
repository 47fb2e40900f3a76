//! Concentrated-liquidity math on f64.
//!
//! Prices are quoted as token1 per token0 in human units unless noted.

/// sqrt(1.0001^tick), i.e. the raw sqrt price at `tick`.
pub fn tick_to_sqrt_price(tick: i32) -> f64 {
    1.0001_f64.powf(tick as f64 / 2.0)
}

/// Human price (token1 per token0) at `tick`, adjusted for token decimals.
pub fn tick_to_price(tick: i32, decimals0: u8, decimals1: u8) -> f64 {
    1.0001_f64.powi(tick) * 10_f64.powi(decimals0 as i32 - decimals1 as i32)
}

/// Converts raw on-chain liquidity into human units.
///
/// With amounts in whole tokens and prices in human units,
/// `amount0 = L * (1/sqrt(P) - 1/sqrt(Pu))` holds for `L = raw / 10^((d0 + d1) / 2)`
/// whichever token is treated as base.
pub fn human_liquidity(raw: u128, decimals0: u8, decimals1: u8) -> f64 {
    raw as f64 / 10_f64.powf((decimals0 as f64 + decimals1 as f64) / 2.0)
}

/// Token amounts held by liquidity `liq` at sqrt price `sqrt_p` inside `[sqrt_lower, sqrt_upper]`.
///
/// Below the range everything sits in token0, above it everything sits in token1.
pub fn liquidity_to_amounts(liq: f64, sqrt_p: f64, sqrt_lower: f64, sqrt_upper: f64) -> (f64, f64) {
    if sqrt_p <= sqrt_lower {
        let amount0 = liq * (sqrt_upper - sqrt_lower) / (sqrt_lower * sqrt_upper);
        (amount0, 0.0)
    } else if sqrt_p < sqrt_upper {
        let amount0 = liq * (sqrt_upper - sqrt_p) / (sqrt_p * sqrt_upper);
        let amount1 = liq * (sqrt_p - sqrt_lower);
        (amount0, amount1)
    } else {
        (0.0, liq * (sqrt_upper - sqrt_lower))
    }
}
