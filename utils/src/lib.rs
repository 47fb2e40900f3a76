//! Shared utilities for the lp-hedger workspace.

mod clock;
mod retry;

pub use clock::{Clock, SystemClock};
pub use retry::{retry_with_backoff, Backoff};

use alloy::primitives::U256;

/// Converts a U256 value to f64, accounting for token decimals.
///
/// Values larger than `u128::MAX` are truncated; this is acceptable for f64 precision.
pub fn u256_to_f64(value: U256, decimals: u32) -> f64 {
    let value_u128 = value.saturating_to::<u128>();
    let divisor = 10_u128.pow(decimals);
    let whole_part = value_u128 / divisor;
    let fractional_part = value_u128 % divisor;
    whole_part as f64 + (fractional_part as f64 / divisor as f64)
}

/// Rounds a value to the nearest multiple of `step`. A non-positive step leaves the value untouched.
pub fn round_to_step(value: f64, step: f64) -> f64 {
    if step <= 0.0 {
        return value;
    }
    (value / step).round() * step
}

/// Formats a quantity with as many decimal places as `step` needs.
pub fn format_quantity(quantity: f64, step: f64) -> String {
    let prec = if step >= 1.0 || step <= 0.0 {
        0
    } else {
        (1.0_f64 / step).log10().ceil().max(0.0) as usize
    };
    format!("{:.prec$}", quantity, prec = prec)
}
