//! Fixed-precision rounding shared by the market-data and indicator layers.

/// Fractional digits kept on every price and indicator value.
pub const PRICE_DP: i32 = 6;

/// Round `value` to `dp` fractional digits (half away from zero).
#[inline]
pub fn round_dp(value: f64, dp: i32) -> f64 {
    let factor = 10f64.powi(dp);
    (value * factor).round() / factor
}

#[inline]
pub fn round6(value: f64) -> f64 {
    round_dp(value, PRICE_DP)
}

/// `Option`-aware variant used for indicator columns.
#[inline]
pub fn round6_opt(value: Option<f64>) -> Option<f64> {
    value.map(round6)
}
