//! Neutral values and floors used whenever a computation lacks data.
//!
//! Everything that substitutes for a missing or degenerate number reads its
//! value from here.

/// Trading days used to annualize daily volatility.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Lower bound applied to every volatility before it is used as a divisor.
pub const VOLATILITY_FLOOR: f64 = 0.01;

/// Momentum score for an instrument whose volatility cannot be estimated.
pub const NEUTRAL_MOMENTUM: f64 = 1.0;

/// RSI reported when the RSI window exceeds the available history.
pub const NEUTRAL_RSI: f64 = 50.0;

/// Canonical return horizons in trading days.
pub const ONE_MONTH: usize = 21;
pub const ONE_QUARTER: usize = 63;
pub const TWO_QUARTERS: usize = 126;

/// Longest lookback a configuration may ask for, about forty years of bars.
pub const MAX_WINDOW: usize = 10_000;

/// Tolerance used when comparing sums of weights.
pub const WEIGHT_EPSILON: f64 = 1e-9;

/// Clamp a volatility to the floor, mapping non-finite values to the floor too.
pub fn floor_volatility(volatility: f64) -> f64 {
    if volatility.is_finite() {
        volatility.max(VOLATILITY_FLOOR)
    } else {
        VOLATILITY_FLOOR
    }
}
