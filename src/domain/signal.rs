//! Per-instrument signal computation.
//!
//! A [`Signal`] is derived fresh on every invocation from the instrument's
//! closes (the snapshots where it is present) and the indicator library.
//! Short histories fall back to shorter windows or to the neutral values in
//! [`crate::domain::defaults`]; an instrument absent from the latest snapshot
//! gets no signal at all.

use crate::domain::defaults::{
    NEUTRAL_MOMENTUM, NEUTRAL_RSI, ONE_QUARTER, TRADING_DAYS_PER_YEAR, TWO_QUARTERS,
    VOLATILITY_FLOOR, floor_volatility,
};
use crate::domain::history::PriceHistory;
use crate::domain::indicator::stddev::population_stddev;
use crate::domain::indicator::{calculate_rsi, calculate_sma, calculate_vwap};
use crate::domain::ohlcv::OhlcvBar;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AverageKind {
    Simple,
    VolumeWeighted,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SignalParams {
    pub volatility_window: usize,
    pub drawdown_window: usize,
    pub rsi_period: usize,
    pub average: AverageKind,
    pub short_average: usize,
    pub long_average: usize,
    /// `None` measures historical volatility over every available close.
    pub historical_volatility_window: Option<usize>,
}

impl Default for SignalParams {
    fn default() -> Self {
        SignalParams {
            volatility_window: 20,
            drawdown_window: ONE_QUARTER,
            rsi_period: 14,
            average: AverageKind::Simple,
            short_average: 50,
            long_average: 200,
            historical_volatility_window: None,
        }
    }
}

/// Trend conditions a stop-loss can key on. An unavailable average never
/// satisfies a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendFilter {
    CloseBelowShort,
    CloseBelowLong,
    ShortBelowLong,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Signal {
    pub code: String,
    pub close: f64,
    pub closes: Vec<f64>,
    /// Annualized realized volatility, already floored.
    pub volatility: f64,
    /// Same estimator over the long window, already floored.
    pub historical_volatility: f64,
    pub momentum: f64,
    pub rsi: f64,
    pub drawdown: f64,
    pub short_average: Option<f64>,
    pub long_average: Option<f64>,
}

impl Signal {
    pub fn bars(&self) -> usize {
        self.closes.len()
    }

    pub fn horizon_return(&self, window: usize) -> f64 {
        horizon_return(&self.closes, window)
    }

    pub fn drawdown_over(&self, window: usize) -> f64 {
        drawdown_from_peak(&self.closes, window)
    }

    pub fn volatility_over(&self, window: usize) -> f64 {
        realized_volatility(&self.closes, window)
            .map(floor_volatility)
            .unwrap_or(VOLATILITY_FLOOR)
    }

    pub fn is_below(&self, filter: TrendFilter) -> bool {
        match filter {
            TrendFilter::CloseBelowShort => self.short_average.is_some_and(|ma| self.close < ma),
            TrendFilter::CloseBelowLong => self.long_average.is_some_and(|ma| self.close < ma),
            TrendFilter::ShortBelowLong => match (self.short_average, self.long_average) {
                (Some(short), Some(long)) => short < long,
                _ => false,
            },
        }
    }

    /// Close above both averages; false while either is unavailable.
    pub fn is_above_both_averages(&self) -> bool {
        match (self.short_average, self.long_average) {
            (Some(short), Some(long)) => self.close > short && self.close > long,
            _ => false,
        }
    }
}

/// `close[t] / close[t-k] - 1`, or 0 when fewer than k+1 closes exist.
pub fn horizon_return(closes: &[f64], window: usize) -> f64 {
    if window == 0 || closes.len() <= window {
        return 0.0;
    }
    let current = closes[closes.len() - 1];
    let past = closes[closes.len() - 1 - window];
    if past <= 0.0 {
        return 0.0;
    }
    current / past - 1.0
}

/// Population std of log returns over the trailing `window` closes, scaled
/// by sqrt(252). `None` with fewer than two closes.
pub fn realized_volatility(closes: &[f64], window: usize) -> Option<f64> {
    let start = closes.len().saturating_sub(window);
    let tail = &closes[start..];
    if tail.len() < 2 {
        return None;
    }
    let log_returns: Vec<f64> = tail
        .windows(2)
        .filter(|w| w[0] > 0.0 && w[1] > 0.0)
        .map(|w| (w[1] / w[0]).ln())
        .collect();
    if log_returns.is_empty() {
        return None;
    }
    Some(population_stddev(&log_returns) * TRADING_DAYS_PER_YEAR.sqrt())
}

/// `(peak - close) / peak` with the peak taken over the trailing `window`
/// closes (all of them if fewer).
pub fn drawdown_from_peak(closes: &[f64], window: usize) -> f64 {
    let Some(&current) = closes.last() else {
        return 0.0;
    };
    let start = closes.len().saturating_sub(window.max(1));
    let peak = closes[start..].iter().copied().fold(f64::MIN, f64::max);
    if peak <= 0.0 {
        return 0.0;
    }
    (peak - current) / peak
}

fn moving_average(bars: &[OhlcvBar], kind: AverageKind, window: usize) -> Option<f64> {
    match kind {
        AverageKind::Simple => calculate_sma(bars, window).latest(),
        AverageKind::VolumeWeighted => calculate_vwap(bars, window).latest(),
    }
}

pub fn compute_signal(history: &PriceHistory, code: &str, params: &SignalParams) -> Option<Signal> {
    let latest = history.latest()?.get(code)?;
    let bars = history.bars(code);
    let closes: Vec<f64> = bars.iter().map(|b| b.close).collect();

    let recent = realized_volatility(&closes, params.volatility_window);
    let volatility = recent.map(floor_volatility).unwrap_or(VOLATILITY_FLOOR);

    let historical_window = params.historical_volatility_window.unwrap_or(closes.len());
    let historical_volatility = realized_volatility(&closes, historical_window)
        .map(floor_volatility)
        .unwrap_or(volatility);

    let momentum = match recent {
        Some(_) => {
            (horizon_return(&closes, ONE_QUARTER) + horizon_return(&closes, TWO_QUARTERS))
                / volatility
        }
        None => NEUTRAL_MOMENTUM,
    };

    let rsi = calculate_rsi(&bars, params.rsi_period)
        .latest()
        .unwrap_or(NEUTRAL_RSI);

    Some(Signal {
        code: code.to_string(),
        close: latest.close,
        drawdown: drawdown_from_peak(&closes, params.drawdown_window),
        short_average: moving_average(&bars, params.average, params.short_average),
        long_average: moving_average(&bars, params.average, params.long_average),
        closes,
        volatility,
        historical_volatility,
        momentum,
        rsi,
    })
}

/// Signals for every universe member present in the latest snapshot.
pub fn compute_signals(
    history: &PriceHistory,
    universe: &[String],
    params: &SignalParams,
) -> BTreeMap<String, Signal> {
    let mut signals = BTreeMap::new();
    for code in universe {
        match compute_signal(history, code, params) {
            Some(signal) => {
                signals.insert(code.clone(), signal);
            }
            None => log::debug!("{} absent from latest snapshot, excluded", code),
        }
    }
    signals
}
