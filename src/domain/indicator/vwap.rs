//! Rolling Volume Weighted Average Price.
//!
//! VWAP(n)[i] = sum(TP[k] * V[k]) / sum(V[k]) for k in i-n+1..=i,
//! where TP = (high + low + close) / 3.
//! A window with no volume falls back to the plain mean typical price.
//! Warmup: first (n-1) bars are invalid.

use crate::domain::indicator::{IndicatorPoint, IndicatorSeries, IndicatorType};
use crate::domain::ohlcv::OhlcvBar;

pub fn calculate_vwap(bars: &[OhlcvBar], period: usize) -> IndicatorSeries {
    if period == 0 || bars.len() < period {
        return IndicatorSeries::empty(IndicatorType::Vwap(period));
    }

    let mut values = Vec::with_capacity(bars.len());
    let mut pv_sum = 0.0;
    let mut vol_sum = 0.0;
    let mut tp_sum = 0.0;

    for (i, bar) in bars.iter().enumerate() {
        let tp = bar.typical_price();
        let volume = bar.volume.max(0.0);
        pv_sum += tp * volume;
        vol_sum += volume;
        tp_sum += tp;

        if i >= period {
            let old = &bars[i - period];
            let old_volume = old.volume.max(0.0);
            pv_sum -= old.typical_price() * old_volume;
            vol_sum -= old_volume;
            tp_sum -= old.typical_price();
        }

        let valid = i + 1 >= period;
        let value = if !valid {
            0.0
        } else if vol_sum > 0.0 {
            pv_sum / vol_sum
        } else {
            tp_sum / period as f64
        };

        values.push(IndicatorPoint {
            date: bar.date,
            valid,
            value,
        });
    }

    IndicatorSeries {
        indicator_type: IndicatorType::Vwap(period),
        values,
    }
}
