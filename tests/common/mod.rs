#![allow(dead_code)]

use chrono::NaiveDate;
use samalloc::domain::auxiliary::{DatasetId, RawRecord};
use samalloc::domain::error::SamallocError;
use samalloc::domain::history::Snapshot;
pub use samalloc::domain::ohlcv::OhlcvBar;
use samalloc::ports::data_port::DataPort;
use std::collections::{BTreeMap, HashMap};

pub struct MockDataPort {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub datasets: HashMap<DatasetId, Vec<RawRecord>>,
    pub errors: HashMap<String, String>,
}

impl MockDataPort {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            datasets: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, code: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(code.to_string(), bars);
        self
    }

    pub fn with_dataset(mut self, dataset: DatasetId, records: Vec<RawRecord>) -> Self {
        self.datasets.insert(dataset, records);
        self
    }

    pub fn with_error(mut self, code: &str, reason: &str) -> Self {
        self.errors.insert(code.to_string(), reason.to_string());
        self
    }
}

impl DataPort for MockDataPort {
    fn fetch_bars(&self, code: &str) -> Result<Vec<OhlcvBar>, SamallocError> {
        if let Some(reason) = self.errors.get(code) {
            return Err(SamallocError::Data {
                reason: reason.clone(),
            });
        }
        Ok(self.data.get(code).cloned().unwrap_or_default())
    }

    fn fetch_auxiliary(&self, dataset: DatasetId) -> Result<Vec<RawRecord>, SamallocError> {
        self.datasets
            .get(&dataset)
            .cloned()
            .ok_or_else(|| SamallocError::Data {
                reason: format!("no {} dataset", dataset),
            })
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(code: &str, date: NaiveDate, close: f64) -> OhlcvBar {
    OhlcvBar {
        code: code.to_string(),
        date,
        open: close,
        high: close * 1.01,
        low: close * 0.99,
        close,
        volume: 1_000.0,
    }
}

/// One snapshot per consecutive calendar day from `start`; `series` maps each
/// code to its closes, aligned to the end of the timeline so shorter series
/// start later.
pub fn build_history(start: NaiveDate, series: &[(&str, Vec<f64>)]) -> Vec<Snapshot> {
    let days = series.iter().map(|(_, c)| c.len()).max().unwrap_or(0);
    (0..days)
        .map(|i| {
            let day = start + chrono::Duration::days(i as i64);
            let mut snap = Snapshot::new(day);
            for (code, closes) in series {
                let offset = days - closes.len();
                if i >= offset {
                    snap.insert(make_bar(code, day, closes[i - offset]));
                }
            }
            snap
        })
        .collect()
}

/// Closes alternating between `base` and `base * e^step`, so every log
/// return is `±step`.
pub fn alternating_closes(count: usize, base: f64, step: f64) -> Vec<f64> {
    (0..count)
        .map(|i| if i % 2 == 0 { base } else { base * step.exp() })
        .collect()
}

pub fn linear_closes(count: usize, start: f64, slope: f64) -> Vec<f64> {
    (0..count).map(|i| start + slope * i as f64).collect()
}

pub fn weights(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(c, w)| (c.to_string(), *w)).collect()
}

pub fn bars_csv(bars: &[OhlcvBar]) -> String {
    let mut out = String::from("date,open,high,low,close,volume\n");
    for b in bars {
        out.push_str(&format!(
            "{},{},{},{},{},{}\n",
            b.date.format("%Y-%m-%d"),
            b.open,
            b.high,
            b.low,
            b.close,
            b.volume
        ));
    }
    out
}

pub fn generate_bars(code: &str, start: NaiveDate, closes: &[f64]) -> Vec<OhlcvBar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &close)| make_bar(code, start + chrono::Duration::days(i as i64), close))
        .collect()
}
