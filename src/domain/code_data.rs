//! Per-code bar series and the unified snapshot timeline.
//!
//! Hosts that keep one series per instrument use [`build_snapshots`] to turn
//! them into the cross-sectional snapshots the engine consumes.

use crate::domain::auxiliary::{AuxiliaryData, DatasetId};
use crate::domain::error::SamallocError;
use crate::domain::history::Snapshot;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::universe::load_universe;
use crate::ports::data_port::DataPort;
use chrono::NaiveDate;
use std::collections::{BTreeSet, HashMap};

#[derive(Debug, Clone)]
pub struct CodeData {
    pub code: String,
    pub bars: Vec<OhlcvBar>,
    pub date_index: HashMap<NaiveDate, usize>,
}

impl CodeData {
    pub fn new(code: String, mut bars: Vec<OhlcvBar>) -> Self {
        bars.sort_by_key(|b| b.date);
        let date_index = bars
            .iter()
            .enumerate()
            .map(|(i, bar)| (bar.date, i))
            .collect();
        Self {
            code,
            bars,
            date_index,
        }
    }

    pub fn bar_count(&self) -> usize {
        self.bars.len()
    }

    pub fn get_bar(&self, date: NaiveDate) -> Option<&OhlcvBar> {
        self.date_index.get(&date).map(|&i| &self.bars[i])
    }
}

pub fn build_unified_timeline(codes: &[CodeData]) -> Vec<NaiveDate> {
    let unique_dates: BTreeSet<NaiveDate> = codes
        .iter()
        .flat_map(|cd| cd.bars.iter().map(|bar| bar.date))
        .collect();
    unique_dates.into_iter().collect()
}

/// One snapshot per timeline date holding every code that traded on it.
pub fn build_snapshots(codes: &[CodeData]) -> Vec<Snapshot> {
    build_unified_timeline(codes)
        .into_iter()
        .map(|date| {
            let mut snapshot = Snapshot::new(date);
            for cd in codes {
                if let Some(bar) = cd.get_bar(date) {
                    snapshot.insert(bar.clone());
                }
            }
            snapshot
        })
        .collect()
}

/// Load every universe member through `port` and merge into snapshots.
pub fn load_snapshots(
    port: &dyn DataPort,
    universe: &[String],
) -> Result<Vec<Snapshot>, SamallocError> {
    let data = load_universe(port, universe)?;
    let codes: Vec<CodeData> = data
        .bars
        .into_iter()
        .map(|(code, bars)| CodeData::new(code, bars))
        .collect();
    Ok(build_snapshots(&codes))
}

/// Load the declared datasets; a dataset that cannot be read is left empty.
pub fn load_auxiliary(port: &dyn DataPort, datasets: &[DatasetId]) -> AuxiliaryData {
    let mut aux = AuxiliaryData::new();
    for &dataset in datasets {
        match port.fetch_auxiliary(dataset) {
            Ok(records) => aux.insert(dataset, records),
            Err(e) => log::warn!("dataset {} unavailable ({})", dataset, e),
        }
    }
    aux
}
