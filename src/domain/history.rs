//! Cross-sectional snapshots and the read-only price history view.
//!
//! A [`Snapshot`] maps instrument codes to the bar for one date. Any
//! instrument may be absent from any snapshot. [`PriceHistory`] borrows an
//! oldest-first slice of snapshots owned by the host.

use crate::domain::error::SamallocError;
use crate::domain::ohlcv::OhlcvBar;
use chrono::NaiveDate;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub date: NaiveDate,
    pub bars: BTreeMap<String, OhlcvBar>,
}

impl Snapshot {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date,
            bars: BTreeMap::new(),
        }
    }

    pub fn with_bar(mut self, bar: OhlcvBar) -> Self {
        self.insert(bar);
        self
    }

    pub fn insert(&mut self, bar: OhlcvBar) {
        self.bars.insert(bar.code.clone(), bar);
    }

    pub fn get(&self, code: &str) -> Option<&OhlcvBar> {
        self.bars.get(code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.bars.contains_key(code)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct PriceHistory<'a> {
    snapshots: &'a [Snapshot],
}

impl<'a> PriceHistory<'a> {
    pub fn new(snapshots: &'a [Snapshot]) -> Self {
        Self { snapshots }
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }

    pub fn snapshots(&self) -> &'a [Snapshot] {
        self.snapshots
    }

    pub fn latest(&self) -> Option<&'a Snapshot> {
        self.snapshots.last()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.latest().map(|s| s.date)
    }

    /// Snapshot `offset` steps back from the latest one (0 = latest).
    pub fn snapshot_at(&self, offset: usize) -> Option<&'a Snapshot> {
        let len = self.snapshots.len();
        if offset >= len {
            return None;
        }
        self.snapshots.get(len - 1 - offset)
    }

    pub fn bar_at(&self, code: &str, offset: usize) -> Option<&'a OhlcvBar> {
        self.snapshot_at(offset).and_then(|s| s.get(code))
    }

    /// True when the instrument trades in the latest snapshot.
    pub fn is_present(&self, code: &str) -> bool {
        self.latest().is_some_and(|s| s.contains(code))
    }

    /// The instrument's bars across every snapshot where it is present.
    pub fn bars(&self, code: &str) -> Vec<OhlcvBar> {
        self.snapshots
            .iter()
            .filter_map(|s| s.get(code))
            .cloned()
            .collect()
    }

    pub fn closes(&self, code: &str) -> Vec<f64> {
        self.snapshots
            .iter()
            .filter_map(|s| s.get(code))
            .map(|b| b.close)
            .collect()
    }

    /// Rejects histories a well-behaved host could never produce.
    pub fn validate(&self) -> Result<(), SamallocError> {
        let mut prev: Option<NaiveDate> = None;
        for (index, snapshot) in self.snapshots.iter().enumerate() {
            if let Some(p) = prev {
                if snapshot.date <= p {
                    return Err(SamallocError::MalformedHistory {
                        index,
                        reason: format!(
                            "snapshot date {} does not follow {}",
                            snapshot.date, p
                        ),
                    });
                }
            }
            prev = Some(snapshot.date);

            for (code, bar) in &snapshot.bars {
                if *code != bar.code {
                    return Err(SamallocError::MalformedHistory {
                        index,
                        reason: format!("bar for {} stored under {}", bar.code, code),
                    });
                }
                if !bar.has_usable_close() {
                    return Err(SamallocError::MalformedHistory {
                        index,
                        reason: format!("{} has unusable close {}", code, bar.close),
                    });
                }
            }
        }
        Ok(())
    }
}
