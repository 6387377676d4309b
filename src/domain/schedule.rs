//! Rebalance scheduling.

use chrono::{Datelike, Duration, NaiveDate};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalanceSchedule {
    EveryStep,
    /// Rebalance when the step counter is a multiple of `n`.
    EveryNth(u64),
    /// Rebalance on the last trading day of each calendar quarter.
    QuarterEnd,
}

impl RebalanceSchedule {
    /// Whether invocation number `step_counter` (1-based) on `date` rebalances.
    pub fn is_due(&self, step_counter: u64, date: Option<NaiveDate>) -> bool {
        match self {
            RebalanceSchedule::EveryStep => true,
            RebalanceSchedule::EveryNth(0) => true,
            RebalanceSchedule::EveryNth(n) => step_counter % n == 0,
            RebalanceSchedule::QuarterEnd => date.is_some_and(is_quarter_end),
        }
    }
}

pub fn quarter_of(date: NaiveDate) -> u32 {
    (date.month() - 1) / 3 + 1
}

/// True when the next calendar day falls in a different quarter.
pub fn is_quarter_end(date: NaiveDate) -> bool {
    match date.checked_add_signed(Duration::days(1)) {
        Some(next) => quarter_of(next) != quarter_of(date),
        None => true,
    }
}
