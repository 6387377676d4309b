//! Per-strategy mutable state carried between invocations.

use crate::domain::allocation::Allocation;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Price recorded the first time an event was seen for an instrument.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceValue {
    pub price: f64,
    pub date: NaiveDate,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StrategyState {
    pub last_allocation: Option<Allocation>,
    /// Invocations seen so far; advances on every call.
    pub step_counter: u64,
    pub last_rebalance_date: Option<NaiveDate>,
    pub references: BTreeMap<String, ReferenceValue>,
}

impl StrategyState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything, as if the strategy had just been constructed.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
