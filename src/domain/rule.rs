//! Adjustment rule data structures.
//!
//! This module defines the rule layer applied between signal computation and
//! normalization:
//! - `Book`: the shared per-instrument score/weight state rules read and write
//! - `Trigger`: a condition on one instrument's signal
//! - `Action`: what a fired trigger does to the instrument's value
//! - `AdjustmentRule`: every supported rule shape
//! - `RuleStep`: a named, toggleable entry in a strategy's ordered rule list

use crate::domain::signal::TrendFilter;
use std::collections::{BTreeMap, BTreeSet};

/// Per-instrument values plus the flags rules may raise. Instruments never
/// written read as 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Book {
    values: BTreeMap<String, f64>,
    excluded: BTreeSet<String>,
    equal_weight_override: bool,
}

impl Book {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values(values: BTreeMap<String, f64>) -> Self {
        Self {
            values,
            ..Self::default()
        }
    }

    pub fn get(&self, code: &str) -> f64 {
        self.values.get(code).copied().unwrap_or(0.0)
    }

    pub fn set(&mut self, code: &str, value: f64) {
        self.values.insert(code.to_string(), value);
    }

    pub fn add(&mut self, code: &str, delta: f64) {
        *self.values.entry(code.to_string()).or_insert(0.0) += delta;
    }

    /// Zero the instrument and keep it out of the final allocation.
    pub fn exclude(&mut self, code: &str) {
        self.values.insert(code.to_string(), 0.0);
        self.excluded.insert(code.to_string());
    }

    pub fn is_excluded(&self, code: &str) -> bool {
        self.excluded.contains(code)
    }

    pub fn excluded(&self) -> &BTreeSet<String> {
        &self.excluded
    }

    pub fn values(&self) -> &BTreeMap<String, f64> {
        &self.values
    }

    pub fn request_equal_weight(&mut self) {
        self.equal_weight_override = true;
    }

    pub fn equal_weight_override(&self) -> bool {
        self.equal_weight_override
    }

    /// Same flags, new values. Used when scores turn into weights.
    pub fn with_values(&self, values: BTreeMap<String, f64>) -> Self {
        Self {
            values,
            excluded: self.excluded.clone(),
            equal_weight_override: self.equal_weight_override,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Trigger {
    /// Return over `window` bars above `threshold`.
    Gain { window: usize, threshold: f64 },
    /// Return over `window` bars below `-threshold`.
    Loss { window: usize, threshold: f64 },
    Overbought { rsi: f64 },
    /// Decline from the trailing `window`-bar peak above `threshold`.
    Drawdown { window: usize, threshold: f64 },
    Trend(TrendFilter),
    /// The instrument's current book value is negative.
    Negative,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    Scale(f64),
    /// Subtract a fixed amount, only from values larger than it.
    Reduce(f64),
    Cap(f64),
    /// Replace the value outright. Later rules win over earlier ones.
    Set(f64),
    /// Scale by the factor and hand the freed weight to the other held
    /// instruments pro rata, so the book total is unchanged.
    Trim(f64),
    Remove,
    Exclude,
    /// Equal-weight every present instrument instead of normalizing.
    EqualWeight,
}

impl Action {
    /// The new value for `value`. [`Action::Exclude`] and
    /// [`Action::EqualWeight`] also raise book flags and [`Action::Trim`]
    /// rebalances the other instruments, handled by the caller.
    pub fn adjust(&self, value: f64) -> f64 {
        match self {
            Action::Scale(factor) => value * factor,
            Action::Reduce(amount) => {
                if value > *amount {
                    value - amount
                } else {
                    value
                }
            }
            Action::Cap(cap) => value.min(*cap),
            Action::Set(target) => *target,
            Action::Trim(factor) => value * factor,
            Action::Remove | Action::Exclude => 0.0,
            Action::EqualWeight => value,
        }
    }
}

/// Fires when any trigger holds, for every target (all signalled instruments
/// when `targets` is `None`). With a `proxy`, triggers read the proxy's
/// signal instead of the target's, and the proxy itself is never a target.
#[derive(Debug, Clone, PartialEq)]
pub struct TriggeredRule {
    pub triggers: Vec<Trigger>,
    pub action: Action,
    pub targets: Option<Vec<String>>,
    pub proxy: Option<String>,
}

impl TriggeredRule {
    pub fn new(triggers: Vec<Trigger>, action: Action) -> Self {
        Self {
            triggers,
            action,
            targets: None,
            proxy: None,
        }
    }

    pub fn on(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_string());
        self
    }

    pub fn only(mut self, targets: &[&str]) -> Self {
        self.targets = Some(targets.iter().map(|t| t.to_string()).collect());
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RegimeMeasure {
    /// Sum of momentum scores.
    MomentumSum,
    /// Mean return over `window` bars.
    MeanReturn { window: usize },
    /// Sum of return over volatility, both over `window` bars.
    RiskAdjustedSum { window: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub enum AdjustmentRule {
    ProfitTaking(TriggeredRule),
    StopLoss(TriggeredRule),
    /// Exclude instruments up at least `threshold` since their cached
    /// reference price.
    EventProfitTaking { threshold: f64 },
    /// Move `shift_fraction` of the risky group's mass to `defensive` when
    /// the group underperforms it.
    DefensiveRotation {
        risky: Vec<String>,
        defensive: String,
        measure: RegimeMeasure,
        shift_fraction: f64,
    },
    /// Equal-weight the universe when a watched instrument's volatility
    /// exceeds `multiple` times its historical volatility.
    VolatilitySpike {
        watch: Option<Vec<String>>,
        multiple: f64,
    },
    /// Install `risk_on` when the proxy closes above its long average,
    /// `risk_off` when it closes below its short average.
    RegimeOverride {
        proxy: String,
        risk_on: BTreeMap<String, f64>,
        risk_off: BTreeMap<String, f64>,
    },
    /// Add `bonus` to `targets` while breakeven inflation is above `above`.
    MacroTilt {
        above: f64,
        targets: Vec<String>,
        bonus: f64,
    },
    /// Multiply instruments priced below the median price-to-book by `factor`.
    ValuationTilt { factor: f64, exclude: Vec<String> },
}

impl AdjustmentRule {
    pub fn kind(&self) -> &'static str {
        match self {
            AdjustmentRule::ProfitTaking(_) => "profit_taking",
            AdjustmentRule::StopLoss(_) => "stop_loss",
            AdjustmentRule::EventProfitTaking { .. } => "event_profit_taking",
            AdjustmentRule::DefensiveRotation { .. } => "defensive_rotation",
            AdjustmentRule::VolatilitySpike { .. } => "volatility_spike",
            AdjustmentRule::RegimeOverride { .. } => "regime_override",
            AdjustmentRule::MacroTilt { .. } => "macro_tilt",
            AdjustmentRule::ValuationTilt { .. } => "valuation_tilt",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RuleStep {
    pub id: String,
    pub enabled: bool,
    pub rule: AdjustmentRule,
}

impl RuleStep {
    pub fn new(id: &str, rule: AdjustmentRule) -> Self {
        Self {
            id: id.to_string(),
            enabled: true,
            rule,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}
