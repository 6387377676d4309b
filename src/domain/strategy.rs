//! Strategy configuration and the per-step allocation pipeline.

use crate::domain::allocation::{Allocation, FallbackAllocation, normalize};
use crate::domain::allocator::{ScoreSource, WeightingMode, base_scores, weigh};
use crate::domain::auxiliary::{AuxiliaryData, AuxiliaryView, DatasetId};
use crate::domain::error::SamallocError;
use crate::domain::history::PriceHistory;
use crate::domain::rule::RuleStep;
use crate::domain::rule_eval::{RuleContext, apply_rules};
use crate::domain::schedule::RebalanceSchedule;
use crate::domain::signal::{SignalParams, compute_signals};
use crate::domain::state::{ReferenceValue, StrategyState};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyConfig {
    pub name: String,
    pub universe: Vec<String>,
    pub schedule: RebalanceSchedule,
    pub signals: SignalParams,
    pub score: ScoreSource,
    pub weighting: WeightingMode,
    /// Applied to base scores, before weighting.
    pub score_rules: Vec<RuleStep>,
    /// Applied to raw weights, before normalization.
    pub weight_rules: Vec<RuleStep>,
    pub normalize_to_one: bool,
    /// Snapshots required before anything is computed.
    pub min_history: usize,
    pub fallback: FallbackAllocation,
    pub datasets: Vec<DatasetId>,
}

impl StrategyConfig {
    /// Inverse-volatility momentum, rebalanced every step, no rules.
    pub fn new(name: &str, universe: &[&str]) -> Self {
        StrategyConfig {
            name: name.to_string(),
            universe: universe.iter().map(|c| c.to_string()).collect(),
            schedule: RebalanceSchedule::EveryStep,
            signals: SignalParams::default(),
            score: ScoreSource::Momentum,
            weighting: WeightingMode::InverseVolatility {
                scale_by_score: false,
            },
            score_rules: Vec::new(),
            weight_rules: Vec::new(),
            normalize_to_one: true,
            min_history: 1,
            fallback: FallbackAllocation::EqualWeight,
            datasets: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Strategy {
    config: StrategyConfig,
    state: StrategyState,
}

struct Rebalance {
    allocation: Allocation,
    references: BTreeMap<String, ReferenceValue>,
}

impl Strategy {
    pub fn new(config: StrategyConfig) -> Self {
        Self {
            config,
            state: StrategyState::new(),
        }
    }

    pub fn config(&self) -> &StrategyConfig {
        &self.config
    }

    pub fn state(&self) -> &StrategyState {
        &self.state
    }

    pub fn universe(&self) -> &[String] {
        &self.config.universe
    }

    /// Datasets the host should supply on each call.
    pub fn datasets(&self) -> &[DatasetId] {
        &self.config.datasets
    }

    pub fn reset(&mut self) {
        self.state.reset();
    }

    /// Produce the target allocation for the latest snapshot in `history`.
    pub fn step(
        &mut self,
        history: &PriceHistory,
        aux: &AuxiliaryData,
    ) -> Result<Allocation, SamallocError> {
        history.validate()?;
        self.state.step_counter += 1;

        let date = history.latest_date();
        if !self.config.schedule.is_due(self.state.step_counter, date) {
            log::debug!(
                "{}: holding at step {}",
                self.config.name,
                self.state.step_counter
            );
            return Ok(match &self.state.last_allocation {
                Some(cached) => cached.clone(),
                None => self.fallback(history),
            });
        }

        if history.len() < self.config.min_history.max(1) {
            log::debug!(
                "{}: {} snapshot(s), {} required, using fallback",
                self.config.name,
                history.len(),
                self.config.min_history
            );
            return Ok(self.fallback(history));
        }

        match self.rebalance(history, aux) {
            Some(Rebalance {
                allocation,
                references,
            }) => {
                log::info!(
                    "{}: rebalanced on {} into {} holding(s), invested {:.4}",
                    self.config.name,
                    date.map(|d| d.to_string()).unwrap_or_default(),
                    allocation.holdings().len(),
                    allocation.total()
                );
                self.state.last_allocation = Some(allocation.clone());
                self.state.last_rebalance_date = date;
                self.state.references = references;
                Ok(allocation)
            }
            None => {
                log::warn!(
                    "{}: insufficient data to rebalance, keeping previous allocation",
                    self.config.name
                );
                Ok(self
                    .state
                    .last_allocation
                    .clone()
                    .unwrap_or_else(|| self.fallback(history)))
            }
        }
    }

    fn present(&self, history: &PriceHistory) -> Vec<String> {
        self.config
            .universe
            .iter()
            .filter(|c| history.is_present(c))
            .cloned()
            .collect()
    }

    fn fallback(&self, history: &PriceHistory) -> Allocation {
        let holders = if history.is_empty() {
            self.config.universe.clone()
        } else {
            self.present(history)
        };
        Allocation::fallback(self.config.fallback, &self.config.universe, &holders)
    }

    fn rebalance(&self, history: &PriceHistory, aux: &AuxiliaryData) -> Option<Rebalance> {
        let config = &self.config;
        let signals = compute_signals(history, &config.universe, &config.signals);
        let view = AuxiliaryView::build(aux, &config.datasets);

        let mut references = self.state.references.clone();
        if let Some(date) = history.latest_date() {
            for code in &view.contract_awards {
                if let Some(signal) = signals.get(code) {
                    references.entry(code.clone()).or_insert_with(|| {
                        log::debug!(
                            "{}: reference price {} recorded for {}",
                            config.name,
                            signal.close,
                            code
                        );
                        ReferenceValue {
                            price: signal.close,
                            date,
                        }
                    });
                }
            }
        }

        let ctx = RuleContext {
            signals: &signals,
            aux: &view,
            references: &references,
        };

        let mut scores = base_scores(&config.score, &signals, &view);
        apply_rules(&config.score_rules, &mut scores, &ctx);

        let mut weights = weigh(&config.weighting, &scores, &signals)?;
        apply_rules(&config.weight_rules, &mut weights, &ctx);

        let present = self.present(history);
        let allocation = if weights.equal_weight_override() {
            Allocation::equal_weight(&config.universe, &present)
        } else {
            let mut excluded: BTreeSet<String> = weights.excluded().clone();
            excluded.extend(
                config
                    .universe
                    .iter()
                    .filter(|c| !signals.contains_key(*c))
                    .cloned(),
            );
            normalize(
                weights.values(),
                &config.universe,
                &excluded,
                config.normalize_to_one,
            )
        };

        Some(Rebalance {
            allocation,
            references,
        })
    }
}
