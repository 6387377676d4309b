//! Base scores and weighting modes.
//!
//! [`base_scores`] turns signals into one number per instrument; [`weigh`]
//! turns a score book into raw weights. Raw weights may still be
//! unnormalized; [`crate::domain::allocation::normalize`] finishes the job.

use crate::domain::auxiliary::AuxiliaryView;
use crate::domain::defaults::floor_volatility;
use crate::domain::rule::Book;
use crate::domain::signal::Signal;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum ScoreSource {
    Momentum,
    HorizonReturn { window: usize },
    /// Return over `window` divided by realized volatility over the same window.
    RiskAdjustedReturn { window: usize },
    /// Long-horizon return minus short-horizon return.
    ReturnSpread { long: usize, short: usize },
    Constant(f64),
    /// Contract-award bonus plus weighted share of total lobbying spend.
    Influence {
        award_weight: f64,
        lobbying_weight: f64,
    },
}

pub fn score(source: &ScoreSource, signal: &Signal, aux: &AuxiliaryView) -> f64 {
    match source {
        ScoreSource::Momentum => signal.momentum,
        ScoreSource::HorizonReturn { window } => signal.horizon_return(*window),
        ScoreSource::RiskAdjustedReturn { window } => {
            signal.horizon_return(*window) / signal.volatility_over(*window)
        }
        ScoreSource::ReturnSpread { long, short } => {
            signal.horizon_return(*long) - signal.horizon_return(*short)
        }
        ScoreSource::Constant(value) => *value,
        ScoreSource::Influence {
            award_weight,
            lobbying_weight,
        } => {
            let award = if aux.contract_awards.contains(&signal.code) {
                *award_weight
            } else {
                0.0
            };
            award + lobbying_weight * aux.lobbying_share(&signal.code)
        }
    }
}

/// One score per signalled instrument.
pub fn base_scores(
    source: &ScoreSource,
    signals: &BTreeMap<String, Signal>,
    aux: &AuxiliaryView,
) -> Book {
    Book::from_values(
        signals
            .iter()
            .map(|(code, signal)| (code.clone(), score(source, signal, aux)))
            .collect(),
    )
}

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeSwitch {
    pub risk_proxy: String,
    pub safe_proxy: String,
    /// Ranked by score when the risk proxy outscores the safe proxy.
    pub candidates: Vec<String>,
    pub top_k: usize,
    /// Installed otherwise.
    pub defensive: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WeightingMode {
    /// Inverse floored volatility over instruments with a positive score,
    /// optionally scaled by `score / max_score`.
    InverseVolatility { scale_by_score: bool },
    /// Raw weight equals the clipped score.
    Proportional,
    /// Equal split across the `k` best scores.
    TopK { k: usize },
    /// `strong` above both averages, `weak` otherwise.
    TrendTiers { strong: f64, weak: f64 },
    Fixed(BTreeMap<String, f64>),
    RegimeSwitch(RegimeSwitch),
}

impl WeightingMode {
    pub fn kind(&self) -> &'static str {
        match self {
            WeightingMode::InverseVolatility { .. } => "inverse_volatility",
            WeightingMode::Proportional => "proportional",
            WeightingMode::TopK { .. } => "top_k",
            WeightingMode::TrendTiers { .. } => "trend_tiers",
            WeightingMode::Fixed(_) => "fixed",
            WeightingMode::RegimeSwitch(_) => "regime_switch",
        }
    }
}

fn eligible<'a>(
    scores: &'a Book,
    signals: &'a BTreeMap<String, Signal>,
) -> impl Iterator<Item = (&'a String, &'a Signal, f64)> {
    signals
        .iter()
        .filter(|(code, _)| !scores.is_excluded(code))
        .map(|(code, signal)| (code, signal, scores.get(code)))
}

/// Best `k` by score, ties broken by code.
fn top_k(mut ranked: Vec<(&String, f64)>, k: usize) -> Vec<String> {
    ranked.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(b.0))
    });
    ranked.into_iter().take(k).map(|(c, _)| c.clone()).collect()
}

fn equal_split(codes: &[String]) -> BTreeMap<String, f64> {
    if codes.is_empty() {
        return BTreeMap::new();
    }
    let weight = 1.0 / codes.len() as f64;
    codes.iter().map(|c| (c.clone(), weight)).collect()
}

/// Raw weights for the scored book, carrying its flags along.
///
/// `None` means the mode lacks the data it needs this step; the caller holds
/// the previous allocation.
pub fn weigh(
    mode: &WeightingMode,
    scores: &Book,
    signals: &BTreeMap<String, Signal>,
) -> Option<Book> {
    let weights = match mode {
        WeightingMode::InverseVolatility { scale_by_score } => {
            let positive: Vec<(&String, &Signal, f64)> =
                eligible(scores, signals).filter(|(_, _, s)| *s > 0.0).collect();
            let inverse_total: f64 = positive
                .iter()
                .map(|(_, sig, _)| 1.0 / floor_volatility(sig.volatility))
                .sum();
            let max_score = positive.iter().map(|(_, _, s)| *s).fold(0.0, f64::max);
            positive
                .iter()
                .map(|(code, sig, s)| {
                    let base = (1.0 / floor_volatility(sig.volatility)) / inverse_total;
                    let scale = if *scale_by_score {
                        (s / max_score).min(1.0)
                    } else {
                        1.0
                    };
                    ((*code).clone(), base * scale)
                })
                .collect()
        }
        WeightingMode::Proportional => eligible(scores, signals)
            .map(|(code, _, s)| (code.clone(), s.max(0.0)))
            .collect(),
        WeightingMode::TopK { k } => {
            let ranked = eligible(scores, signals).map(|(c, _, s)| (c, s)).collect();
            equal_split(&top_k(ranked, *k))
        }
        WeightingMode::TrendTiers { strong, weak } => eligible(scores, signals)
            .filter(|(_, sig, s)| {
                *s > 0.0 && sig.short_average.is_some() && sig.long_average.is_some()
            })
            .map(|(code, sig, _)| {
                let tier = if sig.is_above_both_averages() {
                    *strong
                } else {
                    *weak
                };
                (code.clone(), tier)
            })
            .collect(),
        WeightingMode::Fixed(table) => eligible(scores, signals)
            .filter(|(_, _, s)| *s > 0.0)
            .filter_map(|(code, _, _)| table.get(code).map(|w| (code.clone(), *w)))
            .collect(),
        WeightingMode::RegimeSwitch(switch) => {
            if !signals.contains_key(&switch.risk_proxy)
                || !signals.contains_key(&switch.safe_proxy)
            {
                log::debug!(
                    "regime proxies {}/{} unavailable",
                    switch.risk_proxy,
                    switch.safe_proxy
                );
                return None;
            }
            if scores.get(&switch.risk_proxy) > scores.get(&switch.safe_proxy) {
                let ranked: Vec<(&String, f64)> = switch
                    .candidates
                    .iter()
                    .filter(|c| signals.contains_key(*c) && !scores.is_excluded(c))
                    .map(|c| (c, scores.get(c)))
                    .collect();
                if ranked.is_empty() {
                    return None;
                }
                equal_split(&top_k(ranked, switch.top_k))
            } else {
                switch.defensive.clone()
            }
        }
    };
    Some(scores.with_values(weights))
}
