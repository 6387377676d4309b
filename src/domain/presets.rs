//! Ready-made strategy configurations.
//!
//! Each preset is an ordinary [`StrategyConfig`]; callers may tweak any field
//! before handing it to [`crate::domain::strategy::Strategy::new`].

use crate::domain::allocation::FallbackAllocation;
use crate::domain::allocator::{RegimeSwitch, ScoreSource, WeightingMode};
use crate::domain::auxiliary::DatasetId;
use crate::domain::defaults::{ONE_MONTH, ONE_QUARTER, TWO_QUARTERS};
use crate::domain::rule::{
    Action, AdjustmentRule, RegimeMeasure, RuleStep, Trigger, TriggeredRule,
};
use crate::domain::schedule::RebalanceSchedule;
use crate::domain::signal::{AverageKind, SignalParams, TrendFilter};
use crate::domain::strategy::StrategyConfig;
use std::collections::BTreeMap;

/// Drawdown window reaching back over the whole history.
const ALL_HISTORY: usize = usize::MAX;

fn table(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(c, w)| (c.to_string(), *w)).collect()
}

fn codes(list: &[&str]) -> Vec<String> {
    list.iter().map(|c| c.to_string()).collect()
}

/// Momentum scaled inverse-volatility over large-cap tech.
pub fn momentum_risk_parity() -> StrategyConfig {
    StrategyConfig {
        signals: SignalParams {
            average: AverageKind::VolumeWeighted,
            short_average: 10,
            long_average: 200,
            ..SignalParams::default()
        },
        weighting: WeightingMode::InverseVolatility {
            scale_by_score: true,
        },
        score_rules: vec![
            RuleStep::new(
                "profit_taking",
                AdjustmentRule::ProfitTaking(TriggeredRule::new(
                    vec![
                        Trigger::Gain {
                            window: ONE_MONTH,
                            threshold: 0.30,
                        },
                        Trigger::Overbought { rsi: 80.0 },
                    ],
                    Action::Scale(0.85),
                )),
            ),
            RuleStep::new(
                "stop_loss",
                AdjustmentRule::StopLoss(TriggeredRule::new(
                    vec![
                        Trigger::Drawdown {
                            window: ONE_QUARTER,
                            threshold: 0.05,
                        },
                        Trigger::Trend(TrendFilter::ShortBelowLong),
                    ],
                    Action::Remove,
                )),
            ),
            RuleStep::new(
                "negative_momentum",
                AdjustmentRule::StopLoss(TriggeredRule::new(
                    vec![Trigger::Negative],
                    Action::Scale(0.5),
                )),
            ),
        ],
        ..StrategyConfig::new(
            "momentum_risk_parity",
            &[
                "NVDA", "PLTR", "INTC", "TSLA", "AAPL", "AMD", "AMZN", "MSFT", "GOOGL", "TSM",
            ],
        )
    }
}

/// Risk-adjusted biotech book that rotates into a managed-care anchor when
/// the group lags it.
pub fn biotech_rotation() -> StrategyConfig {
    let risky = ["MRNA", "BNTX", "ISRG", "TDOC", "VRTX"];
    StrategyConfig {
        score: ScoreSource::RiskAdjustedReturn {
            window: TWO_QUARTERS,
        },
        weighting: WeightingMode::Proportional,
        min_history: TWO_QUARTERS,
        fallback: FallbackAllocation::AllZero,
        weight_rules: vec![
            RuleStep::new(
                "profit_taking",
                AdjustmentRule::ProfitTaking(
                    TriggeredRule::new(
                        vec![Trigger::Gain {
                            window: ONE_MONTH,
                            threshold: 0.30,
                        }],
                        Action::Scale(0.8),
                    )
                    .only(&["MRNA", "BNTX"]),
                ),
            ),
            RuleStep::new(
                "stop_loss",
                AdjustmentRule::StopLoss(TriggeredRule::new(
                    vec![Trigger::Drawdown {
                        window: 30,
                        threshold: 0.18,
                    }],
                    Action::Remove,
                )),
            ),
            RuleStep::new(
                "defensive_rotation",
                AdjustmentRule::DefensiveRotation {
                    risky: codes(&risky),
                    defensive: "UNH".to_string(),
                    measure: RegimeMeasure::RiskAdjustedSum {
                        window: TWO_QUARTERS,
                    },
                    shift_fraction: 0.5,
                },
            ),
        ],
        ..StrategyConfig::new(
            "biotech_rotation",
            &["MRNA", "BNTX", "ISRG", "TDOC", "VRTX", "UNH"],
        )
    }
}

/// Equal conviction clean-energy basket. Tilts are ordered so the strongest
/// one wins: a deep PLUG/ENPH pullback over a hot ICLN month over cheap
/// price-to-book.
pub fn clean_energy_value() -> StrategyConfig {
    StrategyConfig {
        score: ScoreSource::Constant(1.0),
        weighting: WeightingMode::Proportional,
        datasets: vec![DatasetId::Ratios],
        score_rules: vec![
            RuleStep::new(
                "trend_stop",
                AdjustmentRule::StopLoss(TriggeredRule::new(
                    vec![Trigger::Trend(TrendFilter::CloseBelowLong)],
                    Action::Exclude,
                )),
            ),
            RuleStep::new(
                "value_tilt",
                AdjustmentRule::ValuationTilt {
                    factor: 1.25,
                    exclude: codes(&["ICLN"]),
                },
            ),
            RuleStep::new(
                "sector_trend",
                AdjustmentRule::ProfitTaking(
                    TriggeredRule::new(
                        vec![Trigger::Gain {
                            window: ONE_MONTH,
                            threshold: 0.10,
                        }],
                        Action::Set(1.25),
                    )
                    .on("ICLN"),
                ),
            ),
            RuleStep::new(
                "mean_reversion",
                AdjustmentRule::StopLoss(
                    TriggeredRule::new(
                        vec![Trigger::Loss {
                            window: 60,
                            threshold: 0.20,
                        }],
                        Action::Set(1.5),
                    )
                    .only(&["PLUG", "ENPH"]),
                ),
            ),
            RuleStep::new(
                "overbought_exit",
                AdjustmentRule::ProfitTaking(
                    TriggeredRule::new(vec![Trigger::Overbought { rsi: 85.0 }], Action::Exclude)
                        .only(&["TSLA"]),
                ),
            ),
        ],
        ..StrategyConfig::new(
            "clean_energy_value",
            &["ICLN", "NEE", "FSLR", "PLUG", "ENPH", "ALB", "TSLA"],
        )
    }
}

/// Equal nuclear basket, halved on quarterly blow-offs and deep pullbacks.
pub fn nuclear_sector() -> StrategyConfig {
    StrategyConfig {
        score: ScoreSource::Constant(1.0),
        weighting: WeightingMode::Proportional,
        weight_rules: vec![
            RuleStep::new(
                "profit_taking",
                AdjustmentRule::ProfitTaking(TriggeredRule::new(
                    vec![Trigger::Gain {
                        window: ONE_QUARTER,
                        threshold: 0.40,
                    }],
                    Action::Scale(0.5),
                )),
            ),
            RuleStep::new(
                "stop_loss",
                AdjustmentRule::StopLoss(TriggeredRule::new(
                    vec![Trigger::Drawdown {
                        window: ONE_QUARTER,
                        threshold: 0.18,
                    }],
                    Action::Scale(0.5),
                )),
            ),
        ],
        ..StrategyConfig::new(
            "nuclear_sector",
            &["SMR", "BWXT", "LEU", "CEG", "VST", "OKLO", "CCJ"],
        )
    }
}

/// Fixed crypto-adjacent book switched by the bitcoin trend.
pub fn crypto_regime() -> StrategyConfig {
    StrategyConfig {
        signals: SignalParams {
            average: AverageKind::VolumeWeighted,
            short_average: 50,
            long_average: 200,
            ..SignalParams::default()
        },
        score: ScoreSource::Constant(1.0),
        weighting: WeightingMode::Fixed(table(&[
            ("COIN", 0.1),
            ("MSTR", 0.1),
            ("NVDA", 0.1),
            ("AMD", 0.1),
            ("BITO", 0.1),
        ])),
        min_history: 200,
        fallback: FallbackAllocation::AllZero,
        weight_rules: vec![
            RuleStep::new(
                "btc_regime",
                AdjustmentRule::RegimeOverride {
                    proxy: "BTC-USD".to_string(),
                    risk_on: table(&[("COIN", 0.2), ("MSTR", 0.2), ("BITO", 0.2), ("NVDA", 0.2)]),
                    risk_off: table(&[("COIN", 0.0), ("MSTR", 0.0), ("BITO", 0.0), ("NVDA", 0.2)]),
                },
            ),
            RuleStep::new(
                "stop_loss",
                AdjustmentRule::StopLoss(TriggeredRule::new(
                    vec![Trigger::Drawdown {
                        window: ALL_HISTORY,
                        threshold: 0.05,
                    }],
                    Action::Remove,
                )),
            ),
            RuleStep::new(
                "profit_taking",
                AdjustmentRule::ProfitTaking(TriggeredRule::new(
                    vec![Trigger::Gain {
                        window: ONE_MONTH,
                        threshold: 0.50,
                    }],
                    Action::Reduce(0.05),
                )),
            ),
        ],
        ..StrategyConfig::new(
            "crypto_regime",
            &["COIN", "NVDA", "MSTR", "AMD", "BITO", "BTC-USD"],
        )
    }
}

/// Contract winners and heavy lobbyists, sold once up 50% from the award.
pub fn policy_influence() -> StrategyConfig {
    StrategyConfig {
        score: ScoreSource::Influence {
            award_weight: 0.5,
            lobbying_weight: 0.5,
        },
        weighting: WeightingMode::Proportional,
        datasets: vec![DatasetId::GovernmentContracts, DatasetId::LobbyingSpend],
        score_rules: vec![RuleStep::new(
            "award_profit_taking",
            AdjustmentRule::EventProfitTaking { threshold: 0.5 },
        )],
        ..StrategyConfig::new(
            "policy_influence",
            &["LMT", "RTX", "NOC", "GD", "BA", "PLTR", "LDOS", "BAH"],
        )
    }
}

/// Top two sectors by return spread while equities beat cash, gold and
/// bills otherwise.
pub fn sector_rotation() -> StrategyConfig {
    StrategyConfig {
        schedule: RebalanceSchedule::EveryNth(10),
        score: ScoreSource::ReturnSpread {
            long: 81,
            short: 10,
        },
        weighting: WeightingMode::RegimeSwitch(RegimeSwitch {
            risk_proxy: "SPY".to_string(),
            safe_proxy: "BIL".to_string(),
            candidates: codes(&["QQQ", "XLK", "NVDA", "MSFT", "AAPL", "XLE", "XLV", "IJT"]),
            top_k: 2,
            defensive: table(&[("GLD", 0.3), ("BIL", 0.7)]),
        }),
        fallback: FallbackAllocation::AllZero,
        ..StrategyConfig::new(
            "sector_rotation",
            &[
                "QQQ", "XLK", "XLE", "IWD", "XLV", "XLU", "XLP", "IJT", "GLD", "UUP", "SPY", "BIL",
                "NVDA", "AAPL", "MSFT",
            ],
        )
    }
}

/// Equal real-asset book overweighting gold and oil when breakevens run hot.
pub fn real_assets_inflation() -> StrategyConfig {
    StrategyConfig {
        score: ScoreSource::Constant(1.0 / 6.0),
        weighting: WeightingMode::Proportional,
        datasets: vec![DatasetId::BreakevenInflation],
        weight_rules: vec![
            RuleStep::new(
                "inflation_tilt",
                AdjustmentRule::MacroTilt {
                    above: 2.0,
                    targets: codes(&["GLD", "XOM"]),
                    bonus: 0.20,
                },
            ),
            RuleStep::new(
                "gold_profit_taking",
                AdjustmentRule::ProfitTaking(
                    TriggeredRule::new(
                        vec![Trigger::Gain {
                            window: ONE_QUARTER,
                            threshold: 0.15,
                        }],
                        Action::Reduce(0.10),
                    )
                    .only(&["GLD"]),
                ),
            ),
            RuleStep::new(
                "oil_stop_loss",
                AdjustmentRule::StopLoss(
                    TriggeredRule::new(
                        vec![Trigger::Loss {
                            window: ONE_MONTH,
                            threshold: 0.10,
                        }],
                        Action::Reduce(0.05),
                    )
                    .only(&["XOM", "COP"]),
                ),
            ),
        ],
        ..StrategyConfig::new(
            "real_assets_inflation",
            &["GLD", "BAM", "PLD", "XOM", "COP", "ET"],
        )
    }
}

/// Two weight tiers by trend, capped back to the low tier on spikes and
/// drawdowns. Total exposure is capped at 1 rather than forced to it.
pub fn emerging_trend_tiers() -> StrategyConfig {
    StrategyConfig {
        score: ScoreSource::Constant(1.0),
        weighting: WeightingMode::TrendTiers {
            strong: 0.2,
            weak: 0.1,
        },
        normalize_to_one: false,
        min_history: 200,
        fallback: FallbackAllocation::AllZero,
        weight_rules: vec![
            RuleStep::new(
                "profit_taking",
                AdjustmentRule::ProfitTaking(TriggeredRule::new(
                    vec![Trigger::Gain {
                        window: 60,
                        threshold: 0.5,
                    }],
                    Action::Cap(0.1),
                )),
            ),
            RuleStep::new(
                "stop_loss",
                AdjustmentRule::StopLoss(TriggeredRule::new(
                    vec![Trigger::Drawdown {
                        window: ALL_HISTORY,
                        threshold: 0.2,
                    }],
                    Action::Cap(0.1),
                )),
            ),
        ],
        ..StrategyConfig::new(
            "emerging_trend_tiers",
            &["TSM", "BABA", "TCEHY", "SE", "MELI", "AMX", "PBR"],
        )
    }
}

/// Quarter-end inverse-volatility semiconductor book.
pub fn semiconductor_quarterly() -> StrategyConfig {
    StrategyConfig {
        schedule: RebalanceSchedule::QuarterEnd,
        signals: SignalParams {
            volatility_window: ONE_QUARTER,
            ..SignalParams::default()
        },
        score: ScoreSource::Constant(1.0),
        min_history: ONE_QUARTER,
        weight_rules: vec![
            RuleStep::new(
                "profit_taking",
                AdjustmentRule::ProfitTaking(
                    TriggeredRule::new(
                        vec![Trigger::Gain {
                            window: ONE_QUARTER,
                            threshold: 0.40,
                        }],
                        Action::EqualWeight,
                    )
                    .only(&["NVDA", "ARM"]),
                ),
            ),
            RuleStep::new(
                "stop_loss",
                AdjustmentRule::StopLoss(
                    TriggeredRule::new(
                        vec![Trigger::Loss {
                            window: ONE_MONTH,
                            threshold: 0.15,
                        }],
                        Action::Trim(0.5),
                    )
                    .only(&["AMD"]),
                ),
            ),
            RuleStep::new(
                "volatility_spike",
                AdjustmentRule::VolatilitySpike {
                    watch: Some(codes(&["MSFT"])),
                    multiple: 1.5,
                },
            ),
        ],
        ..StrategyConfig::new("semiconductor_quarterly", &["MSFT", "ARM", "NVDA", "AMD"])
    }
}

/// Every preset, in a stable order.
pub fn all() -> Vec<StrategyConfig> {
    vec![
        momentum_risk_parity(),
        biotech_rotation(),
        clean_energy_value(),
        nuclear_sector(),
        crypto_regime(),
        policy_influence(),
        sector_rotation(),
        real_assets_inflation(),
        emerging_trend_tiers(),
        semiconductor_quarterly(),
    ]
}

/// Look a preset up by its configured name.
pub fn by_name(name: &str) -> Option<StrategyConfig> {
    all().into_iter().find(|c| c.name == name)
}
