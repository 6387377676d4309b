//! Rule evaluation engine.
//!
//! Applies an ordered list of [`RuleStep`]s to a [`Book`]. Each rule reads
//! the signals, the auxiliary view and the reference-value cache, and writes
//! only to the book.
//!
//! # Evaluation Semantics
//!
//! - Rules run in list order; disabled steps are skipped
//! - Triggered rules fire when any trigger holds; thresholds are strict
//! - Instruments without a signal never fire a trigger
//! - A rule whose inputs are unavailable leaves the book untouched

use crate::domain::auxiliary::AuxiliaryView;
use crate::domain::rule::{
    Action, AdjustmentRule, Book, RegimeMeasure, RuleStep, Trigger, TriggeredRule,
};
use crate::domain::signal::Signal;
use crate::domain::state::ReferenceValue;
use std::collections::BTreeMap;

/// Read-only inputs shared by every rule in one invocation.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub signals: &'a BTreeMap<String, Signal>,
    pub aux: &'a AuxiliaryView,
    pub references: &'a BTreeMap<String, ReferenceValue>,
}

pub fn apply_rules(steps: &[RuleStep], book: &mut Book, ctx: &RuleContext) {
    for step in steps.iter().filter(|s| s.enabled) {
        let touched = apply_rule(&step.rule, book, ctx);
        if touched > 0 {
            log::debug!(
                "rule '{}' ({}) touched {} instrument(s)",
                step.id,
                step.rule.kind(),
                touched
            );
        }
    }
}

/// Apply one rule; returns how many instruments it changed or flagged.
pub fn apply_rule(rule: &AdjustmentRule, book: &mut Book, ctx: &RuleContext) -> usize {
    match rule {
        AdjustmentRule::ProfitTaking(triggered) | AdjustmentRule::StopLoss(triggered) => {
            apply_triggered(triggered, book, ctx)
        }
        AdjustmentRule::EventProfitTaking { threshold } => {
            apply_event_profit_taking(*threshold, book, ctx)
        }
        AdjustmentRule::DefensiveRotation {
            risky,
            defensive,
            measure,
            shift_fraction,
        } => apply_rotation(risky, defensive, measure, *shift_fraction, book, ctx),
        AdjustmentRule::VolatilitySpike { watch, multiple } => {
            apply_volatility_spike(watch.as_deref(), *multiple, book, ctx)
        }
        AdjustmentRule::RegimeOverride {
            proxy,
            risk_on,
            risk_off,
        } => apply_regime_override(proxy, risk_on, risk_off, book, ctx),
        AdjustmentRule::MacroTilt {
            above,
            targets,
            bonus,
        } => match ctx.aux.breakeven {
            Some(reading) if reading > *above => {
                for code in targets {
                    book.add(code, *bonus);
                }
                targets.len()
            }
            _ => 0,
        },
        AdjustmentRule::ValuationTilt { factor, exclude } => {
            apply_valuation_tilt(*factor, exclude, book, ctx)
        }
    }
}

pub fn trigger_fires(trigger: &Trigger, signal: &Signal, value: f64) -> bool {
    match trigger {
        Trigger::Gain { window, threshold } => signal.horizon_return(*window) > *threshold,
        Trigger::Loss { window, threshold } => signal.horizon_return(*window) < -threshold,
        Trigger::Overbought { rsi } => signal.rsi > *rsi,
        Trigger::Drawdown { window, threshold } => signal.drawdown_over(*window) > *threshold,
        Trigger::Trend(filter) => signal.is_below(*filter),
        Trigger::Negative => value < 0.0,
    }
}

fn apply_triggered(rule: &TriggeredRule, book: &mut Book, ctx: &RuleContext) -> usize {
    let proxy_signal = match &rule.proxy {
        Some(proxy) => match ctx.signals.get(proxy) {
            Some(signal) => Some(signal),
            None => return 0,
        },
        None => None,
    };
    let is_proxy = |code: &String| rule.proxy.as_ref() == Some(code);
    let codes: Vec<&String> = match &rule.targets {
        Some(targets) => targets.iter().filter(|c| !is_proxy(*c)).collect(),
        None => ctx.signals.keys().filter(|c| !is_proxy(*c)).collect(),
    };

    let mut touched = 0;
    for code in codes {
        let Some(own) = ctx.signals.get(code) else {
            continue;
        };
        let signal = proxy_signal.unwrap_or(own);
        let value = book.get(code);
        if !rule.triggers.iter().any(|t| trigger_fires(t, signal, value)) {
            continue;
        }
        match rule.action {
            Action::Exclude => book.exclude(code),
            Action::EqualWeight => book.request_equal_weight(),
            Action::Trim(factor) => trim(book, code, factor),
            ref action => book.set(code, action.adjust(value)),
        }
        touched += 1;
    }
    touched
}

/// Scale `code` by `factor` and spread the difference over the other held,
/// included instruments in proportion to their values.
fn trim(book: &mut Book, code: &str, factor: f64) {
    let value = book.get(code);
    let freed = value - value * factor;
    book.set(code, value * factor);

    let others: Vec<(String, f64)> = book
        .values()
        .iter()
        .filter(|(c, v)| c.as_str() != code && **v > 0.0 && !book.is_excluded(c))
        .map(|(c, v)| (c.clone(), *v))
        .collect();
    let total: f64 = others.iter().map(|(_, v)| v).sum();
    if total <= 0.0 {
        return;
    }
    for (other, v) in others {
        book.set(&other, v + freed * v / total);
    }
}

fn apply_event_profit_taking(threshold: f64, book: &mut Book, ctx: &RuleContext) -> usize {
    let mut touched = 0;
    for (code, reference) in ctx.references {
        let Some(signal) = ctx.signals.get(code) else {
            continue;
        };
        if reference.price <= 0.0 {
            continue;
        }
        let gain = signal.close / reference.price - 1.0;
        if gain >= threshold {
            log::info!(
                "{} up {:.1}% since {} event reference, excluded",
                code,
                gain * 100.0,
                reference.date
            );
            book.exclude(code);
            touched += 1;
        }
    }
    touched
}

fn group_measure(codes: &[String], measure: &RegimeMeasure, ctx: &RuleContext) -> f64 {
    match measure {
        RegimeMeasure::MomentumSum => codes
            .iter()
            .filter_map(|c| ctx.signals.get(c))
            .map(|s| s.momentum)
            .sum(),
        RegimeMeasure::MeanReturn { window } => {
            let returns: Vec<f64> = codes
                .iter()
                .filter_map(|c| ctx.signals.get(c))
                .map(|s| s.horizon_return(*window))
                .collect();
            if returns.is_empty() {
                0.0
            } else {
                returns.iter().sum::<f64>() / returns.len() as f64
            }
        }
        RegimeMeasure::RiskAdjustedSum { window } => codes
            .iter()
            .filter_map(|c| ctx.signals.get(c))
            .map(|s| s.horizon_return(*window) / s.volatility_over(*window))
            .sum(),
    }
}

fn apply_rotation(
    risky: &[String],
    defensive: &str,
    measure: &RegimeMeasure,
    shift_fraction: f64,
    book: &mut Book,
    ctx: &RuleContext,
) -> usize {
    if book.is_excluded(defensive) || !ctx.signals.contains_key(defensive) {
        return 0;
    }
    let risky_measure = group_measure(risky, measure, ctx);
    let defensive_measure = group_measure(&[defensive.to_string()], measure, ctx);
    if risky_measure >= defensive_measure {
        return 0;
    }

    let mut moved = 0.0;
    let mut touched = 0;
    for code in risky {
        let value = book.get(code);
        if value > 0.0 {
            let shift = value * shift_fraction;
            book.set(code, value - shift);
            moved += shift;
            touched += 1;
        }
    }
    if moved > 0.0 {
        book.add(defensive, moved);
        log::debug!("rotated {:.4} of weight into {}", moved, defensive);
    }
    touched
}

fn apply_volatility_spike(
    watch: Option<&[String]>,
    multiple: f64,
    book: &mut Book,
    ctx: &RuleContext,
) -> usize {
    let spiking = |signal: &Signal| signal.volatility > multiple * signal.historical_volatility;
    let spike = match watch {
        Some(codes) => codes
            .iter()
            .filter_map(|c| ctx.signals.get(c))
            .find(|s| spiking(*s)),
        None => ctx.signals.values().find(|s| spiking(*s)),
    };
    match spike {
        Some(signal) => {
            log::info!(
                "volatility spike on {} ({:.3} vs {:.3}), equal weighting",
                signal.code,
                signal.volatility,
                signal.historical_volatility
            );
            book.request_equal_weight();
            1
        }
        None => 0,
    }
}

fn apply_regime_override(
    proxy: &str,
    risk_on: &BTreeMap<String, f64>,
    risk_off: &BTreeMap<String, f64>,
    book: &mut Book,
    ctx: &RuleContext,
) -> usize {
    let Some(signal) = ctx.signals.get(proxy) else {
        return 0;
    };
    let table = if signal.long_average.is_some_and(|ma| signal.close > ma) {
        risk_on
    } else if signal.short_average.is_some_and(|ma| signal.close < ma) {
        risk_off
    } else {
        return 0;
    };
    for (code, weight) in table {
        book.set(code, *weight);
    }
    table.len()
}

fn apply_valuation_tilt(
    factor: f64,
    exclude: &[String],
    book: &mut Book,
    ctx: &RuleContext,
) -> usize {
    let Some(median) = ctx.aux.price_to_book_median(exclude) else {
        return 0;
    };
    let cheap: Vec<String> = ctx
        .aux
        .price_to_book
        .iter()
        .filter(|(code, pb)| !exclude.contains(code) && **pb < median)
        .map(|(code, _)| code.clone())
        .collect();
    for code in &cheap {
        book.set(code, book.get(code) * factor);
    }
    cheap.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::signal::TrendFilter;
    use chrono::NaiveDate;

    fn signal(code: &str, closes: &[f64]) -> Signal {
        Signal {
            code: code.into(),
            close: *closes.last().unwrap(),
            closes: closes.to_vec(),
            volatility: 0.2,
            historical_volatility: 0.2,
            momentum: 1.0,
            rsi: 50.0,
            drawdown: 0.0,
            short_average: None,
            long_average: None,
        }
    }

    fn signals(list: Vec<Signal>) -> BTreeMap<String, Signal> {
        list.into_iter().map(|s| (s.code.clone(), s)).collect()
    }

    fn book(pairs: &[(&str, f64)]) -> Book {
        Book::from_values(pairs.iter().map(|(c, v)| (c.to_string(), *v)).collect())
    }

    fn run(rule: AdjustmentRule, book: &mut Book, sigs: &BTreeMap<String, Signal>) -> usize {
        let aux = AuxiliaryView::default();
        let refs = BTreeMap::new();
        let ctx = RuleContext {
            signals: sigs,
            aux: &aux,
            references: &refs,
        };
        apply_rule(&rule, book, &ctx)
    }

    #[test]
    fn stop_loss_never_raises_weights() {
        let sigs = signals(vec![
            signal("AAA", &[100.0, 120.0, 80.0]),
            signal("BBB", &[100.0, 101.0, 102.0]),
            signal("CCC", &[50.0, 40.0, 30.0]),
        ]);
        let before = book(&[("AAA", 0.5), ("BBB", 0.3), ("CCC", 0.2)]);
        let mut after = before.clone();
        let rule = AdjustmentRule::StopLoss(TriggeredRule::new(
            vec![Trigger::Drawdown {
                window: 63,
                threshold: 0.15,
            }],
            Action::Scale(0.5),
        ));
        assert_eq!(run(rule, &mut after, &sigs), 2);
        for code in ["AAA", "BBB", "CCC"] {
            assert!(after.get(code) <= before.get(code));
        }
        assert_eq!(after.get("BBB"), 0.3);
        assert_eq!(after.get("AAA"), 0.25);
    }

    #[test]
    fn profit_taking_on_gain_or_rsi() {
        let mut hot = signal("AAA", &[100.0, 110.0]);
        hot.rsi = 80.0;
        let sigs = signals(vec![
            hot,
            signal("BBB", &[100.0, 130.0]),
            signal("CCC", &[100.0, 101.0]),
        ]);
        let mut b = book(&[("AAA", 0.4), ("BBB", 0.4), ("CCC", 0.2)]);
        let rule = AdjustmentRule::ProfitTaking(TriggeredRule::new(
            vec![
                Trigger::Gain {
                    window: 1,
                    threshold: 0.2,
                },
                Trigger::Overbought { rsi: 70.0 },
            ],
            Action::Reduce(0.05),
        ));
        assert_eq!(run(rule, &mut b, &sigs), 2);
        assert!((b.get("AAA") - 0.35).abs() < 1e-12);
        assert!((b.get("BBB") - 0.35).abs() < 1e-12);
        assert_eq!(b.get("CCC"), 0.2);
    }

    #[test]
    fn trend_stop_excludes() {
        let mut weak = signal("AAA", &[10.0]);
        weak.long_average = Some(12.0);
        let sigs = signals(vec![weak]);
        let mut b = book(&[("AAA", 1.0)]);
        let rule = AdjustmentRule::StopLoss(TriggeredRule::new(
            vec![Trigger::Trend(TrendFilter::CloseBelowLong)],
            Action::Exclude,
        ));
        run(rule, &mut b, &sigs);
        assert!(b.is_excluded("AAA"));
    }

    #[test]
    fn negative_trigger_reads_book_value() {
        let sigs = signals(vec![signal("AAA", &[1.0]), signal("BBB", &[1.0])]);
        let mut b = book(&[("AAA", -2.0), ("BBB", 2.0)]);
        let rule = AdjustmentRule::StopLoss(TriggeredRule::new(
            vec![Trigger::Negative],
            Action::Scale(0.5),
        ));
        run(rule, &mut b, &sigs);
        assert_eq!(b.get("AAA"), -1.0);
        assert_eq!(b.get("BBB"), 2.0);
    }

    #[test]
    fn targets_restrict_scope() {
        let sigs = signals(vec![signal("AAA", &[100.0, 50.0]), signal("BBB", &[100.0, 50.0])]);
        let mut b = book(&[("AAA", 0.5), ("BBB", 0.5)]);
        let rule = AdjustmentRule::StopLoss(
            TriggeredRule::new(
                vec![Trigger::Loss {
                    window: 1,
                    threshold: 0.1,
                }],
                Action::Remove,
            )
            .only(&["BBB", "ZZZ"]),
        );
        assert_eq!(run(rule, &mut b, &sigs), 1);
        assert_eq!(b.get("AAA"), 0.5);
        assert_eq!(b.get("BBB"), 0.0);
    }

    #[test]
    fn equal_weight_action_raises_override() {
        let sigs = signals(vec![
            signal("AAA", &[100.0, 150.0]),
            signal("BBB", &[100.0, 100.0]),
        ]);
        let mut b = book(&[("AAA", 0.7), ("BBB", 0.3)]);
        let rule = AdjustmentRule::ProfitTaking(
            TriggeredRule::new(
                vec![Trigger::Gain {
                    window: 1,
                    threshold: 0.4,
                }],
                Action::EqualWeight,
            )
            .only(&["AAA"]),
        );
        assert_eq!(run(rule, &mut b, &sigs), 1);
        assert!(b.equal_weight_override());
        assert_eq!(b.get("AAA"), 0.7);
    }

    #[test]
    fn proxy_trigger_tilts_the_rest() {
        let sigs = signals(vec![
            signal("ICLN", &[100.0, 115.0]),
            signal("ENPH", &[100.0, 90.0]),
            signal("NEE", &[100.0, 100.0]),
        ]);
        let mut b = book(&[("ICLN", 1.0), ("ENPH", 1.0), ("NEE", 1.0)]);
        let rule = AdjustmentRule::ProfitTaking(
            TriggeredRule::new(
                vec![Trigger::Gain {
                    window: 1,
                    threshold: 0.1,
                }],
                Action::Set(1.25),
            )
            .on("ICLN"),
        );
        assert_eq!(run(rule.clone(), &mut b, &sigs), 2);
        assert_eq!(b.get("ICLN"), 1.0);
        assert_eq!(b.get("ENPH"), 1.25);
        assert_eq!(b.get("NEE"), 1.25);

        let flat = signals(vec![signal("ICLN", &[100.0, 105.0]), signal("NEE", &[1.0])]);
        let mut untouched = book(&[("NEE", 1.0)]);
        assert_eq!(run(rule.clone(), &mut untouched, &flat), 0);

        let missing = signals(vec![signal("NEE", &[100.0, 200.0])]);
        assert_eq!(run(rule, &mut untouched, &missing), 0);
        assert_eq!(untouched.get("NEE"), 1.0);
    }

    #[test]
    fn trim_keeps_the_freed_weight_in_the_book() {
        let sigs = signals(vec![
            signal("AMD", &[100.0, 80.0]),
            signal("NVDA", &[100.0, 100.0]),
            signal("TSM", &[100.0, 100.0]),
        ]);
        let mut b = book(&[("AMD", 0.4), ("NVDA", 0.45), ("TSM", 0.15)]);
        b.exclude("TSM");
        let rule = AdjustmentRule::StopLoss(
            TriggeredRule::new(
                vec![Trigger::Loss {
                    window: 1,
                    threshold: 0.15,
                }],
                Action::Trim(0.5),
            )
            .only(&["AMD"]),
        );
        assert_eq!(run(rule, &mut b, &sigs), 1);
        assert!((b.get("AMD") - 0.2).abs() < 1e-12);
        assert!((b.get("NVDA") - 0.65).abs() < 1e-12);
        assert_eq!(b.get("TSM"), 0.0);
    }

    #[test]
    fn volatility_spike_requests_equal_weight() {
        let mut spiky = signal("AAA", &[1.0]);
        spiky.volatility = 0.30;
        spiky.historical_volatility = 0.15;
        let sigs = signals(vec![spiky, signal("BBB", &[1.0])]);
        let mut b = book(&[("AAA", 0.9), ("BBB", 0.1)]);
        run(
            AdjustmentRule::VolatilitySpike {
                watch: None,
                multiple: 1.5,
            },
            &mut b,
            &sigs,
        );
        assert!(b.equal_weight_override());
    }

    #[test]
    fn volatility_spike_respects_watch_list() {
        let mut spiky = signal("AAA", &[1.0]);
        spiky.volatility = 0.30;
        spiky.historical_volatility = 0.15;
        let sigs = signals(vec![spiky, signal("BBB", &[1.0])]);
        let mut b = Book::new();
        run(
            AdjustmentRule::VolatilitySpike {
                watch: Some(vec!["BBB".into()]),
                multiple: 1.5,
            },
            &mut b,
            &sigs,
        );
        assert!(!b.equal_weight_override());
    }

    #[test]
    fn event_profit_taking_uses_reference_cache() {
        let sigs = signals(vec![signal("LMT", &[100.0, 125.0]), signal("RTX", &[100.0, 105.0])]);
        let date = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let refs: BTreeMap<String, ReferenceValue> = [
            ("LMT".to_string(), ReferenceValue { price: 100.0, date }),
            ("RTX".to_string(), ReferenceValue { price: 100.0, date }),
        ]
        .into_iter()
        .collect();
        let aux = AuxiliaryView::default();
        let ctx = RuleContext {
            signals: &sigs,
            aux: &aux,
            references: &refs,
        };
        let mut b = book(&[("LMT", 0.5), ("RTX", 0.5)]);
        apply_rule(&AdjustmentRule::EventProfitTaking { threshold: 0.2 }, &mut b, &ctx);
        assert!(b.is_excluded("LMT"));
        assert!(!b.is_excluded("RTX"));
    }

    #[test]
    fn rotation_shifts_into_defensive() {
        let mut weak = signal("BIO", &[1.0]);
        weak.momentum = -1.0;
        let mut strong = signal("UNH", &[1.0]);
        strong.momentum = 2.0;
        let sigs = signals(vec![weak, strong]);
        let mut b = book(&[("BIO", 0.6), ("UNH", 0.4)]);
        let rule = AdjustmentRule::DefensiveRotation {
            risky: vec!["BIO".into()],
            defensive: "UNH".into(),
            measure: RegimeMeasure::MomentumSum,
            shift_fraction: 0.5,
        };
        run(rule.clone(), &mut b, &sigs);
        assert!((b.get("BIO") - 0.3).abs() < 1e-12);
        assert!((b.get("UNH") - 0.7).abs() < 1e-12);

        let mut flipped = book(&[("BIO", 0.6), ("UNH", 0.4)]);
        let by_risk = AdjustmentRule::DefensiveRotation {
            risky: vec!["BIO".into()],
            defensive: "UNH".into(),
            measure: RegimeMeasure::RiskAdjustedSum { window: 2 },
            shift_fraction: 0.5,
        };
        assert_eq!(run(by_risk, &mut flipped, &sigs), 0);
        assert_eq!(flipped.get("BIO"), 0.6);

        let mut excluded = book(&[("BIO", 0.6)]);
        excluded.exclude("UNH");
        assert_eq!(run(rule, &mut excluded, &sigs), 0);
        assert_eq!(excluded.get("BIO"), 0.6);
    }

    #[test]
    fn regime_override_installs_table() {
        let mut proxy = signal("BTC", &[100.0]);
        proxy.long_average = Some(90.0);
        proxy.short_average = Some(95.0);
        let sigs = signals(vec![proxy]);
        let risk_on: BTreeMap<String, f64> = [("BTC".to_string(), 0.7), ("ETH".to_string(), 0.3)]
            .into_iter()
            .collect();
        let risk_off: BTreeMap<String, f64> = [("BTC".to_string(), 0.2)].into_iter().collect();
        let mut b = Book::new();
        run(
            AdjustmentRule::RegimeOverride {
                proxy: "BTC".into(),
                risk_on,
                risk_off,
            },
            &mut b,
            &sigs,
        );
        assert_eq!(b.get("BTC"), 0.7);
        assert_eq!(b.get("ETH"), 0.3);
    }

    #[test]
    fn regime_override_without_proxy_is_noop() {
        let sigs = BTreeMap::new();
        let mut b = book(&[("ETH", 0.5)]);
        let touched = run(
            AdjustmentRule::RegimeOverride {
                proxy: "BTC".into(),
                risk_on: BTreeMap::new(),
                risk_off: BTreeMap::new(),
            },
            &mut b,
            &sigs,
        );
        assert_eq!(touched, 0);
        assert_eq!(b.get("ETH"), 0.5);
    }

    #[test]
    fn macro_and_valuation_tilts() {
        let sigs = BTreeMap::new();
        let mut aux = AuxiliaryView::default();
        aux.breakeven = Some(2.6);
        for (code, pb) in [("NEE", 2.0), ("FSLR", 3.0), ("PLUG", 1.0)] {
            aux.price_to_book.insert(code.into(), pb);
        }
        let refs = BTreeMap::new();
        let ctx = RuleContext {
            signals: &sigs,
            aux: &aux,
            references: &refs,
        };
        let mut b = book(&[("GLD", 0.2), ("PLUG", 0.3), ("NEE", 0.3)]);
        apply_rule(
            &AdjustmentRule::MacroTilt {
                above: 2.5,
                targets: vec!["GLD".into()],
                bonus: 0.2,
            },
            &mut b,
            &ctx,
        );
        assert!((b.get("GLD") - 0.4).abs() < 1e-12);

        apply_rule(
            &AdjustmentRule::ValuationTilt {
                factor: 1.2,
                exclude: vec![],
            },
            &mut b,
            &ctx,
        );
        assert!((b.get("PLUG") - 0.36).abs() < 1e-12);
        assert_eq!(b.get("NEE"), 0.3);
    }

    #[test]
    fn disabled_steps_are_skipped() {
        let sigs = signals(vec![signal("AAA", &[1.0])]);
        let aux = AuxiliaryView::default();
        let refs = BTreeMap::new();
        let ctx = RuleContext {
            signals: &sigs,
            aux: &aux,
            references: &refs,
        };
        let steps = vec![
            RuleStep::new(
                "wipe",
                AdjustmentRule::StopLoss(TriggeredRule::new(
                    vec![Trigger::Drawdown {
                        window: 1,
                        threshold: -1.0,
                    }],
                    Action::Remove,
                )),
            )
            .disabled(),
        ];
        let mut b = book(&[("AAA", 0.5)]);
        apply_rules(&steps, &mut b, &ctx);
        assert_eq!(b.get("AAA"), 0.5);
    }
}
