//! Strategy configuration from INI.
//!
//! Reads and validates every section a strategy needs and assembles a
//! [`StrategyConfig`]. Compact values are parsed by
//! [`crate::domain::rule_parser`].
//!
//! ```ini
//! [strategy]
//! name = Sector Rotation
//! universe = SPY, BIL, XLK, XLE
//! schedule = every(5)
//! score = spread(126, 21)
//! score_rules = trim
//! weight_rules = spike
//!
//! [weights]
//! mode = regime_switch
//!
//! [regime]
//! risk_proxy = SPY
//! safe_proxy = BIL
//! candidates = XLK, XLE
//! top_k = 2
//! defensive = GLD:0.5, BIL:0.5
//!
//! [rule:spike]
//! kind = volatility_spike
//! multiple = 1.5
//! ```

use crate::domain::allocation::FallbackAllocation;
use crate::domain::allocator::{RegimeSwitch, WeightingMode};
use crate::domain::auxiliary::DatasetId;
use crate::domain::defaults::MAX_WINDOW;
use crate::domain::error::{ParseError, SamallocError};
use crate::domain::rule::{AdjustmentRule, RuleStep, TriggeredRule};
use crate::domain::rule_parser::{
    parse_action, parse_call, parse_measure, parse_schedule, parse_score_source, parse_triggers,
    parse_weight_map,
};
use crate::domain::signal::{AverageKind, SignalParams};
use crate::domain::strategy::StrategyConfig;
use crate::domain::universe::parse_codes;
use crate::ports::config_port::ConfigPort;

const STRATEGY: &str = "strategy";
const SIGNALS: &str = "signals";
const WEIGHTS: &str = "weights";
const REGIME: &str = "regime";

pub fn build_strategy_config(config: &dyn ConfigPort) -> Result<StrategyConfig, SamallocError> {
    let universe = read_codes(config, STRATEGY, "universe")?;
    let defaults = StrategyConfig::new("", &[]);

    let name = config
        .get_string(STRATEGY, "name")
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| SamallocError::missing(STRATEGY, "name"))?;

    let schedule = match config.get_string(STRATEGY, "schedule") {
        Some(value) => parsed(STRATEGY, "schedule", &value, parse_schedule)?,
        None => defaults.schedule,
    };

    let score = match config.get_string(STRATEGY, "score") {
        Some(value) => parsed(STRATEGY, "score", &value, parse_score_source)?,
        None => defaults.score,
    };

    let fallback = match config.get_string(STRATEGY, "fallback").as_deref().map(str::trim) {
        None | Some("equal_weight") => FallbackAllocation::EqualWeight,
        Some("all_zero") => FallbackAllocation::AllZero,
        Some(other) => {
            return Err(SamallocError::invalid(
                STRATEGY,
                "fallback",
                format!("expected equal_weight or all_zero, found '{}'", other),
            ));
        }
    };

    let datasets = match config.get_string(STRATEGY, "datasets") {
        Some(value) => value
            .split(',')
            .map(|d| d.parse::<DatasetId>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|reason| SamallocError::invalid(STRATEGY, "datasets", reason))?,
        None => Vec::new(),
    };

    Ok(StrategyConfig {
        name: name.trim().to_string(),
        schedule,
        signals: read_signals(config)?,
        score,
        weighting: read_weighting(config)?,
        score_rules: read_rule_list(config, "score_rules")?,
        weight_rules: read_rule_list(config, "weight_rules")?,
        normalize_to_one: config.get_bool(STRATEGY, "normalize_to_one", defaults.normalize_to_one),
        min_history: read_usize(config, STRATEGY, "min_history", defaults.min_history)?,
        fallback,
        datasets,
        universe,
    })
}

fn parsed<T>(
    section: &str,
    key: &str,
    value: &str,
    parse: impl Fn(&str) -> Result<T, ParseError>,
) -> Result<T, SamallocError> {
    parse(value).map_err(|e| SamallocError::invalid(section, key, format!("{} in '{}'", e, value)))
}

fn require(config: &dyn ConfigPort, section: &str, key: &str) -> Result<String, SamallocError> {
    match config.get_string(section, key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(SamallocError::missing(section, key)),
    }
}

fn read_codes(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Vec<String>, SamallocError> {
    let value = require(config, section, key)?;
    parse_codes(&value).map_err(|e| SamallocError::invalid(section, key, e.to_string()))
}

fn read_usize(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, SamallocError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| {
            let reason = format!("expected a whole number, found '{}'", value);
            SamallocError::invalid(section, key, reason)
        }),
    }
}

fn read_window(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
) -> Result<usize, SamallocError> {
    let value = read_usize(config, section, key, default)?;
    if value == 0 {
        return Err(SamallocError::invalid(section, key, "window must be positive"));
    }
    if value > MAX_WINDOW {
        return Err(SamallocError::invalid(
            section,
            key,
            format!("window must not exceed {}", MAX_WINDOW),
        ));
    }
    Ok(value)
}

fn read_number(config: &dyn ConfigPort, section: &str, key: &str) -> Result<f64, SamallocError> {
    let value = require(config, section, key)?;
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| {
            let reason = format!("expected a number, found '{}'", value);
            SamallocError::invalid(section, key, reason)
        })
}

fn read_fraction(config: &dyn ConfigPort, section: &str, key: &str) -> Result<f64, SamallocError> {
    let value = read_number(config, section, key)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(SamallocError::invalid(section, key, "must be between 0 and 1"));
    }
    Ok(value)
}

fn read_signals(config: &dyn ConfigPort) -> Result<SignalParams, SamallocError> {
    let defaults = SignalParams::default();
    let average = match config.get_string(SIGNALS, "average").as_deref().map(str::trim) {
        None | Some("simple") => AverageKind::Simple,
        Some("vwap") => AverageKind::VolumeWeighted,
        Some(other) => {
            return Err(SamallocError::invalid(
                SIGNALS,
                "average",
                format!("expected simple or vwap, found '{}'", other),
            ));
        }
    };
    let short_average = read_window(config, SIGNALS, "short_average", defaults.short_average)?;
    let long_average = read_window(config, SIGNALS, "long_average", defaults.long_average)?;
    if short_average >= long_average {
        return Err(SamallocError::invalid(
            SIGNALS,
            "short_average",
            "short_average must be below long_average",
        ));
    }
    let historical_key = "historical_volatility_window";
    let historical_volatility_window = match config.get_string(SIGNALS, historical_key) {
        Some(_) => Some(read_window(config, SIGNALS, historical_key, 1)?),
        None => None,
    };

    Ok(SignalParams {
        volatility_window: read_window(
            config,
            SIGNALS,
            "volatility_window",
            defaults.volatility_window,
        )?,
        drawdown_window: read_window(config, SIGNALS, "drawdown_window", defaults.drawdown_window)?,
        rsi_period: read_window(config, SIGNALS, "rsi_period", defaults.rsi_period)?,
        average,
        short_average,
        long_average,
        historical_volatility_window,
    })
}

fn read_weighting(config: &dyn ConfigPort) -> Result<WeightingMode, SamallocError> {
    let Some(value) = config.get_string(WEIGHTS, "mode") else {
        return Ok(WeightingMode::InverseVolatility {
            scale_by_score: false,
        });
    };
    let call = parsed(WEIGHTS, "mode", &value, parse_call)?;
    let arity = |n: usize| {
        if call.args.len() == n {
            Ok(())
        } else {
            Err(SamallocError::invalid(
                WEIGHTS,
                "mode",
                format!("{} takes {} argument(s)", call.name, n),
            ))
        }
    };
    let arg_err = |e: ParseError| SamallocError::invalid(WEIGHTS, "mode", e.to_string());

    match call.name.as_str() {
        "inverse_volatility" => arity(0).map(|_| WeightingMode::InverseVolatility {
            scale_by_score: false,
        }),
        "scaled_inverse_volatility" => arity(0).map(|_| WeightingMode::InverseVolatility {
            scale_by_score: true,
        }),
        "proportional" => arity(0).map(|_| WeightingMode::Proportional),
        "top_k" => {
            arity(1)?;
            Ok(WeightingMode::TopK {
                k: call.window(0).map_err(arg_err)?,
            })
        }
        "trend_tiers" => {
            arity(2)?;
            Ok(WeightingMode::TrendTiers {
                strong: call.fraction(0).map_err(arg_err)?,
                weak: call.fraction(1).map_err(arg_err)?,
            })
        }
        "fixed" => {
            arity(0)?;
            let table = require(config, WEIGHTS, "table")?;
            Ok(WeightingMode::Fixed(parsed(WEIGHTS, "table", &table, parse_weight_map)?))
        }
        "regime_switch" => {
            arity(0)?;
            Ok(WeightingMode::RegimeSwitch(read_regime_switch(config)?))
        }
        other => Err(SamallocError::invalid(
            WEIGHTS,
            "mode",
            format!("unknown weighting mode '{}'", other),
        )),
    }
}

fn read_regime_switch(config: &dyn ConfigPort) -> Result<RegimeSwitch, SamallocError> {
    let defensive = require(config, REGIME, "defensive")?;
    Ok(RegimeSwitch {
        risk_proxy: require(config, REGIME, "risk_proxy")?.trim().to_uppercase(),
        safe_proxy: require(config, REGIME, "safe_proxy")?.trim().to_uppercase(),
        candidates: read_codes(config, REGIME, "candidates")?,
        top_k: read_window(config, REGIME, "top_k", 1)?,
        defensive: parsed(REGIME, "defensive", &defensive, parse_weight_map)?,
    })
}

fn read_rule_list(config: &dyn ConfigPort, key: &str) -> Result<Vec<RuleStep>, SamallocError> {
    let Some(value) = config.get_string(STRATEGY, key) else {
        return Ok(Vec::new());
    };
    if value.trim().is_empty() {
        return Ok(Vec::new());
    }
    value
        .split(',')
        .map(|id| read_rule(config, &id.trim().to_lowercase()))
        .collect()
}

/// Parse a compact value inside a `[rule:<id>]` section.
fn rule_value<T>(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    parse: impl Fn(&str) -> Result<T, ParseError>,
) -> Result<T, SamallocError> {
    let value = require(config, section, key)?;
    parse(&value).map_err(|e| {
        log::warn!("[{}] {}:\n{}", section, key, e.display_with_context(&value));
        SamallocError::RuleParse(e)
    })
}

fn read_rule(config: &dyn ConfigPort, id: &str) -> Result<RuleStep, SamallocError> {
    let section = format!("rule:{}", id);
    let section = section.as_str();
    let kind = require(config, section, "kind")?;

    let triggered = || -> Result<TriggeredRule, SamallocError> {
        let mut rule = TriggeredRule::new(
            rule_value(config, section, "when", parse_triggers)?,
            rule_value(config, section, "action", parse_action)?,
        );
        if config.get_string(section, "targets").is_some() {
            rule.targets = Some(read_codes(config, section, "targets")?);
        }
        if let Some(proxy) = config.get_string(section, "proxy") {
            rule.proxy = Some(proxy.trim().to_uppercase());
        }
        Ok(rule)
    };

    let optional_codes = |key: &str| -> Result<Option<Vec<String>>, SamallocError> {
        match config.get_string(section, key) {
            Some(_) => read_codes(config, section, key).map(Some),
            None => Ok(None),
        }
    };

    let rule = match kind.trim() {
        "profit_taking" => AdjustmentRule::ProfitTaking(triggered()?),
        "stop_loss" => AdjustmentRule::StopLoss(triggered()?),
        "event_profit_taking" => AdjustmentRule::EventProfitTaking {
            threshold: read_number(config, section, "threshold")?,
        },
        "defensive_rotation" => AdjustmentRule::DefensiveRotation {
            risky: read_codes(config, section, "risky")?,
            defensive: require(config, section, "defensive")?.trim().to_uppercase(),
            measure: rule_value(config, section, "measure", parse_measure)?,
            shift_fraction: read_fraction(config, section, "fraction")?,
        },
        "volatility_spike" => AdjustmentRule::VolatilitySpike {
            watch: optional_codes("watch")?,
            multiple: read_number(config, section, "multiple")?,
        },
        "regime_override" => AdjustmentRule::RegimeOverride {
            proxy: require(config, section, "proxy")?.trim().to_uppercase(),
            risk_on: rule_value(config, section, "risk_on", parse_weight_map)?,
            risk_off: rule_value(config, section, "risk_off", parse_weight_map)?,
        },
        "macro_tilt" => AdjustmentRule::MacroTilt {
            above: read_number(config, section, "above")?,
            targets: read_codes(config, section, "targets")?,
            bonus: read_number(config, section, "bonus")?,
        },
        "valuation_tilt" => AdjustmentRule::ValuationTilt {
            factor: read_number(config, section, "factor")?,
            exclude: optional_codes("exclude")?.unwrap_or_default(),
        },
        other => {
            return Err(SamallocError::invalid(
                section,
                "kind",
                format!("unknown rule kind '{}'", other),
            ));
        }
    };

    Ok(RuleStep {
        id: id.to_string(),
        enabled: config.get_bool(section, "enabled", true),
        rule,
    })
}
