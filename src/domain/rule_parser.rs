//! Parser for compact configuration values.
//!
//! Recursive descent parser for the small call grammar used in INI values:
//!
//! ```text
//! list    := call ("," call)*
//! call    := word ("(" arg ("," arg)* ")")?
//! arg     := number | word
//! weights := word ":" number ("," word ":" number)*
//! ```
//!
//! Errors carry the character offset of the offending token.

use crate::domain::allocator::ScoreSource;
use crate::domain::defaults::MAX_WINDOW;
use crate::domain::error::ParseError;
use crate::domain::rule::{Action, RegimeMeasure, Trigger};
use crate::domain::schedule::RebalanceSchedule;
use crate::domain::signal::TrendFilter;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Number(f64),
    Word(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub name: String,
    pub args: Vec<Arg>,
    /// Offset of the call name in the parsed input.
    pub position: usize,
}

impl Call {
    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.position,
        }
    }

    fn expect_arity(&self, n: usize) -> Result<(), ParseError> {
        if self.args.len() == n {
            Ok(())
        } else {
            Err(self.error(format!(
                "{} takes {} argument(s), found {}",
                self.name,
                n,
                self.args.len()
            )))
        }
    }

    pub fn number(&self, index: usize) -> Result<f64, ParseError> {
        match self.args.get(index) {
            Some(Arg::Number(v)) => Ok(*v),
            Some(Arg::Word(w)) => Err(self.error(format!(
                "{}: argument {} must be a number, found '{}'",
                self.name,
                index + 1,
                w
            ))),
            None => Err(self.error(format!("{}: missing argument {}", self.name, index + 1))),
        }
    }

    pub fn window(&self, index: usize) -> Result<usize, ParseError> {
        let value = self.number(index)?;
        if value < 1.0 || value.fract() != 0.0 {
            return Err(self.error(format!(
                "{}: argument {} must be a positive integer, found {}",
                self.name,
                index + 1,
                value
            )));
        }
        if value > MAX_WINDOW as f64 {
            return Err(self.error(format!(
                "{}: argument {} exceeds the longest window ({}), found {}",
                self.name,
                index + 1,
                MAX_WINDOW,
                value
            )));
        }
        Ok(value as usize)
    }

    pub fn fraction(&self, index: usize) -> Result<f64, ParseError> {
        let value = self.number(index)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(self.error(format!(
                "{}: argument {} must be within [0, 1], found {}",
                self.name,
                index + 1,
                value
            )));
        }
        Ok(value)
    }
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(ParseError {
                message: format!("expected '{}', found '{}'", expected, ch),
                position: self.pos,
            }),
            None => Err(ParseError {
                message: format!("expected '{}', found end of input", expected),
                position: self.pos,
            }),
        }
    }

    fn consume_char(&mut self, expected: char) -> bool {
        self.skip_whitespace();
        if self.peek() == Some(expected) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn found(&self) -> String {
        self.peek()
            .map(|c| c.to_string())
            .unwrap_or_else(|| "end of input".to_string())
    }

    fn is_word_char(ch: char) -> bool {
        ch.is_alphanumeric() || ch == '_' || ch == '.' || ch == '-'
    }

    fn parse_word(&mut self) -> Result<String, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.peek() {
            Some(ch) if ch.is_alphabetic() => {}
            _ => {
                return Err(ParseError {
                    message: format!("expected name, found '{}'", self.found()),
                    position: start,
                });
            }
        }
        while let Some(ch) = self.peek() {
            if Self::is_word_char(ch) {
                self.advance();
            } else {
                break;
            }
        }
        Ok(self.input[start..self.pos].to_string())
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_arg(&mut self) -> Result<Arg, ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch.is_ascii_digit() || ch == '-' || ch == '.' => {
                Ok(Arg::Number(self.parse_number()?))
            }
            Some(ch) if ch.is_alphabetic() => Ok(Arg::Word(self.parse_word()?)),
            _ => Err(ParseError {
                message: format!("expected argument, found '{}'", self.found()),
                position: self.pos,
            }),
        }
    }

    fn parse_call(&mut self) -> Result<Call, ParseError> {
        self.skip_whitespace();
        let position = self.pos;
        let name = self.parse_word()?.to_lowercase();
        let mut args = Vec::new();

        if self.consume_char('(') {
            args.push(self.parse_arg()?);
            loop {
                self.skip_whitespace();
                if self.peek() == Some(')') {
                    self.advance();
                    break;
                }
                self.expect_char(',')?;
                args.push(self.parse_arg()?);
            }
        }

        Ok(Call {
            name,
            args,
            position,
        })
    }

    fn parse_calls(&mut self) -> Result<Vec<Call>, ParseError> {
        let mut calls = vec![self.parse_call()?];
        while self.consume_char(',') {
            calls.push(self.parse_call()?);
        }
        Ok(calls)
    }

    fn parse_weights(&mut self) -> Result<BTreeMap<String, f64>, ParseError> {
        let mut weights = BTreeMap::new();
        loop {
            self.skip_whitespace();
            let position = self.pos;
            let code = self.parse_word()?.to_uppercase();
            self.expect_char(':')?;
            let weight = self.parse_number()?;
            if weight < 0.0 {
                return Err(ParseError {
                    message: format!("negative weight for {}", code),
                    position,
                });
            }
            if weights.insert(code.clone(), weight).is_some() {
                return Err(ParseError {
                    message: format!("duplicate weight for {}", code),
                    position,
                });
            }
            if !self.consume_char(',') {
                break;
            }
        }
        Ok(weights)
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(ParseError {
                message: format!("unexpected input: '{}'", self.remaining()),
                position: self.pos,
            });
        }
        Ok(())
    }
}

pub fn parse_call(input: &str) -> Result<Call, ParseError> {
    let mut parser = Parser::new(input);
    let call = parser.parse_call()?;
    parser.finish()?;
    Ok(call)
}

pub fn parse_calls(input: &str) -> Result<Vec<Call>, ParseError> {
    let mut parser = Parser::new(input);
    let calls = parser.parse_calls()?;
    parser.finish()?;
    Ok(calls)
}

/// `CODE:weight` pairs; codes are uppercased.
pub fn parse_weight_map(input: &str) -> Result<BTreeMap<String, f64>, ParseError> {
    let mut parser = Parser::new(input);
    let weights = parser.parse_weights()?;
    parser.finish()?;
    Ok(weights)
}

pub fn trigger_from_call(call: &Call) -> Result<Trigger, ParseError> {
    let no_args = |trigger: Trigger| call.expect_arity(0).map(|_| trigger);
    match call.name.as_str() {
        "gain" => {
            call.expect_arity(2)?;
            Ok(Trigger::Gain {
                window: call.window(0)?,
                threshold: call.number(1)?,
            })
        }
        "loss" => {
            call.expect_arity(2)?;
            Ok(Trigger::Loss {
                window: call.window(0)?,
                threshold: call.number(1)?,
            })
        }
        "drawdown" => {
            call.expect_arity(2)?;
            Ok(Trigger::Drawdown {
                window: call.window(0)?,
                threshold: call.fraction(1)?,
            })
        }
        "overbought" => {
            call.expect_arity(1)?;
            Ok(Trigger::Overbought {
                rsi: call.number(0)?,
            })
        }
        "close_below_short" => no_args(Trigger::Trend(TrendFilter::CloseBelowShort)),
        "close_below_long" => no_args(Trigger::Trend(TrendFilter::CloseBelowLong)),
        "short_below_long" => no_args(Trigger::Trend(TrendFilter::ShortBelowLong)),
        "negative" => no_args(Trigger::Negative),
        other => Err(call.error(format!("unknown trigger '{}'", other))),
    }
}

pub fn parse_triggers(input: &str) -> Result<Vec<Trigger>, ParseError> {
    parse_calls(input)?.iter().map(trigger_from_call).collect()
}

pub fn parse_action(input: &str) -> Result<Action, ParseError> {
    let call = parse_call(input)?;
    match call.name.as_str() {
        "scale" => {
            call.expect_arity(1)?;
            Ok(Action::Scale(call.number(0)?))
        }
        "reduce" => {
            call.expect_arity(1)?;
            Ok(Action::Reduce(call.fraction(0)?))
        }
        "cap" => {
            call.expect_arity(1)?;
            Ok(Action::Cap(call.fraction(0)?))
        }
        "set" => {
            call.expect_arity(1)?;
            Ok(Action::Set(call.number(0)?))
        }
        "trim" => {
            call.expect_arity(1)?;
            Ok(Action::Trim(call.fraction(0)?))
        }
        "remove" => call.expect_arity(0).map(|_| Action::Remove),
        "exclude" => call.expect_arity(0).map(|_| Action::Exclude),
        "equal_weight" => call.expect_arity(0).map(|_| Action::EqualWeight),
        other => Err(call.error(format!("unknown action '{}'", other))),
    }
}

pub fn parse_score_source(input: &str) -> Result<ScoreSource, ParseError> {
    let call = parse_call(input)?;
    match call.name.as_str() {
        "momentum" => call.expect_arity(0).map(|_| ScoreSource::Momentum),
        "return" => {
            call.expect_arity(1)?;
            Ok(ScoreSource::HorizonReturn {
                window: call.window(0)?,
            })
        }
        "risk_adjusted" => {
            call.expect_arity(1)?;
            Ok(ScoreSource::RiskAdjustedReturn {
                window: call.window(0)?,
            })
        }
        "spread" => {
            call.expect_arity(2)?;
            Ok(ScoreSource::ReturnSpread {
                long: call.window(0)?,
                short: call.window(1)?,
            })
        }
        "constant" => {
            call.expect_arity(1)?;
            Ok(ScoreSource::Constant(call.number(0)?))
        }
        "influence" => {
            call.expect_arity(2)?;
            Ok(ScoreSource::Influence {
                award_weight: call.number(0)?,
                lobbying_weight: call.number(1)?,
            })
        }
        other => Err(call.error(format!("unknown score source '{}'", other))),
    }
}

pub fn parse_schedule(input: &str) -> Result<RebalanceSchedule, ParseError> {
    let call = parse_call(input)?;
    match call.name.as_str() {
        "every_step" => call.expect_arity(0).map(|_| RebalanceSchedule::EveryStep),
        "every" => {
            call.expect_arity(1)?;
            Ok(RebalanceSchedule::EveryNth(call.window(0)? as u64))
        }
        "quarter_end" => call.expect_arity(0).map(|_| RebalanceSchedule::QuarterEnd),
        other => Err(call.error(format!("unknown schedule '{}'", other))),
    }
}

pub fn parse_measure(input: &str) -> Result<RegimeMeasure, ParseError> {
    let call = parse_call(input)?;
    match call.name.as_str() {
        "momentum_sum" => call.expect_arity(0).map(|_| RegimeMeasure::MomentumSum),
        "mean_return" => {
            call.expect_arity(1)?;
            Ok(RegimeMeasure::MeanReturn {
                window: call.window(0)?,
            })
        }
        "risk_adjusted_sum" => {
            call.expect_arity(1)?;
            Ok(RegimeMeasure::RiskAdjustedSum {
                window: call.window(0)?,
            })
        }
        other => Err(call.error(format!("unknown regime measure '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_window_is_rejected() {
        let err = parse_score_source("return(100000000000000000000000)").unwrap_err();
        assert!(err.message.contains("longest window"));
        assert!(parse_score_source("return(10000)").is_ok());
        assert!(parse_triggers("gain(10001, 0.1)").is_err());
    }

    #[test]
    fn parse_bare_call() {
        let call = parse_call("momentum").unwrap();
        assert_eq!(call.name, "momentum");
        assert!(call.args.is_empty());
    }

    #[test]
    fn parse_call_with_mixed_args() {
        let call = parse_call("top_k(2, SPY, -0.5)").unwrap();
        assert_eq!(call.name, "top_k");
        assert_eq!(
            call.args,
            vec![
                Arg::Number(2.0),
                Arg::Word("SPY".into()),
                Arg::Number(-0.5)
            ]
        );
    }

    #[test]
    fn parse_call_lowercases_name() {
        assert_eq!(parse_call("Quarter_End").unwrap().name, "quarter_end");
    }

    #[test]
    fn parse_call_list_positions() {
        let calls = parse_calls("gain(21, 0.30), overbought(70)").unwrap();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].position, 16);
    }

    #[test]
    fn parse_triggers_list() {
        let triggers = parse_triggers("gain(21, 0.30), overbought(70), close_below_long").unwrap();
        assert_eq!(
            triggers,
            vec![
                Trigger::Gain {
                    window: 21,
                    threshold: 0.30
                },
                Trigger::Overbought { rsi: 70.0 },
                Trigger::Trend(TrendFilter::CloseBelowLong),
            ]
        );
    }

    #[test]
    fn parse_actions() {
        assert_eq!(parse_action("scale(0.85)").unwrap(), Action::Scale(0.85));
        assert_eq!(parse_action("reduce(0.05)").unwrap(), Action::Reduce(0.05));
        assert_eq!(parse_action("cap(0.1)").unwrap(), Action::Cap(0.1));
        assert_eq!(parse_action("exclude").unwrap(), Action::Exclude);
        assert_eq!(parse_action("equal_weight").unwrap(), Action::EqualWeight);
        assert_eq!(parse_action("set(1.5)").unwrap(), Action::Set(1.5));
        assert_eq!(parse_action("trim(0.5)").unwrap(), Action::Trim(0.5));
        assert!(parse_action("cap(1.5)").is_err());
        assert!(parse_action("trim(2)").is_err());
    }

    #[test]
    fn parse_score_sources() {
        assert_eq!(
            parse_score_source("spread(126, 21)").unwrap(),
            ScoreSource::ReturnSpread {
                long: 126,
                short: 21
            }
        );
        assert_eq!(
            parse_score_source("constant(1)").unwrap(),
            ScoreSource::Constant(1.0)
        );
    }

    #[test]
    fn parse_schedules() {
        assert_eq!(
            parse_schedule("every(5)").unwrap(),
            RebalanceSchedule::EveryNth(5)
        );
        assert_eq!(
            parse_schedule("quarter_end").unwrap(),
            RebalanceSchedule::QuarterEnd
        );
        assert!(parse_schedule("every(0)").is_err());
        assert!(parse_schedule("every(2.5)").is_err());
    }

    #[test]
    fn parse_measures() {
        assert_eq!(
            parse_measure("mean_return(63)").unwrap(),
            RegimeMeasure::MeanReturn { window: 63 }
        );
        assert_eq!(
            parse_measure("risk_adjusted_sum(126)").unwrap(),
            RegimeMeasure::RiskAdjustedSum { window: 126 }
        );
    }

    #[test]
    fn parse_weight_map_pairs() {
        let weights = parse_weight_map("btc-usd:0.7, ETH-USD : 0.3").unwrap();
        assert_eq!(weights.get("BTC-USD"), Some(&0.7));
        assert_eq!(weights.get("ETH-USD"), Some(&0.3));
    }

    #[test]
    fn error_duplicate_weight() {
        let err = parse_weight_map("GLD:0.5, gld:0.2").unwrap_err();
        assert!(err.message.contains("duplicate"));
        assert_eq!(err.position, 9);
    }

    #[test]
    fn error_wrong_arity() {
        let err = parse_triggers("gain(21)").unwrap_err();
        assert!(err.message.contains("takes 2 argument(s)"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn error_word_where_number_expected() {
        let err = parse_action("scale(half)").unwrap_err();
        assert!(err.message.contains("must be a number"));
    }

    #[test]
    fn error_unknown_name() {
        let err = parse_triggers("gain(21, 0.3), sideways").unwrap_err();
        assert!(err.message.contains("unknown trigger"));
        assert_eq!(err.position, 15);
    }

    #[test]
    fn error_missing_paren() {
        let err = parse_call("top_k(2").unwrap_err();
        assert!(err.message.contains("expected ','"));
    }

    #[test]
    fn error_trailing_input() {
        let err = parse_call("momentum garbage").unwrap_err();
        assert!(err.message.contains("unexpected input"));
        assert_eq!(err.position, 9);
    }

    #[test]
    fn error_empty_input() {
        let err = parse_call("").unwrap_err();
        assert!(err.message.contains("expected name"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn error_display_with_context() {
        let input = "scale(, 1)";
        let err = parse_action(input).unwrap_err();
        let ctx = err.display_with_context(input);
        assert!(ctx.contains("^"));
        assert!(ctx.contains("position 6"));
    }
}
