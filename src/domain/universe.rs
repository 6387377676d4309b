//! Universe parsing and data validation.
//!
//! Parses code lists from configuration and checks that each code has data
//! behind it before a strategy is built around it.

use crate::domain::error::SamallocError;
use crate::domain::ohlcv::OhlcvBar;
use crate::ports::data_port::DataPort;
use std::collections::{BTreeMap, HashSet};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum UniverseError {
    #[error("empty code list")]
    Empty,

    #[error("empty token in code list")]
    EmptyToken,

    #[error("duplicate code: {0}")]
    DuplicateCode(String),
}

pub fn parse_codes(input: &str) -> Result<Vec<String>, UniverseError> {
    if input.trim().is_empty() {
        return Err(UniverseError::Empty);
    }

    let mut codes = Vec::new();
    let mut seen = HashSet::new();

    for token in input.split(',') {
        let trimmed = token.trim();
        if trimmed.is_empty() {
            return Err(UniverseError::EmptyToken);
        }
        let code = trimmed.to_uppercase();
        if !seen.insert(code.clone()) {
            return Err(UniverseError::DuplicateCode(code));
        }
        codes.push(code);
    }

    Ok(codes)
}

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    NoData,
    Unreadable(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedCode {
    pub code: String,
    pub reason: SkipReason,
}

/// Bars for every loadable code plus the codes that were skipped.
#[derive(Debug, Clone)]
pub struct UniverseData {
    pub bars: BTreeMap<String, Vec<OhlcvBar>>,
    pub skipped: Vec<SkippedCode>,
}

/// Fetch bars for each code, skipping codes that fail or have no data.
/// Fails only when nothing at all could be loaded.
pub fn load_universe(
    data_port: &dyn DataPort,
    codes: &[String],
) -> Result<UniverseData, SamallocError> {
    let mut bars = BTreeMap::new();
    let mut skipped = Vec::new();

    for code in codes {
        match data_port.fetch_bars(code) {
            Ok(series) if series.is_empty() => {
                log::warn!("skipping {} (no data found)", code);
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: SkipReason::NoData,
                });
            }
            Ok(series) => {
                log::debug!("{}: {} bars", code, series.len());
                bars.insert(code.clone(), series);
            }
            Err(e) => {
                log::warn!("skipping {} ({})", code, e);
                skipped.push(SkippedCode {
                    code: code.clone(),
                    reason: SkipReason::Unreadable(e.to_string()),
                });
            }
        }
    }

    if bars.is_empty() {
        return Err(SamallocError::Data {
            reason: format!("none of {} code(s) had usable data", codes.len()),
        });
    }

    Ok(UniverseData { bars, skipped })
}
