//! Core domain types and allocation logic.

pub mod ohlcv;
pub mod history;
pub mod indicator;
pub mod defaults;
pub mod signal;
pub mod auxiliary;
pub mod rule;
pub mod rule_parser;
pub mod rule_eval;
pub mod allocator;
pub mod allocation;
pub mod schedule;
pub mod state;
pub mod strategy;
pub mod strategy_config;
pub mod presets;
pub mod universe;
pub mod code_data;
pub mod error;
