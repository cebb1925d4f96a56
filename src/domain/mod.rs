//! Core domain types and logic: option analytics, consensus, strategies
//! and the backtest loop.

pub mod error;
pub mod ohlcv;
pub mod option_chain;
pub mod option_math;
pub mod volatility;
pub mod open_interest;
pub mod regime;
pub mod consensus;
pub mod market_context;
pub mod strategy;
pub mod rule_parser;
pub mod rule_eval;
pub mod position;
pub mod execution;
pub mod portfolio;
pub mod metrics;
pub mod pricing;
pub mod strategy_engine;
pub mod backtest;
pub mod analytics;
pub mod config_validation;
