//! Backtest engine and event loop.
//!
//! Bars are replayed in order. Each bar inside the configured window builds
//! a `MarketContext` from the bar and its trailing history, steps the
//! strategy engine, books closed trades, and appends one equity point
//! (capital plus open unrealized P&L). Positions still open on the last bar
//! are force-closed there.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::info;

use super::consensus::{ConsensusEngine, ModelOutputs};
use super::error::QuantxError;
use super::execution::CostModel;
use super::market_context::{MarketContext, names};
use super::metrics::{BacktestStats, TRADING_DAYS_PER_YEAR};
use super::ohlcv::{OhlcvBar, closes};
use super::open_interest::OiReport;
use super::portfolio::{EquityPoint, Portfolio};
use super::position::{ExitReason, Trade};
use super::pricing::LegPricer;
use super::regime::{RegimeConfig, regime_report};
use super::strategy::StrategyDefinition;
use super::strategy_engine::StrategyEngine;
use super::volatility::{VolatilityReport, historical_vol, iv_percentile, iv_rank};

#[derive(Debug, Clone, PartialEq)]
pub struct BacktestConfig {
    pub symbol: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: f64,
    pub costs: CostModel,
    pub risk_free_rate: f64,
    pub periods_per_year: f64,
}

impl BacktestConfig {
    pub fn new(symbol: impl Into<String>, start: NaiveDate, end: NaiveDate, initial_capital: f64) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            end,
            initial_capital,
            costs: CostModel::default(),
            risk_free_rate: 0.0,
            periods_per_year: TRADING_DAYS_PER_YEAR,
        }
    }

    pub fn validate(&self) -> Result<(), QuantxError> {
        if self.start >= self.end {
            return Err(QuantxError::InvalidDateRange {
                start: self.start.to_string(),
                end: self.end.to_string(),
            });
        }
        if !(self.initial_capital.is_finite() && self.initial_capital > 0.0) {
            return Err(QuantxError::invalid_parameter(
                "initial_capital",
                "must be positive",
            ));
        }
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(QuantxError::invalid_parameter(
                "periods_per_year",
                "must be positive",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub id: String,
    pub symbol: String,
    pub strategy_name: String,
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub initial_capital: f64,
    pub final_capital: f64,
    pub equity_curve: Vec<EquityPoint>,
    pub trades: Vec<Trade>,
    pub stats: BacktestStats,
}

pub fn backtest_id(strategy_name: &str) -> String {
    format!("bt_{}", strategy_name.replace(' ', "_"))
}

/// Builds the context for the last bar of `history`.
pub trait ContextBuilder {
    fn build(&self, history: &[OhlcvBar]) -> Result<MarketContext, QuantxError>;
}

/// Context from price history alone: price, volume, historical vol (also
/// published as the `iv` proxy), its rank and percentile over a trailing
/// lookback, regime metrics, and a consensus over the models that can run
/// without a chain.
#[derive(Debug, Clone)]
pub struct HistoricalContextBuilder {
    pub hv_window: usize,
    pub periods_per_year: f64,
    pub iv_rank_lookback: usize,
    pub regime: RegimeConfig,
    pub consensus: ConsensusEngine,
}

impl Default for HistoricalContextBuilder {
    fn default() -> Self {
        Self {
            hv_window: 20,
            periods_per_year: TRADING_DAYS_PER_YEAR,
            iv_rank_lookback: 252,
            regime: RegimeConfig::default(),
            consensus: ConsensusEngine::default(),
        }
    }
}

impl HistoricalContextBuilder {
    /// HV at each of the trailing `iv_rank_lookback` bars, excluding the last.
    fn hv_history(&self, closes: &[f64]) -> Vec<f64> {
        let end = closes.len();
        let first = end.saturating_sub(self.iv_rank_lookback).max(2);
        (first..end)
            .filter_map(|i| historical_vol(&closes[..i], self.hv_window, self.periods_per_year).ok())
            .collect()
    }
}

impl ContextBuilder for HistoricalContextBuilder {
    fn build(&self, history: &[OhlcvBar]) -> Result<MarketContext, QuantxError> {
        let bar = history
            .last()
            .ok_or_else(|| QuantxError::insufficient_data("context history", 0, 1))?;

        let mut ctx = MarketContext::new(bar.symbol.clone(), bar.timestamp);
        ctx.set(names::PRICE, bar.close);
        ctx.set(names::VOLUME, bar.volume as f64);

        let closes = closes(history);
        let hv = historical_vol(&closes, self.hv_window, self.periods_per_year);
        let hv_history = self.hv_history(&closes);
        let (rank, percentile) = match &hv {
            Ok(current) => (
                iv_rank(*current, &hv_history).ok(),
                iv_percentile(*current, &hv_history).ok(),
            ),
            Err(_) => (None, None),
        };
        let hv_value = hv.as_ref().ok().copied();
        ctx.set_option(names::IV, hv_value);
        ctx.set_result(names::HV, hv);
        let hv = hv_value;
        ctx.set_option(names::IV_RANK, rank);
        ctx.set_option(names::IV_PERCENTILE, percentile);

        let regime = regime_report(history, &self.regime);
        ctx.apply_regime(&regime);

        let outputs = ModelOutputs {
            probability: None,
            volatility: VolatilityReport {
                atm_iv: hv,
                historical_vol: hv,
                iv_rank: rank,
                iv_percentile: percentile,
                ..VolatilityReport::default()
            },
            open_interest: OiReport::default(),
            regime,
        };
        let consensus = self
            .consensus
            .evaluate(&bar.symbol, None, bar.timestamp, &outputs);
        ctx.set_consensus(consensus);
        Ok(ctx)
    }
}

fn check_ordered(bars: &[OhlcvBar]) -> Result<(), QuantxError> {
    let ordered = bars
        .windows(2)
        .all(|w| w[0].timestamp < w[1].timestamp);
    if ordered {
        Ok(())
    } else {
        Err(QuantxError::invalid_parameter(
            "bars",
            "timestamps must be strictly increasing",
        ))
    }
}

fn in_window(ts: NaiveDateTime, config: &BacktestConfig) -> bool {
    let day = ts.date();
    day >= config.start && day <= config.end
}

/// Replay `bars` (which may include warm-up history before `config.start`)
/// through `strategy`.
pub fn run_backtest(
    strategy: &StrategyDefinition,
    bars: &[OhlcvBar],
    config: &BacktestConfig,
    builder: &dyn ContextBuilder,
    pricer: &dyn LegPricer,
) -> Result<BacktestResult, QuantxError> {
    config.validate()?;
    check_ordered(bars)?;

    let window: Vec<usize> = bars
        .iter()
        .enumerate()
        .filter(|(_, b)| in_window(b.timestamp, config))
        .map(|(i, _)| i)
        .collect();
    let (Some(&first), Some(&last)) = (window.first(), window.last()) else {
        return Err(QuantxError::NoData {
            symbol: config.symbol.clone(),
        });
    };

    let mut engine = StrategyEngine::new(strategy.clone(), config.symbol.clone(), config.costs)?;
    let mut portfolio = Portfolio::new(config.initial_capital);

    for i in first..=last {
        let ctx = builder.build(&bars[..=i])?;
        let outcome = engine.step(&ctx, pricer);
        for trade in outcome.closed {
            portfolio.record_trade(trade);
        }
        if i == last && engine.has_open_positions() {
            for trade in engine.force_close(&ctx, pricer, ExitReason::EndOfData) {
                portfolio.record_trade(trade);
            }
        }
        let equity = portfolio.capital + engine.unrealized_pnl();
        portfolio.record_equity(ctx.timestamp, equity);
    }

    let stats = BacktestStats::compute(
        &portfolio.equity_curve,
        &portfolio.trades,
        portfolio.initial_capital,
        config.risk_free_rate,
        config.periods_per_year,
    );

    info!(
        strategy = %strategy.name,
        symbol = %config.symbol,
        bars = last - first + 1,
        trades = stats.total_trades,
        total_return = stats.total_return,
        "backtest complete"
    );

    Ok(BacktestResult {
        id: backtest_id(&strategy.name),
        symbol: config.symbol.clone(),
        strategy_name: strategy.name.clone(),
        start: config.start,
        end: config.end,
        initial_capital: portfolio.initial_capital,
        final_capital: portfolio.capital,
        equity_curve: portfolio.equity_curve,
        trades: portfolio.trades,
        stats,
    })
}
