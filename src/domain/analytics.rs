//! Analytics facade.
//!
//! `AnalyticsService` wires the data providers and the strategy store to the
//! model engines, the consensus cache and the per-(strategy, symbol)
//! evaluation locks. Caller input is validated before any data is fetched.

use chrono::{Duration, NaiveDate, NaiveTime};
use tracing::{debug, info};

use super::backtest::{BacktestConfig, BacktestResult, HistoricalContextBuilder, run_backtest};
use super::consensus::{ConsensusCache, ConsensusConfig, ConsensusEngine, ConsensusKey, ConsensusResult, ModelOutputs};
use super::error::QuantxError;
use super::execution::CostModel;
use super::market_context::MarketContext;
use super::metrics::TRADING_DAYS_PER_YEAR;
use super::ohlcv::closes;
use super::open_interest::{OiConfig, oi_report};
use super::option_chain::{OptionChainSnapshot, OptionType};
use super::option_math::{
    OptionParams, ProbabilityReport, SimulationSettings, default_expiry_close, expected_move,
    probability_report,
};
use super::pricing::{BlackScholesPricer, ChainPricer};
use super::regime::{RegimeConfig, regime_report};
use super::strategy::StrategyDefinition;
use super::strategy_engine::{EvaluationLocks, LiveDecision, run_live};
use super::volatility::{
    SurfacePoint, VolatilityReport, VolatilitySurface, atm_iv, build_surface, term_structure,
    volatility_report,
};
use crate::ports::data_port::{ChainProvider, OhlcvProvider};
use crate::ports::strategy_store::StrategyStore;

/// Theoretical option legs used by backtests, and the expiry-day close
/// every time-to-expiry is measured to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingConfig {
    pub strike_step: f64,
    pub tenor_days: u32,
    pub expiry_close: NaiveTime,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            strike_step: 50.0,
            tenor_days: 30,
            expiry_close: default_expiry_close(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalyticsConfig {
    pub rate: f64,
    pub simulation: SimulationSettings,
    pub hv_window: usize,
    pub periods_per_year: f64,
    pub iv_rank_lookback: usize,
    /// Chain snapshots fed to the OI model and the IV history.
    pub chain_history: usize,
    /// Calendar days of bars loaded before the analysis or backtest window.
    pub ohlcv_lookback_days: i64,
    pub consensus: ConsensusConfig,
    pub oi: OiConfig,
    pub regime: RegimeConfig,
    pub pricing: PricingConfig,
    pub costs: CostModel,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            rate: 0.05,
            simulation: SimulationSettings::default(),
            hv_window: 20,
            periods_per_year: TRADING_DAYS_PER_YEAR,
            iv_rank_lookback: 252,
            chain_history: 20,
            ohlcv_lookback_days: 365,
            consensus: ConsensusConfig::default(),
            oi: OiConfig::default(),
            regime: RegimeConfig::default(),
            pricing: PricingConfig::default(),
            costs: CostModel::default(),
        }
    }
}

pub struct AnalyticsService<'a> {
    chains: &'a dyn ChainProvider,
    ohlcv: &'a dyn OhlcvProvider,
    strategies: &'a dyn StrategyStore,
    config: AnalyticsConfig,
    engine: ConsensusEngine,
    cache: ConsensusCache,
    locks: EvaluationLocks,
}

impl<'a> AnalyticsService<'a> {
    pub fn new(
        chains: &'a dyn ChainProvider,
        ohlcv: &'a dyn OhlcvProvider,
        strategies: &'a dyn StrategyStore,
        config: AnalyticsConfig,
    ) -> Self {
        let engine = ConsensusEngine::new(config.consensus.clone());
        Self {
            chains,
            ohlcv,
            strategies,
            config,
            engine,
            cache: ConsensusCache::new(),
            locks: EvaluationLocks::new(),
        }
    }

    pub fn config(&self) -> &AnalyticsConfig {
        &self.config
    }

    pub fn cache(&self) -> &ConsensusCache {
        &self.cache
    }

    fn check_symbol(&self, symbol: &str) -> Result<(), QuantxError> {
        if symbol.trim().is_empty() {
            return Err(QuantxError::invalid_parameter("symbol", "must not be empty"));
        }
        if self.ohlcv.list_symbols()?.iter().any(|s| s == symbol) {
            Ok(())
        } else {
            Err(QuantxError::UnknownSymbol {
                symbol: symbol.to_string(),
            })
        }
    }

    fn strategy(&self, name: &str) -> Result<StrategyDefinition, QuantxError> {
        self.strategies
            .get(name)?
            .ok_or_else(|| QuantxError::StrategyNotFound {
                name: name.to_string(),
            })
    }

    /// Run the four model engines for (symbol, expiry).
    pub fn evaluate_models(&self, symbol: &str, expiry: NaiveDate) -> Result<ModelOutputs, QuantxError> {
        self.check_symbol(symbol)?;
        let chain = self.fetch_chain(symbol, expiry)?;
        self.models_for(&chain)
    }

    fn fetch_chain(&self, symbol: &str, expiry: NaiveDate) -> Result<OptionChainSnapshot, QuantxError> {
        Ok(self
            .chains
            .fetch_chain(symbol, expiry)?
            .with_expiry_close(self.config.pricing.expiry_close))
    }

    fn models_for(&self, chain: &OptionChainSnapshot) -> Result<ModelOutputs, QuantxError> {
        let cfg = &self.config;
        let mut history: Vec<OptionChainSnapshot> = self
            .chains
            .chain_history(&chain.underlying, chain.expiry, cfg.chain_history)?
            .into_iter()
            .map(|snap| snap.with_expiry_close(cfg.pricing.expiry_close))
            .collect();
        if history.last().is_none_or(|last| last.timestamp < chain.timestamp) {
            history.push(chain.clone());
        }

        let today = chain.timestamp.date();
        let bars = self.ohlcv.fetch_ohlcv(
            &chain.underlying,
            today - Duration::days(cfg.ohlcv_lookback_days),
            today,
        )?;

        let iv_history: Vec<f64> = history
            .iter()
            .filter(|snap| snap.timestamp < chain.timestamp)
            .filter_map(|snap| atm_iv(snap, cfg.rate).ok())
            .collect();

        let volatility = volatility_report(
            chain,
            &iv_history,
            &closes(&bars),
            cfg.rate,
            cfg.hv_window,
            cfg.periods_per_year,
        );
        let probability = self.probability(chain, &volatility);
        let open_interest = oi_report(&history, &cfg.oi);
        let regime = regime_report(&bars, &cfg.regime);

        debug!(
            symbol = %chain.underlying,
            expiry = %chain.expiry,
            bars = bars.len(),
            snapshots = history.len(),
            "models evaluated"
        );

        Ok(ModelOutputs {
            probability,
            volatility,
            open_interest,
            regime,
        })
    }

    /// ATM call probabilities, with the one-sigma tails priced off the skew.
    fn probability(
        &self,
        chain: &OptionChainSnapshot,
        volatility: &VolatilityReport,
    ) -> Option<ProbabilityReport> {
        let vol = volatility.atm_iv?;
        let strike = chain.atm_strike()?;
        let time = chain.time_to_expiry();
        let em = expected_move(chain.spot, vol, time);
        let up_vol = skew_vol_near(&volatility.call_skew, chain.spot + em).unwrap_or(vol);
        let down_vol = skew_vol_near(&volatility.put_skew, chain.spot - em).unwrap_or(vol);
        let params = OptionParams::new(chain.spot, strike, self.config.rate, vol, time, OptionType::Call);
        probability_report(&params, up_vol, down_vol, &self.config.simulation)
            .map_err(|e| debug!(error = %e, "probability model unavailable"))
            .ok()
    }

    /// IV surface and ATM term structure over every listed expiry.
    pub fn volatility_surface(&self, symbol: &str) -> Result<VolatilitySurface, QuantxError> {
        self.check_symbol(symbol)?;
        let chains = self
            .chains
            .expiries(symbol)?
            .into_iter()
            .map(|expiry| self.fetch_chain(symbol, expiry))
            .collect::<Result<Vec<_>, _>>()?;
        if chains.is_empty() {
            return Err(QuantxError::NoData {
                symbol: symbol.to_string(),
            });
        }
        Ok(VolatilitySurface {
            symbol: symbol.to_string(),
            points: build_surface(&chains, self.config.rate),
            term_structure: term_structure(&chains, self.config.rate),
        })
    }

    /// Fused view of every model for (symbol, expiry), cached per snapshot.
    pub fn consensus(&self, symbol: &str, expiry: NaiveDate) -> Result<ConsensusResult, QuantxError> {
        self.check_symbol(symbol)?;
        let chain = self.fetch_chain(symbol, expiry)?;
        let (result, _) = self.consensus_for(&chain)?;
        Ok(result)
    }

    fn consensus_for(
        &self,
        chain: &OptionChainSnapshot,
    ) -> Result<(ConsensusResult, Option<ModelOutputs>), QuantxError> {
        let key = ConsensusKey {
            symbol: chain.underlying.clone(),
            expiry: Some(chain.expiry),
            timestamp: chain.timestamp,
        };
        if let Some(hit) = self.cache.get(&key) {
            debug!(symbol = %key.symbol, "consensus cache hit");
            return Ok((hit, None));
        }
        let outputs = self.models_for(chain)?;
        let result = self
            .engine
            .evaluate(&chain.underlying, Some(chain.expiry), chain.timestamp, &outputs);
        self.cache.insert(result.clone());
        Ok((result, Some(outputs)))
    }

    /// One live decision on the nearest listed expiry, priced off the chain.
    pub fn run_live(&self, strategy_name: &str, symbol: &str) -> Result<LiveDecision, QuantxError> {
        let strategy = self.strategy(strategy_name)?;
        self.check_symbol(symbol)?;
        let expiry = self
            .chains
            .expiries(symbol)?
            .into_iter()
            .min()
            .ok_or_else(|| QuantxError::NoData {
                symbol: symbol.to_string(),
            })?;
        let chain = self.fetch_chain(symbol, expiry)?;

        let (consensus, outputs) = self.consensus_for(&chain)?;
        let outputs = match outputs {
            Some(outputs) => outputs,
            None => self.models_for(&chain)?,
        };
        let day = chain.timestamp.date();
        let underlying_volume = self
            .ohlcv
            .fetch_ohlcv(symbol, day, day)?
            .last()
            .map(|bar| bar.volume as f64);
        let ctx = MarketContext::from_models(chain, underlying_volume, &outputs, consensus);

        let decision = self.locks.with_lock(&strategy.name, symbol, || {
            run_live(&strategy, &ctx, &ChainPricer, self.config.costs)
        })?;
        info!(
            strategy = %strategy.name,
            symbol,
            executed = decision.executed,
            "live evaluation"
        );
        Ok(decision)
    }

    pub fn run_backtest(
        &self,
        strategy_name: &str,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
        initial_capital: f64,
    ) -> Result<BacktestResult, QuantxError> {
        let config = BacktestConfig {
            symbol: symbol.to_string(),
            start,
            end,
            initial_capital,
            costs: self.config.costs,
            risk_free_rate: self.config.rate,
            periods_per_year: self.config.periods_per_year,
        };
        config.validate()?;
        let strategy = self.strategy(strategy_name)?;
        self.check_symbol(symbol)?;

        let bars = self.ohlcv.fetch_ohlcv(
            symbol,
            start - Duration::days(self.config.ohlcv_lookback_days),
            end,
        )?;
        if bars.is_empty() {
            return Err(QuantxError::NoData {
                symbol: symbol.to_string(),
            });
        }

        let builder = HistoricalContextBuilder {
            hv_window: self.config.hv_window,
            periods_per_year: self.config.periods_per_year,
            iv_rank_lookback: self.config.iv_rank_lookback,
            regime: self.config.regime.clone(),
            consensus: self.engine.clone(),
        };
        let pricer = BlackScholesPricer::new(
            self.config.rate,
            self.config.pricing.strike_step,
            self.config.pricing.tenor_days,
        )?
        .with_expiry_close(self.config.pricing.expiry_close);

        self.locks.with_lock(&strategy.name, symbol, || {
            run_backtest(&strategy, &bars, &config, &builder, &pricer)
        })
    }
}

/// IV of the skew point whose strike is closest to `level`.
fn skew_vol_near(skew: &[SurfacePoint], level: f64) -> Option<f64> {
    skew.iter()
        .min_by(|a, b| (a.strike - level).abs().total_cmp(&(b.strike - level).abs()))
        .map(|p| p.iv)
}
