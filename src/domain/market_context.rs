//! The per-tick view a strategy is evaluated against.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use super::consensus::{ConsensusResult, ModelOutputs};
use super::error::QuantxError;
use super::option_chain::{InstrumentQuote, OptionChainSnapshot, OptionType};
use super::regime::{Regime, RegimeReport, TrendDirection};

/// Indicator names understood by strategy conditions.
pub mod names {
    pub const PRICE: &str = "price";
    /// Traded volume of the underlying on the current bar.
    pub const VOLUME: &str = "volume";
    /// Traded volume summed over every leg of the chain.
    pub const OPTION_VOLUME: &str = "option_volume";
    pub const IV: &str = "iv";
    pub const HV: &str = "hv";
    pub const IV_RANK: &str = "iv_rank";
    pub const IV_PERCENTILE: &str = "iv_percentile";
    pub const PCR_OI: &str = "pcr_oi";
    pub const PCR_VOLUME: &str = "pcr_volume";
    pub const OI_SPIKE: &str = "oi_spike";
    pub const OI_ANOMALY: &str = "oi_anomaly";
    pub const VOLUME_OI_RATIO: &str = "volume_oi_ratio";
    pub const ATR: &str = "atr";
    pub const TREND: &str = "trend";
    pub const VWAP: &str = "vwap";
    pub const VWAP_DEVIATION: &str = "vwap_deviation";
    pub const BB_BANDWIDTH: &str = "bb_bandwidth";
    pub const SQUEEZE: &str = "squeeze";
    pub const MEAN_REVERSION: &str = "mean_reversion";
    pub const PROB_ITM: &str = "prob_itm";
    pub const EXPECTED_MOVE: &str = "expected_move";
    pub const CONFIDENCE: &str = "confidence";
    pub const CONSENSUS_SCORE: &str = "consensus_score";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum IndicatorValue {
    Available(f64),
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketContext {
    pub symbol: String,
    pub timestamp: NaiveDateTime,
    indicators: HashMap<String, IndicatorValue>,
    pub consensus: Option<ConsensusResult>,
    pub chain: Option<OptionChainSnapshot>,
}

impl MarketContext {
    pub fn new(symbol: impl Into<String>, timestamp: NaiveDateTime) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            indicators: HashMap::new(),
            consensus: None,
            chain: None,
        }
    }

    pub fn set(&mut self, name: &str, value: f64) {
        let entry = if value.is_finite() {
            IndicatorValue::Available(value)
        } else {
            IndicatorValue::Unavailable("non-finite value".into())
        };
        self.indicators.insert(name.to_string(), entry);
    }

    pub fn set_unavailable(&mut self, name: &str, reason: impl Into<String>) {
        self.indicators
            .insert(name.to_string(), IndicatorValue::Unavailable(reason.into()));
    }

    pub fn set_result(&mut self, name: &str, result: Result<f64, QuantxError>) {
        match result {
            Ok(v) => self.set(name, v),
            Err(e) => {
                debug!(indicator = name, error = %e, "indicator unavailable");
                self.set_unavailable(name, e.to_string());
            }
        }
    }

    pub fn set_option(&mut self, name: &str, value: Option<f64>) {
        match value {
            Some(v) => self.set(name, v),
            None => self.set_unavailable(name, "not computed"),
        }
    }

    pub fn indicator(&self, name: &str) -> Option<&IndicatorValue> {
        self.indicators.get(name)
    }

    /// The numeric value of an indicator, if it was computed.
    pub fn get(&self, name: &str) -> Option<f64> {
        match self.indicators.get(name)? {
            IndicatorValue::Available(v) => Some(*v),
            IndicatorValue::Unavailable(_) => None,
        }
    }

    pub fn price(&self) -> Option<f64> {
        self.get(names::PRICE)
    }

    /// Spot this context was built from.
    pub fn quote(&self) -> Option<InstrumentQuote> {
        Some(InstrumentQuote {
            symbol: self.symbol.clone(),
            spot: self.price()?,
            timestamp: self.timestamp,
        })
    }

    pub fn set_consensus(&mut self, result: ConsensusResult) {
        self.set(names::CONFIDENCE, result.confidence);
        self.set(names::CONSENSUS_SCORE, result.score);
        self.consensus = Some(result);
    }

    /// Publish every model output under its indicator name.
    pub fn apply_models(&mut self, outputs: &ModelOutputs) {
        let vol = &outputs.volatility;
        self.set_option(names::IV, vol.atm_iv);
        self.set_option(names::HV, vol.historical_vol);
        self.set_option(names::IV_RANK, vol.iv_rank);
        self.set_option(names::IV_PERCENTILE, vol.iv_percentile);

        let oi = &outputs.open_interest;
        self.set_option(names::PCR_OI, oi.pcr_oi);
        self.set_option(names::PCR_VOLUME, oi.pcr_volume);
        self.set_option(names::OI_SPIKE, oi.spike);
        self.set_option(names::OI_ANOMALY, oi.anomaly);
        self.set_option(names::VOLUME_OI_RATIO, oi.volume_oi_ratio);

        self.apply_regime(&outputs.regime);

        let probability = outputs.probability.as_ref();
        self.set_option(names::PROB_ITM, probability.and_then(|p| p.lognormal));
        self.set_option(names::EXPECTED_MOVE, probability.map(|p| p.expected_move));
    }

    pub fn apply_regime(&mut self, regime: &RegimeReport) {
        self.set_option(names::ATR, regime.trend.map(|t| t.atr));
        self.set_option(
            names::TREND,
            regime.trend.map(|t| match t.direction {
                TrendDirection::Up => 1.0,
                TrendDirection::Down => -1.0,
                TrendDirection::Sideways => 0.0,
            }),
        );
        self.set_option(names::VWAP, regime.vwap.map(|v| v.vwap));
        self.set_option(names::VWAP_DEVIATION, regime.vwap.map(|v| v.deviation));
        self.set_option(names::BB_BANDWIDTH, regime.squeeze.map(|s| s.bandwidth));
        self.set_option(names::MEAN_REVERSION, regime.mean_reversion);
        match regime.regime {
            Regime::Unknown => self.set_unavailable(names::SQUEEZE, "regime unknown"),
            Regime::Squeeze => self.set(names::SQUEEZE, 1.0),
            _ => self.set(names::SQUEEZE, 0.0),
        }
    }

    /// Live context: spot, underlying and chain volume, every model output
    /// and the consensus, with the chain attached for leg pricing.
    pub fn from_models(
        chain: OptionChainSnapshot,
        underlying_volume: Option<f64>,
        outputs: &ModelOutputs,
        consensus: ConsensusResult,
    ) -> Self {
        let mut ctx = MarketContext::new(chain.underlying.clone(), chain.timestamp);
        ctx.set(names::PRICE, chain.spot);
        match underlying_volume {
            Some(volume) => ctx.set(names::VOLUME, volume),
            None => ctx.set_unavailable(names::VOLUME, "no underlying bar for the snapshot date"),
        }
        ctx.set(
            names::OPTION_VOLUME,
            (chain.total_volume(OptionType::Call) + chain.total_volume(OptionType::Put)) as f64,
        );
        ctx.apply_models(outputs);
        ctx.set_consensus(consensus);
        ctx.chain = Some(chain);
        ctx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx() -> MarketContext {
        MarketContext::new(
            "NIFTY",
            NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(9, 30, 0).unwrap(),
        )
    }

    #[test]
    fn set_and_get() {
        let mut c = ctx();
        c.set(names::IV_RANK, 62.0);
        assert_eq!(c.get(names::IV_RANK), Some(62.0));
        assert_eq!(c.get(names::HV), None);
    }

    #[test]
    fn failed_indicator_is_unavailable() {
        let mut c = ctx();
        c.set_result(
            names::IV,
            Err(QuantxError::NoConvergence {
                reason: "intrinsic".into(),
            }),
        );
        assert_eq!(c.get(names::IV), None);
        assert!(matches!(
            c.indicator(names::IV),
            Some(IndicatorValue::Unavailable(reason)) if reason.contains("intrinsic")
        ));
    }

    #[test]
    fn non_finite_values_are_unavailable() {
        let mut c = ctx();
        c.set(names::PCR_OI, f64::NAN);
        assert_eq!(c.get(names::PCR_OI), None);
    }

    #[test]
    fn consensus_publishes_confidence() {
        let mut c = ctx();
        let result = ConsensusResult {
            symbol: "NIFTY".into(),
            expiry: None,
            timestamp: c.timestamp,
            score: -0.4,
            confidence: 40.0,
            bias: crate::domain::consensus::Bias::Bearish,
            breakdown: vec![],
        };
        c.set_consensus(result);
        assert_eq!(c.get(names::CONFIDENCE), Some(40.0));
        assert_eq!(c.get(names::CONSENSUS_SCORE), Some(-0.4));
        assert!(c.consensus.is_some());
    }
}
