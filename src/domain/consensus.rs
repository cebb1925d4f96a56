//! Multi-model score fusion.
//!
//! Each model contributes a [`ModelScore`] normalized to [-1, 1] (positive is
//! bullish). Unavailable scores are dropped and the remaining weights
//! re-normalized, so missing data never pulls the result toward neutral.

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use super::open_interest::OiReport;
use super::option_math::ProbabilityReport;
use super::regime::RegimeReport;
use super::volatility::VolatilityReport;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelSource {
    Probability,
    Volatility,
    OpenInterest,
    Regime,
}

impl fmt::Display for ModelSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ModelSource::Probability => "probability",
            ModelSource::Volatility => "volatility",
            ModelSource::OpenInterest => "open_interest",
            ModelSource::Regime => "regime",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum ScoreValue {
    Available(f64),
    Unavailable(String),
}

impl ScoreValue {
    pub fn value(&self) -> Option<f64> {
        match self {
            ScoreValue::Available(v) => Some(*v),
            ScoreValue::Unavailable(_) => None,
        }
    }

    fn bounded(value: f64) -> Self {
        if value.is_finite() {
            ScoreValue::Available(value.clamp(-1.0, 1.0))
        } else {
            ScoreValue::Unavailable("non-finite score".into())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelScore {
    pub source: ModelSource,
    pub value: ScoreValue,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Bias {
    Bullish,
    Bearish,
    Neutral,
}

impl fmt::Display for Bias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bias::Bullish => write!(f, "BULLISH"),
            Bias::Bearish => write!(f, "BEARISH"),
            Bias::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

impl FromStr for Bias {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "BULLISH" => Ok(Bias::Bullish),
            "BEARISH" => Ok(Bias::Bearish),
            "NEUTRAL" => Ok(Bias::Neutral),
            other => Err(format!("unknown bias '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusWeights {
    pub probability: f64,
    pub volatility: f64,
    pub open_interest: f64,
    pub regime: f64,
}

impl Default for ConsensusWeights {
    fn default() -> Self {
        Self {
            probability: 0.25,
            volatility: 0.25,
            open_interest: 0.25,
            regime: 0.25,
        }
    }
}

impl ConsensusWeights {
    pub fn weight(&self, source: ModelSource) -> f64 {
        match source {
            ModelSource::Probability => self.probability,
            ModelSource::Volatility => self.volatility,
            ModelSource::OpenInterest => self.open_interest,
            ModelSource::Regime => self.regime,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConsensusConfig {
    pub weights: ConsensusWeights,
    /// Fused scores with magnitude at or below this are NEUTRAL.
    pub dead_band: f64,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            weights: ConsensusWeights::default(),
            dead_band: 0.1,
        }
    }
}

/// Result of fusing a set of model scores.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fusion {
    pub score: f64,
    pub confidence: f64,
    pub bias: Bias,
}

pub fn fuse(scores: &[ModelScore], dead_band: f64) -> Fusion {
    let (weighted, total_weight) = scores
        .iter()
        .filter(|s| s.weight > 0.0)
        .filter_map(|s| s.value.value().map(|v| (v * s.weight, s.weight)))
        .fold((0.0, 0.0), |(acc, w), (v, wt)| (acc + v, w + wt));

    if total_weight <= 0.0 {
        return Fusion {
            score: 0.0,
            confidence: 0.0,
            bias: Bias::Neutral,
        };
    }

    let score = (weighted / total_weight).clamp(-1.0, 1.0);
    let bias = if score > dead_band {
        Bias::Bullish
    } else if score < -dead_band {
        Bias::Bearish
    } else {
        Bias::Neutral
    };
    Fusion {
        score,
        confidence: (score.abs() * 100.0).clamp(0.0, 100.0),
        bias,
    }
}

/// Upside versus downside one-sigma tail probability.
pub fn probability_score(report: Option<&ProbabilityReport>) -> ScoreValue {
    let Some(report) = report else {
        return ScoreValue::Unavailable("probability model unavailable".into());
    };
    let (Some(upside), Some(downside)) = (report.upside, report.downside) else {
        return ScoreValue::Unavailable("tail probabilities unavailable".into());
    };
    let total = upside + downside;
    if total <= 0.0 {
        return ScoreValue::Unavailable("no tail probability mass".into());
    }
    ScoreValue::bounded((upside - downside) / total)
}

/// Rich implied volatility (rank above 50) leans bearish.
pub fn volatility_score(iv_rank: Option<f64>) -> ScoreValue {
    match iv_rank {
        Some(rank) => ScoreValue::bounded(1.0 - rank / 50.0),
        None => ScoreValue::Unavailable("iv rank unavailable".into()),
    }
}

/// Put/call OI ratio below 1 leans bullish.
pub fn oi_score(pcr: Option<f64>) -> ScoreValue {
    match pcr {
        Some(pcr) => ScoreValue::bounded(1.0 - pcr),
        None => ScoreValue::Unavailable("put/call ratio unavailable".into()),
    }
}

/// A squeeze is directionless. Otherwise the mean of trend strength (2 × k·ATR
/// saturates) and VWAP deviation (1% saturates).
pub fn regime_score(report: &RegimeReport) -> ScoreValue {
    if report.squeeze.is_some_and(|s| s.active) {
        return ScoreValue::Available(0.0);
    }
    let components: Vec<f64> = [
        report.trend.map(|t| (t.strength / 2.0).clamp(-1.0, 1.0)),
        report.vwap.map(|v| (v.deviation / 0.01).clamp(-1.0, 1.0)),
    ]
    .into_iter()
    .flatten()
    .collect();
    if components.is_empty() {
        return ScoreValue::Unavailable("regime indicators unavailable".into());
    }
    ScoreValue::bounded(components.iter().sum::<f64>() / components.len() as f64)
}

/// Outputs of the four model engines for one (symbol, expiry).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelOutputs {
    pub probability: Option<ProbabilityReport>,
    pub volatility: VolatilityReport,
    pub open_interest: OiReport,
    pub regime: RegimeReport,
}

pub fn model_scores(outputs: &ModelOutputs, weights: &ConsensusWeights) -> Vec<ModelScore> {
    [
        (
            ModelSource::Probability,
            probability_score(outputs.probability.as_ref()),
        ),
        (
            ModelSource::Volatility,
            volatility_score(outputs.volatility.iv_rank),
        ),
        (
            ModelSource::OpenInterest,
            oi_score(outputs.open_interest.pcr_oi),
        ),
        (ModelSource::Regime, regime_score(&outputs.regime)),
    ]
    .into_iter()
    .map(|(source, value)| ModelScore {
        source,
        value,
        weight: weights.weight(source),
    })
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub symbol: String,
    pub expiry: Option<NaiveDate>,
    pub timestamp: NaiveDateTime,
    pub score: f64,
    pub confidence: f64,
    pub bias: Bias,
    pub breakdown: Vec<ModelScore>,
}

impl ConsensusResult {
    pub fn key(&self) -> ConsensusKey {
        ConsensusKey {
            symbol: self.symbol.clone(),
            expiry: self.expiry,
            timestamp: self.timestamp,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.config
    }

    pub fn evaluate(
        &self,
        symbol: &str,
        expiry: Option<NaiveDate>,
        timestamp: NaiveDateTime,
        outputs: &ModelOutputs,
    ) -> ConsensusResult {
        self.combine(symbol, expiry, timestamp, model_scores(outputs, &self.config.weights))
    }

    pub fn combine(
        &self,
        symbol: &str,
        expiry: Option<NaiveDate>,
        timestamp: NaiveDateTime,
        breakdown: Vec<ModelScore>,
    ) -> ConsensusResult {
        let fusion = fuse(&breakdown, self.config.dead_band);
        ConsensusResult {
            symbol: symbol.to_string(),
            expiry,
            timestamp,
            score: fusion.score,
            confidence: fusion.confidence,
            bias: fusion.bias,
            breakdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConsensusKey {
    pub symbol: String,
    pub expiry: Option<NaiveDate>,
    pub timestamp: NaiveDateTime,
}

/// Latest consensus per (symbol, expiry). A newer snapshot replaces the
/// older one, and once `capacity` series are held the series with the
/// oldest snapshot is evicted.
#[derive(Debug)]
pub struct ConsensusCache {
    capacity: usize,
    entries: RwLock<HashMap<(String, Option<NaiveDate>), ConsensusResult>>,
}

pub const DEFAULT_CACHE_CAPACITY: usize = 256;

impl Default for ConsensusCache {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl ConsensusCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: RwLock::new(HashMap::new()),
        }
    }

    pub fn get(&self, key: &ConsensusKey) -> Option<ConsensusResult> {
        self.entries
            .read()
            .get(&(key.symbol.clone(), key.expiry))
            .filter(|hit| hit.timestamp == key.timestamp)
            .cloned()
    }

    /// Stores `result` unless a newer snapshot of the same series is held.
    pub fn insert(&self, result: ConsensusResult) {
        let series = (result.symbol.clone(), result.expiry);
        let mut entries = self.entries.write();
        if let Some(held) = entries.get(&series) {
            if held.timestamp > result.timestamp {
                return;
            }
        } else if entries.len() >= self.capacity {
            let oldest = entries
                .iter()
                .min_by_key(|(_, r)| r.timestamp)
                .map(|(k, _)| k.clone());
            if let Some(oldest) = oldest {
                entries.remove(&oldest);
            }
        }
        entries.insert(series, result);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::option_chain::OptionType;
    use crate::domain::regime::{Regime, SqueezeSignal, TrendDirection, TrendSignal, VwapBias, VwapSignal};
    use approx::assert_abs_diff_eq;

    fn score(source: ModelSource, value: f64, weight: f64) -> ModelScore {
        ModelScore {
            source,
            value: ScoreValue::Available(value),
            weight,
        }
    }

    fn missing(source: ModelSource, weight: f64) -> ModelScore {
        ModelScore {
            source,
            value: ScoreValue::Unavailable("no data".into()),
            weight,
        }
    }

    fn ts() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2).unwrap().and_hms_opt(10, 0, 0).unwrap()
    }

    fn empty_regime() -> RegimeReport {
        RegimeReport {
            trend: None,
            vwap: None,
            squeeze: None,
            mean_reversion: None,
            regime: Regime::Unknown,
        }
    }

    #[test]
    fn weighted_average_and_bias() {
        let fusion = fuse(
            &[
                score(ModelSource::Probability, 0.8, 0.5),
                score(ModelSource::Volatility, -0.2, 0.5),
            ],
            0.1,
        );
        assert_abs_diff_eq!(fusion.score, 0.3, epsilon = 1e-12);
        assert_abs_diff_eq!(fusion.confidence, 30.0, epsilon = 1e-9);
        assert_eq!(fusion.bias, Bias::Bullish);
    }

    #[test]
    fn unavailable_scores_renormalize_instead_of_zeroing() {
        let with_missing = fuse(
            &[
                score(ModelSource::Probability, -0.6, 0.25),
                missing(ModelSource::Volatility, 0.25),
                missing(ModelSource::OpenInterest, 0.25),
                missing(ModelSource::Regime, 0.25),
            ],
            0.1,
        );
        assert_abs_diff_eq!(with_missing.score, -0.6, epsilon = 1e-12);
        assert_eq!(with_missing.bias, Bias::Bearish);
    }

    #[test]
    fn dead_band_is_neutral() {
        let fusion = fuse(&[score(ModelSource::Regime, 0.05, 1.0)], 0.1);
        assert_eq!(fusion.bias, Bias::Neutral);
        assert_abs_diff_eq!(fusion.confidence, 5.0, epsilon = 1e-9);
    }

    #[test]
    fn nothing_available_is_neutral_zero() {
        let fusion = fuse(&[missing(ModelSource::Regime, 1.0)], 0.1);
        assert_eq!(fusion.bias, Bias::Neutral);
        assert_eq!(fusion.confidence, 0.0);
    }

    #[test]
    fn zero_weight_sources_ignored() {
        let fusion = fuse(
            &[
                score(ModelSource::Probability, 1.0, 0.0),
                score(ModelSource::Regime, -0.5, 1.0),
            ],
            0.1,
        );
        assert_abs_diff_eq!(fusion.score, -0.5, epsilon = 1e-12);
    }

    #[test]
    fn normalizers_are_bounded() {
        assert_eq!(volatility_score(Some(100.0)), ScoreValue::Available(-1.0));
        assert_eq!(volatility_score(Some(0.0)), ScoreValue::Available(1.0));
        assert_eq!(oi_score(Some(3.0)), ScoreValue::Available(-1.0));
        assert_eq!(oi_score(Some(0.7)).value().map(|v| (v * 10.0).round()), Some(3.0));
        assert!(volatility_score(None).value().is_none());
        assert!(oi_score(None).value().is_none());
    }

    #[test]
    fn probability_score_from_tails() {
        let report = ProbabilityReport {
            strike: 100.0,
            option_type: OptionType::Call,
            vol: 0.2,
            time: 0.25,
            lognormal: Some(0.5),
            binomial: Some(0.5),
            monte_carlo: None,
            expected_move: 10.0,
            upside: Some(0.1),
            downside: Some(0.3),
        };
        assert_abs_diff_eq!(
            probability_score(Some(&report)).value().unwrap(),
            -0.5,
            epsilon = 1e-12
        );
        assert!(probability_score(None).value().is_none());

        let no_upside = ProbabilityReport {
            upside: None,
            ..report
        };
        assert!(probability_score(Some(&no_upside)).value().is_none());
    }

    #[test]
    fn regime_score_components() {
        let mut report = empty_regime();
        assert!(regime_score(&report).value().is_none());

        report.trend = Some(TrendSignal {
            direction: TrendDirection::Up,
            displacement: 3.0,
            atr: 1.0,
            strength: 3.0,
        });
        report.vwap = Some(VwapSignal {
            vwap: 100.0,
            deviation: 0.005,
            bias: VwapBias::Above,
        });
        assert_abs_diff_eq!(regime_score(&report).value().unwrap(), 0.75, epsilon = 1e-12);

        report.squeeze = Some(SqueezeSignal {
            bandwidth: 0.01,
            percentile: 1.0,
            active: true,
        });
        assert_eq!(regime_score(&report), ScoreValue::Available(0.0));
    }

    #[test]
    fn engine_builds_breakdown_for_all_sources() {
        let outputs = ModelOutputs {
            probability: None,
            volatility: VolatilityReport {
                iv_rank: Some(25.0),
                ..VolatilityReport::default()
            },
            open_interest: OiReport::default(),
            regime: empty_regime(),
        };
        let engine = ConsensusEngine::default();
        let result = engine.evaluate("NIFTY", None, ts(), &outputs);
        assert_eq!(result.breakdown.len(), 4);
        // only volatility available: 1 - 25/50
        assert_abs_diff_eq!(result.score, 0.5, epsilon = 1e-12);
        assert_eq!(result.bias, Bias::Bullish);
    }

    fn regime_result(engine: &ConsensusEngine, symbol: &str, minutes: i64, value: f64) -> ConsensusResult {
        let at = ts() + chrono::Duration::minutes(minutes);
        engine.combine(symbol, None, at, vec![score(ModelSource::Regime, value, 1.0)])
    }

    #[test]
    fn cache_keeps_latest_snapshot_per_series() {
        let cache = ConsensusCache::new();
        let engine = ConsensusEngine::default();
        let first = regime_result(&engine, "NIFTY", 0, 0.4);
        let second = regime_result(&engine, "NIFTY", 1, -0.9);

        cache.insert(first.clone());
        assert_eq!(cache.get(&first.key()), Some(first.clone()));

        cache.insert(second.clone());
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get(&first.key()), None);
        assert_eq!(cache.get(&second.key()), Some(second.clone()));

        // an older snapshot never displaces a newer one
        cache.insert(first);
        assert_eq!(cache.get(&second.key()), Some(second));
    }

    #[test]
    fn cache_stays_bounded_over_many_ticks() {
        let cache = ConsensusCache::with_capacity(2);
        let engine = ConsensusEngine::default();
        for minute in 0..500 {
            cache.insert(regime_result(&engine, "NIFTY", minute, 0.1));
        }
        assert_eq!(cache.len(), 1);

        let bank = regime_result(&engine, "BANKNIFTY", 600, 0.2);
        cache.insert(bank.clone());
        let fin = regime_result(&engine, "FINNIFTY", 601, 0.3);
        cache.insert(fin.clone());
        assert_eq!(cache.len(), 2);
        // NIFTY held the oldest snapshot
        assert_eq!(cache.get(&regime_result(&engine, "NIFTY", 499, 0.1).key()), None);
        assert_eq!(cache.get(&bank.key()), Some(bank));
        assert_eq!(cache.get(&fin.key()), Some(fin));
    }

    #[test]
    fn bias_round_trips_through_text() {
        for bias in [Bias::Bullish, Bias::Bearish, Bias::Neutral] {
            assert_eq!(bias.to_string().parse::<Bias>().unwrap(), bias);
        }
    }
}
