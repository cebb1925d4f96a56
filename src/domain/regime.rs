//! Market regime classification from OHLCV history.
//!
//! - Trend: close displacement over a lookback compared with k × ATR (Wilder)
//! - VWAP bias: last close against volume-weighted typical price, with a band
//! - Squeeze: Bollinger bandwidth percentile within its own trailing history
//! - Mean reversion: negated z-score of the close against its SMA
//!
//! Standard deviations are population (divide by N).

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::QuantxError;
use super::ohlcv::{closes, OhlcvBar};

#[derive(Debug, Clone, PartialEq)]
pub struct RegimeConfig {
    pub atr_period: usize,
    pub trend_lookback: usize,
    pub atr_multiplier: f64,
    pub vwap_window: usize,
    pub vwap_band: f64,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
    pub squeeze_lookback: usize,
    pub squeeze_percentile: f64,
    pub mean_reversion_period: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            atr_period: 14,
            trend_lookback: 20,
            atr_multiplier: 1.0,
            vwap_window: 20,
            vwap_band: 0.001,
            bollinger_period: 20,
            bollinger_k: 2.0,
            squeeze_lookback: 120,
            squeeze_percentile: 20.0,
            mean_reversion_period: 20,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TrendDirection {
    Up,
    Down,
    Sideways,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VwapBias {
    Above,
    Below,
    Near,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Regime {
    TrendingUp,
    TrendingDown,
    RangeBound,
    Squeeze,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrendSignal {
    pub direction: TrendDirection,
    pub displacement: f64,
    pub atr: f64,
    /// Displacement measured in units of k × ATR.
    pub strength: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VwapSignal {
    pub vwap: f64,
    /// (close - vwap) / vwap
    pub deviation: f64,
    pub bias: VwapBias,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SqueezeSignal {
    pub bandwidth: f64,
    pub percentile: f64,
    pub active: bool,
}

/// Wilder-smoothed average true range at the last bar. The first bar's
/// true range is its high-low span; the seed is the simple mean of the first
/// `period` true ranges.
pub fn atr(bars: &[OhlcvBar], period: usize) -> Result<f64, QuantxError> {
    if period == 0 {
        return Err(QuantxError::invalid_parameter("atr_period", "must be at least 1"));
    }
    if bars.len() < period {
        return Err(QuantxError::insufficient_data("atr", bars.len(), period));
    }

    let tr_values: Vec<f64> = bars
        .iter()
        .enumerate()
        .map(|(i, bar)| {
            if i == 0 {
                bar.high - bar.low
            } else {
                bar.true_range(bars[i - 1].close)
            }
        })
        .collect();

    let seed = tr_values[..period].iter().sum::<f64>() / period as f64;
    Ok(tr_values[period..]
        .iter()
        .fold(seed, |prev, tr| (prev * (period - 1) as f64 + tr) / period as f64))
}

pub fn trend(bars: &[OhlcvBar], config: &RegimeConfig) -> Result<TrendSignal, QuantxError> {
    let need = (config.trend_lookback + 1).max(config.atr_period);
    if bars.len() < need {
        return Err(QuantxError::insufficient_data("trend", bars.len(), need));
    }
    let atr = atr(bars, config.atr_period)?;
    let last = bars[bars.len() - 1].close;
    let anchor = bars[bars.len() - 1 - config.trend_lookback].close;
    let displacement = last - anchor;
    let threshold = config.atr_multiplier * atr;

    let direction = if displacement > threshold {
        TrendDirection::Up
    } else if displacement < -threshold {
        TrendDirection::Down
    } else {
        TrendDirection::Sideways
    };
    let strength = if threshold > 0.0 {
        displacement / threshold
    } else {
        0.0
    };

    Ok(TrendSignal {
        direction,
        displacement,
        atr,
        strength,
    })
}

/// Volume-weighted typical price over `bars`.
pub fn vwap(bars: &[OhlcvBar]) -> Result<f64, QuantxError> {
    let volume: f64 = bars.iter().map(|b| b.volume as f64).sum();
    if volume <= 0.0 {
        return Err(QuantxError::insufficient_data("vwap volume", 0, 1));
    }
    let weighted: f64 = bars.iter().map(|b| b.typical_price() * b.volume as f64).sum();
    Ok(weighted / volume)
}

pub fn vwap_signal(bars: &[OhlcvBar], window: usize, band: f64) -> Result<VwapSignal, QuantxError> {
    let last = bars
        .last()
        .ok_or_else(|| QuantxError::insufficient_data("vwap", 0, 1))?;
    let start = bars.len().saturating_sub(window.max(1));
    let vwap = vwap(&bars[start..])?;
    let deviation = (last.close - vwap) / vwap;
    let bias = if deviation > band {
        VwapBias::Above
    } else if deviation < -band {
        VwapBias::Below
    } else {
        VwapBias::Near
    };
    Ok(VwapSignal {
        vwap,
        deviation,
        bias,
    })
}

fn window_stats(window: &[f64]) -> (f64, f64) {
    let n = window.len() as f64;
    let mean = window.iter().sum::<f64>() / n;
    let variance = window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

/// (upper - lower) / middle for every full window of `period` closes.
pub fn bandwidth_series(closes: &[f64], period: usize, k: f64) -> Vec<f64> {
    if period == 0 {
        return Vec::new();
    }
    closes
        .windows(period)
        .filter_map(|w| {
            let (middle, stdev) = window_stats(w);
            (middle != 0.0).then(|| 2.0 * k * stdev / middle)
        })
        .collect()
}

/// Percentile (share of trailing bandwidths at or below the current one)
/// of the latest Bollinger bandwidth; active when at or under the threshold.
pub fn squeeze(closes: &[f64], config: &RegimeConfig) -> Result<SqueezeSignal, QuantxError> {
    let series = bandwidth_series(closes, config.bollinger_period, config.bollinger_k);
    let start = series.len().saturating_sub(config.squeeze_lookback.max(1));
    let history = &series[start..];
    let Some(&bandwidth) = history.last() else {
        return Err(QuantxError::insufficient_data(
            "bollinger bandwidth",
            closes.len(),
            config.bollinger_period,
        ));
    };
    let at_or_below = history.iter().filter(|&&b| b <= bandwidth).count();
    let percentile = at_or_below as f64 / history.len() as f64 * 100.0;
    Ok(SqueezeSignal {
        bandwidth,
        percentile,
        active: percentile <= config.squeeze_percentile,
    })
}

/// -(close - SMA) / stdev over the last `period` closes; 0 for a flat window.
pub fn mean_reversion_score(closes: &[f64], period: usize) -> Result<f64, QuantxError> {
    if period == 0 {
        return Err(QuantxError::invalid_parameter("mean_reversion_period", "must be at least 1"));
    }
    if closes.len() < period {
        return Err(QuantxError::insufficient_data("mean reversion", closes.len(), period));
    }
    let window = &closes[closes.len() - period..];
    let (mean, stdev) = window_stats(window);
    if stdev == 0.0 {
        return Ok(0.0);
    }
    Ok(-(window[period - 1] - mean) / stdev)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeReport {
    pub trend: Option<TrendSignal>,
    pub vwap: Option<VwapSignal>,
    pub squeeze: Option<SqueezeSignal>,
    pub mean_reversion: Option<f64>,
    pub regime: Regime,
}

/// Squeeze dominates; otherwise the trend direction decides. Without a
/// trend reading the regime is unknown.
pub fn classify(trend: Option<&TrendSignal>, squeeze: Option<&SqueezeSignal>) -> Regime {
    if squeeze.is_some_and(|s| s.active) {
        return Regime::Squeeze;
    }
    match trend.map(|t| t.direction) {
        Some(TrendDirection::Up) => Regime::TrendingUp,
        Some(TrendDirection::Down) => Regime::TrendingDown,
        Some(TrendDirection::Sideways) => Regime::RangeBound,
        None => Regime::Unknown,
    }
}

pub fn regime_report(bars: &[OhlcvBar], config: &RegimeConfig) -> RegimeReport {
    let closes = closes(bars);
    let trend = trend(bars, config)
        .map_err(|e| debug!(error = %e, "trend unavailable"))
        .ok();
    let vwap = vwap_signal(bars, config.vwap_window, config.vwap_band)
        .map_err(|e| debug!(error = %e, "vwap unavailable"))
        .ok();
    let squeeze = squeeze(&closes, config)
        .map_err(|e| debug!(error = %e, "squeeze unavailable"))
        .ok();
    let mean_reversion = mean_reversion_score(&closes, config.mean_reversion_period)
        .map_err(|e| debug!(error = %e, "mean reversion unavailable"))
        .ok();

    RegimeReport {
        regime: classify(trend.as_ref(), squeeze.as_ref()),
        trend,
        vwap,
        squeeze,
        mean_reversion,
    }
}
