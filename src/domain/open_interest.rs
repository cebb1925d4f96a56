//! Open-interest signals: spikes, volume/OI, multi-day trend, anomaly
//! scoring and put/call ratios.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::QuantxError;
use super::option_chain::{OptionChainSnapshot, OptionType};

/// Weights and caps for [`anomaly_score`], plus trend settings.
#[derive(Debug, Clone, PartialEq)]
pub struct OiConfig {
    pub spike_weight: f64,
    pub ratio_weight: f64,
    pub level_weight: f64,
    pub spike_cap: f64,
    pub ratio_cap: f64,
    pub level_cap: f64,
    pub trend_window: usize,
    pub flat_band: f64,
}

impl Default for OiConfig {
    fn default() -> Self {
        Self {
            spike_weight: 0.5,
            ratio_weight: 0.3,
            level_weight: 0.2,
            spike_cap: 3.0,
            ratio_cap: 2.0,
            level_cap: 3.0,
            trend_window: 5,
            flat_band: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OiTrend {
    Rising,
    Falling,
    Flat,
}

fn mean_and_stdev(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

fn z_of_last(values: &[f64]) -> f64 {
    let (mean, stdev) = mean_and_stdev(values);
    match values.last() {
        Some(last) if stdev > 0.0 => (last - mean) / stdev,
        _ => 0.0,
    }
}

/// z-score of the latest OI change against the series of changes.
pub fn spike_score(oi: &[f64]) -> Result<f64, QuantxError> {
    if oi.len() < 2 {
        return Err(QuantxError::insufficient_data("oi spike", oi.len(), 2));
    }
    let changes: Vec<f64> = oi.windows(2).map(|w| w[1] - w[0]).collect();
    Ok(z_of_last(&changes))
}

/// z-score of the latest OI level against the series of levels.
pub fn level_zscore(oi: &[f64]) -> Result<f64, QuantxError> {
    if oi.is_empty() {
        return Err(QuantxError::insufficient_data("oi level", 0, 1));
    }
    Ok(z_of_last(oi))
}

pub fn volume_oi_ratio(volume: f64, open_interest: f64) -> f64 {
    if open_interest <= 0.0 {
        0.0
    } else {
        volume / open_interest
    }
}

/// Least-squares slope of the last `window` points.
pub fn trend_slope(series: &[f64], window: usize) -> Result<f64, QuantxError> {
    let start = series.len().saturating_sub(window.max(2));
    let tail = &series[start..];
    if tail.len() < 2 {
        return Err(QuantxError::insufficient_data("oi trend", tail.len(), 2));
    }
    let n = tail.len() as f64;
    let x_mean = (n - 1.0) / 2.0;
    let y_mean = tail.iter().sum::<f64>() / n;
    let (mut num, mut den) = (0.0, 0.0);
    for (i, y) in tail.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    Ok(num / den)
}

/// Rising/falling/flat by slope sign; slopes within `flat_band` are flat.
pub fn multi_day_trend(series: &[f64], window: usize, flat_band: f64) -> Result<OiTrend, QuantxError> {
    let slope = trend_slope(series, window)?;
    Ok(if slope > flat_band {
        OiTrend::Rising
    } else if slope < -flat_band {
        OiTrend::Falling
    } else {
        OiTrend::Flat
    })
}

/// Weighted blend of capped |spike|, volume/OI and |level z| in [0, 1].
pub fn anomaly_score(spike: f64, ratio: f64, level_z: f64, config: &OiConfig) -> f64 {
    let capped = |value: f64, cap: f64| {
        if cap <= 0.0 {
            0.0
        } else {
            (value.abs() / cap).min(1.0)
        }
    };
    let total_weight = config.spike_weight + config.ratio_weight + config.level_weight;
    if total_weight <= 0.0 {
        return 0.0;
    }
    let blended = config.spike_weight * capped(spike, config.spike_cap)
        + config.ratio_weight * capped(ratio, config.ratio_cap)
        + config.level_weight * capped(level_z, config.level_cap);
    (blended / total_weight).clamp(0.0, 1.0)
}

/// Put OI over call OI; `None` when there is no call OI.
pub fn pcr_oi(chain: &OptionChainSnapshot) -> Option<f64> {
    let calls = chain.total_open_interest(OptionType::Call);
    (calls > 0).then(|| chain.total_open_interest(OptionType::Put) as f64 / calls as f64)
}

/// Put volume over call volume; `None` when there is no call volume.
pub fn pcr_volume(chain: &OptionChainSnapshot) -> Option<f64> {
    let calls = chain.total_volume(OptionType::Call);
    (calls > 0).then(|| chain.total_volume(OptionType::Put) as f64 / calls as f64)
}

fn total_oi(chain: &OptionChainSnapshot) -> f64 {
    (chain.total_open_interest(OptionType::Call) + chain.total_open_interest(OptionType::Put)) as f64
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OiReport {
    pub total_oi: Option<f64>,
    pub spike: Option<f64>,
    pub volume_oi_ratio: Option<f64>,
    pub trend: Option<OiTrend>,
    pub anomaly: Option<f64>,
    pub pcr_oi: Option<f64>,
    pub pcr_volume: Option<f64>,
}

/// OI model output over a chronologically ordered chain history whose last
/// element is the current snapshot.
pub fn oi_report(history: &[OptionChainSnapshot], config: &OiConfig) -> OiReport {
    let Some(latest) = history.last() else {
        return OiReport::default();
    };
    let series: Vec<f64> = history.iter().map(total_oi).collect();
    let current_oi = total_oi(latest);
    let volume =
        (latest.total_volume(OptionType::Call) + latest.total_volume(OptionType::Put)) as f64;

    let spike = spike_score(&series)
        .map_err(|e| debug!(error = %e, "oi spike unavailable"))
        .ok();
    let level = level_zscore(&series).ok();
    let ratio = volume_oi_ratio(volume, current_oi);
    let trend = multi_day_trend(&series, config.trend_window, config.flat_band)
        .map_err(|e| debug!(error = %e, "oi trend unavailable"))
        .ok();
    let anomaly = match (spike, level) {
        (Some(s), Some(l)) => Some(anomaly_score(s, ratio, l, config)),
        _ => None,
    };

    OiReport {
        total_oi: Some(current_oi),
        spike,
        volume_oi_ratio: Some(ratio),
        trend,
        anomaly,
        pcr_oi: pcr_oi(latest),
        pcr_volume: pcr_volume(latest),
    }
}
