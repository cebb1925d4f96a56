//! Loading and validation of the analytics configuration.
//!
//! Every key is optional and falls back to the `Default` of the matching
//! config struct. Keys that are present but malformed or out of range are
//! rejected with `ConfigInvalid` before anything runs.

use chrono::NaiveTime;

use crate::domain::analytics::{AnalyticsConfig, PricingConfig};
use crate::domain::consensus::{ConsensusConfig, ConsensusWeights};
use crate::domain::error::QuantxError;
use crate::domain::execution::CostModel;
use crate::domain::open_interest::OiConfig;
use crate::domain::option_math::SimulationSettings;
use crate::domain::regime::RegimeConfig;
use crate::ports::config_port::ConfigPort;

pub const DEFAULT_INITIAL_CAPITAL: f64 = 100_000.0;

pub fn load_analytics_config(config: &dyn ConfigPort) -> Result<AnalyticsConfig, QuantxError> {
    let defaults = AnalyticsConfig::default();

    let rate = read_double(config, "analytics", "risk_free_rate", defaults.rate)?;
    if !(0.0..1.0).contains(&rate) {
        return Err(invalid(
            "analytics",
            "risk_free_rate",
            "risk_free_rate must be between 0 and 1",
        ));
    }

    Ok(AnalyticsConfig {
        rate,
        simulation: load_simulation(config, &defaults.simulation)?,
        hv_window: read_count(config, "analytics", "hv_window", defaults.hv_window, 2)?,
        periods_per_year: read_positive(
            config,
            "analytics",
            "periods_per_year",
            defaults.periods_per_year,
        )?,
        iv_rank_lookback: read_count(
            config,
            "analytics",
            "iv_rank_lookback",
            defaults.iv_rank_lookback,
            2,
        )?,
        chain_history: read_count(
            config,
            "analytics",
            "chain_history",
            defaults.chain_history,
            1,
        )?,
        ohlcv_lookback_days: read_count(
            config,
            "analytics",
            "ohlcv_lookback_days",
            defaults.ohlcv_lookback_days as usize,
            1,
        )? as i64,
        consensus: load_consensus(config)?,
        oi: load_oi(config)?,
        regime: load_regime(config)?,
        pricing: load_pricing(config)?,
        costs: load_costs(config)?,
    })
}

/// `[backtest] initial_capital`, used when the caller gives none.
pub fn load_initial_capital(config: &dyn ConfigPort) -> Result<f64, QuantxError> {
    read_positive(
        config,
        "backtest",
        "initial_capital",
        DEFAULT_INITIAL_CAPITAL,
    )
}

fn load_simulation(
    config: &dyn ConfigPort,
    defaults: &SimulationSettings,
) -> Result<SimulationSettings, QuantxError> {
    let seed = read_int(config, "analytics", "mc_seed", defaults.seed as i64)?;
    if seed < 0 {
        return Err(invalid("analytics", "mc_seed", "mc_seed must be non-negative"));
    }
    Ok(SimulationSettings {
        paths: read_count(config, "analytics", "mc_paths", defaults.paths, 1)?,
        seed: seed as u64,
        binomial_steps: read_count(
            config,
            "analytics",
            "binomial_steps",
            defaults.binomial_steps,
            1,
        )?,
    })
}

fn load_consensus(config: &dyn ConfigPort) -> Result<ConsensusConfig, QuantxError> {
    let d = ConsensusConfig::default();
    let weights = ConsensusWeights {
        probability: read_non_negative(
            config,
            "consensus",
            "weight_probability",
            d.weights.probability,
        )?,
        volatility: read_non_negative(
            config,
            "consensus",
            "weight_volatility",
            d.weights.volatility,
        )?,
        open_interest: read_non_negative(
            config,
            "consensus",
            "weight_open_interest",
            d.weights.open_interest,
        )?,
        regime: read_non_negative(config, "consensus", "weight_regime", d.weights.regime)?,
    };
    let total = weights.probability + weights.volatility + weights.open_interest + weights.regime;
    if total <= 0.0 {
        return Err(invalid(
            "consensus",
            "weight_probability",
            "at least one consensus weight must be positive",
        ));
    }

    let dead_band = read_double(config, "consensus", "dead_band", d.dead_band)?;
    if !(0.0..1.0).contains(&dead_band) {
        return Err(invalid(
            "consensus",
            "dead_band",
            "dead_band must be in [0, 1)",
        ));
    }

    Ok(ConsensusConfig { weights, dead_band })
}

fn load_oi(config: &dyn ConfigPort) -> Result<OiConfig, QuantxError> {
    let d = OiConfig::default();
    Ok(OiConfig {
        spike_weight: read_non_negative(config, "oi", "spike_weight", d.spike_weight)?,
        ratio_weight: read_non_negative(config, "oi", "ratio_weight", d.ratio_weight)?,
        level_weight: read_non_negative(config, "oi", "level_weight", d.level_weight)?,
        spike_cap: read_positive(config, "oi", "spike_cap", d.spike_cap)?,
        ratio_cap: read_positive(config, "oi", "ratio_cap", d.ratio_cap)?,
        level_cap: read_positive(config, "oi", "level_cap", d.level_cap)?,
        trend_window: read_count(config, "oi", "trend_window", d.trend_window, 2)?,
        flat_band: read_non_negative(config, "oi", "flat_band", d.flat_band)?,
    })
}

fn load_regime(config: &dyn ConfigPort) -> Result<RegimeConfig, QuantxError> {
    let d = RegimeConfig::default();
    let squeeze_percentile =
        read_double(config, "regime", "squeeze_percentile", d.squeeze_percentile)?;
    if !(0.0..=100.0).contains(&squeeze_percentile) {
        return Err(invalid(
            "regime",
            "squeeze_percentile",
            "squeeze_percentile must be between 0 and 100",
        ));
    }
    Ok(RegimeConfig {
        atr_period: read_count(config, "regime", "atr_period", d.atr_period, 1)?,
        trend_lookback: read_count(config, "regime", "trend_lookback", d.trend_lookback, 2)?,
        atr_multiplier: read_positive(config, "regime", "atr_multiplier", d.atr_multiplier)?,
        vwap_window: read_count(config, "regime", "vwap_window", d.vwap_window, 1)?,
        vwap_band: read_non_negative(config, "regime", "vwap_band", d.vwap_band)?,
        bollinger_period: read_count(config, "regime", "bollinger_period", d.bollinger_period, 2)?,
        bollinger_k: read_positive(config, "regime", "bollinger_k", d.bollinger_k)?,
        squeeze_lookback: read_count(config, "regime", "squeeze_lookback", d.squeeze_lookback, 1)?,
        squeeze_percentile,
        mean_reversion_period: read_count(
            config,
            "regime",
            "mean_reversion_period",
            d.mean_reversion_period,
            2,
        )?,
    })
}

fn load_pricing(config: &dyn ConfigPort) -> Result<PricingConfig, QuantxError> {
    let d = PricingConfig::default();
    Ok(PricingConfig {
        strike_step: read_positive(config, "pricing", "strike_step", d.strike_step)?,
        tenor_days: read_count(config, "pricing", "tenor_days", d.tenor_days as usize, 1)?
            as u32,
        expiry_close: read_time(config, "pricing", "expiry_close", d.expiry_close)?,
    })
}

fn load_costs(config: &dyn ConfigPort) -> Result<CostModel, QuantxError> {
    let slippage_bps = read_non_negative(config, "backtest", "slippage_bps", 0.0)?;
    let commission = read_non_negative(config, "backtest", "commission_per_fill", 0.0)?;
    CostModel::new(slippage_bps, commission)
}

fn invalid(section: &str, key: &str, reason: &str) -> QuantxError {
    QuantxError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn read_double(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, QuantxError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Ok(v),
            _ => Err(invalid(
                section,
                key,
                &format!("{key} must be a number, got '{raw}'"),
            )),
        },
    }
}

/// `HH:MM` or `HH:MM:SS`.
fn read_time(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: NaiveTime,
) -> Result<NaiveTime, QuantxError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => {
            let raw = raw.trim();
            NaiveTime::parse_from_str(raw, "%H:%M:%S")
                .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
                .map_err(|_| invalid(section, key, &format!("{key} must be HH:MM, got '{raw}'")))
        }
    }
}

fn read_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
) -> Result<i64, QuantxError> {
    match config.get_string(section, key) {
        None => Ok(default),
        Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
            invalid(
                section,
                key,
                &format!("{key} must be an integer, got '{raw}'"),
            )
        }),
    }
}

fn read_positive(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, QuantxError> {
    let value = read_double(config, section, key, default)?;
    if value <= 0.0 {
        return Err(invalid(section, key, &format!("{key} must be positive")));
    }
    Ok(value)
}

fn read_non_negative(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: f64,
) -> Result<f64, QuantxError> {
    let value = read_double(config, section, key, default)?;
    if value < 0.0 {
        return Err(invalid(section, key, &format!("{key} must be non-negative")));
    }
    Ok(value)
}

fn read_count(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: usize,
    min: usize,
) -> Result<usize, QuantxError> {
    let value = read_int(config, section, key, default as i64)?;
    if value < min as i64 {
        return Err(invalid(
            section,
            key,
            &format!("{key} must be at least {min}"),
        ));
    }
    Ok(value as usize)
}
