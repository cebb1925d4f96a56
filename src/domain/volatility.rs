//! Implied and historical volatility, IV rank/percentile, surface and skew.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::QuantxError;
use super::option_chain::{OptionChainSnapshot, OptionLeg, OptionType};
use super::option_math::{price_unchecked, vega_unchecked, OptionParams};

pub const IV_LOWER_BOUND: f64 = 1e-4;
pub const IV_UPPER_BOUND: f64 = 5.0;
pub const IV_MAX_ITERATIONS: usize = 100;
pub const IV_PRICE_TOLERANCE: f64 = 1e-6;

/// Solve Black–Scholes for the volatility that reproduces `market_price`.
///
/// Newton steps are taken while they stay inside the current bracket,
/// otherwise the bracket is bisected. Prices that are not strictly above the
/// price at the lower bound (pure intrinsic, typically deep ITM/OTM) or that
/// exceed the price at the upper bound have no bracket and report
/// `NoConvergence`.
pub fn implied_vol_solve(
    market_price: f64,
    spot: f64,
    strike: f64,
    rate: f64,
    time: f64,
    option_type: OptionType,
) -> Result<f64, QuantxError> {
    if !(market_price.is_finite() && market_price >= 0.0) {
        return Err(QuantxError::invalid_parameter(
            "market_price",
            "must be a non-negative number",
        ));
    }
    let params = OptionParams::new(spot, strike, rate, IV_LOWER_BOUND, time, option_type);
    params.validate()?;
    if time <= 0.0 {
        return Err(QuantxError::invalid_parameter("time", "must be positive"));
    }

    let price_lo = price_unchecked(&params);
    let price_hi = price_unchecked(&params.with_vol(IV_UPPER_BOUND));
    if market_price - price_lo <= IV_PRICE_TOLERANCE {
        return Err(QuantxError::NoConvergence {
            reason: format!(
                "price {market_price:.6} is at or below the minimum-volatility value {price_lo:.6}"
            ),
        });
    }
    if market_price > price_hi + IV_PRICE_TOLERANCE {
        return Err(QuantxError::NoConvergence {
            reason: format!(
                "price {market_price:.6} exceeds the maximum-volatility value {price_hi:.6}"
            ),
        });
    }

    let (mut lo, mut hi) = (IV_LOWER_BOUND, IV_UPPER_BOUND);
    let mut sigma = 0.3;
    for _ in 0..IV_MAX_ITERATIONS {
        let p = params.with_vol(sigma);
        let diff = price_unchecked(&p) - market_price;
        if diff.abs() < IV_PRICE_TOLERANCE {
            return Ok(sigma);
        }
        if diff > 0.0 {
            hi = sigma;
        } else {
            lo = sigma;
        }

        let vega = vega_unchecked(&p);
        let newton = sigma - diff / vega;
        sigma = if vega > 1e-12 && newton > lo && newton < hi {
            newton
        } else {
            0.5 * (lo + hi)
        };
    }

    Err(QuantxError::NoConvergence {
        reason: format!("no solution within {IV_MAX_ITERATIONS} iterations"),
    })
}

/// Annualized population standard deviation of log returns over the
/// trailing `window` returns.
pub fn historical_vol(
    closes: &[f64],
    window: usize,
    periods_per_year: f64,
) -> Result<f64, QuantxError> {
    if window == 0 {
        return Err(QuantxError::invalid_parameter("window", "must be at least 1"));
    }
    if closes.len() < 2 {
        return Err(QuantxError::insufficient_data("historical_vol", closes.len(), 2));
    }
    if closes.iter().any(|c| !(c.is_finite() && *c > 0.0)) {
        return Err(QuantxError::invalid_parameter("closes", "prices must be positive"));
    }

    let start = closes.len().saturating_sub(window + 1);
    let returns: Vec<f64> = closes[start..]
        .windows(2)
        .map(|w| (w[1] / w[0]).ln())
        .collect();

    let n = returns.len() as f64;
    let mean = returns.iter().sum::<f64>() / n;
    let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    Ok(variance.sqrt() * periods_per_year.sqrt())
}

fn check_history(history: &[f64]) -> Result<(), QuantxError> {
    if history.is_empty() {
        return Err(QuantxError::insufficient_data("iv history", 0, 1));
    }
    Ok(())
}

/// Where `current` sits between the historical min and max, on 0–100.
pub fn iv_rank(current: f64, history: &[f64]) -> Result<f64, QuantxError> {
    check_history(history)?;
    let min = history.iter().copied().fold(f64::INFINITY, f64::min);
    let max = history.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let range = max - min;
    if range <= 0.0 {
        return Ok(if current > min {
            100.0
        } else if current < min {
            0.0
        } else {
            50.0
        });
    }
    Ok(((current - min) / range * 100.0).clamp(0.0, 100.0))
}

/// Share of history strictly below `current`, on 0–100.
pub fn iv_percentile(current: f64, history: &[f64]) -> Result<f64, QuantxError> {
    check_history(history)?;
    let below = history.iter().filter(|&&v| v < current).count();
    Ok(below as f64 / history.len() as f64 * 100.0)
}

/// One solved point of a volatility surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurfacePoint {
    pub expiry: NaiveDate,
    pub strike: f64,
    pub option_type: OptionType,
    pub iv: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermPoint {
    pub expiry: NaiveDate,
    pub time: f64,
    pub atm_iv: f64,
}

/// Solve IV from a leg's last traded price.
pub fn solve_leg_iv(
    chain: &OptionChainSnapshot,
    leg: &OptionLeg,
    rate: f64,
) -> Result<f64, QuantxError> {
    implied_vol_solve(
        leg.last_price,
        chain.spot,
        leg.strike,
        rate,
        chain.time_to_expiry(),
        leg.option_type,
    )
}

fn solved_points<'a>(
    chain: &'a OptionChainSnapshot,
    legs: impl Iterator<Item = &'a OptionLeg> + 'a,
    rate: f64,
) -> impl Iterator<Item = SurfacePoint> + 'a {
    legs.filter_map(move |leg| match solve_leg_iv(chain, leg, rate) {
        Ok(iv) => Some(SurfacePoint {
            expiry: chain.expiry,
            strike: leg.strike,
            option_type: leg.option_type,
            iv,
        }),
        Err(e) => {
            debug!(strike = leg.strike, option_type = %leg.option_type, error = %e, "iv unavailable");
            None
        }
    })
}

/// Strike → IV for one side of one expiry, ascending by strike.
pub fn skew(chain: &OptionChainSnapshot, rate: f64, option_type: OptionType) -> Vec<SurfacePoint> {
    solved_points(chain, chain.legs_of(option_type), rate).collect()
}

/// Every solvable leg across the supplied expiries.
pub fn build_surface(chains: &[OptionChainSnapshot], rate: f64) -> Vec<SurfacePoint> {
    let mut points: Vec<SurfacePoint> = chains
        .iter()
        .flat_map(|chain| solved_points(chain, chain.legs().iter(), rate))
        .collect();
    points.sort_by(|a, b| {
        a.expiry
            .cmp(&b.expiry)
            .then_with(|| a.strike.total_cmp(&b.strike))
    });
    points
}

/// ATM IV of one chain: mean of the solvable ATM call and put.
pub fn atm_iv(chain: &OptionChainSnapshot, rate: f64) -> Result<f64, QuantxError> {
    let strike = chain
        .atm_strike()
        .ok_or_else(|| QuantxError::insufficient_data("option chain strikes", 0, 1))?;
    let mut solved = Vec::with_capacity(2);
    let mut last_err = None;
    for option_type in [OptionType::Call, OptionType::Put] {
        if let Some(leg) = chain.leg(strike, option_type) {
            match solve_leg_iv(chain, leg, rate) {
                Ok(iv) => solved.push(iv),
                Err(e) => last_err = Some(e),
            }
        }
    }
    if solved.is_empty() {
        return Err(last_err.unwrap_or_else(|| QuantxError::insufficient_data("atm legs", 0, 1)));
    }
    Ok(solved.iter().sum::<f64>() / solved.len() as f64)
}

/// Expiry → ATM IV, ascending by expiry. Expiries whose ATM IV cannot be
/// solved are omitted.
pub fn term_structure(chains: &[OptionChainSnapshot], rate: f64) -> Vec<TermPoint> {
    let mut points: Vec<TermPoint> = chains
        .iter()
        .filter_map(|chain| match atm_iv(chain, rate) {
            Ok(iv) => Some(TermPoint {
                expiry: chain.expiry,
                time: chain.time_to_expiry(),
                atm_iv: iv,
            }),
            Err(e) => {
                debug!(expiry = %chain.expiry, error = %e, "atm iv unavailable");
                None
            }
        })
        .collect();
    points.sort_by(|a, b| a.expiry.cmp(&b.expiry));
    points
}

/// IV surface and ATM term structure of one underlying.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatilitySurface {
    pub symbol: String,
    pub points: Vec<SurfacePoint>,
    pub term_structure: Vec<TermPoint>,
}

/// Volatility model output; each field is `None` when it could not be
/// computed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VolatilityReport {
    pub atm_iv: Option<f64>,
    pub historical_vol: Option<f64>,
    pub iv_rank: Option<f64>,
    pub iv_percentile: Option<f64>,
    pub call_skew: Vec<SurfacePoint>,
    pub put_skew: Vec<SurfacePoint>,
}

pub fn volatility_report(
    chain: &OptionChainSnapshot,
    iv_history: &[f64],
    closes: &[f64],
    rate: f64,
    hv_window: usize,
    periods_per_year: f64,
) -> VolatilityReport {
    let atm = atm_iv(chain, rate)
        .map_err(|e| debug!(error = %e, "atm iv unavailable"))
        .ok();
    let historical = historical_vol(closes, hv_window, periods_per_year)
        .map_err(|e| debug!(error = %e, "historical vol unavailable"))
        .ok();
    let (rank, percentile) = match atm {
        Some(iv) => (
            iv_rank(iv, iv_history).ok(),
            iv_percentile(iv, iv_history).ok(),
        ),
        None => (None, None),
    };

    VolatilityReport {
        atm_iv: atm,
        historical_vol: historical,
        iv_rank: rank,
        iv_percentile: percentile,
        call_skew: skew(chain, rate, OptionType::Call),
        put_skew: skew(chain, rate, OptionType::Put),
    }
}
