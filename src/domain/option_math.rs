//! Option pricing and probability primitives.
//!
//! Everything here is a pure function of its inputs. Time is expressed in
//! calendar years (ACT/365), volatility and rates as decimals.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use rand::SeedableRng;
use rand::distributions::Distribution;
use rand_pcg::Pcg64;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Binomial, DiscreteCDF, Normal};
use statrs::function::erf::erfc;
use std::f64::consts::{PI, SQRT_2};
use tracing::debug;

use super::error::QuantxError;
use super::option_chain::OptionType;

pub const DAYS_PER_YEAR: f64 = 365.0;
const SECONDS_PER_YEAR: f64 = DAYS_PER_YEAR * 86_400.0;

/// Calendar years between two instants, floored at zero.
pub fn years_between(from: NaiveDateTime, to: NaiveDateTime) -> f64 {
    ((to - from).num_seconds() as f64 / SECONDS_PER_YEAR).max(0.0)
}

/// Session close on expiry day when no other time is configured (15:30).
pub fn default_expiry_close() -> NaiveTime {
    NaiveTime::from_hms_opt(15, 30, 0).unwrap_or(NaiveTime::MIN)
}

/// Calendar years from `now` until the session close on `expiry`.
pub fn time_to_expiry(now: NaiveDateTime, expiry: NaiveDate, close: NaiveTime) -> f64 {
    years_between(now, expiry.and_time(close))
}

/// Standard normal CDF: Φ(x)
pub fn norm_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / SQRT_2)
}

/// Standard normal PDF: φ(x)
pub fn norm_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * PI).sqrt()
}

/// Price sensitivities. Theta is per calendar day, vega and rho per one
/// percentage point.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// Inputs shared by the pricing and probability functions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionParams {
    pub spot: f64,
    pub strike: f64,
    pub rate: f64,
    pub vol: f64,
    pub time: f64,
    pub option_type: OptionType,
}

impl OptionParams {
    pub fn new(
        spot: f64,
        strike: f64,
        rate: f64,
        vol: f64,
        time: f64,
        option_type: OptionType,
    ) -> Self {
        Self {
            spot,
            strike,
            rate,
            vol,
            time,
            option_type,
        }
    }

    pub fn with_vol(self, vol: f64) -> Self {
        Self { vol, ..self }
    }

    pub fn validate(&self) -> Result<(), QuantxError> {
        if !(self.spot.is_finite() && self.spot > 0.0) {
            return Err(QuantxError::invalid_parameter("spot", "must be positive"));
        }
        if !(self.strike.is_finite() && self.strike > 0.0) {
            return Err(QuantxError::invalid_parameter("strike", "must be positive"));
        }
        if !self.rate.is_finite() {
            return Err(QuantxError::invalid_parameter("rate", "must be finite"));
        }
        if !(self.vol.is_finite() && self.vol >= 0.0) {
            return Err(QuantxError::invalid_parameter("vol", "must be non-negative"));
        }
        if !(self.time.is_finite() && self.time >= 0.0) {
            return Err(QuantxError::invalid_parameter("time", "must be non-negative"));
        }
        Ok(())
    }

    fn d1_d2(&self) -> (f64, f64) {
        let sqrt_t = self.time.sqrt();
        let d1 = ((self.spot / self.strike).ln()
            + (self.rate + 0.5 * self.vol * self.vol) * self.time)
            / (self.vol * sqrt_t);
        (d1, d1 - self.vol * sqrt_t)
    }

    fn is_degenerate(&self) -> bool {
        self.time <= 0.0 || self.vol <= 0.0
    }

    fn discounted_strike(&self) -> f64 {
        self.strike * (-self.rate * self.time).exp()
    }

    fn strictly_itm(&self) -> bool {
        match self.option_type {
            OptionType::Call => self.spot > self.strike,
            OptionType::Put => self.spot < self.strike,
        }
    }
}

/// Unchecked Black–Scholes price. With zero time or zero volatility the
/// option is worth its (discounted) intrinsic value.
pub(crate) fn price_unchecked(p: &OptionParams) -> f64 {
    if p.is_degenerate() {
        let k = p.discounted_strike();
        return match p.option_type {
            OptionType::Call => (p.spot - k).max(0.0),
            OptionType::Put => (k - p.spot).max(0.0),
        };
    }
    let (d1, d2) = p.d1_d2();
    let k = p.discounted_strike();
    match p.option_type {
        OptionType::Call => p.spot * norm_cdf(d1) - k * norm_cdf(d2),
        OptionType::Put => k * norm_cdf(-d2) - p.spot * norm_cdf(-d1),
    }
}

/// dPrice/dσ per unit of volatility.
pub(crate) fn vega_unchecked(p: &OptionParams) -> f64 {
    if p.is_degenerate() {
        return 0.0;
    }
    let (d1, _) = p.d1_d2();
    p.spot * norm_pdf(d1) * p.time.sqrt()
}

pub fn black_scholes_price(p: &OptionParams) -> Result<f64, QuantxError> {
    p.validate()?;
    Ok(price_unchecked(p))
}

pub fn greeks(p: &OptionParams) -> Result<Greeks, QuantxError> {
    p.validate()?;
    if p.is_degenerate() {
        let delta = match (p.option_type, p.strictly_itm()) {
            (OptionType::Call, true) => 1.0,
            (OptionType::Put, true) => -1.0,
            _ => 0.0,
        };
        return Ok(Greeks {
            delta,
            ..Greeks::default()
        });
    }

    let (d1, d2) = p.d1_d2();
    let sqrt_t = p.time.sqrt();
    let k = p.discounted_strike();
    let pdf = norm_pdf(d1);
    let decay = -p.spot * pdf * p.vol / (2.0 * sqrt_t);

    let (delta, theta_year, rho) = match p.option_type {
        OptionType::Call => (
            norm_cdf(d1),
            decay - p.rate * k * norm_cdf(d2),
            k * p.time * norm_cdf(d2),
        ),
        OptionType::Put => (
            norm_cdf(d1) - 1.0,
            decay + p.rate * k * norm_cdf(-d2),
            -k * p.time * norm_cdf(-d2),
        ),
    };

    Ok(Greeks {
        delta,
        gamma: pdf / (p.spot * p.vol * sqrt_t),
        theta: theta_year / DAYS_PER_YEAR,
        vega: vega_unchecked(p) / 100.0,
        rho: rho / 100.0,
    })
}

/// Risk-neutral probability of finishing in the money under a lognormal
/// terminal distribution: N(d2) for calls, N(-d2) for puts.
pub fn itm_probability_lognormal(p: &OptionParams) -> Result<f64, QuantxError> {
    p.validate()?;
    if p.time <= 0.0 {
        return Ok(if p.strictly_itm() { 1.0 } else { 0.0 });
    }
    if p.vol <= 0.0 {
        let forward = p.spot * (p.rate * p.time).exp();
        let itm = match p.option_type {
            OptionType::Call => forward > p.strike,
            OptionType::Put => forward < p.strike,
        };
        return Ok(if itm { 1.0 } else { 0.0 });
    }
    let (_, d2) = p.d1_d2();
    Ok(match p.option_type {
        OptionType::Call => norm_cdf(d2),
        OptionType::Put => norm_cdf(-d2),
    })
}

/// Monte Carlo estimate of the ITM probability from `paths` lognormal
/// terminal draws. The same seed always yields the same estimate.
pub fn monte_carlo_itm_probability(
    p: &OptionParams,
    paths: usize,
    seed: u64,
) -> Result<f64, QuantxError> {
    p.validate()?;
    if p.vol <= 0.0 {
        return Err(QuantxError::invalid_parameter("vol", "must be positive for simulation"));
    }
    if p.time <= 0.0 {
        return Err(QuantxError::invalid_parameter("time", "must be positive for simulation"));
    }
    if paths == 0 {
        return Err(QuantxError::invalid_parameter("paths", "must be at least 1"));
    }

    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| QuantxError::invalid_parameter("normal", e.to_string()))?;
    let mut rng = Pcg64::seed_from_u64(seed);

    let drift = (p.rate - 0.5 * p.vol * p.vol) * p.time;
    let diffusion = p.vol * p.time.sqrt();
    let threshold = (p.strike / p.spot).ln();

    let hits = (0..paths)
        .filter(|_| {
            let log_return = drift + diffusion * normal.sample(&mut rng);
            match p.option_type {
                OptionType::Call => log_return > threshold,
                OptionType::Put => log_return < threshold,
            }
        })
        .count();

    Ok(hits as f64 / paths as f64)
}

/// ITM probability on a Cox–Ross–Rubinstein lattice with `steps` periods.
///
/// The terminal node after k up-moves sits at `spot * u^(2k - n)`, so the
/// probability is a tail of Binomial(n, q) with q the risk-neutral up
/// probability.
pub fn binomial_tree_probability(p: &OptionParams, steps: usize) -> Result<f64, QuantxError> {
    p.validate()?;
    if steps == 0 {
        return Err(QuantxError::invalid_parameter("steps", "must be at least 1"));
    }
    if p.is_degenerate() {
        return itm_probability_lognormal(p);
    }

    let n = steps as f64;
    let dt = p.time / n;
    let jump = p.vol * dt.sqrt();
    let up = jump.exp();
    let down = 1.0 / up;
    let q = ((p.rate * dt).exp() - down) / (up - down);
    if !(0.0..=1.0).contains(&q) {
        return Err(QuantxError::invalid_parameter(
            "steps",
            format!("risk-neutral probability {q:.4} outside [0, 1]"),
        ));
    }

    let binomial = Binomial::new(q, steps as u64)
        .map_err(|e| QuantxError::invalid_parameter("steps", e.to_string()))?;

    // Up-move count at which the terminal price equals the strike.
    let boundary = (n + (p.strike / p.spot).ln() / jump) / 2.0;

    let probability = match p.option_type {
        OptionType::Call => {
            let k_min = boundary.floor() as i64 + 1;
            if k_min <= 0 {
                1.0
            } else if k_min > steps as i64 {
                0.0
            } else {
                binomial.sf((k_min - 1) as u64)
            }
        }
        OptionType::Put => {
            let k_max = boundary.ceil() as i64 - 1;
            if k_max < 0 {
                0.0
            } else if k_max >= steps as i64 {
                1.0
            } else {
                binomial.cdf(k_max as u64)
            }
        }
    };
    Ok(probability.clamp(0.0, 1.0))
}

/// One-standard-deviation move of the underlying over `time` years.
pub fn expected_move(spot: f64, vol: f64, time: f64) -> f64 {
    spot * vol * time.max(0.0).sqrt()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationSettings {
    pub paths: usize,
    pub seed: u64,
    pub binomial_steps: usize,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            paths: 20_000,
            seed: 42,
            binomial_steps: 500,
        }
    }
}

/// The probability model's view of one expiry. Each estimator is `None`
/// when it could not run on these inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbabilityReport {
    pub strike: f64,
    pub option_type: OptionType,
    pub vol: f64,
    pub time: f64,
    pub lognormal: Option<f64>,
    pub binomial: Option<f64>,
    pub monte_carlo: Option<f64>,
    pub expected_move: f64,
    /// P(S_T > spot + expected move), priced with the upside volatility.
    pub upside: Option<f64>,
    /// P(S_T < spot - expected move), priced with the downside volatility.
    pub downside: Option<f64>,
}

fn estimate(estimator: &'static str, result: Result<f64, QuantxError>) -> Option<f64> {
    result
        .map_err(|e| debug!(estimator, error = %e, "estimator unavailable"))
        .ok()
}

/// Runs the three ITM estimators on `params` and prices the one-sigma
/// tails with their own volatilities, which is where skew shows up.
/// Invalid `params` fail the whole report; an estimator that cannot run
/// only blanks its own field.
pub fn probability_report(
    params: &OptionParams,
    up_vol: f64,
    down_vol: f64,
    settings: &SimulationSettings,
) -> Result<ProbabilityReport, QuantxError> {
    params.validate()?;
    let em = expected_move(params.spot, params.vol, params.time);

    let upside = estimate(
        "upside",
        itm_probability_lognormal(&OptionParams {
            strike: params.spot + em,
            vol: up_vol,
            option_type: OptionType::Call,
            ..*params
        }),
    );
    let lower = params.spot - em;
    let downside = if lower > 0.0 {
        estimate(
            "downside",
            itm_probability_lognormal(&OptionParams {
                strike: lower,
                vol: down_vol,
                option_type: OptionType::Put,
                ..*params
            }),
        )
    } else {
        Some(0.0)
    };

    Ok(ProbabilityReport {
        strike: params.strike,
        option_type: params.option_type,
        vol: params.vol,
        time: params.time,
        lognormal: estimate("lognormal", itm_probability_lognormal(params)),
        binomial: estimate(
            "binomial",
            binomial_tree_probability(params, settings.binomial_steps),
        ),
        monte_carlo: estimate(
            "monte_carlo",
            monte_carlo_itm_probability(params, settings.paths, settings.seed),
        ),
        expected_move: em,
        upside,
        downside,
    })
}
