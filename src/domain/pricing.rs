//! Leg pricing for strategy actions.
//!
//! A `LegPricer` turns an `InstrumentRole` into a concrete instrument with an
//! entry price, then marks that instrument on later ticks.

use chrono::{Duration, NaiveDateTime, NaiveTime};

use super::error::QuantxError;
use super::market_context::{MarketContext, names};
use super::option_math::{OptionParams, black_scholes_price, default_expiry_close, time_to_expiry};
use super::position::Instrument;
use super::strategy::InstrumentRole;

pub trait LegPricer {
    fn open_leg(
        &self,
        role: InstrumentRole,
        ctx: &MarketContext,
    ) -> Result<(Instrument, f64), QuantxError>;

    fn mark(&self, instrument: &Instrument, ctx: &MarketContext) -> Result<f64, QuantxError>;
}

fn spot(ctx: &MarketContext) -> Result<f64, QuantxError> {
    ctx.price().ok_or_else(|| QuantxError::NoData {
        symbol: ctx.symbol.clone(),
    })
}

/// Theoretical pricing for historical runs. The strike is fixed at entry
/// on a `strike_step` grid and the option expires `tenor_days` after entry;
/// volatility is the context `iv`, falling back to `hv`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlackScholesPricer {
    rate: f64,
    strike_step: f64,
    tenor_days: u32,
    expiry_close: NaiveTime,
}

impl BlackScholesPricer {
    pub fn new(rate: f64, strike_step: f64, tenor_days: u32) -> Result<Self, QuantxError> {
        if !rate.is_finite() {
            return Err(QuantxError::invalid_parameter("rate", "must be finite"));
        }
        if !(strike_step.is_finite() && strike_step > 0.0) {
            return Err(QuantxError::invalid_parameter(
                "strike_step",
                "must be positive",
            ));
        }
        if tenor_days == 0 {
            return Err(QuantxError::invalid_parameter(
                "tenor_days",
                "must be at least one day",
            ));
        }
        Ok(Self {
            rate,
            strike_step,
            tenor_days,
            expiry_close: default_expiry_close(),
        })
    }

    pub fn with_expiry_close(mut self, close: NaiveTime) -> Self {
        self.expiry_close = close;
        self
    }

    fn vol(&self, ctx: &MarketContext) -> Result<f64, QuantxError> {
        ctx.get(names::IV)
            .or_else(|| ctx.get(names::HV))
            .ok_or_else(|| QuantxError::insufficient_data("volatility for leg pricing", 0, 1))
    }

    fn strike_for(&self, spot: f64, offset: i32) -> Result<f64, QuantxError> {
        let atm = (spot / self.strike_step).round() * self.strike_step;
        let strike = atm + offset as f64 * self.strike_step;
        if strike > 0.0 {
            Ok(strike)
        } else {
            Err(QuantxError::invalid_parameter(
                "strike",
                format!("offset {offset} from ATM {atm} is not a positive strike"),
            ))
        }
    }

    fn expiry_for(&self, entry: NaiveDateTime) -> chrono::NaiveDate {
        entry.date() + Duration::days(i64::from(self.tenor_days))
    }
}

impl LegPricer for BlackScholesPricer {
    fn open_leg(
        &self,
        role: InstrumentRole,
        ctx: &MarketContext,
    ) -> Result<(Instrument, f64), QuantxError> {
        let spot = spot(ctx)?;
        match role {
            InstrumentRole::Underlying => Ok((Instrument::Underlying, spot)),
            InstrumentRole::Option {
                option_type,
                offset,
            } => {
                let instrument = Instrument::Option {
                    option_type,
                    strike: self.strike_for(spot, offset)?,
                    expiry: self.expiry_for(ctx.timestamp),
                };
                let price = self.mark(&instrument, ctx)?;
                Ok((instrument, price))
            }
        }
    }

    fn mark(&self, instrument: &Instrument, ctx: &MarketContext) -> Result<f64, QuantxError> {
        let spot = spot(ctx)?;
        match instrument {
            Instrument::Underlying => Ok(spot),
            Instrument::Option {
                option_type,
                strike,
                expiry,
            } => {
                let time = time_to_expiry(ctx.timestamp, *expiry, self.expiry_close);
                let params =
                    OptionParams::new(spot, *strike, self.rate, self.vol(ctx)?, time, *option_type);
                black_scholes_price(&params)
            }
        }
    }
}

/// Market pricing from the chain attached to the context: last traded
/// price of the matching leg.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainPricer;

impl LegPricer for ChainPricer {
    fn open_leg(
        &self,
        role: InstrumentRole,
        ctx: &MarketContext,
    ) -> Result<(Instrument, f64), QuantxError> {
        let chain = ctx.chain.as_ref().ok_or_else(|| QuantxError::NoData {
            symbol: ctx.symbol.clone(),
        })?;
        match role {
            InstrumentRole::Underlying => Ok((Instrument::Underlying, chain.spot)),
            InstrumentRole::Option {
                option_type,
                offset,
            } => {
                let strike = chain.strike_from_atm(offset).ok_or_else(|| {
                    QuantxError::invalid_parameter(
                        "strike",
                        format!("no listed strike {offset} steps from ATM"),
                    )
                })?;
                let instrument = Instrument::Option {
                    option_type,
                    strike,
                    expiry: chain.expiry,
                };
                let price = self.mark(&instrument, ctx)?;
                Ok((instrument, price))
            }
        }
    }

    fn mark(&self, instrument: &Instrument, ctx: &MarketContext) -> Result<f64, QuantxError> {
        let chain = ctx.chain.as_ref().ok_or_else(|| QuantxError::NoData {
            symbol: ctx.symbol.clone(),
        })?;
        match instrument {
            Instrument::Underlying => Ok(chain.spot),
            Instrument::Option {
                option_type,
                strike,
                expiry,
            } => {
                if *expiry != chain.expiry {
                    return Err(QuantxError::NoData {
                        symbol: format!("{} {}", ctx.symbol, instrument),
                    });
                }
                chain
                    .leg(*strike, *option_type)
                    .map(|leg| leg.last_price)
                    .ok_or_else(|| QuantxError::NoData {
                        symbol: format!("{} {}", ctx.symbol, instrument),
                    })
            }
        }
    }
}
