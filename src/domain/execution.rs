//! Fills and transaction costs.
//!
//! Fills execute at the raw market price; slippage and commission are charged
//! as a separate cost per fill:
//!
//! `cost = slippage_bps / 10_000 * |price| * quantity + commission_per_fill`

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::error::QuantxError;
use super::position::Instrument;
use super::strategy::{InstrumentRole, Side};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CostModel {
    pub slippage_bps: f64,
    pub commission_per_fill: f64,
}

impl CostModel {
    pub fn new(slippage_bps: f64, commission_per_fill: f64) -> Result<Self, QuantxError> {
        if !(slippage_bps.is_finite() && slippage_bps >= 0.0) {
            return Err(QuantxError::invalid_parameter(
                "slippage_bps",
                "must be a non-negative number",
            ));
        }
        if !(commission_per_fill.is_finite() && commission_per_fill >= 0.0) {
            return Err(QuantxError::invalid_parameter(
                "commission_per_fill",
                "must be a non-negative number",
            ));
        }
        Ok(Self {
            slippage_bps,
            commission_per_fill,
        })
    }

    /// Zero-cost model, used for live decisions.
    pub fn slippage_cost(&self, price: f64, quantity: u32) -> f64 {
        self.slippage_bps / 10_000.0 * price.abs() * quantity as f64
    }

    pub fn fill_cost(&self, price: f64, quantity: u32) -> f64 {
        self.slippage_cost(price, quantity) + self.commission_per_fill
    }
}

/// One executed order leg.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub symbol: String,
    pub role: InstrumentRole,
    pub instrument: Instrument,
    pub side: Side,
    pub quantity: u32,
    pub price: f64,
    pub time: NaiveDateTime,
    pub cost: f64,
}
