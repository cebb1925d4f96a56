//! Option chain snapshots and instrument quotes.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::option_math::{Greeks, default_expiry_close, time_to_expiry};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OptionType {
    Call,
    Put,
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OptionType::Call => write!(f, "CALL"),
            OptionType::Put => write!(f, "PUT"),
        }
    }
}

impl FromStr for OptionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "CALL" | "CE" | "C" => Ok(OptionType::Call),
            "PUT" | "PE" | "P" => Ok(OptionType::Put),
            other => Err(format!("unknown option type '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionLeg {
    pub strike: f64,
    pub option_type: OptionType,
    pub last_price: f64,
    /// Quoted implied volatility as a decimal, when the venue publishes one.
    pub iv: Option<f64>,
    pub greeks: Option<Greeks>,
    pub open_interest: i64,
    pub volume: i64,
}

/// Spot price of one underlying at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstrumentQuote {
    pub symbol: String,
    pub spot: f64,
    pub timestamp: NaiveDateTime,
}

/// Every leg for one (underlying, expiry) at one instant. Legs are kept
/// ordered by strike, calls before puts at equal strikes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionChainSnapshot {
    pub underlying: String,
    pub expiry: NaiveDate,
    pub timestamp: NaiveDateTime,
    pub spot: f64,
    /// Time of day the contract stops trading on `expiry`.
    #[serde(default = "default_expiry_close")]
    pub expiry_close: NaiveTime,
    legs: Vec<OptionLeg>,
}

impl OptionChainSnapshot {
    pub fn new(
        underlying: impl Into<String>,
        expiry: NaiveDate,
        timestamp: NaiveDateTime,
        spot: f64,
        mut legs: Vec<OptionLeg>,
    ) -> Self {
        legs.sort_by(|a, b| {
            a.strike
                .total_cmp(&b.strike)
                .then_with(|| (a.option_type == OptionType::Put).cmp(&(b.option_type == OptionType::Put)))
        });
        Self {
            underlying: underlying.into(),
            expiry,
            timestamp,
            spot,
            expiry_close: default_expiry_close(),
            legs,
        }
    }

    pub fn with_expiry_close(mut self, close: NaiveTime) -> Self {
        self.expiry_close = close;
        self
    }

    pub fn legs(&self) -> &[OptionLeg] {
        &self.legs
    }

    /// Distinct strikes in ascending order.
    pub fn strikes(&self) -> Vec<f64> {
        let mut strikes: Vec<f64> = self.legs.iter().map(|l| l.strike).collect();
        strikes.dedup_by(|a, b| (*a - *b).abs() < 1e-9);
        strikes
    }

    /// Strike closest to spot; ties go to the lower strike.
    pub fn atm_strike(&self) -> Option<f64> {
        self.strikes().into_iter().min_by(|a, b| {
            (a - self.spot)
                .abs()
                .total_cmp(&(b - self.spot).abs())
                .then_with(|| a.total_cmp(b))
        })
    }

    /// Strike `offset` listed strikes away from ATM, positive being higher.
    pub fn strike_from_atm(&self, offset: i32) -> Option<f64> {
        let strikes = self.strikes();
        let atm = self.atm_strike()?;
        let idx = strikes.iter().position(|s| (s - atm).abs() < 1e-9)? as i64 + offset as i64;
        if idx < 0 {
            return None;
        }
        strikes.get(idx as usize).copied()
    }

    pub fn leg(&self, strike: f64, option_type: OptionType) -> Option<&OptionLeg> {
        self.legs
            .iter()
            .find(|l| l.option_type == option_type && (l.strike - strike).abs() < 1e-9)
    }

    pub fn legs_of(&self, option_type: OptionType) -> impl Iterator<Item = &OptionLeg> {
        self.legs.iter().filter(move |l| l.option_type == option_type)
    }

    pub fn total_open_interest(&self, option_type: OptionType) -> i64 {
        self.legs_of(option_type).map(|l| l.open_interest).sum()
    }

    pub fn total_volume(&self, option_type: OptionType) -> i64 {
        self.legs_of(option_type).map(|l| l.volume).sum()
    }

    /// Calendar-year time from the snapshot to the expiry-day close.
    pub fn time_to_expiry(&self) -> f64 {
        time_to_expiry(self.timestamp, self.expiry, self.expiry_close)
    }
}
