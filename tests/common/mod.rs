#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::Mutex;
pub use quantx::domain::ohlcv::OhlcvBar;
use quantx::domain::error::QuantxError;
use quantx::domain::option_chain::{OptionChainSnapshot, OptionLeg, OptionType};
use quantx::domain::option_math::{
    OptionParams, black_scholes_price, default_expiry_close, time_to_expiry,
};
use quantx::domain::strategy::StrategyDefinition;
use quantx::ports::data_port::{ChainProvider, OhlcvProvider};
use quantx::ports::strategy_store::StrategyStore;
use std::collections::HashMap;

pub struct MockOhlcvProvider {
    pub data: HashMap<String, Vec<OhlcvBar>>,
    pub errors: HashMap<String, String>,
}

impl MockOhlcvProvider {
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            errors: HashMap::new(),
        }
    }

    pub fn with_bars(mut self, symbol: &str, bars: Vec<OhlcvBar>) -> Self {
        self.data.insert(symbol.to_string(), bars);
        self
    }

    pub fn with_error(mut self, symbol: &str, reason: &str) -> Self {
        self.errors.insert(symbol.to_string(), reason.to_string());
        self
    }
}

impl OhlcvProvider for MockOhlcvProvider {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, QuantxError> {
        if let Some(reason) = self.errors.get(symbol) {
            return Err(QuantxError::DataSource {
                reason: reason.clone(),
            });
        }
        Ok(self
            .data
            .get(symbol)
            .map(|bars| {
                bars.iter()
                    .filter(|b| b.timestamp.date() >= start && b.timestamp.date() <= end)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantxError> {
        let mut symbols: Vec<String> = self.data.keys().cloned().collect();
        symbols.sort();
        Ok(symbols)
    }
}

/// Snapshots per symbol, oldest first.
pub struct MockChainProvider {
    pub chains: HashMap<String, Vec<OptionChainSnapshot>>,
}

impl MockChainProvider {
    pub fn new() -> Self {
        Self {
            chains: HashMap::new(),
        }
    }

    pub fn with_chain(mut self, chain: OptionChainSnapshot) -> Self {
        self.chains
            .entry(chain.underlying.clone())
            .or_default()
            .push(chain);
        self
    }

    fn matching(&self, symbol: &str, expiry: NaiveDate) -> Vec<OptionChainSnapshot> {
        self.chains
            .get(symbol)
            .map(|all| {
                all.iter()
                    .filter(|c| c.expiry == expiry)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl ChainProvider for MockChainProvider {
    fn fetch_chain(
        &self,
        symbol: &str,
        expiry: NaiveDate,
    ) -> Result<OptionChainSnapshot, QuantxError> {
        self.matching(symbol, expiry)
            .pop()
            .ok_or_else(|| QuantxError::NoData {
                symbol: symbol.to_string(),
            })
    }

    fn chain_history(
        &self,
        symbol: &str,
        expiry: NaiveDate,
        limit: usize,
    ) -> Result<Vec<OptionChainSnapshot>, QuantxError> {
        let all = self.matching(symbol, expiry);
        let skip = all.len().saturating_sub(limit);
        Ok(all.into_iter().skip(skip).collect())
    }

    fn expiries(&self, symbol: &str) -> Result<Vec<NaiveDate>, QuantxError> {
        let mut expiries: Vec<NaiveDate> = self
            .chains
            .get(symbol)
            .map(|all| all.iter().map(|c| c.expiry).collect())
            .unwrap_or_default();
        expiries.sort();
        expiries.dedup();
        Ok(expiries)
    }
}

pub struct MemoryStrategyStore {
    strategies: Mutex<HashMap<String, StrategyDefinition>>,
}

impl MemoryStrategyStore {
    pub fn new() -> Self {
        Self {
            strategies: Mutex::new(HashMap::new()),
        }
    }

    pub fn with(self, strategy: StrategyDefinition) -> Self {
        self.strategies
            .lock()
            .insert(strategy.name.clone(), strategy);
        self
    }
}

impl StrategyStore for MemoryStrategyStore {
    fn list(&self) -> Result<Vec<String>, QuantxError> {
        let mut names: Vec<String> = self.strategies.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn get(&self, name: &str) -> Result<Option<StrategyDefinition>, QuantxError> {
        Ok(self.strategies.lock().get(name).cloned())
    }

    fn save(&self, strategy: &StrategyDefinition) -> Result<(), QuantxError> {
        strategy.validate()?;
        self.strategies
            .lock()
            .insert(strategy.name.clone(), strategy.clone());
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<bool, QuantxError> {
        Ok(self.strategies.lock().remove(name).is_some())
    }
}

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn at(date: NaiveDate, hour: u32) -> NaiveDateTime {
    date.and_hms_opt(hour, 0, 0).unwrap()
}

pub fn make_bar(symbol: &str, date: &str, close: f64) -> OhlcvBar {
    OhlcvBar {
        symbol: symbol.to_string(),
        timestamp: NaiveDate::parse_from_str(date, "%Y-%m-%d")
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap(),
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

/// Daily bars with a small alternating wiggle on top of `drift` per day.
pub fn generate_bars(
    symbol: &str,
    start_date: &str,
    count: usize,
    start_price: f64,
    drift: f64,
) -> Vec<OhlcvBar> {
    let start = NaiveDate::parse_from_str(start_date, "%Y-%m-%d").unwrap();
    (0..count)
        .map(|i| {
            let wiggle = if i % 2 == 0 { 0.5 } else { -0.5 };
            let close = start_price + drift * i as f64 + wiggle;
            OhlcvBar {
                symbol: symbol.to_string(),
                timestamp: (start + chrono::Duration::days(i as i64))
                    .and_hms_opt(0, 0, 0)
                    .unwrap(),
                open: close - wiggle,
                high: close + 1.0,
                low: close - 1.0,
                close,
                volume: 1000 + i as i64,
            }
        })
        .collect()
}

/// Chain whose legs are priced by Black–Scholes at `vol`, so each leg's
/// solved IV comes back as `vol`. OI is skewed by `put_oi_factor`.
pub fn make_chain(
    symbol: &str,
    expiry: NaiveDate,
    timestamp: NaiveDateTime,
    spot: f64,
    strikes: &[f64],
    vol: f64,
    put_oi_factor: f64,
) -> OptionChainSnapshot {
    let time = time_to_expiry(timestamp, expiry, default_expiry_close());
    let mut legs = Vec::new();
    for &strike in strikes {
        for option_type in [OptionType::Call, OptionType::Put] {
            let price =
                black_scholes_price(&OptionParams::new(spot, strike, 0.05, vol, time, option_type))
                    .unwrap();
            let oi = match option_type {
                OptionType::Call => 10_000,
                OptionType::Put => (10_000.0 * put_oi_factor) as i64,
            };
            legs.push(OptionLeg {
                strike,
                option_type,
                last_price: price,
                iv: None,
                greeks: None,
                open_interest: oi,
                volume: 500,
            });
        }
    }
    OptionChainSnapshot::new(symbol, expiry, timestamp, spot, legs)
}
