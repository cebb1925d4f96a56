//! CSV file data adapter.
//!
//! Layout under the base directory:
//! - `{SYMBOL}.csv`: `timestamp,open,high,low,close,volume`
//! - `{SYMBOL}_chain.csv`: one row per leg,
//!   `timestamp,expiry,spot,strike,option_type,last_price,iv,delta,gamma,theta,vega,open_interest,volume`
//!   where `iv` and the greeks may be left empty.
//!
//! Timestamps are `YYYY-MM-DD`, `YYYY-MM-DD HH:MM:SS` or `YYYY-MM-DDTHH:MM:SS`.

use crate::domain::error::QuantxError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::option_chain::{OptionChainSnapshot, OptionLeg, OptionType};
use crate::domain::option_math::Greeks;
use crate::ports::data_port::{ChainProvider, OhlcvProvider};
use chrono::{NaiveDate, NaiveDateTime};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

const CHAIN_SUFFIX: &str = "_chain.csv";

#[derive(Debug, Deserialize)]
struct BarRow {
    #[serde(alias = "date")]
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    volume: i64,
}

#[derive(Debug, Deserialize)]
struct LegRow {
    timestamp: String,
    expiry: String,
    spot: f64,
    strike: f64,
    #[serde(alias = "type")]
    option_type: String,
    #[serde(alias = "last")]
    last_price: f64,
    iv: Option<f64>,
    delta: Option<f64>,
    gamma: Option<f64>,
    theta: Option<f64>,
    vega: Option<f64>,
    #[serde(default)]
    rho: Option<f64>,
    open_interest: i64,
    volume: i64,
}

impl LegRow {
    fn greeks(&self) -> Option<Greeks> {
        Some(Greeks {
            delta: self.delta?,
            gamma: self.gamma?,
            theta: self.theta?,
            vega: self.vega?,
            rho: self.rho.unwrap_or(0.0),
        })
    }
}

pub struct CsvDataAdapter {
    base_path: PathBuf,
    chains: RwLock<HashMap<String, Arc<Vec<OptionChainSnapshot>>>>,
}

impl CsvDataAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self {
            base_path,
            chains: RwLock::new(HashMap::new()),
        }
    }

    fn ohlcv_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}.csv"))
    }

    fn chain_path(&self, symbol: &str) -> PathBuf {
        self.base_path.join(format!("{symbol}{CHAIN_SUFFIX}"))
    }

    fn read(path: &PathBuf) -> Result<String, QuantxError> {
        fs::read_to_string(path).map_err(|e| QuantxError::DataSource {
            reason: format!("failed to read {}: {}", path.display(), e),
        })
    }

    /// All snapshots in the chain file, ordered by (expiry, timestamp).
    fn load_chains(&self, symbol: &str) -> Result<Arc<Vec<OptionChainSnapshot>>, QuantxError> {
        if let Some(cached) = self.chains.read().get(symbol) {
            return Ok(Arc::clone(cached));
        }

        let path = self.chain_path(symbol);
        let content = Self::read(&path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());

        let mut grouped: BTreeMap<(NaiveDate, NaiveDateTime), (f64, Vec<OptionLeg>)> =
            BTreeMap::new();
        for (line, result) in rdr.deserialize::<LegRow>().enumerate() {
            let row = result.map_err(|e| QuantxError::DataSource {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let timestamp = parse_timestamp(&row.timestamp)?;
            let expiry = parse_date(&row.expiry)?;
            let option_type: OptionType =
                row.option_type
                    .parse()
                    .map_err(|e: String| QuantxError::DataSource {
                        reason: format!("{} row {}: {}", path.display(), line + 2, e),
                    })?;
            let leg = OptionLeg {
                strike: row.strike,
                option_type,
                last_price: row.last_price,
                iv: row.iv,
                greeks: row.greeks(),
                open_interest: row.open_interest,
                volume: row.volume,
            };
            let entry = grouped
                .entry((expiry, timestamp))
                .or_insert_with(|| (row.spot, Vec::new()));
            entry.1.push(leg);
        }

        let snapshots: Vec<OptionChainSnapshot> = grouped
            .into_iter()
            .map(|((expiry, timestamp), (spot, legs))| {
                OptionChainSnapshot::new(symbol, expiry, timestamp, spot, legs)
            })
            .collect();
        debug!(symbol, snapshots = snapshots.len(), "loaded option chains");

        let snapshots = Arc::new(snapshots);
        self.chains
            .write()
            .insert(symbol.to_string(), Arc::clone(&snapshots));
        Ok(snapshots)
    }
}

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime, QuantxError> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .or_else(|_| {
            NaiveDate::parse_from_str(raw, "%Y-%m-%d")
                .map(|d| d.and_time(chrono::NaiveTime::MIN))
        })
        .map_err(|e| QuantxError::DataSource {
            reason: format!("invalid timestamp '{raw}': {e}"),
        })
}

fn parse_date(raw: &str) -> Result<NaiveDate, QuantxError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|e| QuantxError::DataSource {
        reason: format!("invalid date '{raw}': {e}"),
    })
}

impl OhlcvProvider for CsvDataAdapter {
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, QuantxError> {
        let path = self.ohlcv_path(symbol);
        let content = Self::read(&path)?;
        let mut rdr = csv::Reader::from_reader(content.as_bytes());
        let mut bars = Vec::new();

        for result in rdr.deserialize::<BarRow>() {
            let row = result.map_err(|e| QuantxError::DataSource {
                reason: format!("{}: CSV parse error: {}", path.display(), e),
            })?;
            let timestamp = parse_timestamp(&row.timestamp)?;
            let date = timestamp.date();
            if date < start || date > end {
                continue;
            }
            bars.push(OhlcvBar {
                symbol: symbol.to_string(),
                timestamp,
                open: row.open,
                high: row.high,
                low: row.low,
                close: row.close,
                volume: row.volume,
            });
        }

        bars.sort_by_key(|b| b.timestamp);
        Ok(bars)
    }

    fn list_symbols(&self) -> Result<Vec<String>, QuantxError> {
        let entries = fs::read_dir(&self.base_path).map_err(|e| QuantxError::DataSource {
            reason: format!(
                "failed to read directory {}: {}",
                self.base_path.display(),
                e
            ),
        })?;

        let mut symbols = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| QuantxError::DataSource {
                reason: format!("directory entry error: {}", e),
            })?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(CHAIN_SUFFIX) {
                continue;
            }
            if let Some(symbol) = name.strip_suffix(".csv") {
                symbols.push(symbol.to_string());
            }
        }

        symbols.sort();
        Ok(symbols)
    }
}

impl ChainProvider for CsvDataAdapter {
    fn fetch_chain(
        &self,
        symbol: &str,
        expiry: NaiveDate,
    ) -> Result<OptionChainSnapshot, QuantxError> {
        self.load_chains(symbol)?
            .iter()
            .rev()
            .find(|c| c.expiry == expiry)
            .cloned()
            .ok_or_else(|| QuantxError::NoData {
                symbol: format!("{symbol} {expiry}"),
            })
    }

    fn chain_history(
        &self,
        symbol: &str,
        expiry: NaiveDate,
        limit: usize,
    ) -> Result<Vec<OptionChainSnapshot>, QuantxError> {
        let chains = self.load_chains(symbol)?;
        let matching: Vec<&OptionChainSnapshot> =
            chains.iter().filter(|c| c.expiry == expiry).collect();
        let skip = matching.len().saturating_sub(limit);
        Ok(matching.into_iter().skip(skip).cloned().collect())
    }

    fn expiries(&self, symbol: &str) -> Result<Vec<NaiveDate>, QuantxError> {
        let mut expiries: Vec<NaiveDate> =
            self.load_chains(symbol)?.iter().map(|c| c.expiry).collect();
        expiries.dedup();
        Ok(expiries)
    }
}
