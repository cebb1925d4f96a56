//! Market data ports: option chain snapshots and OHLCV history.

use crate::domain::error::QuantxError;
use crate::domain::ohlcv::OhlcvBar;
use crate::domain::option_chain::OptionChainSnapshot;
use chrono::NaiveDate;

pub trait ChainProvider: Send + Sync {
    /// Latest snapshot for (symbol, expiry).
    fn fetch_chain(&self, symbol: &str, expiry: NaiveDate)
    -> Result<OptionChainSnapshot, QuantxError>;

    /// Up to `limit` most recent snapshots, oldest first.
    fn chain_history(
        &self,
        symbol: &str,
        expiry: NaiveDate,
        limit: usize,
    ) -> Result<Vec<OptionChainSnapshot>, QuantxError>;

    /// Listed expiries, ascending.
    fn expiries(&self, symbol: &str) -> Result<Vec<NaiveDate>, QuantxError>;
}

pub trait OhlcvProvider: Send + Sync {
    /// Bars with dates in `[start, end]`, ascending.
    fn fetch_ohlcv(
        &self,
        symbol: &str,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<OhlcvBar>, QuantxError>;

    fn list_symbols(&self) -> Result<Vec<String>, QuantxError>;
}
