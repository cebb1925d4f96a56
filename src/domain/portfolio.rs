//! Capital, trade ledger and equity tracking for a backtest run.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use super::position::Trade;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: NaiveDateTime,
    pub equity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Portfolio {
    pub capital: f64,
    pub initial_capital: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl Portfolio {
    pub fn new(initial_capital: f64) -> Self {
        Portfolio {
            capital: initial_capital,
            initial_capital,
            trades: Vec::new(),
            equity_curve: Vec::new(),
        }
    }

    /// Append a closed trade and realize its net P&L into capital.
    pub fn record_trade(&mut self, trade: Trade) {
        self.capital += trade.pnl;
        self.trades.push(trade);
    }

    pub fn record_equity(&mut self, timestamp: NaiveDateTime, equity: f64) {
        self.equity_curve.push(EquityPoint { timestamp, equity });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::position::{ExitReason, Instrument};
    use crate::domain::strategy::Side;
    use chrono::NaiveDate;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 2, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    fn trade(pnl: f64, fees: f64) -> Trade {
        Trade {
            symbol: "NIFTY".into(),
            instrument: Instrument::Underlying,
            side: Side::Buy,
            quantity: 1,
            entry_price: 100.0,
            exit_price: 100.0 + pnl + fees,
            entry_time: ts(1),
            exit_time: ts(2),
            bars_held: 1,
            exit_reason: ExitReason::TakeProfit,
            fees,
            pnl,
        }
    }

    #[test]
    fn new_portfolio() {
        let portfolio = Portfolio::new(100_000.0);
        assert!((portfolio.capital - 100_000.0).abs() < f64::EPSILON);
        assert!(portfolio.trades.is_empty());
        assert!(portfolio.equity_curve.is_empty());
    }

    #[test]
    fn record_trade_updates_capital() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.record_trade(trade(250.0, 10.0));
        portfolio.record_trade(trade(-100.0, 10.0));
        assert!((portfolio.capital - 10_150.0).abs() < 1e-9);
        assert_eq!(portfolio.trades.len(), 2);
    }

    #[test]
    fn record_equity_appends() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio.record_equity(ts(1), 10_000.0);
        portfolio.record_equity(ts(2), 10_050.0);
        assert_eq!(portfolio.equity_curve.len(), 2);
        assert_eq!(portfolio.equity_curve[1].timestamp, ts(2));
    }
}
