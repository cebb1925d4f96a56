//! Open positions and completed trades.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::option_chain::OptionType;
use super::strategy::{ExitKind, InstrumentRole, Side};

/// A concrete tradable instrument, resolved from an `InstrumentRole` at entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Instrument {
    Underlying,
    Option {
        option_type: OptionType,
        strike: f64,
        expiry: NaiveDate,
    },
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Instrument::Underlying => write!(f, "UNDERLYING"),
            Instrument::Option {
                option_type,
                strike,
                expiry,
            } => write!(f, "{} {} {}", expiry.format("%Y-%m-%d"), strike, option_type),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    TimeExit,
    EndOfData,
}

impl From<ExitKind> for ExitReason {
    fn from(kind: ExitKind) -> Self {
        match kind {
            ExitKind::TakeProfit => ExitReason::TakeProfit,
            ExitKind::StopLoss => ExitReason::StopLoss,
            ExitKind::TimeExit => ExitReason::TimeExit,
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitReason::TakeProfit => write!(f, "take_profit"),
            ExitReason::StopLoss => write!(f, "stop_loss"),
            ExitReason::TimeExit => write!(f, "time_exit"),
            ExitReason::EndOfData => write!(f, "end_of_data"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Position {
    pub symbol: String,
    pub role: InstrumentRole,
    pub instrument: Instrument,
    pub side: Side,
    pub quantity: u32,
    pub entry_price: f64,
    pub entry_time: NaiveDateTime,
    pub entry_fees: f64,
    pub bars_held: usize,
}

impl Position {
    /// Quantity signed by side: positive long, negative short.
    pub fn signed_qty(&self) -> f64 {
        self.side.sign() * self.quantity as f64
    }

    pub fn unrealized_pnl(&self, price: f64) -> f64 {
        self.signed_qty() * (price - self.entry_price)
    }

    /// Capital committed at entry; the denominator of `pnl_pct`.
    pub fn cost_basis(&self) -> f64 {
        self.entry_price.abs() * self.quantity as f64
    }

    pub fn pnl_pct(&self, price: f64) -> f64 {
        let basis = self.cost_basis();
        if basis > 0.0 {
            self.unrealized_pnl(price) / basis
        } else {
            0.0
        }
    }

    /// Realize the position. `exit_fees` are the costs of the closing fill.
    pub fn close(
        self,
        exit_price: f64,
        exit_time: NaiveDateTime,
        exit_fees: f64,
        reason: ExitReason,
    ) -> Trade {
        let fees = self.entry_fees + exit_fees;
        let gross = self.unrealized_pnl(exit_price);
        Trade {
            symbol: self.symbol,
            instrument: self.instrument,
            side: self.side,
            quantity: self.quantity,
            entry_price: self.entry_price,
            exit_price,
            entry_time: self.entry_time,
            exit_time,
            bars_held: self.bars_held,
            exit_reason: reason,
            fees,
            pnl: gross - fees,
        }
    }
}

/// A completed round trip. `pnl` is net of `fees`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub symbol: String,
    pub instrument: Instrument,
    pub side: Side,
    pub quantity: u32,
    pub entry_price: f64,
    pub exit_price: f64,
    pub entry_time: NaiveDateTime,
    pub exit_time: NaiveDateTime,
    pub bars_held: usize,
    pub exit_reason: ExitReason,
    pub fees: f64,
    pub pnl: f64,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(15, 30, 0)
            .unwrap()
    }

    fn position(side: Side) -> Position {
        Position {
            symbol: "NIFTY".into(),
            role: InstrumentRole::ATM_CALL,
            instrument: Instrument::Option {
                option_type: OptionType::Call,
                strike: 22000.0,
                expiry: NaiveDate::from_ymd_opt(2024, 1, 25).unwrap(),
            },
            side,
            quantity: 2,
            entry_price: 100.0,
            entry_time: ts(2),
            entry_fees: 1.0,
            bars_held: 0,
        }
    }

    #[test]
    fn long_pnl() {
        let p = position(Side::Buy);
        assert!((p.unrealized_pnl(130.0) - 60.0).abs() < 1e-12);
        assert!((p.pnl_pct(130.0) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn short_pnl() {
        let p = position(Side::Sell);
        assert!((p.unrealized_pnl(80.0) - 40.0).abs() < 1e-12);
        assert!((p.pnl_pct(120.0) + 0.2).abs() < 1e-12);
    }

    #[test]
    fn zero_entry_price_has_zero_pct() {
        let mut p = position(Side::Buy);
        p.entry_price = 0.0;
        assert_eq!(p.pnl_pct(5.0), 0.0);
    }

    #[test]
    fn close_nets_fees() {
        let mut p = position(Side::Buy);
        p.bars_held = 4;
        let trade = p.close(110.0, ts(5), 1.5, ExitReason::TakeProfit);
        assert!((trade.fees - 2.5).abs() < 1e-12);
        assert!((trade.pnl + trade.fees - 20.0).abs() < 1e-12);
        assert!((trade.pnl - 17.5).abs() < 1e-12);
        assert_eq!(trade.bars_held, 4);
        assert!(trade.is_win());
    }

    #[test]
    fn instrument_display() {
        let p = position(Side::Buy);
        assert_eq!(p.instrument.to_string(), "2024-01-25 22000 CALL");
        assert_eq!(Instrument::Underlying.to_string(), "UNDERLYING");
    }

    #[test]
    fn exit_reason_from_kind() {
        assert_eq!(ExitReason::from(ExitKind::StopLoss), ExitReason::StopLoss);
        assert_eq!(ExitReason::EndOfData.to_string(), "end_of_data");
    }
}
