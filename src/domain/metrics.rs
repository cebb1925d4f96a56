//! Backtest performance statistics.

use serde::{Deserialize, Serialize};

use super::portfolio::EquityPoint;
use super::position::Trade;

pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct BacktestStats {
    pub total_trades: usize,
    pub wins: usize,
    pub losses: usize,
    pub win_rate: f64,
    /// Gross wins over gross losses; `None` when nothing lost.
    pub profit_factor: Option<f64>,
    pub max_drawdown: f64,
    pub sharpe: f64,
    pub sortino: f64,
    pub total_return: f64,
    pub avg_win: f64,
    pub avg_loss: f64,
    pub total_fees: f64,
}

impl BacktestStats {
    /// `risk_free_rate` is annual and only sets the Sortino target; Sharpe is
    /// mean / stdev of period returns times sqrt(`periods_per_year`).
    pub fn compute(
        equity_curve: &[EquityPoint],
        trades: &[Trade],
        initial_capital: f64,
        risk_free_rate: f64,
        periods_per_year: f64,
    ) -> Self {
        let final_equity = equity_curve
            .last()
            .map(|p| p.equity)
            .unwrap_or(initial_capital);

        let total_return = if initial_capital > 0.0 {
            (final_equity - initial_capital) / initial_capital
        } else {
            0.0
        };

        let max_drawdown = compute_drawdown(equity_curve);
        let period_rf = if periods_per_year > 0.0 {
            risk_free_rate / periods_per_year
        } else {
            0.0
        };
        let (sharpe, sortino) = compute_risk_adjusted(equity_curve, period_rf, periods_per_year);

        let mut wins = 0usize;
        let mut losses = 0usize;
        let mut total_wins = 0.0_f64;
        let mut total_losses = 0.0_f64;
        let mut total_fees = 0.0_f64;

        for trade in trades {
            total_fees += trade.fees;
            if trade.is_win() {
                wins += 1;
                total_wins += trade.pnl;
            } else if trade.pnl < 0.0 {
                losses += 1;
                total_losses += trade.pnl.abs();
            }
        }

        let total_trades = trades.len();
        let win_rate = if total_trades > 0 {
            wins as f64 / total_trades as f64
        } else {
            0.0
        };

        let profit_factor = (total_losses > 0.0).then(|| total_wins / total_losses);

        let avg_win = if wins > 0 {
            total_wins / wins as f64
        } else {
            0.0
        };

        let avg_loss = if losses > 0 {
            total_losses / losses as f64
        } else {
            0.0
        };

        BacktestStats {
            total_trades,
            wins,
            losses,
            win_rate,
            profit_factor,
            max_drawdown,
            sharpe,
            sortino,
            total_return,
            avg_win,
            avg_loss,
            total_fees,
        }
    }
}

/// Largest peak-to-trough decline as a fraction of the peak.
pub fn compute_drawdown(equity_curve: &[EquityPoint]) -> f64 {
    let Some(first) = equity_curve.first() else {
        return 0.0;
    };

    let mut peak = first.equity;
    let mut max_dd = 0.0_f64;

    for point in equity_curve {
        if point.equity > peak {
            peak = point.equity;
        } else if peak > 0.0 {
            let dd = (peak - point.equity) / peak;
            if dd > max_dd {
                max_dd = dd;
            }
        }
    }

    max_dd
}

fn period_returns(equity_curve: &[EquityPoint]) -> Vec<f64> {
    equity_curve
        .windows(2)
        .map(|w| {
            let prev = w[0].equity;
            let curr = w[1].equity;
            if prev > 0.0 {
                (curr - prev) / prev
            } else {
                0.0
            }
        })
        .collect()
}

/// (sharpe, sortino) of per-period returns, population stdev. Sortino
/// measures excess over `period_rf` against the downside deviation below it.
fn compute_risk_adjusted(
    equity_curve: &[EquityPoint],
    period_rf: f64,
    periods_per_year: f64,
) -> (f64, f64) {
    let returns = period_returns(equity_curve);
    if returns.is_empty() {
        return (0.0, 0.0);
    }

    let n = returns.len() as f64;
    let mean: f64 = returns.iter().sum::<f64>() / n;

    let variance: f64 = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();

    let annualise = periods_per_year.max(0.0).sqrt();

    let sharpe = if stddev > 0.0 {
        (mean / stddev) * annualise
    } else {
        0.0
    };

    let downside: f64 = returns
        .iter()
        .filter(|&&r| r < period_rf)
        .map(|&r| (r - period_rf).powi(2))
        .sum();
    let downside_stddev = (downside / n).sqrt();

    let sortino = if downside_stddev > 0.0 {
        ((mean - period_rf) / downside_stddev) * annualise
    } else {
        0.0
    };

    (sharpe, sortino)
}
