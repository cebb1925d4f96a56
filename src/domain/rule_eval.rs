//! Strategy rule evaluation against a `MarketContext`.
//!
//! # Evaluation Semantics
//!
//! - Conditions: all must hold (AND, short-circuits on first `false`)
//! - An indicator missing from the context makes its condition `false`
//! - Filters: all must hold, dispatched by filter kind
//! - Exits: checked in declared order, the first one that holds wins

use chrono::NaiveTime;
use tracing::debug;

use crate::domain::market_context::{MarketContext, names};
use crate::domain::strategy::{Condition, Exit, ExitKind, Filter};

pub fn evaluate_condition(condition: &Condition, ctx: &MarketContext) -> bool {
    match ctx.get(&condition.indicator) {
        Some(value) => condition.operator.apply(value, condition.threshold),
        None => {
            debug!(
                indicator = %condition.indicator,
                symbol = %ctx.symbol,
                "indicator unavailable, condition is false"
            );
            false
        }
    }
}

pub fn evaluate_conditions(conditions: &[Condition], ctx: &MarketContext) -> bool {
    conditions.iter().all(|c| evaluate_condition(c, ctx))
}

pub fn evaluate_filter(filter: &Filter, ctx: &MarketContext) -> bool {
    match filter {
        Filter::MinVolume { value } => ctx.get(names::VOLUME).is_some_and(|v| v >= *value),
        Filter::Session { start, end } => in_session(ctx.timestamp.time(), *start, *end),
        Filter::MinConfidence { value } => ctx
            .consensus
            .as_ref()
            .is_some_and(|c| c.confidence >= *value),
        Filter::Bias { bias } => ctx.consensus.as_ref().is_some_and(|c| c.bias == *bias),
    }
}

pub fn evaluate_filters(filters: &[Filter], ctx: &MarketContext) -> bool {
    filters.iter().all(|f| evaluate_filter(f, ctx))
}

fn in_session(time: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        time >= start && time <= end
    } else {
        time >= start || time <= end
    }
}

/// `pnl_pct` is the unrealized P&L as a fraction of entry cost.
pub fn exit_triggered(exit: &Exit, pnl_pct: f64, bars_held: usize) -> bool {
    match exit.kind {
        ExitKind::TakeProfit => pnl_pct >= exit.value,
        ExitKind::StopLoss => pnl_pct <= -exit.value,
        ExitKind::TimeExit => bars_held as f64 >= exit.value,
    }
}

pub fn first_triggered_exit(exits: &[Exit], pnl_pct: f64, bars_held: usize) -> Option<&Exit> {
    exits
        .iter()
        .find(|e| exit_triggered(e, pnl_pct, bars_held))
}
