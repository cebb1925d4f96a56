//! Strategy state machine, one per (strategy, instrument).
//!
//! ```text
//! IDLE -> EVALUATING -> POSITION_OPEN -> CLOSING -> IDLE
//! ```
//!
//! Each `step` consumes one market context. While idle the engine evaluates
//! conditions and filters and, if both pass, opens one position per action.
//! Exits are not checked on the entry tick. While positions are open the
//! engine marks them, checks exits in declared order and realizes trades;
//! a tick that closes positions never re-enters.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::error::QuantxError;
use super::execution::{CostModel, Fill};
use super::market_context::MarketContext;
use super::option_chain::InstrumentQuote;
use super::position::{ExitReason, Position, Trade};
use super::pricing::LegPricer;
use super::rule_eval::{evaluate_conditions, evaluate_filters, first_triggered_exit};
use super::strategy::StrategyDefinition;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineState {
    Idle,
    Evaluating,
    PositionOpen,
    Closing,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    ConditionsNotMet,
    FiltersNotMet,
    PositionOpen,
    PricingFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::ConditionsNotMet => write!(f, "conditions not met"),
            SkipReason::FiltersNotMet => write!(f, "filters not met"),
            SkipReason::PositionOpen => write!(f, "position already open"),
            SkipReason::PricingFailed(reason) => write!(f, "pricing failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StepOutcome {
    pub opened: Vec<Fill>,
    pub closed: Vec<Trade>,
    pub skip: Option<SkipReason>,
}

#[derive(Debug, Clone)]
struct OpenLeg {
    position: Position,
    last_mark: f64,
}

pub struct StrategyEngine {
    strategy: StrategyDefinition,
    symbol: String,
    costs: CostModel,
    state: EngineState,
    open: Vec<OpenLeg>,
}

impl StrategyEngine {
    pub fn new(
        strategy: StrategyDefinition,
        symbol: impl Into<String>,
        costs: CostModel,
    ) -> Result<Self, QuantxError> {
        strategy.validate()?;
        Ok(Self {
            strategy,
            symbol: symbol.into(),
            costs,
            state: EngineState::Idle,
            open: Vec::new(),
        })
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn strategy(&self) -> &StrategyDefinition {
        &self.strategy
    }

    pub fn has_open_positions(&self) -> bool {
        !self.open.is_empty()
    }

    /// Unrealized P&L of open legs at their most recent marks.
    pub fn unrealized_pnl(&self) -> f64 {
        self.open
            .iter()
            .map(|leg| leg.position.unrealized_pnl(leg.last_mark))
            .sum()
    }

    pub fn step(&mut self, ctx: &MarketContext, pricer: &dyn LegPricer) -> StepOutcome {
        if self.open.is_empty() {
            self.try_enter(ctx, pricer)
        } else {
            self.manage_open(ctx, pricer)
        }
    }

    fn try_enter(&mut self, ctx: &MarketContext, pricer: &dyn LegPricer) -> StepOutcome {
        self.state = EngineState::Evaluating;

        if !evaluate_conditions(&self.strategy.conditions, ctx) {
            return self.skip(SkipReason::ConditionsNotMet);
        }
        if !evaluate_filters(&self.strategy.filters, ctx) {
            return self.skip(SkipReason::FiltersNotMet);
        }

        // price every leg before opening any of them
        let mut priced = Vec::with_capacity(self.strategy.actions.len());
        let mut failure = None;
        for action in &self.strategy.actions {
            match pricer.open_leg(action.role, ctx) {
                Ok((instrument, price)) => priced.push((action.clone(), instrument, price)),
                Err(e) => {
                    warn!(
                        strategy = %self.strategy.name,
                        symbol = %self.symbol,
                        role = %action.role,
                        error = %e,
                        "could not price entry leg"
                    );
                    failure = Some(e.to_string());
                    break;
                }
            }
        }
        if let Some(reason) = failure {
            return self.skip(SkipReason::PricingFailed(reason));
        }

        let mut opened = Vec::with_capacity(priced.len());
        for (action, instrument, price) in priced {
            let cost = self.costs.fill_cost(price, action.quantity);
            opened.push(Fill {
                symbol: self.symbol.clone(),
                role: action.role,
                instrument: instrument.clone(),
                side: action.side,
                quantity: action.quantity,
                price,
                time: ctx.timestamp,
                cost,
            });
            self.open.push(OpenLeg {
                position: Position {
                    symbol: self.symbol.clone(),
                    role: action.role,
                    instrument,
                    side: action.side,
                    quantity: action.quantity,
                    entry_price: price,
                    entry_time: ctx.timestamp,
                    entry_fees: cost,
                    bars_held: 0,
                },
                last_mark: price,
            });
        }

        debug!(
            strategy = %self.strategy.name,
            symbol = %self.symbol,
            legs = opened.len(),
            time = %ctx.timestamp,
            "opened position"
        );
        self.state = EngineState::PositionOpen;
        StepOutcome {
            opened,
            ..StepOutcome::default()
        }
    }

    fn skip(&mut self, reason: SkipReason) -> StepOutcome {
        self.state = EngineState::Idle;
        StepOutcome {
            skip: Some(reason),
            ..StepOutcome::default()
        }
    }

    fn manage_open(&mut self, ctx: &MarketContext, pricer: &dyn LegPricer) -> StepOutcome {
        self.state = EngineState::PositionOpen;
        for leg in &mut self.open {
            leg.position.bars_held += 1;
            match pricer.mark(&leg.position.instrument, ctx) {
                Ok(price) => leg.last_mark = price,
                Err(e) => debug!(
                    instrument = %leg.position.instrument,
                    error = %e,
                    "mark unavailable, keeping last price"
                ),
            }
        }

        let closed = if self.strategy.multi_leg {
            self.exit_group(ctx)
        } else {
            self.exit_each(ctx)
        };

        self.state = if self.open.is_empty() {
            EngineState::Idle
        } else {
            EngineState::PositionOpen
        };
        let skip = closed.is_empty().then_some(SkipReason::PositionOpen);
        StepOutcome {
            opened: Vec::new(),
            closed,
            skip,
        }
    }

    /// Multi-leg: exits apply to the combined P&L of the whole group.
    fn exit_group(&mut self, ctx: &MarketContext) -> Vec<Trade> {
        let pnl: f64 = self.unrealized_pnl();
        let basis: f64 = self.open.iter().map(|l| l.position.cost_basis()).sum();
        let pnl_pct = if basis > 0.0 { pnl / basis } else { 0.0 };
        let bars_held = self.open.iter().map(|l| l.position.bars_held).max().unwrap_or(0);

        let reason = first_triggered_exit(&self.strategy.exits, pnl_pct, bars_held)
            .map(|exit| ExitReason::from(exit.kind));
        match reason {
            Some(reason) => self.close_all(ctx, reason),
            None => Vec::new(),
        }
    }

    fn exit_each(&mut self, ctx: &MarketContext) -> Vec<Trade> {
        let exits = &self.strategy.exits;
        let mut closing = Vec::new();
        let mut remaining = Vec::with_capacity(self.open.len());
        for leg in self.open.drain(..) {
            let pnl_pct = leg.position.pnl_pct(leg.last_mark);
            match first_triggered_exit(exits, pnl_pct, leg.position.bars_held) {
                Some(exit) => closing.push((leg, ExitReason::from(exit.kind))),
                None => remaining.push(leg),
            }
        }
        self.open = remaining;
        if !closing.is_empty() {
            self.state = EngineState::Closing;
        }
        closing
            .into_iter()
            .map(|(leg, reason)| self.realize(leg, ctx, reason))
            .collect()
    }

    fn close_all(&mut self, ctx: &MarketContext, reason: ExitReason) -> Vec<Trade> {
        self.state = EngineState::Closing;
        let legs: Vec<OpenLeg> = self.open.drain(..).collect();
        legs.into_iter()
            .map(|leg| self.realize(leg, ctx, reason))
            .collect()
    }

    fn realize(&self, leg: OpenLeg, ctx: &MarketContext, reason: ExitReason) -> Trade {
        let exit_fees = self.costs.fill_cost(leg.last_mark, leg.position.quantity);
        let trade = leg
            .position
            .close(leg.last_mark, ctx.timestamp, exit_fees, reason);
        debug!(
            strategy = %self.strategy.name,
            instrument = %trade.instrument,
            reason = %reason,
            pnl = trade.pnl,
            "closed position"
        );
        trade
    }

    /// Close everything at the current marks, e.g. at the end of a series.
    pub fn force_close(
        &mut self,
        ctx: &MarketContext,
        pricer: &dyn LegPricer,
        reason: ExitReason,
    ) -> Vec<Trade> {
        for leg in &mut self.open {
            if let Ok(price) = pricer.mark(&leg.position.instrument, ctx) {
                leg.last_mark = price;
            }
        }
        let trades = self.close_all(ctx, reason);
        self.state = EngineState::Idle;
        trades
    }
}

/// Result of a single live evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveDecision {
    pub strategy: String,
    pub symbol: String,
    pub quote: Option<InstrumentQuote>,
    pub executed: bool,
    pub fills: Vec<Fill>,
    pub skip_reason: Option<SkipReason>,
}

/// One stateless evaluation of `strategy` against `ctx`.
pub fn run_live(
    strategy: &StrategyDefinition,
    ctx: &MarketContext,
    pricer: &dyn LegPricer,
    costs: CostModel,
) -> Result<LiveDecision, QuantxError> {
    let mut engine = StrategyEngine::new(strategy.clone(), ctx.symbol.clone(), costs)?;
    let outcome = engine.step(ctx, pricer);
    Ok(LiveDecision {
        strategy: strategy.name.clone(),
        symbol: ctx.symbol.clone(),
        quote: ctx.quote(),
        executed: !outcome.opened.is_empty(),
        fills: outcome.opened,
        skip_reason: outcome.skip,
    })
}

/// Serializes evaluations per (strategy, symbol) key.
#[derive(Debug, Default)]
pub struct EvaluationLocks {
    locks: Mutex<HashMap<(String, String), Arc<Mutex<()>>>>,
}

impl EvaluationLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `f` holding the key's lock. The key's entry is dropped again once
    /// no other caller holds or waits on it.
    pub fn with_lock<R>(&self, strategy: &str, symbol: &str, f: impl FnOnce() -> R) -> R {
        let key = (strategy.to_string(), symbol.to_string());
        let key_lock = Arc::clone(self.locks.lock().entry(key.clone()).or_default());
        let result = {
            let _guard = key_lock.lock();
            f()
        };
        drop(key_lock);

        let mut locks = self.locks.lock();
        if locks.get(&key).is_some_and(|l| Arc::strong_count(l) == 1) {
            locks.remove(&key);
        }
        result
    }

    pub fn len(&self) -> usize {
        self.locks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::market_context::names;
    use crate::domain::position::Instrument;
    use crate::domain::strategy::{
        Action, Condition, Exit, ExitKind, Filter, InstrumentRole, Operator, Side, StrategyMode,
    };
    use approx::assert_relative_eq;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Prices every instrument at the context's `price`, puts at `2 * 100 - price`.
    struct SpotPricer;

    impl LegPricer for SpotPricer {
        fn open_leg(
            &self,
            role: InstrumentRole,
            ctx: &MarketContext,
        ) -> Result<(Instrument, f64), QuantxError> {
            let instrument = match role {
                InstrumentRole::Underlying => Instrument::Underlying,
                InstrumentRole::Option { option_type, .. } => Instrument::Option {
                    option_type,
                    strike: 100.0,
                    expiry: NaiveDate::from_ymd_opt(2024, 12, 31).unwrap(),
                },
            };
            let price = self.mark(&instrument, ctx)?;
            Ok((instrument, price))
        }

        fn mark(&self, instrument: &Instrument, ctx: &MarketContext) -> Result<f64, QuantxError> {
            let p = ctx.price().ok_or(QuantxError::NoData {
                symbol: ctx.symbol.clone(),
            })?;
            Ok(match instrument {
                Instrument::Option {
                    option_type: crate::domain::option_chain::OptionType::Put,
                    ..
                } => 200.0 - p,
                _ => p,
            })
        }
    }

    struct FailingPricer;

    impl LegPricer for FailingPricer {
        fn open_leg(
            &self,
            _role: InstrumentRole,
            _ctx: &MarketContext,
        ) -> Result<(Instrument, f64), QuantxError> {
            Err(QuantxError::NoConvergence {
                reason: "no vol".into(),
            })
        }

        fn mark(&self, _i: &Instrument, _ctx: &MarketContext) -> Result<f64, QuantxError> {
            Err(QuantxError::NoConvergence {
                reason: "no vol".into(),
            })
        }
    }

    fn ts(i: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap()
            + chrono::Duration::days(i64::from(i))
    }

    fn ctx(i: u32, price: f64, signal: f64) -> MarketContext {
        let mut c = MarketContext::new("NIFTY", ts(i));
        c.set(names::PRICE, price);
        c.set(names::IV_RANK, signal);
        c
    }

    fn strategy(exits: Vec<Exit>, actions: Vec<Action>, multi_leg: bool) -> StrategyDefinition {
        StrategyDefinition {
            name: "test".into(),
            mode: StrategyMode::Backtest,
            conditions: vec![Condition {
                indicator: "iv_rank".into(),
                operator: Operator::Gt,
                threshold: 50.0,
            }],
            filters: vec![],
            actions,
            exits,
            multi_leg,
        }
    }

    fn buy(role: InstrumentRole) -> Action {
        Action {
            side: Side::Buy,
            quantity: 1,
            role,
        }
    }

    fn exit(kind: ExitKind, value: f64) -> Exit {
        Exit { kind, value }
    }

    fn engine(def: StrategyDefinition) -> StrategyEngine {
        StrategyEngine::new(def, "NIFTY", CostModel::default()).unwrap()
    }

    #[test]
    fn idle_until_conditions_pass() {
        let mut e = engine(strategy(
            vec![exit(ExitKind::TakeProfit, 0.1)],
            vec![buy(InstrumentRole::Underlying)],
            false,
        ));
        let out = e.step(&ctx(0, 100.0, 10.0), &SpotPricer);
        assert_eq!(out.skip, Some(SkipReason::ConditionsNotMet));
        assert_eq!(e.state(), EngineState::Idle);

        let out = e.step(&ctx(1, 100.0, 60.0), &SpotPricer);
        assert_eq!(out.opened.len(), 1);
        assert_eq!(e.state(), EngineState::PositionOpen);
    }

    #[test]
    fn filters_block_entry() {
        let mut def = strategy(vec![], vec![buy(InstrumentRole::Underlying)], false);
        def.filters.push(Filter::MinVolume { value: 1.0 });
        let mut e = engine(def);
        let out = e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        assert_eq!(out.skip, Some(SkipReason::FiltersNotMet));
        assert!(!e.has_open_positions());
    }

    #[test]
    fn take_profit_closes_and_no_reentry_same_tick() {
        let mut e = engine(strategy(
            vec![exit(ExitKind::TakeProfit, 0.3)],
            vec![buy(InstrumentRole::Underlying)],
            false,
        ));
        e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        let out = e.step(&ctx(1, 120.0, 60.0), &SpotPricer);
        assert!(out.closed.is_empty());
        assert_eq!(out.skip, Some(SkipReason::PositionOpen));
        assert_relative_eq!(e.unrealized_pnl(), 20.0);

        let out = e.step(&ctx(2, 130.0, 60.0), &SpotPricer);
        assert_eq!(out.closed.len(), 1);
        assert!(out.opened.is_empty());
        let trade = &out.closed[0];
        assert_eq!(trade.exit_reason, ExitReason::TakeProfit);
        assert_eq!(trade.bars_held, 2);
        assert_relative_eq!(trade.pnl, 30.0);
        assert_eq!(e.state(), EngineState::Idle);

        // next tick may enter again
        let out = e.step(&ctx(3, 130.0, 60.0), &SpotPricer);
        assert_eq!(out.opened.len(), 1);
    }

    #[test]
    fn no_exit_on_entry_tick() {
        let mut e = engine(strategy(
            vec![exit(ExitKind::TimeExit, 0.0)],
            vec![buy(InstrumentRole::Underlying)],
            false,
        ));
        let out = e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        assert_eq!(out.opened.len(), 1);
        assert!(out.closed.is_empty());
        let out = e.step(&ctx(1, 100.0, 60.0), &SpotPricer);
        assert_eq!(out.closed.len(), 1);
        assert_eq!(out.closed[0].exit_reason, ExitReason::TimeExit);
    }

    #[test]
    fn first_declared_exit_wins() {
        let mut e = engine(strategy(
            vec![exit(ExitKind::TimeExit, 1.0), exit(ExitKind::StopLoss, 0.1)],
            vec![buy(InstrumentRole::Underlying)],
            false,
        ));
        e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        let out = e.step(&ctx(1, 50.0, 60.0), &SpotPricer);
        assert_eq!(out.closed[0].exit_reason, ExitReason::TimeExit);
    }

    #[test]
    fn independent_legs_exit_separately() {
        let mut e = engine(strategy(
            vec![exit(ExitKind::StopLoss, 0.15)],
            vec![buy(InstrumentRole::ATM_CALL), buy(InstrumentRole::ATM_PUT)],
            false,
        ));
        e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        // call 80 (-20%), put 120 (+20%)
        let out = e.step(&ctx(1, 80.0, 60.0), &SpotPricer);
        assert_eq!(out.closed.len(), 1);
        assert!(matches!(
            out.closed[0].instrument,
            Instrument::Option {
                option_type: crate::domain::option_chain::OptionType::Call,
                ..
            }
        ));
        assert!(e.has_open_positions());
        assert_eq!(e.state(), EngineState::PositionOpen);
    }

    #[test]
    fn multi_leg_exits_as_group() {
        let mut e = engine(strategy(
            vec![exit(ExitKind::StopLoss, 0.15), exit(ExitKind::TimeExit, 3.0)],
            vec![buy(InstrumentRole::ATM_CALL), buy(InstrumentRole::ATM_PUT)],
            true,
        ));
        e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        // legs offset: group pnl is flat
        let out = e.step(&ctx(1, 80.0, 60.0), &SpotPricer);
        assert!(out.closed.is_empty());
        e.step(&ctx(2, 80.0, 60.0), &SpotPricer);
        let out = e.step(&ctx(3, 80.0, 60.0), &SpotPricer);
        assert_eq!(out.closed.len(), 2);
        assert!(out.closed.iter().all(|t| t.exit_reason == ExitReason::TimeExit));
        assert_eq!(e.state(), EngineState::Idle);
    }

    #[test]
    fn fees_charged_per_fill() {
        let mut e = StrategyEngine::new(
            strategy(
                vec![exit(ExitKind::TimeExit, 1.0)],
                vec![buy(InstrumentRole::Underlying)],
                false,
            ),
            "NIFTY",
            CostModel::new(0.0, 5.0).unwrap(),
        )
        .unwrap();
        let out = e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        assert_relative_eq!(out.opened[0].cost, 5.0);
        let out = e.step(&ctx(1, 110.0, 60.0), &SpotPricer);
        let trade = &out.closed[0];
        assert_relative_eq!(trade.fees, 10.0);
        assert_relative_eq!(trade.pnl, 0.0);
    }

    #[test]
    fn pricing_failure_skips_atomically() {
        let mut e = engine(strategy(vec![], vec![buy(InstrumentRole::ATM_CALL)], false));
        let out = e.step(&ctx(0, 100.0, 60.0), &FailingPricer);
        assert!(matches!(out.skip, Some(SkipReason::PricingFailed(_))));
        assert!(!e.has_open_positions());
        assert_eq!(e.state(), EngineState::Idle);
    }

    #[test]
    fn mark_failure_keeps_last_price() {
        let mut e = engine(strategy(
            vec![exit(ExitKind::TakeProfit, 0.5)],
            vec![buy(InstrumentRole::Underlying)],
            false,
        ));
        e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        e.step(&ctx(1, 120.0, 60.0), &SpotPricer);
        e.step(&ctx(2, 0.0, 60.0), &FailingPricer);
        assert_relative_eq!(e.unrealized_pnl(), 20.0);
    }

    #[test]
    fn force_close_realizes_everything() {
        let mut e = engine(strategy(
            vec![],
            vec![buy(InstrumentRole::ATM_CALL), buy(InstrumentRole::ATM_PUT)],
            false,
        ));
        e.step(&ctx(0, 100.0, 60.0), &SpotPricer);
        let trades = e.force_close(&ctx(1, 105.0, 60.0), &SpotPricer, ExitReason::EndOfData);
        assert_eq!(trades.len(), 2);
        assert!(trades.iter().all(|t| t.exit_reason == ExitReason::EndOfData));
        assert!(!e.has_open_positions());
        assert_eq!(e.state(), EngineState::Idle);
    }

    #[test]
    fn invalid_strategy_rejected() {
        let def = strategy(vec![], vec![], false);
        assert!(matches!(
            StrategyEngine::new(def, "NIFTY", CostModel::default()),
            Err(QuantxError::StrategyInvalid { .. })
        ));
    }

    #[test]
    fn live_reports_executed_and_skipped() {
        let def = strategy(vec![], vec![buy(InstrumentRole::Underlying)], false);
        let yes = run_live(&def, &ctx(0, 100.0, 60.0), &SpotPricer, CostModel::default()).unwrap();
        assert!(yes.executed);
        assert_eq!(yes.fills.len(), 1);
        let quote = yes.quote.unwrap();
        assert_eq!(quote.symbol, "NIFTY");
        assert_relative_eq!(quote.spot, 100.0);
        assert!(yes.skip_reason.is_none());

        let no = run_live(&def, &ctx(0, 100.0, 10.0), &SpotPricer, CostModel::default()).unwrap();
        assert!(!no.executed);
        assert_eq!(no.skip_reason, Some(SkipReason::ConditionsNotMet));
    }

    #[test]
    fn locks_serialize_per_key() {
        let locks = Arc::new(EvaluationLocks::new());
        let in_flight = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let locks = Arc::clone(&locks);
                let in_flight = Arc::clone(&in_flight);
                let max_seen = Arc::clone(&max_seen);
                std::thread::spawn(move || {
                    locks.with_lock("s", "NIFTY", || {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_seen.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(std::time::Duration::from_millis(2));
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                    })
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
        assert!(locks.is_empty());
    }

    #[test]
    fn idle_lock_entries_are_pruned() {
        let locks = EvaluationLocks::new();
        for i in 0..100 {
            let symbol = format!("SYM{i}");
            locks.with_lock("s", &symbol, || assert_eq!(locks.len(), 1));
        }
        assert!(locks.is_empty());

        locks.with_lock("s", "NIFTY", || {
            locks.with_lock("s", "BANKNIFTY", || assert_eq!(locks.len(), 2));
            assert_eq!(locks.len(), 1);
        });
        assert!(locks.is_empty());
    }
}
