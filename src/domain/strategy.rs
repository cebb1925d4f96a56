//! Strategy definitions: conditions, filters, actions and exits.

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use super::consensus::Bias;
use super::error::QuantxError;
use super::option_chain::OptionType;

/// Tolerance for `==` / `!=` on indicator values.
pub const EQUALITY_EPSILON: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StrategyMode {
    Live,
    Backtest,
}

impl fmt::Display for StrategyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StrategyMode::Live => write!(f, "LIVE"),
            StrategyMode::Backtest => write!(f, "BACKTEST"),
        }
    }
}

impl FromStr for StrategyMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LIVE" => Ok(StrategyMode::Live),
            "BACKTEST" => Ok(StrategyMode::Backtest),
            other => Err(format!("unknown strategy mode '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
}

impl Operator {
    pub fn apply(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Operator::Gt => lhs > rhs,
            Operator::Lt => lhs < rhs,
            Operator::Ge => lhs >= rhs,
            Operator::Le => lhs <= rhs,
            Operator::Eq => (lhs - rhs).abs() <= EQUALITY_EPSILON,
            Operator::Ne => (lhs - rhs).abs() > EQUALITY_EPSILON,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub indicator: String,
    pub operator: Operator,
    pub threshold: f64,
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.indicator, self.operator.symbol(), self.threshold)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Filter {
    /// Underlying volume on the current bar, in live and historical runs alike.
    MinVolume { value: f64 },
    /// Inclusive trading window; a window whose start is after its end wraps
    /// past midnight.
    Session { start: NaiveTime, end: NaiveTime },
    MinConfidence { value: f64 },
    Bias { bias: Bias },
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Filter::MinVolume { value } => write!(f, "min_volume({value})"),
            Filter::Session { start, end } => {
                write!(f, "session({}-{})", start.format("%H:%M"), end.format("%H:%M"))
            }
            Filter::MinConfidence { value } => write!(f, "min_confidence({value})"),
            Filter::Bias { bias } => write!(f, "bias({bias})"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// +1 for long exposure, -1 for short.
    pub fn sign(self) -> f64 {
        match self {
            Side::Buy => 1.0,
            Side::Sell => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// What an action trades, relative to the underlying and the ATM strike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstrumentRole {
    Underlying,
    /// An option `offset` strikes away from ATM (positive is higher).
    Option { option_type: OptionType, offset: i32 },
}

impl InstrumentRole {
    pub const ATM_CALL: InstrumentRole = InstrumentRole::Option {
        option_type: OptionType::Call,
        offset: 0,
    };
    pub const ATM_PUT: InstrumentRole = InstrumentRole::Option {
        option_type: OptionType::Put,
        offset: 0,
    };
}

impl fmt::Display for InstrumentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstrumentRole::Underlying => write!(f, "UNDERLYING"),
            InstrumentRole::Option {
                option_type,
                offset: 0,
            } => write!(f, "ATM_{option_type}"),
            InstrumentRole::Option {
                option_type,
                offset,
            } => write!(f, "{option_type}{offset:+}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub side: Side,
    pub quantity: u32,
    pub role: InstrumentRole,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.side, self.quantity, self.role)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitKind {
    /// Unrealized P&L fraction at or above the value.
    TakeProfit,
    /// Unrealized P&L fraction at or below minus the value.
    StopLoss,
    /// Bars held at or above the value.
    TimeExit,
}

impl fmt::Display for ExitKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitKind::TakeProfit => write!(f, "take_profit"),
            ExitKind::StopLoss => write!(f, "stop_loss"),
            ExitKind::TimeExit => write!(f, "time_exit"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Exit {
    pub kind: ExitKind,
    pub value: f64,
}

impl fmt::Display for Exit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.value)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyDefinition {
    pub name: String,
    pub mode: StrategyMode,
    pub conditions: Vec<Condition>,
    pub filters: Vec<Filter>,
    pub actions: Vec<Action>,
    pub exits: Vec<Exit>,
    pub multi_leg: bool,
}

impl StrategyDefinition {
    pub fn validate(&self) -> Result<(), QuantxError> {
        let invalid = |reason: &str| QuantxError::StrategyInvalid {
            name: self.name.clone(),
            reason: reason.to_string(),
        };

        if self.name.trim().is_empty() {
            return Err(invalid("name must not be empty"));
        }
        if self.conditions.is_empty() {
            return Err(invalid("at least one condition is required"));
        }
        if self.actions.is_empty() {
            return Err(invalid("at least one action is required"));
        }
        if self.conditions.iter().any(|c| !c.threshold.is_finite()) {
            return Err(invalid("condition thresholds must be finite"));
        }
        if self.actions.iter().any(|a| a.quantity == 0) {
            return Err(invalid("action quantities must be positive"));
        }
        if self
            .exits
            .iter()
            .any(|e| !(e.value.is_finite() && e.value >= 0.0))
        {
            return Err(invalid("exit values must be non-negative"));
        }
        let mut roles = HashSet::new();
        if !self.actions.iter().all(|a| roles.insert(a.role)) {
            return Err(invalid("each instrument may appear in only one action"));
        }
        let bad_filter = self.filters.iter().any(|f| match f {
            Filter::MinVolume { value } | Filter::MinConfidence { value } => !value.is_finite(),
            _ => false,
        });
        if bad_filter {
            return Err(invalid("filter values must be finite"));
        }
        Ok(())
    }
}

/// Strategies shipped with the tool.
pub fn default_strategies() -> Vec<StrategyDefinition> {
    vec![
        StrategyDefinition {
            name: "Mean Reversion Call".into(),
            mode: StrategyMode::Backtest,
            conditions: vec![Condition {
                indicator: "pcr_oi".into(),
                operator: Operator::Lt,
                threshold: 0.7,
            }],
            filters: vec![],
            actions: vec![Action {
                side: Side::Buy,
                quantity: 1,
                role: InstrumentRole::ATM_CALL,
            }],
            exits: vec![
                Exit {
                    kind: ExitKind::TakeProfit,
                    value: 0.3,
                },
                Exit {
                    kind: ExitKind::StopLoss,
                    value: 0.15,
                },
            ],
            multi_leg: false,
        },
        StrategyDefinition {
            name: "Momentum Put".into(),
            mode: StrategyMode::Backtest,
            conditions: vec![Condition {
                indicator: "pcr_oi".into(),
                operator: Operator::Gt,
                threshold: 1.2,
            }],
            filters: vec![],
            actions: vec![Action {
                side: Side::Buy,
                quantity: 1,
                role: InstrumentRole::ATM_PUT,
            }],
            exits: vec![
                Exit {
                    kind: ExitKind::TakeProfit,
                    value: 0.25,
                },
                Exit {
                    kind: ExitKind::StopLoss,
                    value: 0.2,
                },
            ],
            multi_leg: false,
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_strategy() -> StrategyDefinition {
        StrategyDefinition {
            name: "IV Crush Straddle".into(),
            mode: StrategyMode::Backtest,
            conditions: vec![Condition {
                indicator: "iv_rank".into(),
                operator: Operator::Gt,
                threshold: 70.0,
            }],
            filters: vec![Filter::MinVolume { value: 1000.0 }],
            actions: vec![
                Action {
                    side: Side::Sell,
                    quantity: 1,
                    role: InstrumentRole::ATM_CALL,
                },
                Action {
                    side: Side::Sell,
                    quantity: 1,
                    role: InstrumentRole::ATM_PUT,
                },
            ],
            exits: vec![Exit {
                kind: ExitKind::TimeExit,
                value: 5.0,
            }],
            multi_leg: true,
        }
    }

    #[test]
    fn operators() {
        assert!(Operator::Gt.apply(2.0, 1.0));
        assert!(!Operator::Gt.apply(1.0, 1.0));
        assert!(Operator::Ge.apply(1.0, 1.0));
        assert!(Operator::Lt.apply(0.5, 1.0));
        assert!(Operator::Le.apply(1.0, 1.0));
        assert!(Operator::Eq.apply(0.1 + 0.2, 0.3));
        assert!(Operator::Ne.apply(0.3, 0.31));
        assert!(!Operator::Ne.apply(0.1 + 0.2, 0.3));
    }

    #[test]
    fn valid_strategy_passes() {
        assert!(sample_strategy().validate().is_ok());
    }

    #[test]
    fn defaults_are_valid() {
        let defaults = default_strategies();
        assert_eq!(defaults.len(), 2);
        for s in &defaults {
            assert!(s.validate().is_ok(), "{} should validate", s.name);
        }
    }

    #[test]
    fn duplicate_roles_rejected() {
        let mut s = sample_strategy();
        s.actions[1].role = InstrumentRole::ATM_CALL;
        assert!(matches!(s.validate(), Err(QuantxError::StrategyInvalid { .. })));
    }

    #[test]
    fn zero_quantity_rejected() {
        let mut s = sample_strategy();
        s.actions[0].quantity = 0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn negative_exit_rejected() {
        let mut s = sample_strategy();
        s.exits[0].value = -1.0;
        assert!(s.validate().is_err());
    }

    #[test]
    fn empty_conditions_rejected() {
        let mut s = sample_strategy();
        s.conditions.clear();
        assert!(s.validate().is_err());
    }

    #[test]
    fn role_display() {
        assert_eq!(InstrumentRole::ATM_CALL.to_string(), "ATM_CALL");
        assert_eq!(InstrumentRole::Underlying.to_string(), "UNDERLYING");
        let otm = InstrumentRole::Option {
            option_type: OptionType::Put,
            offset: -2,
        };
        assert_eq!(otm.to_string(), "PUT-2");
        let itm = InstrumentRole::Option {
            option_type: OptionType::Call,
            offset: 1,
        };
        assert_eq!(itm.to_string(), "CALL+1");
    }

    #[test]
    fn filter_display() {
        let f = Filter::Session {
            start: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
            end: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
        };
        assert_eq!(f.to_string(), "session(09:15-15:30)");
        assert_eq!(
            Filter::Bias { bias: Bias::Bullish }.to_string(),
            "bias(BULLISH)"
        );
    }
}
