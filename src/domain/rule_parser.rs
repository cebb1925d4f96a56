//! Text form of strategy rules.
//!
//! Recursive descent parser for the four rule kinds a strategy file carries.
//! Every list is `;`-separated and errors report the character offset into
//! the whole input, so `ParseError::display_with_context` can point at it.
//!
//! ```text
//! conditions = iv_rank > 50; pcr_oi <= 0.8
//! filters    = min_volume(1000); session(09:15-15:30); min_confidence(60); bias(BULLISH)
//! actions    = SELL 1 ATM_CALL; SELL 1 ATM_PUT; BUY 1 CALL+2; BUY 100 UNDERLYING
//! exits      = take_profit 0.3; stop_loss 0.15; time_exit 10
//! ```

use chrono::NaiveTime;

use crate::domain::consensus::Bias;
use crate::domain::error::ParseError;
use crate::domain::option_chain::OptionType;
use crate::domain::strategy::{
    Action, Condition, Exit, ExitKind, Filter, InstrumentRole, Operator, Side,
};

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn remaining(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.remaining().chars().next()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += ch.len_utf8();
        Some(ch)
    }

    fn skip_whitespace(&mut self) {
        while let Some(ch) = self.peek() {
            if ch.is_whitespace() {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: self.pos,
        }
    }

    fn expect_char(&mut self, expected: char) -> Result<(), ParseError> {
        self.skip_whitespace();
        match self.peek() {
            Some(ch) if ch == expected => {
                self.advance();
                Ok(())
            }
            Some(ch) => Err(self.error(format!("expected '{}', found '{}'", expected, ch))),
            None => Err(self.error(format!("expected '{}', found end of input", expected))),
        }
    }

    fn peek_word(&self) -> String {
        let word: String = self
            .remaining()
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect();
        if word.is_empty() {
            self.peek()
                .map(|c| c.to_string())
                .unwrap_or_else(|| "end of input".to_string())
        } else {
            word
        }
    }

    /// Consume an identifier (`[A-Za-z0-9_]+`) or fail with `what`.
    fn parse_word(&mut self, what: &str) -> Result<&'a str, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if ch.is_alphanumeric() || ch == '_' {
                self.advance();
            } else {
                break;
            }
        }
        if self.pos == start {
            return Err(self.error(format!("expected {}, found '{}'", what, self.peek_word())));
        }
        Ok(&self.input[start..self.pos])
    }

    fn parse_number(&mut self) -> Result<f64, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let mut has_dot = false;
        let mut digits = 0;

        if self.peek() == Some('-') {
            self.advance();
        }

        while let Some(ch) = self.peek() {
            if ch.is_ascii_digit() {
                digits += 1;
                self.advance();
            } else if ch == '.' && !has_dot {
                has_dot = true;
                self.advance();
            } else {
                break;
            }
        }

        if digits == 0 {
            return Err(ParseError {
                message: "expected number".to_string(),
                position: start,
            });
        }

        let num_str = &self.input[start..self.pos];
        num_str.parse::<f64>().map_err(|_| ParseError {
            message: format!("invalid number: {}", num_str),
            position: start,
        })
    }

    fn parse_integer(&mut self) -> Result<u32, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        while self.peek().is_some_and(|ch| ch.is_ascii_digit()) {
            self.advance();
        }
        if self.pos == start {
            return Err(ParseError {
                message: "expected integer".to_string(),
                position: start,
            });
        }
        let num_str = &self.input[start..self.pos];
        num_str.parse::<u32>().map_err(|_| ParseError {
            message: format!("invalid integer: {}", num_str),
            position: start,
        })
    }

    fn parse_operator(&mut self) -> Result<Operator, ParseError> {
        self.skip_whitespace();
        for (text, op) in [
            (">=", Operator::Ge),
            ("<=", Operator::Le),
            ("==", Operator::Eq),
            ("!=", Operator::Ne),
            (">", Operator::Gt),
            ("<", Operator::Lt),
        ] {
            if self.remaining().starts_with(text) {
                self.pos += text.len();
                return Ok(op);
            }
        }
        Err(self.error(format!(
            "expected operator (> < >= <= == !=), found '{}'",
            self.peek_word()
        )))
    }

    fn parse_condition(&mut self) -> Result<Condition, ParseError> {
        let indicator = self.parse_word("indicator name")?.to_string();
        let operator = self.parse_operator()?;
        let threshold = self.parse_number()?;
        Ok(Condition {
            indicator,
            operator,
            threshold,
        })
    }

    fn parse_time(&mut self) -> Result<NaiveTime, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let hours = self.parse_integer()?;
        self.expect_char(':')?;
        let minutes = self.parse_integer()?;
        NaiveTime::from_hms_opt(hours, minutes, 0).ok_or(ParseError {
            message: format!("invalid time: {}", &self.input[start..self.pos]),
            position: start,
        })
    }

    fn parse_filter(&mut self) -> Result<Filter, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let kind = self.parse_word("filter")?;
        self.expect_char('(')?;
        let filter = match kind {
            "min_volume" => Filter::MinVolume {
                value: self.parse_number()?,
            },
            "min_confidence" => Filter::MinConfidence {
                value: self.parse_number()?,
            },
            "session" => {
                let begin = self.parse_time()?;
                self.expect_char('-')?;
                let end = self.parse_time()?;
                Filter::Session { start: begin, end }
            }
            "bias" => {
                self.skip_whitespace();
                let at = self.pos;
                let word = self.parse_word("bias")?;
                let bias = word.parse::<Bias>().map_err(|message| ParseError {
                    message,
                    position: at,
                })?;
                Filter::Bias { bias }
            }
            other => {
                return Err(ParseError {
                    message: format!(
                        "expected filter (min_volume, session, min_confidence, bias), found '{}'",
                        other
                    ),
                    position: start,
                });
            }
        };
        self.expect_char(')')?;
        Ok(filter)
    }

    fn parse_side(&mut self) -> Result<Side, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        match self.parse_word("side")? {
            "BUY" => Ok(Side::Buy),
            "SELL" => Ok(Side::Sell),
            other => Err(ParseError {
                message: format!("expected side (BUY, SELL), found '{}'", other),
                position: start,
            }),
        }
    }

    fn parse_offset(&mut self) -> Result<i32, ParseError> {
        let sign = match self.peek() {
            Some('+') => 1,
            Some('-') => -1,
            _ => return Err(self.error("expected '+' or '-' strike offset")),
        };
        self.advance();
        let start = self.pos;
        let steps = self.parse_integer()?;
        let steps = i32::try_from(steps).map_err(|_| ParseError {
            message: format!("strike offset too large: {}", steps),
            position: start,
        })?;
        Ok(sign * steps)
    }

    fn parse_role(&mut self) -> Result<InstrumentRole, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let role = match self.parse_word("instrument")? {
            "UNDERLYING" => InstrumentRole::Underlying,
            "ATM_CALL" => InstrumentRole::ATM_CALL,
            "ATM_PUT" => InstrumentRole::ATM_PUT,
            "CALL" => InstrumentRole::Option {
                option_type: OptionType::Call,
                offset: self.parse_offset()?,
            },
            "PUT" => InstrumentRole::Option {
                option_type: OptionType::Put,
                offset: self.parse_offset()?,
            },
            other => {
                return Err(ParseError {
                    message: format!(
                        "expected instrument (UNDERLYING, ATM_CALL, ATM_PUT, CALL±n, PUT±n), found '{}'",
                        other
                    ),
                    position: start,
                });
            }
        };
        Ok(role)
    }

    fn parse_action(&mut self) -> Result<Action, ParseError> {
        let side = self.parse_side()?;
        let quantity = self.parse_integer()?;
        let role = self.parse_role()?;
        Ok(Action {
            side,
            quantity,
            role,
        })
    }

    fn parse_exit(&mut self) -> Result<Exit, ParseError> {
        self.skip_whitespace();
        let start = self.pos;
        let kind = match self.parse_word("exit")? {
            "take_profit" => ExitKind::TakeProfit,
            "stop_loss" => ExitKind::StopLoss,
            "time_exit" => ExitKind::TimeExit,
            other => {
                return Err(ParseError {
                    message: format!(
                        "expected exit (take_profit, stop_loss, time_exit), found '{}'",
                        other
                    ),
                    position: start,
                });
            }
        };
        let value = self.parse_number()?;
        Ok(Exit { kind, value })
    }

    fn finish(&mut self) -> Result<(), ParseError> {
        self.skip_whitespace();
        if self.pos < self.input.len() {
            return Err(self.error(format!(
                "unexpected input after rule: '{}'",
                self.remaining()
            )));
        }
        Ok(())
    }

    fn parse_one<T>(
        &mut self,
        item: fn(&mut Parser<'a>) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let value = item(self)?;
        self.finish()?;
        Ok(value)
    }

    /// `item (';' item)*`, or nothing for blank input.
    fn parse_list<T>(
        &mut self,
        item: fn(&mut Parser<'a>) -> Result<T, ParseError>,
    ) -> Result<Vec<T>, ParseError> {
        let mut items = Vec::new();
        self.skip_whitespace();
        if self.peek().is_none() {
            return Ok(items);
        }
        loop {
            items.push(item(self)?);
            self.skip_whitespace();
            match self.peek() {
                None => break,
                Some(';') => {
                    self.advance();
                    self.skip_whitespace();
                    // tolerate a trailing separator
                    if self.peek().is_none() {
                        break;
                    }
                }
                Some(ch) => {
                    return Err(self.error(format!("expected ';', found '{}'", ch)));
                }
            }
        }
        Ok(items)
    }
}

pub fn parse_condition(input: &str) -> Result<Condition, ParseError> {
    Parser::new(input).parse_one(Parser::parse_condition)
}

pub fn parse_filter(input: &str) -> Result<Filter, ParseError> {
    Parser::new(input).parse_one(Parser::parse_filter)
}

pub fn parse_action(input: &str) -> Result<Action, ParseError> {
    Parser::new(input).parse_one(Parser::parse_action)
}

pub fn parse_exit(input: &str) -> Result<Exit, ParseError> {
    Parser::new(input).parse_one(Parser::parse_exit)
}

pub fn parse_conditions(input: &str) -> Result<Vec<Condition>, ParseError> {
    Parser::new(input).parse_list(Parser::parse_condition)
}

pub fn parse_filters(input: &str) -> Result<Vec<Filter>, ParseError> {
    Parser::new(input).parse_list(Parser::parse_filter)
}

pub fn parse_actions(input: &str) -> Result<Vec<Action>, ParseError> {
    Parser::new(input).parse_list(Parser::parse_action)
}

pub fn parse_exits(input: &str) -> Result<Vec<Exit>, ParseError> {
    Parser::new(input).parse_list(Parser::parse_exit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_simple_condition() {
        let c = parse_condition("iv_rank > 50").unwrap();
        assert_eq!(c.indicator, "iv_rank");
        assert_eq!(c.operator, Operator::Gt);
        assert!((c.threshold - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_all_operators() {
        for (input, expected) in [
            ("x > 1", Operator::Gt),
            ("x < 1", Operator::Lt),
            ("x >= 1", Operator::Ge),
            ("x <= 1", Operator::Le),
            ("x == 1", Operator::Eq),
            ("x != 1", Operator::Ne),
        ] {
            assert_eq!(parse_condition(input).unwrap().operator, expected, "{input}");
        }
    }

    #[test]
    fn parse_condition_without_spaces() {
        let c = parse_condition("pcr_oi<=0.8").unwrap();
        assert_eq!(c.operator, Operator::Le);
        assert!((c.threshold - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_negative_threshold() {
        let c = parse_condition("trend == -1").unwrap();
        assert!((c.threshold + 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parse_condition_list() {
        let list = parse_conditions("iv_rank > 50; pcr_oi < 0.7;").unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[1].indicator, "pcr_oi");
    }

    #[test]
    fn blank_list_is_empty() {
        assert!(parse_filters("   ").unwrap().is_empty());
    }

    #[test]
    fn parse_filters_of_every_kind() {
        let list =
            parse_filters("min_volume(1000); session(09:15-15:30); min_confidence(60); bias(BULLISH)")
                .unwrap();
        assert_eq!(list.len(), 4);
        assert_eq!(list[0], Filter::MinVolume { value: 1000.0 });
        assert_eq!(
            list[1],
            Filter::Session {
                start: NaiveTime::from_hms_opt(9, 15, 0).unwrap(),
                end: NaiveTime::from_hms_opt(15, 30, 0).unwrap(),
            }
        );
        assert_eq!(list[2], Filter::MinConfidence { value: 60.0 });
        assert_eq!(list[3], Filter::Bias { bias: Bias::Bullish });
    }

    #[test]
    fn parse_actions_with_roles() {
        let list = parse_actions("SELL 1 ATM_CALL; BUY 2 PUT-1; BUY 100 UNDERLYING").unwrap();
        assert_eq!(list[0].side, Side::Sell);
        assert_eq!(list[0].role, InstrumentRole::ATM_CALL);
        assert_eq!(list[1].quantity, 2);
        assert_eq!(
            list[1].role,
            InstrumentRole::Option {
                option_type: OptionType::Put,
                offset: -1
            }
        );
        assert_eq!(list[2].role, InstrumentRole::Underlying);
    }

    #[test]
    fn parse_exits_in_order() {
        let list = parse_exits("take_profit 0.3; stop_loss 0.15; time_exit 10").unwrap();
        let kinds: Vec<ExitKind> = list.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![ExitKind::TakeProfit, ExitKind::StopLoss, ExitKind::TimeExit]
        );
    }

    #[test]
    fn display_round_trips_through_parser() {
        for s in crate::domain::strategy::default_strategies() {
            for c in &s.conditions {
                assert_eq!(&parse_condition(&c.to_string()).unwrap(), c);
            }
            for a in &s.actions {
                assert_eq!(&parse_action(&a.to_string()).unwrap(), a);
            }
            for e in &s.exits {
                assert_eq!(&parse_exit(&e.to_string()).unwrap(), e);
            }
        }
    }

    #[test]
    fn error_missing_operator() {
        let err = parse_condition("iv_rank 50").unwrap_err();
        assert!(err.message.contains("expected operator"));
        assert_eq!(err.position, 8);
    }

    #[test]
    fn error_unknown_filter() {
        let err = parse_filter("max_volume(10)").unwrap_err();
        assert!(err.message.contains("expected filter"));
        assert_eq!(err.position, 0);
    }

    #[test]
    fn error_bad_session_time() {
        let err = parse_filter("session(25:00-15:30)").unwrap_err();
        assert!(err.message.contains("invalid time"));
    }

    #[test]
    fn error_unknown_bias() {
        assert!(parse_filter("bias(SIDEWAYS)").is_err());
    }

    #[test]
    fn error_missing_offset() {
        let err = parse_action("BUY 1 CALL").unwrap_err();
        assert!(err.message.contains("strike offset"));
    }

    #[test]
    fn error_lowercase_side() {
        let err = parse_action("buy 1 ATM_CALL").unwrap_err();
        assert!(err.message.contains("expected side"));
    }

    #[test]
    fn error_unknown_exit() {
        let err = parse_exit("trailing_stop 0.1").unwrap_err();
        assert!(err.message.contains("expected exit"));
    }

    #[test]
    fn error_trailing_input() {
        let err = parse_exit("take_profit 0.3 now").unwrap_err();
        assert!(err.message.contains("unexpected input"));
    }

    #[test]
    fn error_missing_separator_reports_offset() {
        let input = "iv_rank > 50 pcr_oi < 0.7";
        let err = parse_conditions(input).unwrap_err();
        assert!(err.message.contains("expected ';'"));
        assert_eq!(err.position, 13);
        let ctx = err.display_with_context(input);
        assert!(ctx.contains('^'));
    }
}
