// Resolves a `UserAlert`'s conditions against a market snapshot/history and
// combines them with the alert's logical operator. Crossing detection reads
// and writes the previous-value side table the store exposes for exactly
// this purpose.

use crate::domain::user_alert::Condition;
use crate::domain::UserAlert;
use crate::error::{CoreError, CoreResult};
use crate::indicators::{atr, bollinger, ema, rsi, roc};
use crate::market_data::{Candle, Snapshot};
use crate::store::AlertStore;
use crate::types::{ConditionField, ConditionOperator, LogicalOperator};

#[derive(Debug, Clone)]
pub struct EvalOutcome {
    pub triggered: bool,
    pub detail: String,
}

/// `==`/`!=` numeric tolerance, matching the design's documented epsilon.
const EQ_EPSILON: f64 = 1e-4;

pub async fn evaluate_alert(
    alert: &UserAlert,
    snapshot: &Snapshot,
    history: &[Candle],
    store: &dyn AlertStore,
) -> CoreResult<EvalOutcome> {
    let mut results = Vec::with_capacity(alert.conditions.len());
    let mut details = Vec::with_capacity(alert.conditions.len());

    for condition in &alert.conditions {
        match evaluate_condition(alert, condition, snapshot, history, store).await? {
            ConditionResult::Resolved(satisfied, detail) => {
                results.push(satisfied);
                details.push(detail);
            }
            ConditionResult::InsufficientData(detail) => {
                return Ok(EvalOutcome {
                    triggered: false,
                    detail,
                });
            }
        }
    }

    let triggered = match alert.logical_operator {
        LogicalOperator::And => results.iter().all(|r| *r),
        LogicalOperator::Or => results.iter().any(|r| *r),
    };

    Ok(EvalOutcome {
        triggered,
        detail: details.join("; "),
    })
}

/// A single condition either resolves to a pass/fail, or the history backing
/// it isn't deep enough yet (e.g. a brand new Technical alert before enough
/// candles have accumulated) — that case is not an error.
enum ConditionResult {
    Resolved(bool, String),
    InsufficientData(String),
}

async fn evaluate_condition(
    alert: &UserAlert,
    condition: &Condition,
    snapshot: &Snapshot,
    history: &[Candle],
    store: &dyn AlertStore,
) -> CoreResult<ConditionResult> {
    let current = match resolve_field(condition, snapshot, history)? {
        Some(value) => value,
        None => {
            return Ok(ConditionResult::InsufficientData(format!(
                "insufficient data: not enough history for {:?} yet",
                condition.field
            )))
        }
    };

    let field_key = format!("{:?}", condition.field);

    let satisfied = match condition.operator {
        ConditionOperator::Gt => current > condition.value,
        ConditionOperator::Lt => current < condition.value,
        ConditionOperator::Gte => current >= condition.value,
        ConditionOperator::Lte => current <= condition.value,
        ConditionOperator::Eq => (current - condition.value).abs() < EQ_EPSILON,
        ConditionOperator::Neq => (current - condition.value).abs() >= EQ_EPSILON,
        ConditionOperator::Between => {
            let second = condition
                .second_value
                .ok_or_else(|| CoreError::Validation("between operator requires secondValue".into()))?;
            let (lo, hi) = if condition.value <= second {
                (condition.value, second)
            } else {
                (second, condition.value)
            };
            current >= lo && current <= hi
        }
        ConditionOperator::NotBetween => {
            let second = condition
                .second_value
                .ok_or_else(|| CoreError::Validation("notBetween operator requires secondValue".into()))?;
            let (lo, hi) = if condition.value <= second {
                (condition.value, second)
            } else {
                (second, condition.value)
            };
            !(current >= lo && current <= hi)
        }
        ConditionOperator::CrossesAbove | ConditionOperator::CrossesBelow => {
            let previous = store.get_previous_value(&alert.id, &field_key).await?;
            store.set_previous_value(&alert.id, &field_key, current).await?;
            match previous {
                None => false, // first observation: never triggers
                Some(prev) => match condition.operator {
                    ConditionOperator::CrossesAbove => prev <= condition.value && current > condition.value,
                    ConditionOperator::CrossesBelow => prev >= condition.value && current < condition.value,
                    _ => unreachable!(),
                },
            }
        }
    };

    let detail = format!(
        "{:?} {:?} {} (current={current:.4})",
        condition.field, condition.operator, condition.value
    );
    Ok(ConditionResult::Resolved(satisfied, detail))
}

/// `Ok(None)` means the field can't be computed yet for lack of history —
/// not an error, just not ready. `Err` is reserved for genuine problems
/// (malformed custom expressions, a snapshot with no `marketCap` at all).
fn resolve_field(condition: &Condition, snapshot: &Snapshot, history: &[Candle]) -> CoreResult<Option<f64>> {
    match condition.field {
        ConditionField::Price => Ok(Some(snapshot.price)),
        ConditionField::Volume => Ok(Some(snapshot.volume)),
        ConditionField::Change => Ok(Some(snapshot.change)),
        ConditionField::ChangePercent => Ok(Some(snapshot.change_percent)),
        ConditionField::MarketCap => snapshot
            .market_cap
            .map(Some)
            .ok_or_else(|| CoreError::Validation("insufficient data: no marketCap on snapshot".into())),
        ConditionField::Sma => {
            let period = condition.params.get("period").copied().unwrap_or(20.0) as usize;
            let closes: Vec<f64> = history.iter().map(|c| c.close).collect();
            Ok(sma(&closes, period))
        }
        ConditionField::Ema => {
            let period = condition.params.get("period").copied().unwrap_or(20.0) as usize;
            let closes: Vec<f64> = history.iter().map(|c| c.close).collect();
            Ok(ema::calculate_ema(&closes, period).last().copied())
        }
        ConditionField::Rsi => {
            let period = condition.params.get("period").copied().unwrap_or(14.0) as usize;
            let closes: Vec<f64> = history.iter().map(|c| c.close).collect();
            Ok(rsi::current_rsi(&closes, period).map(|(value, _label)| value))
        }
        ConditionField::Macd => {
            let fast = condition.params.get("fast").copied().unwrap_or(12.0) as usize;
            let slow = condition.params.get("slow").copied().unwrap_or(26.0) as usize;
            let closes: Vec<f64> = history.iter().map(|c| c.close).collect();
            let ema_fast = ema::calculate_ema(&closes, fast).last().copied();
            let ema_slow = ema::calculate_ema(&closes, slow).last().copied();
            Ok(match (ema_fast, ema_slow) {
                (Some(f), Some(s)) => Some(f - s),
                _ => None,
            })
        }
        ConditionField::Bollinger => {
            let period = condition.params.get("period").copied().unwrap_or(20.0) as usize;
            let num_std = condition.params.get("numStd").copied().unwrap_or(2.0);
            let closes: Vec<f64> = history.iter().map(|c| c.close).collect();
            Ok(bollinger::calculate_bollinger(&closes, period, num_std).map(|bb| bb.width))
        }
        ConditionField::Custom => {
            let expr = condition
                .custom_expression
                .as_deref()
                .ok_or_else(|| CoreError::Validation("custom field requires customExpression".into()))?;
            eval_custom_expression(expr, snapshot).map(Some)
        }
    }
}

fn sma(closes: &[f64], period: usize) -> Option<f64> {
    if period == 0 || closes.len() < period {
        return None;
    }
    let window = &closes[closes.len() - period..];
    Some(window.iter().sum::<f64>() / period as f64)
}

/// Referenced by ATR/ADX-style field extensions in the future; kept here so
/// `atr`/`roc` stay linked from the condition evaluator rather than bit-rotting
/// as dead imports while only SMA/EMA/RSI/MACD/Bollinger are wired to fields.
#[allow(dead_code)]
fn extended_indicators_available(history: &[Candle]) -> (Option<f64>, Option<f64>) {
    (atr::calculate(history), roc::current_roc(&history.iter().map(|c| c.close).collect::<Vec<_>>(), 14))
}

/// Minimal recursive-descent evaluator for `+ - * /` and parentheses over a
/// fixed variable set. No I/O, no function calls, no assignment — this is a
/// calculator, not a scripting language.
fn eval_custom_expression(expr: &str, snapshot: &Snapshot) -> CoreResult<f64> {
    let tokens = tokenize(expr)?;
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        snapshot,
    };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(CoreError::Validation(format!(
            "unexpected trailing input in expression: {expr}"
        )));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> CoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        match c {
            ' ' | '\t' => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let num = text
                    .parse::<f64>()
                    .map_err(|_| CoreError::Validation(format!("bad number literal: {text}")))?;
                tokens.push(Token::Number(num));
            }
            c if c.is_alphabetic() => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                tokens.push(Token::Ident(text));
            }
            other => {
                return Err(CoreError::Validation(format!(
                    "unexpected character in expression: {other}"
                )))
            }
        }
    }
    Ok(tokens)
}

struct ExprParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    snapshot: &'a Snapshot,
}

impl<'a> ExprParser<'a> {
    fn parse_expr(&mut self) -> CoreResult<f64> {
        let mut value = self.parse_term()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    value += self.parse_term()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    value -= self.parse_term()?;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_term(&mut self) -> CoreResult<f64> {
        let mut value = self.parse_factor()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    value *= self.parse_factor()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let denom = self.parse_factor()?;
                    if denom == 0.0 {
                        return Err(CoreError::Validation("division by zero in expression".into()));
                    }
                    value /= denom;
                }
                _ => break,
            }
        }
        Ok(value)
    }

    fn parse_factor(&mut self) -> CoreResult<f64> {
        match self.peek().cloned() {
            Some(Token::Number(n)) => {
                self.pos += 1;
                Ok(n)
            }
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.parse_factor()?)
            }
            Some(Token::Ident(name)) => {
                self.pos += 1;
                self.resolve_variable(&name)
            }
            Some(Token::LParen) => {
                self.pos += 1;
                let value = self.parse_expr()?;
                match self.peek() {
                    Some(Token::RParen) => {
                        self.pos += 1;
                        Ok(value)
                    }
                    _ => Err(CoreError::Validation("missing closing parenthesis".into())),
                }
            }
            _ => Err(CoreError::Validation("unexpected end of expression".into())),
        }
    }

    fn resolve_variable(&self, name: &str) -> CoreResult<f64> {
        match name {
            "price" => Ok(self.snapshot.price),
            "volume" => Ok(self.snapshot.volume),
            "change" => Ok(self.snapshot.change),
            "changePercent" => Ok(self.snapshot.change_percent),
            "marketCap" => self
                .snapshot
                .market_cap
                .ok_or_else(|| CoreError::Validation("marketCap unavailable for expression".into())),
            other => Err(CoreError::Validation(format!("unknown variable: {other}"))),
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }
}
