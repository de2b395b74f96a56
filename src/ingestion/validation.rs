// Webhook payload schema + semantic validation. Deliberately separate from
// the wire `IncomingAlertData` type: this module owns the "can this string
// even become a domain value" question and reports every violation at once,
// the way a form validator would rather than failing on the first field.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::collections::HashMap;

use crate::domain::IncomingAlertData;
use crate::error::{CoreError, CoreResult};
use crate::types::{Signal, Timeframe};

#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    pub symbol: String,
    pub timeframe: String,
    pub strategy: String,
    pub signal: String,
    pub price: f64,
    #[serde(rename = "takeProfitPrice")]
    pub take_profit_price: Option<f64>,
    #[serde(rename = "stopLossPrice")]
    pub stop_loss_price: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(rename = "tradeNumber")]
    pub trade_number: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

fn is_valid_symbol(symbol: &str) -> bool {
    !symbol.is_empty()
        && symbol.len() <= 20
        && symbol
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
}

/// Validate a decoded webhook payload and, on success, produce the domain
/// value the rest of the pipeline operates on. All violations are collected
/// before returning so the caller sees the full field list at once.
pub fn validate(payload: WebhookPayload) -> CoreResult<IncomingAlertData> {
    let mut errors = Vec::new();

    if !is_valid_symbol(&payload.symbol) {
        errors.push("symbol: must match ^[A-Z0-9._-]{1,20}$".to_string());
    }

    let timeframe = serde_json::from_value::<Timeframe>(serde_json::Value::String(payload.timeframe.clone()))
        .map_err(|_| ())
        .ok();
    if timeframe.is_none() {
        errors.push(format!("timeframe: unrecognized value '{}'", payload.timeframe));
    }

    if payload.strategy.is_empty() || payload.strategy.len() > 100 {
        errors.push("strategy: must be 1..100 characters".to_string());
    }

    let signal = Signal::parse_loose(&payload.signal);
    if signal.is_none() {
        errors.push(format!("signal: unrecognized value '{}'", payload.signal));
    }

    if !(payload.price > 0.0) {
        errors.push("price: must be > 0".to_string());
    }

    if let Some(tp) = payload.take_profit_price {
        if !(tp > 0.0) {
            errors.push("takeProfitPrice: must be > 0".to_string());
        }
    }
    if let Some(sl) = payload.stop_loss_price {
        if !(sl > 0.0) {
            errors.push("stopLossPrice: must be > 0".to_string());
        }
    }

    if let Some(sig) = signal {
        match sig {
            Signal::Buy => {
                if let Some(tp) = payload.take_profit_price {
                    if tp <= payload.price {
                        errors.push("takeProfitPrice: must exceed price for BUY".to_string());
                    }
                }
                if let Some(sl) = payload.stop_loss_price {
                    if sl >= payload.price {
                        errors.push("stopLossPrice: must be below price for BUY".to_string());
                    }
                }
            }
            Signal::Sell => {
                if let Some(tp) = payload.take_profit_price {
                    if tp >= payload.price {
                        errors.push("takeProfitPrice: must be below price for SELL".to_string());
                    }
                }
                if let Some(sl) = payload.stop_loss_price {
                    if sl <= payload.price {
                        errors.push("stopLossPrice: must exceed price for SELL".to_string());
                    }
                }
            }
            Signal::TpHit | Signal::SlHit => {}
        }
    }

    if let Some(tn) = payload.trade_number {
        if tn < 1 {
            errors.push("tradeNumber: must be >= 1".to_string());
        }
    }

    if !errors.is_empty() {
        return Err(CoreError::Validation(errors.join("; ")));
    }

    Ok(IncomingAlertData {
        symbol: payload.symbol,
        timeframe: timeframe.expect("checked above"),
        strategy: payload.strategy,
        signal: signal.expect("checked above"),
        price: payload.price,
        take_profit_price: payload.take_profit_price,
        stop_loss_price: payload.stop_loss_price,
        trade_number: payload.trade_number,
        metadata: payload.metadata,
    })
}
