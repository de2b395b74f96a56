// Per-user virtual trade derived from an `IncomingAlert`. Modeled closely on
// this engine's original position lifecycle (open -> closed), extended with
// the `replaced` terminal state the alert-config cap/replacement policy
// requires.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ExitReason, Signal, Timeframe, TradeStatus};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Pnl {
    pub amount: f64,
    pub percentage: f64,
    pub currency: &'static str,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub id: String,
    pub trade_number: i64,
    pub user_id: String,
    pub config_id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub strategy: String,
    pub signal: Signal,
    pub entry_price: f64,
    pub take_profit_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub exit_price: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub status: TradeStatus,
    pub opened_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    pub replaced_at: Option<DateTime<Utc>>,
    pub replaced_by: Option<String>,
    pub replacement_reason: Option<String>,
    pub pnl: Option<Pnl>,
}

impl Trade {
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: String,
        trade_number: i64,
        user_id: String,
        config_id: String,
        symbol: String,
        timeframe: Timeframe,
        strategy: String,
        signal: Signal,
        entry_price: f64,
        take_profit_price: Option<f64>,
        stop_loss_price: Option<f64>,
        opened_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            trade_number,
            user_id,
            config_id,
            symbol,
            timeframe,
            strategy,
            signal,
            entry_price,
            take_profit_price,
            stop_loss_price,
            exit_price: None,
            exit_reason: None,
            status: TradeStatus::Open,
            opened_at,
            closed_at: None,
            replaced_at: None,
            replaced_by: None,
            replacement_reason: None,
            pnl: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.status == TradeStatus::Open
    }

    /// Close this trade against an exit price, computing realized P&L per
    /// the BUY/SELL formulas. Rounds to 2 decimals using round-half-to-even
    /// (Rust's default `f64::round` is round-half-away-from-zero; we use
    /// explicit banker's rounding to match the documented formula exactly).
    pub fn close(&mut self, exit_price: f64, reason: ExitReason, at: DateTime<Utc>) {
        let (amount, percentage) = match self.signal {
            Signal::Buy => (
                exit_price - self.entry_price,
                (exit_price - self.entry_price) / self.entry_price * 100.0,
            ),
            Signal::Sell => (
                self.entry_price - exit_price,
                (self.entry_price - exit_price) / self.entry_price * 100.0,
            ),
            _ => (0.0, 0.0),
        };

        self.exit_price = Some(exit_price);
        self.exit_reason = Some(reason);
        self.status = TradeStatus::Closed;
        self.closed_at = Some(at);
        self.pnl = Some(Pnl {
            amount: banker_round_2(amount),
            percentage: banker_round_2(percentage),
            currency: "USD",
        });
    }

    /// Mark this trade as replaced by `new_id`. P&L stays undefined.
    pub fn replace(&mut self, new_id: String, reason: String, at: DateTime<Utc>) {
        self.status = TradeStatus::Replaced;
        self.replaced_by = Some(new_id);
        self.replacement_reason = Some(reason);
        self.replaced_at = Some(at);
        self.exit_reason = Some(ExitReason::Replaced);
    }
}

/// Round to 2 decimal places using round-half-to-even, matching the
/// documented P&L formula exactly (avoids the upward bias of naive
/// round-half-away-from-zero on repeated `.5` boundaries).
fn banker_round_2(value: f64) -> f64 {
    let scaled = value * 100.0;
    let rounded = if (scaled.fract().abs() - 0.5).abs() < 1e-9 {
        let floor = scaled.floor();
        if (floor as i64) % 2 == 0 {
            floor
        } else {
            floor + 1.0
        }
    } else {
        scaled.round()
    };
    rounded / 100.0
}
