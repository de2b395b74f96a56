// Admin-defined matching template that decides which incoming webhook
// signals are relevant and how they translate into trades for subscribed
// users.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};
use crate::types::{ConfigStatus, Signal, Timeframe};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeMgmt {
    pub max_open_trades: u32,
    pub allow_opposite_signals: bool,
    pub replace_on_same_signal: bool,
    pub auto_close_on_tp_sl: bool,
}

impl Default for TradeMgmt {
    fn default() -> Self {
        Self {
            max_open_trades: 1,
            allow_opposite_signals: false,
            replace_on_same_signal: true,
            auto_close_on_tp_sl: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Validation {
    pub required_fields: Vec<String>,
    /// Percentage tolerance allowed between the alert's price and the
    /// provider's last known price, if cross-checked. `None` disables the
    /// check.
    pub price_tolerance_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TimeWindow {
    /// Minutes since midnight, inclusive, in `timezone`.
    pub start_minute: u16,
    pub end_minute: u16,
    pub timezone: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Filters {
    pub price_min: Option<f64>,
    pub price_max: Option<f64>,
    pub time_window: Option<TimeWindow>,
    pub min_volume: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Stats {
    pub total: u64,
    pub success: u64,
    pub failed: u64,
    pub last_alert_at: Option<DateTime<Utc>>,
    pub avg_processing_ms: f64,
}

impl Stats {
    pub fn record(&mut self, succeeded: bool, processing_ms: f64, at: DateTime<Utc>) {
        let prior_total = self.total as f64;
        self.total += 1;
        if succeeded {
            self.success += 1;
        } else {
            self.failed += 1;
        }
        self.avg_processing_ms =
            (self.avg_processing_ms * prior_total + processing_ms) / self.total as f64;
        self.last_alert_at = Some(at);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertConfiguration {
    pub id: String,
    pub symbol: String,
    pub timeframe: Timeframe,
    pub strategy: String,
    pub status: ConfigStatus,
    pub trade_mgmt: TradeMgmt,
    pub allowed_entry_signals: Vec<Signal>,
    pub allowed_exit_signals: Vec<Signal>,
    pub validation: Validation,
    pub filters: Filters,
    pub plan_ids: Vec<String>,
    #[serde(default)]
    pub stats: Stats,
}

impl AlertConfiguration {
    /// Validates the invariant that at least one entry or exit signal is
    /// allowed; an unreachable configuration is a validation error, not a
    /// silently-accepted no-op.
    pub fn validate(&self) -> CoreResult<()> {
        if self.allowed_entry_signals.is_empty() && self.allowed_exit_signals.is_empty() {
            return Err(CoreError::Validation(
                "alert configuration must allow at least one entry or exit signal".to_string(),
            ));
        }
        if self.trade_mgmt.max_open_trades == 0 || self.trade_mgmt.max_open_trades > 5 {
            return Err(CoreError::Validation(
                "maxOpenTrades must be between 1 and 5".to_string(),
            ));
        }
        Ok(())
    }

    pub fn permits_signal(&self, signal: Signal) -> bool {
        if signal.is_entry() {
            self.allowed_entry_signals.contains(&signal)
        } else {
            self.allowed_exit_signals.contains(&signal)
        }
    }

    pub fn normalized_symbol(symbol: &str) -> String {
        symbol.trim().to_ascii_uppercase()
    }
}
