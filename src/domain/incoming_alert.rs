// Immutable record of one external signal delivered over the webhook.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::types::{IncomingAlertStatus, Signal, Timeframe};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingAlertData {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub strategy: String,
    pub signal: Signal,
    pub price: f64,
    pub take_profit_price: Option<f64>,
    pub stop_loss_price: Option<f64>,
    pub trade_number: Option<i64>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeAction {
    pub action: String,
    pub reason: Option<String>,
    pub trade_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Processing {
    pub matched_config_ids: Vec<String>,
    pub matched_users: Vec<String>,
    pub trade_actions: Vec<TradeAction>,
    pub errors: Vec<String>,
    pub processing_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingAlert {
    pub id: String,
    pub received_at: DateTime<Utc>,
    pub source_ip: Option<String>,
    pub fingerprint: String,
    pub data: IncomingAlertData,
    pub status: IncomingAlertStatus,
    pub processing: Processing,
}

impl IncomingAlert {
    pub fn new(
        id: String,
        received_at: DateTime<Utc>,
        source_ip: Option<String>,
        fingerprint: String,
        data: IncomingAlertData,
    ) -> Self {
        Self {
            id,
            received_at,
            source_ip,
            fingerprint,
            data,
            status: IncomingAlertStatus::Received,
            processing: Processing::default(),
        }
    }

    /// Monotonic status advancement: `received -> processing -> {processed,
    /// failed}`. `processed`/`failed` are terminal.
    pub fn advance(&mut self, next: IncomingAlertStatus) {
        use IncomingAlertStatus::*;
        let allowed = matches!(
            (self.status, next),
            (Received, Processing) | (Processing, Processed) | (Processing, Failed)
        );
        if allowed {
            self.status = next;
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            IncomingAlertStatus::Processed | IncomingAlertStatus::Failed
        )
    }
}
