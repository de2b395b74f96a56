// User-owned monitoring rule evaluated periodically by the scheduler.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{ConditionField, ConditionOperator, Frequency, LogicalOperator, UserAlertType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Condition {
    pub field: ConditionField,
    pub operator: ConditionOperator,
    pub value: f64,
    pub second_value: Option<f64>,
    /// Extra parameters for technical fields, e.g. `{"period": 14}` for RSI.
    #[serde(default)]
    pub params: std::collections::HashMap<String, f64>,
    /// Arithmetic expression over `price`/`volume`/`change`/`changePercent`/
    /// `marketCap`, used only when `field == Custom`.
    #[serde(default)]
    pub custom_expression: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub at: DateTime<Utc>,
    pub triggered: bool,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Performance {
    pub total_evaluations: u64,
    pub total_triggers: u64,
    /// Fraction of triggers later judged accurate by an external confirming
    /// signal; left `None` until the engine has enough samples.
    pub accuracy: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAlert {
    pub id: String,
    pub user_id: String,
    pub symbol: String,
    pub venue: String,
    pub interval: String,
    pub alert_type: UserAlertType,
    pub conditions: Vec<Condition>,
    pub logical_operator: LogicalOperator,
    pub priority: i32,
    pub frequency: Frequency,
    pub max_triggers: u32,
    pub trigger_count: u32,
    pub cooldown_ms: i64,
    pub last_triggered: Option<DateTime<Utc>>,
    pub last_checked: Option<DateTime<Utc>>,
    pub next_check: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub is_active: bool,
    pub is_paused: bool,
    pub notification_channels: Vec<String>,
    #[serde(default)]
    pub execution_history: Vec<ExecutionRecord>,
    #[serde(default)]
    pub performance: Performance,
    /// Consecutive evaluation failures, used to back off `next_check`.
    #[serde(default)]
    pub failed_checks: u32,
}

pub const MAX_EXECUTION_HISTORY: usize = 100;
pub const MIN_COOLDOWN_MS: i64 = 60_000;
pub const MAX_COOLDOWN_MS: i64 = 86_400_000;

impl UserAlert {
    /// Whether this alert can currently fire, per the cooldown/expiry/active
    /// invariants.
    pub fn can_trigger(&self, now: DateTime<Utc>) -> bool {
        if !self.is_active || self.is_paused {
            return false;
        }
        if let Some(expires) = self.expires_at {
            if expires <= now {
                return false;
            }
        }
        if let Some(last) = self.last_triggered {
            let elapsed = (now - last).num_milliseconds();
            if elapsed < self.cooldown_ms {
                return false;
            }
        }
        if self.frequency == Frequency::Once && self.trigger_count >= self.max_triggers {
            return false;
        }
        true
    }

    pub fn record_trigger(&mut self, at: DateTime<Utc>, detail: String) {
        self.trigger_count += 1;
        self.last_triggered = Some(at);
        self.push_history(ExecutionRecord {
            at,
            triggered: true,
            detail,
        });
        self.performance.total_triggers += 1;
        if self.frequency == Frequency::Once {
            self.is_active = false;
        }
    }

    pub fn record_evaluation(&mut self, at: DateTime<Utc>, triggered: bool, detail: String) {
        self.last_checked = Some(at);
        self.performance.total_evaluations += 1;
        if !triggered {
            self.push_history(ExecutionRecord {
                at,
                triggered: false,
                detail,
            });
        }
    }

    fn push_history(&mut self, record: ExecutionRecord) {
        self.execution_history.push(record);
        while self.execution_history.len() > MAX_EXECUTION_HISTORY {
            self.execution_history.remove(0);
        }
    }
}
