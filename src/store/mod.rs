pub mod memory;

pub use memory::InMemoryAlertStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

use crate::domain::{AlertConfiguration, IncomingAlert, Trade, UserAlert};
use crate::error::CoreResult;

/// Durable-state contract. Not a schema — a set of operations the rest of
/// the engine needs, each individually linearizable; no cross-entity
/// transactions are required (§4.7 of the design).
#[async_trait]
pub trait AlertStore: Send + Sync {
    // -- Incoming alerts -----------------------------------------------------
    async fn create_incoming_alert(&self, alert: IncomingAlert) -> CoreResult<()>;
    async fn get_incoming_alert(&self, id: &str) -> CoreResult<Option<IncomingAlert>>;
    async fn update_incoming_alert(&self, alert: IncomingAlert) -> CoreResult<()>;

    /// Acquire the per-alertId mutex for the duration of `f`, guaranteeing a
    /// second concurrent delivery of the same id cannot interleave.
    async fn with_incoming_alert_lock<F, Fut, T>(&self, alert_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = T> + Send,
        T: Send;

    // -- Alert configurations -------------------------------------------------
    async fn upsert_alert_configuration(&self, config: AlertConfiguration) -> CoreResult<()>;
    async fn get_alert_configuration(&self, id: &str) -> CoreResult<Option<AlertConfiguration>>;
    async fn list_alert_configurations(&self) -> CoreResult<Vec<AlertConfiguration>>;
    async fn find_matching_configurations(
        &self,
        symbol: &str,
        timeframe: crate::types::Timeframe,
        strategy: &str,
    ) -> CoreResult<Vec<AlertConfiguration>>;

    // -- Trades ----------------------------------------------------------------
    async fn allocate_trade_number(&self) -> CoreResult<i64>;
    async fn create_trade(&self, trade: Trade) -> CoreResult<()>;
    async fn get_trade(&self, id: &str) -> CoreResult<Option<Trade>>;
    async fn update_trade(&self, trade: Trade) -> CoreResult<()>;
    async fn list_open_trades(&self, user_id: &str, config_id: &str) -> CoreResult<Vec<Trade>>;
    async fn list_trades_for_user(&self, user_id: &str) -> CoreResult<Vec<Trade>>;

    /// Serializes mutation of trades belonging to one `(userId, configId)`
    /// pair — the advisory lock named in §5 of the design.
    async fn with_trade_pair_lock<F, Fut, T>(&self, user_id: &str, config_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = T> + Send,
        T: Send;

    // -- User alerts -------------------------------------------------------------
    async fn upsert_user_alert(&self, alert: UserAlert) -> CoreResult<()>;
    async fn get_user_alert(&self, id: &str) -> CoreResult<Option<UserAlert>>;
    async fn list_user_alerts_for_user(&self, user_id: &str) -> CoreResult<Vec<UserAlert>>;
    async fn load_due_alerts(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<UserAlert>>;

    /// Non-blocking per-`UserAlert` lease: `Some(guard)` if acquired, `None`
    /// if another worker already holds it (the caller should skip this tick).
    fn try_lease_user_alert(&self, alert_id: &str) -> Option<LeaseGuard>;

    // -- Crossing detection side-state -------------------------------------------
    async fn get_previous_value(&self, alert_id: &str, field_key: &str) -> CoreResult<Option<f64>>;
    async fn set_previous_value(&self, alert_id: &str, field_key: &str, value: f64) -> CoreResult<()>;

    // -- Dedup -------------------------------------------------------------------
    fn fingerprint_seen(&self, fingerprint: &str) -> bool;
}

pub type SharedAlertStore = Arc<dyn AlertStore>;

/// RAII guard releasing a `UserAlert` lease on drop.
pub struct LeaseGuard {
    key: String,
    table: Arc<dashmap::DashSet<String>>,
}

impl Drop for LeaseGuard {
    fn drop(&mut self) {
        self.table.remove(&self.key);
    }
}
