// In-process implementation of `AlertStore`. Backs both the production
// single-node deployment and every test in this crate; a clustered
// deployment would swap this for a database-backed implementation without
// changing any caller.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::{DashMap, DashSet};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::deduper::{Deduper, Observation};
use crate::domain::{AlertConfiguration, IncomingAlert, Trade, UserAlert};
use crate::error::CoreResult;
use crate::store::{AlertStore, LeaseGuard};
use crate::types::{ConfigStatus, Timeframe};

pub struct InMemoryAlertStore {
    incoming_alerts: RwLock<HashMap<String, IncomingAlert>>,
    configurations: RwLock<HashMap<String, AlertConfiguration>>,
    trades: RwLock<HashMap<String, Trade>>,
    user_alerts: RwLock<HashMap<String, UserAlert>>,
    previous_values: RwLock<HashMap<(String, String), f64>>,

    trade_counter: AtomicI64,
    deduper: Deduper,

    alert_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    trade_pair_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    user_alert_leases: Arc<DashSet<String>>,
}

impl InMemoryAlertStore {
    pub fn new(dedup_ttl: std::time::Duration) -> Self {
        Self {
            incoming_alerts: RwLock::new(HashMap::new()),
            configurations: RwLock::new(HashMap::new()),
            trades: RwLock::new(HashMap::new()),
            user_alerts: RwLock::new(HashMap::new()),
            previous_values: RwLock::new(HashMap::new()),
            trade_counter: AtomicI64::new(0),
            deduper: Deduper::new(dedup_ttl),
            alert_locks: DashMap::new(),
            trade_pair_locks: DashMap::new(),
            user_alert_leases: Arc::new(DashSet::new()),
        }
    }

    fn get_or_create_lock(table: &DashMap<String, Arc<tokio::sync::Mutex<()>>>, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        table
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }
}

#[async_trait]
impl AlertStore for InMemoryAlertStore {
    async fn create_incoming_alert(&self, alert: IncomingAlert) -> CoreResult<()> {
        self.incoming_alerts.write().insert(alert.id.clone(), alert);
        Ok(())
    }

    async fn get_incoming_alert(&self, id: &str) -> CoreResult<Option<IncomingAlert>> {
        Ok(self.incoming_alerts.read().get(id).cloned())
    }

    async fn update_incoming_alert(&self, alert: IncomingAlert) -> CoreResult<()> {
        self.incoming_alerts.write().insert(alert.id.clone(), alert);
        Ok(())
    }

    async fn with_incoming_alert_lock<F, Fut, T>(&self, alert_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = T> + Send,
        T: Send,
    {
        let lock = Self::get_or_create_lock(&self.alert_locks, alert_id);
        let _guard = lock.lock().await;
        f().await
    }

    async fn upsert_alert_configuration(&self, config: AlertConfiguration) -> CoreResult<()> {
        config.validate()?;
        self.configurations.write().insert(config.id.clone(), config);
        Ok(())
    }

    async fn get_alert_configuration(&self, id: &str) -> CoreResult<Option<AlertConfiguration>> {
        Ok(self.configurations.read().get(id).cloned())
    }

    async fn list_alert_configurations(&self) -> CoreResult<Vec<AlertConfiguration>> {
        let mut all: Vec<AlertConfiguration> = self.configurations.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(all)
    }

    async fn find_matching_configurations(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        strategy: &str,
    ) -> CoreResult<Vec<AlertConfiguration>> {
        let normalized_symbol = AlertConfiguration::normalized_symbol(symbol);
        let mut matches: Vec<AlertConfiguration> = self
            .configurations
            .read()
            .values()
            .filter(|c| {
                c.symbol == normalized_symbol
                    && c.timeframe == timeframe
                    && c.strategy == strategy
                    && c.status == ConfigStatus::Active
            })
            .cloned()
            .collect();
        // Deterministic ordering required by the test suite.
        matches.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(matches)
    }

    async fn allocate_trade_number(&self) -> CoreResult<i64> {
        Ok(self.trade_counter.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn create_trade(&self, trade: Trade) -> CoreResult<()> {
        self.trades.write().insert(trade.id.clone(), trade);
        Ok(())
    }

    async fn get_trade(&self, id: &str) -> CoreResult<Option<Trade>> {
        Ok(self.trades.read().get(id).cloned())
    }

    async fn update_trade(&self, trade: Trade) -> CoreResult<()> {
        self.trades.write().insert(trade.id.clone(), trade);
        Ok(())
    }

    async fn list_open_trades(&self, user_id: &str, config_id: &str) -> CoreResult<Vec<Trade>> {
        let mut open: Vec<Trade> = self
            .trades
            .read()
            .values()
            .filter(|t| t.user_id == user_id && t.config_id == config_id && t.is_open())
            .cloned()
            .collect();
        open.sort_by_key(|t| t.opened_at);
        Ok(open)
    }

    async fn list_trades_for_user(&self, user_id: &str) -> CoreResult<Vec<Trade>> {
        let mut trades: Vec<Trade> = self
            .trades
            .read()
            .values()
            .filter(|t| t.user_id == user_id)
            .cloned()
            .collect();
        trades.sort_by_key(|t| t.trade_number);
        Ok(trades)
    }

    async fn with_trade_pair_lock<F, Fut, T>(&self, user_id: &str, config_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut + Send,
        Fut: std::future::Future<Output = T> + Send,
        T: Send,
    {
        let key = format!("{user_id}:{config_id}");
        let lock = Self::get_or_create_lock(&self.trade_pair_locks, &key);
        let _guard = lock.lock().await;
        f().await
    }

    async fn upsert_user_alert(&self, alert: UserAlert) -> CoreResult<()> {
        self.user_alerts.write().insert(alert.id.clone(), alert);
        Ok(())
    }

    async fn get_user_alert(&self, id: &str) -> CoreResult<Option<UserAlert>> {
        Ok(self.user_alerts.read().get(id).cloned())
    }

    async fn list_user_alerts_for_user(&self, user_id: &str) -> CoreResult<Vec<UserAlert>> {
        Ok(self
            .user_alerts
            .read()
            .values()
            .filter(|a| a.user_id == user_id)
            .cloned()
            .collect())
    }

    async fn load_due_alerts(&self, now: DateTime<Utc>, limit: usize) -> CoreResult<Vec<UserAlert>> {
        let mut due: Vec<UserAlert> = self
            .user_alerts
            .read()
            .values()
            .filter(|a| {
                a.is_active
                    && !a.is_paused
                    && a.next_check.map(|nc| nc <= now).unwrap_or(true)
                    && a.expires_at.map(|exp| exp > now).unwrap_or(true)
            })
            .cloned()
            .collect();
        // priority DESC, nextCheck ASC
        due.sort_by(|a, b| {
            b.priority
                .cmp(&a.priority)
                .then_with(|| a.next_check.cmp(&b.next_check))
        });
        due.truncate(limit);
        Ok(due)
    }

    fn try_lease_user_alert(&self, alert_id: &str) -> Option<LeaseGuard> {
        if self.user_alert_leases.insert(alert_id.to_string()) {
            Some(LeaseGuard {
                key: alert_id.to_string(),
                table: self.user_alert_leases.clone(),
            })
        } else {
            None
        }
    }

    async fn get_previous_value(&self, alert_id: &str, field_key: &str) -> CoreResult<Option<f64>> {
        Ok(self
            .previous_values
            .read()
            .get(&(alert_id.to_string(), field_key.to_string()))
            .copied())
    }

    async fn set_previous_value(&self, alert_id: &str, field_key: &str, value: f64) -> CoreResult<()> {
        self.previous_values
            .write()
            .insert((alert_id.to_string(), field_key.to_string()), value);
        Ok(())
    }

    fn fingerprint_seen(&self, fingerprint: &str) -> bool {
        matches!(self.deduper.observe(fingerprint), Observation::Duplicate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert_configuration::{Filters, Stats, TradeMgmt, Validation};
    use crate::types::Signal;

    fn store() -> InMemoryAlertStore {
        InMemoryAlertStore::new(std::time::Duration::from_secs(60))
    }

    fn config(id: &str) -> AlertConfiguration {
        AlertConfiguration {
            id: id.into(),
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::M5,
            strategy: "S2".into(),
            status: ConfigStatus::Active,
            trade_mgmt: TradeMgmt::default(),
            allowed_entry_signals: vec![Signal::Buy, Signal::Sell],
            allowed_exit_signals: vec![Signal::TpHit, Signal::SlHit],
            validation: Validation::default(),
            filters: Filters::default(),
            plan_ids: vec!["free".into()],
            stats: Stats::default(),
        }
    }

    #[tokio::test]
    async fn trade_number_allocation_is_monotonic() {
        let store = store();
        let a = store.allocate_trade_number().await.unwrap();
        let b = store.allocate_trade_number().await.unwrap();
        let c = store.allocate_trade_number().await.unwrap();
        assert!(a < b);
        assert!(b < c);
    }

    #[tokio::test]
    async fn find_matching_configurations_filters_and_orders() {
        let store = store();
        store.upsert_alert_configuration(config("cfg-2")).await.unwrap();
        store.upsert_alert_configuration(config("cfg-1")).await.unwrap();
        let mut inactive = config("cfg-3");
        inactive.status = ConfigStatus::Inactive;
        store.upsert_alert_configuration(inactive).await.unwrap();

        let matches = store
            .find_matching_configurations("btcusdt", Timeframe::M5, "S2")
            .await
            .unwrap();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].id, "cfg-1");
        assert_eq!(matches[1].id, "cfg-2");
    }

    #[tokio::test]
    async fn user_alert_lease_is_exclusive() {
        let store = store();
        let first = store.try_lease_user_alert("ua-1");
        assert!(first.is_some());
        let second = store.try_lease_user_alert("ua-1");
        assert!(second.is_none());
        drop(first);
        let third = store.try_lease_user_alert("ua-1");
        assert!(third.is_some());
    }

    #[tokio::test]
    async fn fingerprint_seen_flags_repeats() {
        let store = store();
        assert!(!store.fingerprint_seen("fp-a"));
        assert!(store.fingerprint_seen("fp-a"));
    }

    #[tokio::test]
    async fn previous_value_roundtrips() {
        let store = store();
        assert_eq!(store.get_previous_value("ua-1", "price").await.unwrap(), None);
        store.set_previous_value("ua-1", "price", 99.5).await.unwrap();
        assert_eq!(
            store.get_previous_value("ua-1", "price").await.unwrap(),
            Some(99.5)
        );
    }
}
