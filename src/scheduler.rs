// Evaluation scheduler: on a fixed tick, loads the batch of due `UserAlert`s,
// evaluates each under its per-alert lease against live market data, and
// routes triggers to the `Dispatcher`. Fixed-interval driver spawning a
// bounded worker pool of evaluation tasks per tick.

use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Semaphore;

use crate::condition_eval::{self, EvalOutcome};
use crate::config::SchedulerParams;
use crate::dispatcher::Dispatcher;
use crate::domain::UserAlert;
use crate::market_data::SharedMarketDataProvider;
use crate::metrics::Metrics;
use crate::store::SharedAlertStore;
use crate::types::{NotificationKind, Timeframe, UserAlertType};

/// Candles fetched for technical conditions (enough for a 100-period SMA).
const HISTORY_LIMIT: usize = 200;
/// Used when `UserAlert::interval` doesn't parse as a known timeframe.
const FALLBACK_INTERVAL_MS: i64 = 60_000;
/// Exponent cap so `backoff_ms` can't overflow before the `min` against
/// `max_backoff_ms` brings it back down.
const MAX_BACKOFF_EXPONENT: u32 = 20;

pub struct Scheduler {
    store: SharedAlertStore,
    market_data: SharedMarketDataProvider,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    workers: usize,
    batch_size: usize,
    tick: Duration,
    max_backoff_ms: i64,
}

impl Scheduler {
    pub fn new(
        store: SharedAlertStore,
        market_data: SharedMarketDataProvider,
        dispatcher: Arc<Dispatcher>,
        metrics: Arc<Metrics>,
        params: SchedulerParams,
        workers: usize,
    ) -> Self {
        Self {
            store,
            market_data,
            dispatcher,
            metrics,
            workers,
            batch_size: params.batch_size,
            tick: Duration::from_secs(params.tick_secs),
            max_backoff_ms: params.max_backoff_ms,
        }
    }

    /// Run the tick loop until `shutdown` fires. Each tick evaluates at most
    /// `batch_size` due alerts with at most `workers` in flight at once.
    pub async fn run(self: Arc<Self>, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let mut interval = tokio::time::interval(self.tick);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.clone().tick().await;
                }
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        tracing::info!("scheduler stopping");
                        break;
                    }
                }
            }
        }
    }

    async fn tick(self: Arc<Self>) {
        let now = Utc::now();
        let due = match self.store.load_due_alerts(now, self.batch_size).await {
            Ok(alerts) => alerts,
            Err(e) => {
                e.log();
                return;
            }
        };

        if due.is_empty() {
            return;
        }

        tracing::debug!(count = due.len(), "scheduler tick loaded due alerts");

        let semaphore = Arc::new(Semaphore::new(self.workers.max(1)));
        let mut handles = Vec::with_capacity(due.len());
        for alert in due {
            let permit = semaphore
                .clone()
                .acquire_owned()
                .await
                .expect("semaphore is never closed");
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                this.process_one(alert).await;
            }));
        }
        for handle in handles {
            let _ = handle.await;
        }
    }

    /// Evaluate a single leased alert and persist the result. Swallows
    /// store errors (logged, not propagated) since one alert's bookkeeping
    /// failure must never stall the rest of the batch.
    async fn process_one(&self, mut alert: UserAlert) {
        let lease = self.store.try_lease_user_alert(&alert.id);
        let _lease = match lease {
            Some(guard) => guard,
            None => return,
        };

        let now = Utc::now();
        if !alert.can_trigger(now) {
            alert.next_check = Some(now + chrono::Duration::milliseconds(interval_ms(&alert)));
            if let Err(e) = self.store.upsert_user_alert(alert).await {
                e.log();
            }
            return;
        }

        match self.evaluate(&alert).await {
            Ok(eval) => {
                self.metrics.user_alerts_evaluated.fetch_add(1, Relaxed);
                alert.failed_checks = 0;
                alert.record_evaluation(now, eval.triggered, eval.detail.clone());
                if eval.triggered {
                    self.metrics.user_alerts_triggered.fetch_add(1, Relaxed);
                    self.notify(&alert, &eval).await;
                    alert.record_trigger(now, eval.detail);
                }
                alert.next_check = Some(now + chrono::Duration::milliseconds(interval_ms(&alert)));
            }
            Err(e) => {
                e.log();
                if e.is_fatal() {
                    self.metrics.record_fatal_fault();
                }
                self.metrics.user_alerts_eval_failed.fetch_add(1, Relaxed);
                alert.failed_checks += 1;
                let backoff = backoff_ms(&alert, self.max_backoff_ms);
                alert.next_check = Some(now + chrono::Duration::milliseconds(backoff));
            }
        }

        if let Err(e) = self.store.upsert_user_alert(alert).await {
            e.log();
        }
    }

    async fn evaluate(&self, alert: &UserAlert) -> crate::error::CoreResult<EvalOutcome> {
        let snapshot = self.market_data.get_snapshot(&alert.symbol, &alert.venue).await?;
        let history = if alert.alert_type == UserAlertType::Technical {
            self.market_data
                .get_history(&alert.symbol, &alert.venue, HISTORY_LIMIT)
                .await?
        } else {
            Vec::new()
        };
        condition_eval::evaluate_alert(alert, &snapshot, &history, self.store.as_ref()).await
    }

    async fn notify(&self, alert: &UserAlert, eval: &EvalOutcome) {
        let metadata = serde_json::json!({
            "alertId": alert.id,
            "symbol": alert.symbol,
            "venue": alert.venue,
        });
        let outcomes = self
            .dispatcher
            .dispatch_to_users(
                &[alert.user_id.clone()],
                NotificationKind::UserAlert,
                eval.detail.clone(),
                metadata,
            )
            .await;
        for outcome in outcomes {
            if !outcome.is_delivered() {
                tracing::warn!(alert_id = %alert.id, "user alert notification delivery failed permanently");
            }
        }
    }
}

fn interval_ms(alert: &UserAlert) -> i64 {
    serde_json::from_str::<Timeframe>(&format!("\"{}\"", alert.interval))
        .map(|tf| tf.as_millis())
        .unwrap_or(FALLBACK_INTERVAL_MS)
}

fn backoff_ms(alert: &UserAlert, max_backoff_ms: i64) -> i64 {
    let base = interval_ms(alert);
    let exponent = alert.failed_checks.min(MAX_BACKOFF_EXPONENT);
    let multiplier = 2i64.saturating_pow(exponent);
    base.saturating_mul(multiplier).min(max_backoff_ms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::user_alert::Condition;
    use crate::market_data::{InMemoryMarketDataProvider, Snapshot};
    use crate::notification_bus::InMemoryNotificationBus;
    use crate::store::InMemoryAlertStore;
    use crate::types::{ConditionField, ConditionOperator, Frequency, LogicalOperator};

    fn alert(id: &str, now: chrono::DateTime<Utc>) -> UserAlert {
        UserAlert {
            id: id.into(),
            user_id: "u1".into(),
            symbol: "BTCUSDT".into(),
            venue: "binance".into(),
            interval: "1m".into(),
            alert_type: UserAlertType::Price,
            conditions: vec![Condition {
                field: ConditionField::Price,
                operator: ConditionOperator::Gt,
                value: 40000.0,
                second_value: None,
                params: Default::default(),
                custom_expression: None,
            }],
            logical_operator: LogicalOperator::And,
            priority: 0,
            frequency: Frequency::Recurring,
            max_triggers: 0,
            trigger_count: 0,
            cooldown_ms: crate::domain::user_alert::MIN_COOLDOWN_MS,
            last_triggered: None,
            last_checked: None,
            next_check: Some(now),
            expires_at: None,
            is_active: true,
            is_paused: false,
            notification_channels: vec!["telegram".into()],
            execution_history: Vec::new(),
            performance: Default::default(),
            failed_checks: 0,
        }
    }

    fn snapshot(price: f64, now: chrono::DateTime<Utc>) -> Snapshot {
        Snapshot {
            price,
            volume: 100.0,
            change: 0.0,
            change_percent: 0.0,
            market_cap: None,
            as_of: now,
        }
    }

    #[tokio::test]
    async fn tick_triggers_and_dispatches_a_due_alert() {
        let now = Utc::now();
        let store = Arc::new(InMemoryAlertStore::new(std::time::Duration::from_secs(60)));
        store.upsert_user_alert(alert("ua-1", now)).await.unwrap();

        let market = Arc::new(InMemoryMarketDataProvider::new());
        market.set_snapshot("BTCUSDT", "binance", snapshot(45000.0, now));

        let bus = Arc::new(InMemoryNotificationBus::new());
        let dispatcher = Arc::new(Dispatcher::new(bus.clone(), crate::config::DispatcherParams::default()));

        let params = SchedulerParams {
            tick_secs: 5,
            batch_size: 100,
            max_backoff_ms: 3_600_000,
        };
        let scheduler = Arc::new(Scheduler::new(store.clone(), market, dispatcher, Arc::new(Metrics::new()), params, 5));
        scheduler.tick().await;

        assert_eq!(bus.sent().len(), 1);
        let updated = store.get_user_alert("ua-1").await.unwrap().unwrap();
        assert_eq!(updated.trigger_count, 1);
        assert!(updated.next_check.unwrap() > now);
    }

    #[tokio::test]
    async fn non_triggering_alert_is_rescheduled_without_dispatch() {
        let now = Utc::now();
        let store = Arc::new(InMemoryAlertStore::new(std::time::Duration::from_secs(60)));
        store.upsert_user_alert(alert("ua-1", now)).await.unwrap();

        let market = Arc::new(InMemoryMarketDataProvider::new());
        market.set_snapshot("BTCUSDT", "binance", snapshot(100.0, now));

        let bus = Arc::new(InMemoryNotificationBus::new());
        let dispatcher = Arc::new(Dispatcher::new(bus.clone(), crate::config::DispatcherParams::default()));
        let params = SchedulerParams {
            tick_secs: 5,
            batch_size: 100,
            max_backoff_ms: 3_600_000,
        };
        let scheduler = Arc::new(Scheduler::new(store.clone(), market, dispatcher, Arc::new(Metrics::new()), params, 5));
        scheduler.tick().await;

        assert!(bus.sent().is_empty());
        let updated = store.get_user_alert("ua-1").await.unwrap().unwrap();
        assert_eq!(updated.trigger_count, 0);
        assert_eq!(updated.performance.total_evaluations, 1);
    }

    #[tokio::test]
    async fn provider_failure_backs_off_and_does_not_reset_failed_checks() {
        let now = Utc::now();
        let store = Arc::new(InMemoryAlertStore::new(std::time::Duration::from_secs(60)));
        store.upsert_user_alert(alert("ua-1", now)).await.unwrap();

        // No snapshot configured: provider errors with ExternalUnavailable.
        let market = Arc::new(InMemoryMarketDataProvider::new());
        let bus = Arc::new(InMemoryNotificationBus::new());
        let dispatcher = Arc::new(Dispatcher::new(bus.clone(), crate::config::DispatcherParams::default()));
        let params = SchedulerParams {
            tick_secs: 5,
            batch_size: 100,
            max_backoff_ms: 3_600_000,
        };
        let scheduler = Arc::new(Scheduler::new(store.clone(), market, dispatcher, Arc::new(Metrics::new()), params, 5));
        scheduler.tick().await;

        let updated = store.get_user_alert("ua-1").await.unwrap().unwrap();
        assert_eq!(updated.failed_checks, 1);
        assert!(updated.next_check.unwrap() > now + chrono::Duration::milliseconds(60_000));
    }

    #[test]
    fn backoff_is_capped_at_configured_max() {
        let now = Utc::now();
        let mut a = alert("ua-1", now);
        a.failed_checks = 30;
        assert_eq!(backoff_ms(&a, 3_600_000), 3_600_000);
    }

    #[test]
    fn unparseable_interval_falls_back_to_default() {
        let now = Utc::now();
        let mut a = alert("ua-1", now);
        a.interval = "not-a-timeframe".into();
        assert_eq!(interval_ms(&a), FALLBACK_INTERVAL_MS);
    }
}
