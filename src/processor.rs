// Drains ingested alert ids off the pipeline queue, resolves each to its
// matching configurations/eligible users via the `Matcher`, applies the
// `TradeManager` per eligible user, and dispatches notifications. One
// perpetual consumer task reading one bounded channel to completion.

use std::sync::atomic::Ordering::Relaxed;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::mpsc;

use crate::dispatcher::Dispatcher;
use crate::domain::incoming_alert::TradeAction;
use crate::domain::{AlertConfiguration, IncomingAlert};
use crate::error::CoreError;
use crate::market_data::SharedMarketDataProvider;
use crate::matcher::Matcher;
use crate::metrics::Metrics;
use crate::principal_directory::SharedPrincipalDirectory;
use crate::store::SharedAlertStore;
use crate::trade_manager::TradeManager;
use crate::types::{IncomingAlertStatus, NotificationKind};

pub struct Processor {
    store: SharedAlertStore,
    matcher: Matcher,
    trade_manager: TradeManager,
    dispatcher: Arc<Dispatcher>,
    principals: SharedPrincipalDirectory,
    market_data: SharedMarketDataProvider,
    metrics: Arc<Metrics>,
}

impl Processor {
    pub fn new(
        store: SharedAlertStore,
        dispatcher: Arc<Dispatcher>,
        principals: SharedPrincipalDirectory,
        market_data: SharedMarketDataProvider,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            matcher: Matcher::new(store.clone()),
            trade_manager: TradeManager::new(store.clone()),
            store,
            dispatcher,
            principals,
            market_data,
            metrics,
        }
    }

    /// Drain `receiver` until the ingestion pipeline's sender is dropped.
    pub async fn run(self, mut receiver: mpsc::Receiver<String>) {
        while let Some(alert_id) = receiver.recv().await {
            self.process(&alert_id).await;
        }
        tracing::info!("processor exiting: ingestion channel closed");
    }

    async fn process(&self, alert_id: &str) {
        let started = Instant::now();
        let mut alert = match self.store.get_incoming_alert(alert_id).await {
            Ok(Some(a)) => a,
            Ok(None) => {
                tracing::warn!(alert_id, "processor received an id with no backing record");
                return;
            }
            Err(e) => {
                e.log();
                return;
            }
        };

        alert.advance(IncomingAlertStatus::Processing);

        match self.match_and_apply(&alert).await {
            Ok((matched_ids, matched_users, actions)) => {
                alert.processing.matched_config_ids = matched_ids;
                alert.processing.matched_users = matched_users;
                alert.processing.trade_actions = actions;
                alert.advance(IncomingAlertStatus::Processed);
            }
            Err(e) => {
                e.log();
                if e.is_fatal() {
                    self.metrics.record_fatal_fault();
                }
                self.metrics.alerts_rejected.fetch_add(1, Relaxed);
                alert.processing.errors.push(e.to_string());
                alert.advance(IncomingAlertStatus::Failed);
            }
        }

        alert.processing.processing_ms = Some(started.elapsed().as_secs_f64() * 1000.0);

        if let Err(e) = self.store.update_incoming_alert(alert).await {
            e.log();
        }
    }

    async fn match_and_apply(
        &self,
        alert: &IncomingAlert,
    ) -> Result<(Vec<String>, Vec<String>, Vec<TradeAction>), CoreError> {
        let principals = self.principals.list_all().await?;
        let reference_price = self
            .market_data
            .get_snapshot(&alert.data.symbol, "default")
            .await
            .ok()
            .map(|s| s.price);

        let results = self.matcher.resolve(alert, &principals, reference_price).await?;

        let mut matched_ids = Vec::new();
        let mut matched_users = Vec::new();
        let mut actions = Vec::new();

        if results.is_empty() {
            self.metrics.alerts_unmatched.fetch_add(1, Relaxed);
            actions.push(TradeAction {
                action: "skip".to_string(),
                reason: Some("no matching configuration".to_string()),
                trade_id: None,
            });
            return Ok((matched_ids, matched_users, actions));
        }

        self.metrics.alerts_matched.fetch_add(1, Relaxed);

        for result in results {
            matched_ids.push(result.config.id.clone());
            for principal in &result.eligible_users {
                matched_users.push(principal.user_id.clone());

                let action = self
                    .trade_manager
                    .apply(
                        &principal.user_id,
                        &result.config,
                        &alert.data.symbol,
                        &alert.data.strategy,
                        alert.data.signal,
                        alert.data.price,
                        alert.data.take_profit_price,
                        alert.data.stop_loss_price,
                        alert.data.trade_number,
                        Utc::now(),
                    )
                    .await?;

                self.record_action_metric(&action);
                self.notify(alert, &result.config, &principal.user_id, &action).await;

                actions.push(action);
            }
        }

        Ok((matched_ids, matched_users, actions))
    }

    async fn notify(&self, alert: &IncomingAlert, config: &AlertConfiguration, user_id: &str, action: &TradeAction) {
        let kind = match action.action.as_str() {
            "open" => NotificationKind::Entry,
            "close" => NotificationKind::Exit,
            "replace" => NotificationKind::Replace,
            _ => return, // skips are bookkeeping only, not user-visible events
        };

        let body = format!(
            "{} {} {} @ {}",
            alert.data.signal, alert.data.symbol, config.strategy, alert.data.price
        );
        let metadata = serde_json::json!({
            "alertId": alert.id,
            "configId": config.id,
            "symbol": alert.data.symbol,
        });

        let outcomes = self
            .dispatcher
            .dispatch_to_users(&[user_id.to_string()], kind, body, metadata)
            .await;
        for outcome in outcomes {
            if outcome.is_delivered() {
                self.metrics.notifications_sent.fetch_add(1, Relaxed);
            } else {
                self.metrics.notifications_failed.fetch_add(1, Relaxed);
                tracing::warn!(user_id, alert_id = %alert.id, "notification delivery failed permanently");
            }
        }
    }

    fn record_action_metric(&self, action: &TradeAction) {
        match action.action.as_str() {
            "open" => self.metrics.trades_opened.fetch_add(1, Relaxed),
            "close" => self.metrics.trades_closed.fetch_add(1, Relaxed),
            "replace" => self.metrics.trades_replaced.fetch_add(1, Relaxed),
            _ => self.metrics.trades_skipped.fetch_add(1, Relaxed),
        };
    }
}
