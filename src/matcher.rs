// Resolves an `IncomingAlert` to the set of `AlertConfiguration`s and
// eligible users it should act on, applying configuration-level filters
// deterministically.

use chrono::{DateTime, Timelike, Utc};
use chrono_tz::Tz;

use crate::domain::incoming_alert::TradeAction;
use crate::domain::{AlertConfiguration, IncomingAlert, Principal};
use crate::error::CoreResult;
use crate::store::SharedAlertStore;

#[derive(Debug, Clone)]
pub struct MatchResult {
    pub config: AlertConfiguration,
    pub eligible_users: Vec<Principal>,
}

pub struct Matcher {
    store: SharedAlertStore,
}

impl Matcher {
    pub fn new(store: SharedAlertStore) -> Self {
        Self { store }
    }

    /// Resolve the configurations (and, per configuration, the eligible
    /// users) an incoming alert should drive. Configurations are returned in
    /// ascending `id` order, matching the store's deterministic ordering.
    /// `reference_price`, when given, is a live market snapshot price used to
    /// enforce `validation.price_tolerance_pct` against the alert's price.
    pub async fn resolve(
        &self,
        alert: &IncomingAlert,
        principals: &[Principal],
        reference_price: Option<f64>,
    ) -> CoreResult<Vec<MatchResult>> {
        let candidates = self
            .store
            .find_matching_configurations(&alert.data.symbol, alert.data.timeframe, &alert.data.strategy)
            .await?;

        let mut results = Vec::new();
        for config in candidates {
            if !config.permits_signal(alert.data.signal) {
                continue;
            }
            if !passes_filters(&config, alert, Utc::now(), reference_price) {
                continue;
            }

            let mut eligible: Vec<Principal> = principals
                .iter()
                .filter(|p| p.is_eligible_for_plan(&config.plan_ids))
                .cloned()
                .collect();
            eligible.sort_by(|a, b| a.user_id.cmp(&b.user_id));

            results.push(MatchResult {
                config,
                eligible_users: eligible,
            });
        }

        Ok(results)
    }

    pub fn record_no_match(&self, action: &mut Vec<TradeAction>) {
        action.push(TradeAction {
            action: "skip".to_string(),
            reason: Some("no matching configuration".to_string()),
            trade_id: None,
        });
    }
}

fn passes_filters(
    config: &AlertConfiguration,
    alert: &IncomingAlert,
    now: DateTime<Utc>,
    reference_price: Option<f64>,
) -> bool {
    let price = alert.data.price;

    if let (Some(tolerance_pct), Some(reference)) = (config.validation.price_tolerance_pct, reference_price) {
        if reference > 0.0 {
            let drift_pct = ((price - reference) / reference).abs() * 100.0;
            if drift_pct > tolerance_pct {
                return false;
            }
        }
    }

    if let Some(min) = config.filters.price_min {
        if price < min {
            return false;
        }
    }
    if let Some(max) = config.filters.price_max {
        if price > max {
            return false;
        }
    }

    if let Some(min_volume) = config.filters.min_volume {
        let observed_volume = alert
            .data
            .metadata
            .get("volume")
            .and_then(|v| v.as_f64())
            .unwrap_or(f64::INFINITY);
        if observed_volume < min_volume {
            return false;
        }
    }

    if let Some(window) = &config.filters.time_window {
        let tz: Tz = window.timezone.parse().unwrap_or(chrono_tz::UTC);
        let local = now.with_timezone(&tz);
        let minute_of_day = local.hour() * 60 + local.minute();
        if window.start_minute as u32 <= window.end_minute as u32 {
            if minute_of_day < window.start_minute as u32 || minute_of_day > window.end_minute as u32 {
                return false;
            }
        } else {
            // Window wraps past midnight.
            if minute_of_day < window.start_minute as u32 && minute_of_day > window.end_minute as u32 {
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert_configuration::{Filters, Stats, TradeMgmt, Validation};
    use crate::domain::incoming_alert::IncomingAlertData;
    use crate::store::InMemoryAlertStore;
    use crate::types::{ConfigStatus, Signal, Timeframe};
    use std::collections::HashMap;
    use std::sync::Arc;

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

    fn alert() -> IncomingAlert {
        IncomingAlert::new(
            "a1".into(),
            Utc::now(),
            None,
            "fp1".into(),
            IncomingAlertData {
                symbol: "BTCUSDT".into(),
                timeframe: Timeframe::M5,
                strategy: "S2".into(),
                signal: Signal::Buy,
                price: 45000.0,
                take_profit_price: None,
                stop_loss_price: None,
                trade_number: None,
                metadata: HashMap::new(),
            },
        )
    }

    fn principal(user_id: &str, plan_id: &str) -> Principal {
        Principal {
            user_id: user_id.into(),
            active_plan_ids: vec![plan_id.into()],
            preferred_channels: vec!["telegram".into()],
            timezone: "UTC".into(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn resolves_matching_configuration_and_eligible_users() {
        let store = Arc::new(InMemoryAlertStore::new(std::time::Duration::from_secs(60)));
        store.upsert_alert_configuration(config("cfg-1")).await.unwrap();
        let matcher = Matcher::new(store);

        let principals = vec![principal("u2", "free"), principal("u1", "free"), principal("u3", "pro")];
        let results = matcher.resolve(&alert(), &principals, None).await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].eligible_users.len(), 2);
        assert_eq!(results[0].eligible_users[0].user_id, "u1");
        assert_eq!(results[0].eligible_users[1].user_id, "u2");
    }

    #[tokio::test]
    async fn zero_configurations_match_yields_empty_result() {
        let store = Arc::new(InMemoryAlertStore::new(std::time::Duration::from_secs(60)));
        let matcher = Matcher::new(store);
        let results = matcher.resolve(&alert(), &[], None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn price_range_filter_excludes_out_of_band_alerts() {
        let store = Arc::new(InMemoryAlertStore::new(std::time::Duration::from_secs(60)));
        let mut cfg = config("cfg-1");
        cfg.filters.price_max = Some(40000.0);
        store.upsert_alert_configuration(cfg).await.unwrap();
        let matcher = Matcher::new(store);
        let results = matcher.resolve(&alert(), &[], None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn inactive_principal_is_excluded() {
        let store = Arc::new(InMemoryAlertStore::new(std::time::Duration::from_secs(60)));
        store.upsert_alert_configuration(config("cfg-1")).await.unwrap();
        let matcher = Matcher::new(store);
        let mut inactive = principal("u1", "free");
        inactive.enabled = false;
        let results = matcher.resolve(&alert(), &[inactive], None).await.unwrap();
        assert_eq!(results[0].eligible_users.len(), 0);
    }
}
