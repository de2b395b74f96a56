// Per-(userId, configId) trade state machine: open / replace / skip on
// entry signals, close on exit signals. All mutation happens under the
// store's advisory pair lock so a concurrent delivery for the same pair
// cannot interleave.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::incoming_alert::TradeAction;
use crate::domain::{AlertConfiguration, Trade};
use crate::error::CoreResult;
use crate::types::{ExitReason, Signal};
use crate::store::SharedAlertStore;

pub struct TradeManager {
    store: SharedAlertStore,
}

impl TradeManager {
    pub fn new(store: SharedAlertStore) -> Self {
        Self { store }
    }

    /// Apply exactly one of {open, replace, skip} for an entry signal on
    /// behalf of one user, or close matching open trades for an exit signal.
    pub async fn apply(
        &self,
        user_id: &str,
        config: &AlertConfiguration,
        symbol: &str,
        strategy: &str,
        signal: Signal,
        price: f64,
        take_profit_price: Option<f64>,
        stop_loss_price: Option<f64>,
        target_trade_number: Option<i64>,
        now: DateTime<Utc>,
    ) -> CoreResult<TradeAction> {
        let store = self.store.clone();
        let user_id = user_id.to_string();
        let config_id = config.id.clone();

        let result = self
            .store
            .with_trade_pair_lock(&user_id, &config_id, || async move {
                if signal.is_entry() {
                    handle_entry(
                        &store,
                        &user_id,
                        config,
                        symbol,
                        strategy,
                        signal,
                        price,
                        take_profit_price,
                        stop_loss_price,
                        now,
                    )
                    .await
                } else {
                    handle_exit(
                        &store,
                        &user_id,
                        &config_id,
                        symbol,
                        strategy,
                        signal,
                        price,
                        target_trade_number,
                        now,
                    )
                    .await
                }
            })
            .await?;

        Ok(result)
    }
}

#[allow(clippy::too_many_arguments)]
async fn handle_entry(
    store: &SharedAlertStore,
    user_id: &str,
    config: &AlertConfiguration,
    symbol: &str,
    strategy: &str,
    signal: Signal,
    price: f64,
    take_profit_price: Option<f64>,
    stop_loss_price: Option<f64>,
    now: DateTime<Utc>,
) -> CoreResult<TradeAction> {
    let open_trades = store.list_open_trades(user_id, &config.id).await?;
    let cap = config.trade_mgmt.max_open_trades as usize;

    if open_trades.len() < cap {
        let trade = open_new_trade(
            store,
            user_id,
            config,
            symbol,
            strategy,
            signal,
            price,
            take_profit_price,
            stop_loss_price,
            now,
        )
        .await?;
        return Ok(TradeAction {
            action: "open".to_string(),
            reason: None,
            trade_id: Some(trade.id),
        });
    }

    if config.trade_mgmt.replace_on_same_signal {
        if let Some(same_signal) = open_trades.iter().find(|t| t.signal == signal) {
            return replace(
                store,
                user_id,
                config,
                symbol,
                strategy,
                signal,
                price,
                take_profit_price,
                stop_loss_price,
                same_signal.clone(),
                "same signal".to_string(),
                now,
            )
            .await;
        }
    }

    if config.trade_mgmt.allow_opposite_signals {
        if let Some(oldest) = open_trades.iter().min_by_key(|t| t.opened_at) {
            return replace(
                store,
                user_id,
                config,
                symbol,
                strategy,
                signal,
                price,
                take_profit_price,
                stop_loss_price,
                oldest.clone(),
                "cap reached".to_string(),
                now,
            )
            .await;
        }
    }

    Ok(TradeAction {
        action: "skip".to_string(),
        reason: Some("cap".to_string()),
        trade_id: None,
    })
}

#[allow(clippy::too_many_arguments)]
async fn open_new_trade(
    store: &SharedAlertStore,
    user_id: &str,
    config: &AlertConfiguration,
    symbol: &str,
    strategy: &str,
    signal: Signal,
    price: f64,
    take_profit_price: Option<f64>,
    stop_loss_price: Option<f64>,
    now: DateTime<Utc>,
) -> CoreResult<Trade> {
    let trade_number = store.allocate_trade_number().await?;
    let trade = Trade::open(
        Uuid::new_v4().to_string(),
        trade_number,
        user_id.to_string(),
        config.id.clone(),
        symbol.to_string(),
        config.timeframe,
        strategy.to_string(),
        signal,
        price,
        take_profit_price,
        stop_loss_price,
        now,
    );
    store.create_trade(trade.clone()).await?;
    Ok(trade)
}

#[allow(clippy::too_many_arguments)]
async fn replace(
    store: &SharedAlertStore,
    user_id: &str,
    config: &AlertConfiguration,
    symbol: &str,
    strategy: &str,
    signal: Signal,
    price: f64,
    take_profit_price: Option<f64>,
    stop_loss_price: Option<f64>,
    mut old: Trade,
    reason: String,
    now: DateTime<Utc>,
) -> CoreResult<TradeAction> {
    let new_trade = open_new_trade(
        store,
        user_id,
        config,
        symbol,
        strategy,
        signal,
        price,
        take_profit_price,
        stop_loss_price,
        now,
    )
    .await?;

    old.replace(new_trade.id.clone(), reason.clone(), now);
    store.update_trade(old).await?;

    Ok(TradeAction {
        action: "replace".to_string(),
        reason: Some(reason),
        trade_id: Some(new_trade.id),
    })
}

#[allow(clippy::too_many_arguments)]
async fn handle_exit(
    store: &SharedAlertStore,
    user_id: &str,
    config_id: &str,
    symbol: &str,
    strategy: &str,
    signal: Signal,
    exit_price: f64,
    target_trade_number: Option<i64>,
    now: DateTime<Utc>,
) -> CoreResult<TradeAction> {
    let exit_reason = match signal {
        Signal::TpHit => ExitReason::TpHit,
        Signal::SlHit => ExitReason::SlHit,
        _ => unreachable!("handle_exit only called for exit signals"),
    };

    let mut open_trades = store.list_open_trades(user_id, config_id).await?;
    open_trades.retain(|t| t.symbol == symbol && t.strategy == strategy);

    let targets: Vec<Trade> = if let Some(trade_number) = target_trade_number {
        open_trades
            .into_iter()
            .filter(|t| t.trade_number == trade_number)
            .collect()
    } else {
        let mut all = open_trades;
        all.sort_by_key(|t| t.opened_at);
        all
    };

    if targets.is_empty() {
        return Ok(TradeAction {
            action: "skip".to_string(),
            reason: Some("no matching open trade".to_string()),
            trade_id: None,
        });
    }

    let mut closed_ids = Vec::new();
    for mut trade in targets {
        trade.close(exit_price, exit_reason, now);
        store.update_trade(trade.clone()).await?;
        closed_ids.push(trade.id);
    }

    Ok(TradeAction {
        action: "close".to_string(),
        reason: None,
        trade_id: closed_ids.into_iter().next(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::alert_configuration::{Filters, Stats, TradeMgmt, Validation};
    use crate::store::InMemoryAlertStore;
    use crate::types::{ConfigStatus, Timeframe};
    use std::sync::Arc;

    fn config(max_open: u32, replace_same: bool, allow_opposite: bool) -> AlertConfiguration {
        AlertConfiguration {
            id: "cfg-1".into(),
            symbol: "BTCUSDT".into(),
            timeframe: Timeframe::M5,
            strategy: "S2".into(),
            status: ConfigStatus::Active,
            trade_mgmt: TradeMgmt {
                max_open_trades: max_open,
                allow_opposite_signals: allow_opposite,
                replace_on_same_signal: replace_same,
                auto_close_on_tp_sl: true,
            },
            allowed_entry_signals: vec![Signal::Buy, Signal::Sell],
            allowed_exit_signals: vec![Signal::TpHit, Signal::SlHit],
            validation: Validation::default(),
            filters: Filters::default(),
            plan_ids: vec!["free".into()],
            stats: Stats::default(),
        }
    }

    fn manager() -> (TradeManager, SharedAlertStore) {
        let store: SharedAlertStore = Arc::new(InMemoryAlertStore::new(std::time::Duration::from_secs(60)));
        (TradeManager::new(store.clone()), store)
    }

    #[tokio::test]
    async fn opens_a_new_trade_under_cap() {
        let (mgr, store) = manager();
        let cfg = config(1, true, false);
        let action = mgr
            .apply("u1", &cfg, "BTCUSDT", "S2", Signal::Buy, 45000.0, None, None, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(action.action, "open");
        let open = store.list_open_trades("u1", "cfg-1").await.unwrap();
        assert_eq!(open.len(), 1);
    }

    #[tokio::test]
    async fn replaces_same_signal_at_cap() {
        let (mgr, store) = manager();
        let cfg = config(1, true, false);
        mgr.apply("u1", &cfg, "BTCUSDT", "S2", Signal::Buy, 45000.0, None, None, None, Utc::now())
            .await
            .unwrap();
        let action = mgr
            .apply("u1", &cfg, "BTCUSDT", "S2", Signal::Buy, 45500.0, None, None, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(action.action, "replace");
        let open = store.list_open_trades("u1", "cfg-1").await.unwrap();
        assert_eq!(open.len(), 1);
        assert!((open[0].entry_price - 45500.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn skips_when_cap_reached_and_no_replacement_allowed() {
        let (mgr, _store) = manager();
        let cfg = config(1, false, false);
        mgr.apply("u1", &cfg, "BTCUSDT", "S2", Signal::Buy, 45000.0, None, None, None, Utc::now())
            .await
            .unwrap();
        let action = mgr
            .apply("u1", &cfg, "BTCUSDT", "S2", Signal::Sell, 45500.0, None, None, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(action.action, "skip");
        assert_eq!(action.reason.as_deref(), Some("cap"));
    }

    #[tokio::test]
    async fn replaces_oldest_on_opposite_signal_when_allowed() {
        let (mgr, store) = manager();
        let cfg = config(1, false, true);
        mgr.apply("u1", &cfg, "BTCUSDT", "S2", Signal::Buy, 45000.0, None, None, None, Utc::now())
            .await
            .unwrap();
        let action = mgr
            .apply("u1", &cfg, "BTCUSDT", "S2", Signal::Sell, 45500.0, None, None, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(action.action, "replace");
        let open = store.list_open_trades("u1", "cfg-1").await.unwrap();
        assert_eq!(open[0].signal, Signal::Sell);
    }

    #[tokio::test]
    async fn closes_open_trade_on_tp_hit() {
        let (mgr, store) = manager();
        let cfg = config(1, true, false);
        mgr.apply("u1", &cfg, "BTCUSDT", "S2", Signal::Buy, 45000.0, None, None, None, Utc::now())
            .await
            .unwrap();

        let action = mgr
            .apply(
                "u1",
                &cfg,
                "BTCUSDT",
                "S2",
                Signal::TpHit,
                46000.0,
                None,
                None,
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(action.action, "close");

        let trades = store.list_trades_for_user("u1").await.unwrap();
        assert_eq!(trades.len(), 1);
        assert!(trades[0].pnl.is_some());
    }

    #[tokio::test]
    async fn exit_with_no_open_trades_is_a_skip() {
        let (mgr, _store) = manager();
        let cfg = config(1, true, false);
        let action = mgr
            .apply(
                "u1",
                &cfg,
                "BTCUSDT",
                "S2",
                Signal::SlHit,
                44000.0,
                None,
                None,
                None,
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(action.action, "skip");
    }

    #[tokio::test]
    async fn trade_number_targeting_closes_only_that_trade() {
        let (mgr, store) = manager();
        let cfg = config(2, true, false);
        mgr.apply("u1", &cfg, "BTCUSDT", "S2", Signal::Buy, 45000.0, None, None, None, Utc::now())
            .await
            .unwrap();
        mgr.apply("u1", &cfg, "BTCUSDT", "S2", Signal::Sell, 45100.0, None, None, None, Utc::now())
            .await
            .unwrap();

        let open_before = store.list_open_trades("u1", "cfg-1").await.unwrap();
        let target_number = open_before[0].trade_number;

        mgr.apply(
            "u1",
            &cfg,
            "BTCUSDT",
            "S2",
            Signal::TpHit,
            46000.0,
            None,
            None,
            Some(target_number),
            Utc::now(),
        )
        .await
        .unwrap();

        let open_after = store.list_open_trades("u1", "cfg-1").await.unwrap();
        assert_eq!(open_after.len(), 1);
        assert_ne!(open_after[0].trade_number, target_number);
    }
}
