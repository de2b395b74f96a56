// =============================================================================
// Evalbot — Trading Alert Distribution Engine — Entrypoint
// =============================================================================
//
// Wires configuration, the durable store, the externally-owned concerns
// (market data, notifications, identity), and the three long-running tasks
// (ingestion HTTP server, matching processor, evaluation scheduler), then
// waits for Ctrl+C to drain and exit cleanly.
// =============================================================================

mod api;
mod app_state;
mod clock;
mod condition_eval;
mod config;
mod deduper;
mod dispatcher;
mod domain;
mod error;
mod indicators;
mod ingestion;
mod market_data;
mod matcher;
mod metrics;
mod notification_bus;
mod principal_directory;
mod processor;
mod scheduler;
mod store;
mod trade_manager;
mod types;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::{EngineConfig, Secrets};
use crate::market_data::{HttpMarketDataProvider, SharedMarketDataProvider};
use crate::notification_bus::{LoggingNotificationBus, SharedNotificationBus};
use crate::principal_directory::{InMemoryPrincipalDirectory, SharedPrincipalDirectory};
use crate::store::{InMemoryAlertStore, SharedAlertStore};

const CONFIG_PATH: &str = "evalbot.config.json";

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = EngineConfig::load_or_default(CONFIG_PATH);
    let secrets = Secrets::from_env();

    if secrets.webhook_hmac_secret.is_none() && config.require_webhook_signature {
        warn!("require_webhook_signature is set but EVALBOT_WEBHOOK_SECRET is unset; all webhooks will be rejected");
    }
    if secrets.admin_token.is_none() {
        warn!("EVALBOT_ADMIN_TOKEN is unset; the admin REST surface will reject every request");
    }

    let store: SharedAlertStore = Arc::new(InMemoryAlertStore::new(Duration::from_secs(
        config.dedup_ttl_secs,
    )));
    let market_data: SharedMarketDataProvider = Arc::new(HttpMarketDataProvider::new(
        std::env::var("EVALBOT_MARKET_DATA_URL")
            .unwrap_or_else(|_| "http://localhost:9100".to_string()),
    ));
    let notifications: SharedNotificationBus = Arc::new(LoggingNotificationBus);
    let principals: SharedPrincipalDirectory = Arc::new(InMemoryPrincipalDirectory::new());

    let (state, processor, receiver, shutdown_tx) = app_state::AppState::new(
        config.clone(),
        secrets,
        store,
        market_data,
        notifications,
        principals,
    );

    let processor_handle = tokio::spawn(processor.run(receiver));

    let scheduler = state.scheduler.clone();
    let scheduler_shutdown_rx = shutdown_tx.subscribe();
    let scheduler_handle = tokio::spawn(scheduler.run(scheduler_shutdown_rx));

    let bind_addr: SocketAddr = config
        .bind_addr
        .parse()
        .unwrap_or_else(|_| "0.0.0.0:8080".parse().unwrap());

    let app = api::router(state.clone());
    let listener = match tokio::net::TcpListener::bind(bind_addr).await {
        Ok(l) => l,
        Err(e) => {
            error!(error = %e, addr = %bind_addr, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };
    info!(addr = %bind_addr, "evalbot listening");

    let server = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal());

    if let Err(e) = server.await {
        error!(error = %e, "HTTP server exited with error");
    }

    info!("shutdown signal received, stopping scheduler and draining ingestion queue");
    let _ = shutdown_tx.send(true);

    let drain = Duration::from_secs(config.concurrency.shutdown_drain_secs);
    if tokio::time::timeout(drain, processor_handle).await.is_err() {
        warn!("processor did not drain within the shutdown deadline; exiting anyway");
    }
    let _ = tokio::time::timeout(drain, scheduler_handle).await;

    info!("evalbot stopped");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
