// =============================================================================
// Central Application State — Evalbot Alert Engine
// =============================================================================
//
// The single source of truth tying every subsystem together. Each subsystem
// holds its own interior mutability; AppState just wires the Arcs together
// and exposes the atomic version counter the rest of the engine bumps on
// every meaningful mutation.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - Arc<dyn Trait> for every externally-owned concern (store, market data,
//     notifications, identity).
//   - parking_lot::RwLock only where a subsystem genuinely needs shared
//     mutable state (none at this layer currently).
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::{mpsc, watch};

use crate::config::{EngineConfig, Secrets};
use crate::dispatcher::Dispatcher;
use crate::ingestion::IngestionPipeline;
use crate::market_data::SharedMarketDataProvider;
use crate::metrics::Metrics;
use crate::notification_bus::SharedNotificationBus;
use crate::principal_directory::SharedPrincipalDirectory;
use crate::processor::Processor;
use crate::scheduler::Scheduler;
use crate::store::SharedAlertStore;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    /// Monotonically increasing version counter, bumped on every admin
    /// mutation. Exposed on snapshots so long-poll clients can detect change
    /// without diffing the payload themselves.
    pub state_version: AtomicU64,

    pub config: EngineConfig,
    pub secrets: Secrets,

    pub store: SharedAlertStore,
    pub market_data: SharedMarketDataProvider,
    pub notifications: SharedNotificationBus,
    pub principals: SharedPrincipalDirectory,
    pub dispatcher: Arc<Dispatcher>,
    pub metrics: Arc<Metrics>,
    pub scheduler: Arc<Scheduler>,

    /// Ingestion queue producer; the webhook handler calls `ingest` on this
    /// directly, the `Processor` owns the matching receiver end.
    pub ingestion: Arc<IngestionPipeline>,

    pub start_time: std::time::Instant,
}

impl AppState {
    /// Wire every subsystem from `config`/`secrets` plus the externally-owned
    /// dependencies (store, market data, notifications, identity) supplied by
    /// the caller. Returns the state plus the processor task and shutdown
    /// sender that `main` is responsible for spawning/holding.
    pub fn new(
        config: EngineConfig,
        secrets: Secrets,
        store: SharedAlertStore,
        market_data: SharedMarketDataProvider,
        notifications: SharedNotificationBus,
        principals: SharedPrincipalDirectory,
    ) -> (Arc<Self>, Processor, mpsc::Receiver<String>, watch::Sender<bool>) {
        let metrics = Arc::new(Metrics::new());
        let dispatcher = Arc::new(Dispatcher::new(notifications.clone(), config.dispatcher.clone()));

        let (ingestion, receiver) = IngestionPipeline::new(
            store.clone(),
            secrets.webhook_hmac_secret.clone(),
            Arc::new(crate::clock::SystemClock),
            config.concurrency.ingestion_queue_capacity,
            metrics.clone(),
            config.concurrency.backpressure_deadline_ms,
        );

        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            market_data.clone(),
            dispatcher.clone(),
            metrics.clone(),
            config.scheduler.clone(),
            config.concurrency.scheduler_workers,
        ));

        let processor = Processor::new(
            store.clone(),
            dispatcher.clone(),
            principals.clone(),
            market_data.clone(),
            metrics.clone(),
        );

        let (shutdown_tx, _) = watch::channel(false);

        let state = Arc::new(Self {
            state_version: AtomicU64::new(1),
            config,
            secrets,
            store,
            market_data,
            notifications,
            principals,
            dispatcher,
            metrics,
            scheduler,
            ingestion: Arc::new(ingestion),
            start_time: std::time::Instant::now(),
        });

        (state, processor, receiver, shutdown_tx)
    }

    /// Atomically increment the state version. Call this after every
    /// admin-visible mutation (configuration create/update, user alert
    /// create/update).
    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
