// =============================================================================
// Engine Configuration — hot-reloadable settings with atomic save
// =============================================================================
//
// Central configuration hub for the alert engine. Every tunable parameter
// lives here so that operational behaviour (queue sizes, scheduler cadence,
// retry policy) can be changed without a rebuild.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash. All fields carry a serde default so adding new fields never breaks
// loading an older config file. Secrets (the webhook HMAC key, the admin
// bearer token) are never persisted to the config file — they are read from
// the environment at startup and layered on top of whatever was loaded.
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_dedup_ttl_secs() -> u64 {
    60
}

fn default_ingestion_queue_capacity() -> usize {
    1024
}

fn default_backpressure_deadline_ms() -> u64 {
    2_000
}

fn default_scheduler_workers() -> usize {
    5
}

fn default_scheduler_tick_secs() -> u64 {
    5
}

fn default_scheduler_batch_size() -> usize {
    100
}

fn default_dispatcher_base_backoff_ms() -> u64 {
    1_000
}

fn default_dispatcher_backoff_factor() -> u32 {
    2
}

fn default_dispatcher_max_attempts() -> u32 {
    5
}

fn default_dispatcher_max_backoff_ms() -> u64 {
    30_000
}

fn default_scheduler_max_backoff_ms() -> i64 {
    3_600_000
}

fn default_shutdown_drain_secs() -> u64 {
    10
}

/// Tunable parameters governing the bounded worker pools (§5 of the design).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyParams {
    #[serde(default = "default_ingestion_queue_capacity")]
    pub ingestion_queue_capacity: usize,

    #[serde(default = "default_backpressure_deadline_ms")]
    pub backpressure_deadline_ms: u64,

    #[serde(default = "default_scheduler_workers")]
    pub scheduler_workers: usize,

    #[serde(default = "default_shutdown_drain_secs")]
    pub shutdown_drain_secs: u64,
}

impl Default for ConcurrencyParams {
    fn default() -> Self {
        Self {
            ingestion_queue_capacity: default_ingestion_queue_capacity(),
            backpressure_deadline_ms: default_backpressure_deadline_ms(),
            scheduler_workers: default_scheduler_workers(),
            shutdown_drain_secs: default_shutdown_drain_secs(),
        }
    }
}

/// Tunable parameters for the evaluation scheduler tick loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerParams {
    #[serde(default = "default_scheduler_tick_secs")]
    pub tick_secs: u64,

    #[serde(default = "default_scheduler_batch_size")]
    pub batch_size: usize,

    /// Cap, in milliseconds, on the exponential backoff applied to
    /// `nextCheck` after a failed evaluation.
    #[serde(default = "default_scheduler_max_backoff_ms")]
    pub max_backoff_ms: i64,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            tick_secs: default_scheduler_tick_secs(),
            batch_size: default_scheduler_batch_size(),
            max_backoff_ms: default_scheduler_max_backoff_ms(),
        }
    }
}

/// Tunable parameters for the dispatcher's retry/backoff policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatcherParams {
    #[serde(default = "default_dispatcher_base_backoff_ms")]
    pub base_backoff_ms: u64,

    #[serde(default = "default_dispatcher_backoff_factor")]
    pub backoff_factor: u32,

    #[serde(default = "default_dispatcher_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_dispatcher_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for DispatcherParams {
    fn default() -> Self {
        Self {
            base_backoff_ms: default_dispatcher_base_backoff_ms(),
            backoff_factor: default_dispatcher_backoff_factor(),
            max_attempts: default_dispatcher_max_attempts(),
            max_backoff_ms: default_dispatcher_max_backoff_ms(),
        }
    }
}

/// Top-level engine configuration.
///
/// Every field has a serde default so that older JSON files missing new
/// fields still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Address the webhook/admin HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// TTL for the ingestion dedup fingerprint set.
    #[serde(default = "default_dedup_ttl_secs")]
    pub dedup_ttl_secs: u64,

    #[serde(default)]
    pub concurrency: ConcurrencyParams,

    #[serde(default)]
    pub scheduler: SchedulerParams,

    #[serde(default)]
    pub dispatcher: DispatcherParams,

    /// Whether webhook signature verification is required. Only disabled in
    /// local development; production deployments must set a secret.
    #[serde(default = "default_true")]
    pub require_webhook_signature: bool,
}

fn default_true() -> bool {
    true
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            dedup_ttl_secs: default_dedup_ttl_secs(),
            concurrency: ConcurrencyParams::default(),
            scheduler: SchedulerParams::default(),
            dispatcher: DispatcherParams::default(),
            require_webhook_signature: true,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning (the `main.rs` convention).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        info!(
            path = %path.display(),
            bind_addr = %config.bind_addr,
            scheduler_workers = config.concurrency.scheduler_workers,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename) so a crash mid-write never corrupts it.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Load from `path`, falling back to defaults with a warning if the file
    /// is missing or unparsable — startup never fails over an optional
    /// config file.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(&path) {
            Ok(cfg) => cfg,
            Err(e) => {
                warn!(error = %e, "failed to load engine config, using defaults");
                Self::default()
            }
        }
    }
}

/// Secrets layered on top of `EngineConfig` from the environment. Never
/// serialized into the config file.
#[derive(Clone)]
pub struct Secrets {
    pub webhook_hmac_secret: Option<String>,
    pub admin_token: Option<String>,
}

impl Secrets {
    pub fn from_env() -> Self {
        Self {
            webhook_hmac_secret: std::env::var("EVALBOT_WEBHOOK_SECRET")
                .ok()
                .filter(|s| !s.is_empty()),
            admin_token: std::env::var("EVALBOT_ADMIN_TOKEN")
                .ok()
                .filter(|s| !s.is_empty()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.dedup_ttl_secs, 60);
        assert_eq!(cfg.concurrency.ingestion_queue_capacity, 1024);
        assert_eq!(cfg.concurrency.backpressure_deadline_ms, 2_000);
        assert_eq!(cfg.scheduler.tick_secs, 5);
        assert_eq!(cfg.scheduler.batch_size, 100);
        assert!(cfg.require_webhook_signature);
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.concurrency.scheduler_workers, 5);
        assert!(cfg.require_webhook_signature);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "bind_addr": "127.0.0.1:9000", "dedup_ttl_secs": 120 }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.bind_addr, "127.0.0.1:9000");
        assert_eq!(cfg.dedup_ttl_secs, 120);
        assert_eq!(cfg.scheduler.batch_size, 100);
    }

    #[test]
    fn roundtrip_serialisation() {
        let cfg = EngineConfig::default();
        let json = serde_json::to_string(&cfg).unwrap();
        let cfg2: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(cfg.bind_addr, cfg2.bind_addr);
        assert_eq!(
            cfg.concurrency.ingestion_queue_capacity,
            cfg2.concurrency.ingestion_queue_capacity
        );
    }

    #[test]
    fn save_and_load_roundtrip() {
        let dir = std::env::temp_dir().join(format!("evalbot-cfg-test-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine.json");

        let mut cfg = EngineConfig::default();
        cfg.bind_addr = "0.0.0.0:9999".to_string();
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.bind_addr, "0.0.0.0:9999");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let cfg = EngineConfig::load_or_default("/nonexistent/path/evalbot.json");
        assert_eq!(cfg.bind_addr, default_bind_addr());
    }
}
