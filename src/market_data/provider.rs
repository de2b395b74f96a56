// External market-data abstraction consumed by the scheduler and the
// condition-evaluation engine. Real acquisition (exchange/aggregator wire
// formats, reconnect policy) is explicitly out of scope; this module defines
// the interface plus a concrete `reqwest`-backed implementation in the same
// idiom as the engine's own signed HTTP client, and an in-memory test double.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{CoreError, CoreResult};
use crate::market_data::Candle;

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub price: f64,
    pub volume: f64,
    pub change: f64,
    pub change_percent: f64,
    pub market_cap: Option<f64>,
    pub as_of: DateTime<Utc>,
}

#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn get_snapshot(&self, symbol: &str, venue: &str) -> CoreResult<Snapshot>;
    async fn get_history(&self, symbol: &str, venue: &str, limit: usize) -> CoreResult<Vec<Candle>>;
}

/// `reqwest`-backed provider hitting a configurable upstream aggregator.
/// A plain struct over a shared `reqwest::Client`, mapping transport
/// failures to `ExternalUnavailable`.
pub struct HttpMarketDataProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpMarketDataProvider {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl MarketDataProvider for HttpMarketDataProvider {
    async fn get_snapshot(&self, symbol: &str, venue: &str) -> CoreResult<Snapshot> {
        let url = format!("{}/snapshot?symbol={}&venue={}", self.base_url, symbol, venue);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::ExternalUnavailable(format!("market data request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(CoreError::ExternalUnavailable(format!(
                "market data provider returned status {}",
                resp.status()
            )));
        }

        resp.json::<Snapshot>()
            .await
            .map_err(|e| CoreError::ExternalUnavailable(format!("bad snapshot payload: {e}")))
    }

    async fn get_history(&self, symbol: &str, venue: &str, limit: usize) -> CoreResult<Vec<Candle>> {
        let url = format!(
            "{}/history?symbol={}&venue={}&limit={}",
            self.base_url, symbol, venue, limit
        );
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| CoreError::ExternalUnavailable(format!("market data request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(CoreError::ExternalUnavailable(format!(
                "market data provider returned status {}",
                resp.status()
            )));
        }

        resp.json::<Vec<Candle>>()
            .await
            .map_err(|e| CoreError::ExternalUnavailable(format!("bad history payload: {e}")))
    }
}

// Serde impls for Snapshot, written by hand since `DateTime<Utc>` round-trips
// fine through chrono's serde feature but the struct itself isn't derived
// above (kept minimal on purpose -- this type only crosses the HTTP boundary
// here and in tests).
impl serde::Serialize for Snapshot {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("Snapshot", 6)?;
        s.serialize_field("price", &self.price)?;
        s.serialize_field("volume", &self.volume)?;
        s.serialize_field("change", &self.change)?;
        s.serialize_field("changePercent", &self.change_percent)?;
        s.serialize_field("marketCap", &self.market_cap)?;
        s.serialize_field("asOf", &self.as_of)?;
        s.end()
    }
}

impl<'de> serde::Deserialize<'de> for Snapshot {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(serde::Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct Raw {
            price: f64,
            volume: f64,
            change: f64,
            change_percent: f64,
            market_cap: Option<f64>,
            as_of: DateTime<Utc>,
        }
        let raw = Raw::deserialize(deserializer)?;
        Ok(Snapshot {
            price: raw.price,
            volume: raw.volume,
            change: raw.change,
            change_percent: raw.change_percent,
            market_cap: raw.market_cap,
            as_of: raw.as_of,
        })
    }
}

/// Deterministic in-memory provider for tests: a fixed map of
/// `(symbol, venue) -> Snapshot`/history, with no network, no sleeps.
#[derive(Default)]
pub struct InMemoryMarketDataProvider {
    snapshots: RwLock<HashMap<(String, String), Snapshot>>,
    histories: RwLock<HashMap<(String, String), Vec<Candle>>>,
}

impl InMemoryMarketDataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_snapshot(&self, symbol: &str, venue: &str, snapshot: Snapshot) {
        self.snapshots
            .write()
            .insert((symbol.to_string(), venue.to_string()), snapshot);
    }

    pub fn set_history(&self, symbol: &str, venue: &str, candles: Vec<Candle>) {
        self.histories
            .write()
            .insert((symbol.to_string(), venue.to_string()), candles);
    }
}

#[async_trait]
impl MarketDataProvider for InMemoryMarketDataProvider {
    async fn get_snapshot(&self, symbol: &str, venue: &str) -> CoreResult<Snapshot> {
        self.snapshots
            .read()
            .get(&(symbol.to_string(), venue.to_string()))
            .cloned()
            .ok_or_else(|| CoreError::ExternalUnavailable(format!("no snapshot for {symbol}@{venue}")))
    }

    async fn get_history(&self, symbol: &str, venue: &str, limit: usize) -> CoreResult<Vec<Candle>> {
        let guard = self.histories.read();
        match guard.get(&(symbol.to_string(), venue.to_string())) {
            Some(candles) => {
                let start = candles.len().saturating_sub(limit);
                Ok(candles[start..].to_vec())
            }
            None => Ok(Vec::new()),
        }
    }
}

pub type SharedMarketDataProvider = Arc<dyn MarketDataProvider>;
