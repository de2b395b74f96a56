// Verify -> validate -> dedup -> persist -> enqueue. The HTTP boundary calls
// `ingest` and gets a decision back without waiting for matching to run;
// matching happens off the bounded channel this pipeline feeds.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::clock::Clock;
use crate::deduper::fingerprint;
use crate::domain::IncomingAlert;
use crate::error::{CoreError, CoreResult};
use crate::ingestion::signature;
use crate::ingestion::validation::{self, WebhookPayload};
use crate::metrics::Metrics;
use crate::store::SharedAlertStore;

#[derive(Debug, Clone)]
pub enum IngestOutcome {
    Received { alert_id: String },
    Duplicate,
}

pub struct IngestionPipeline {
    store: SharedAlertStore,
    webhook_secret: Option<String>,
    clock: Arc<dyn Clock>,
    sender: mpsc::Sender<String>,
    metrics: Arc<Metrics>,
    /// How long a caller is willing to block on a saturated ingestion queue
    /// before giving up and returning 429.
    enqueue_deadline: Duration,
}

impl IngestionPipeline {
    pub fn new(
        store: SharedAlertStore,
        webhook_secret: Option<String>,
        clock: Arc<dyn Clock>,
        queue_capacity: usize,
        metrics: Arc<Metrics>,
        backpressure_deadline_ms: u64,
    ) -> (Self, mpsc::Receiver<String>) {
        let (sender, receiver) = mpsc::channel(queue_capacity);
        (
            Self {
                store,
                webhook_secret,
                clock,
                sender,
                metrics,
                enqueue_deadline: Duration::from_millis(backpressure_deadline_ms),
            },
            receiver,
        )
    }

    pub async fn ingest(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        source_ip: Option<String>,
    ) -> CoreResult<IngestOutcome> {
        let result = self.ingest_inner(body, signature_header, source_ip).await;
        if matches!(result, Err(CoreError::Auth(_)) | Err(CoreError::Validation(_))) {
            self.metrics
                .alerts_rejected
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }
        if let Err(e) = &result {
            if e.is_fatal() {
                self.metrics.record_fatal_fault();
            }
        }
        result
    }

    async fn ingest_inner(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        source_ip: Option<String>,
    ) -> CoreResult<IngestOutcome> {
        if let Some(secret) = &self.webhook_secret {
            let header = signature_header
                .ok_or_else(|| CoreError::Auth("missing X-TradingView-Signature header".to_string()))?;
            if !signature::verify(secret, body, header) {
                return Err(CoreError::Auth("signature mismatch".to_string()));
            }
        }

        let payload: WebhookPayload = serde_json::from_slice(body)
            .map_err(|e| CoreError::Validation(format!("invalid JSON body: {e}")))?;
        let timestamp_minute = payload.timestamp.map(|ts| ts.timestamp() / 60);

        let data = validation::validate(payload)?;

        let fp = fingerprint(
            &data.symbol,
            &data.timeframe.to_string(),
            &data.strategy,
            &data.signal.to_string(),
            data.price,
            data.trade_number,
            timestamp_minute,
        );

        if self.store.fingerprint_seen(&fp) {
            self.metrics
                .alerts_duplicated
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
            return Ok(IngestOutcome::Duplicate);
        }

        let id = Uuid::new_v4().to_string();
        let received_at = self.clock.now();
        let alert = IncomingAlert::new(id.clone(), received_at, source_ip, fp, data);
        self.store.create_incoming_alert(alert).await?;

        match tokio::time::timeout(self.enqueue_deadline, self.sender.send(id.clone())).await {
            Ok(Ok(())) => {
                self.metrics
                    .alerts_ingested
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                self.metrics.set_queue_depth(
                    (self.sender.max_capacity() - self.sender.capacity()) as u64,
                );
                Ok(IngestOutcome::Received { alert_id: id })
            }
            Ok(Err(_)) => Err(CoreError::Internal("ingestion queue closed".to_string())),
            Err(_) => {
                self.metrics
                    .ingestion_queue_dropped
                    .fetch_add(1, std::sync::atomic::Ordering::Relaxed);
                Err(CoreError::RateLimited("ingestion queue saturated".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::store::InMemoryAlertStore;

    fn metrics() -> Arc<Metrics> {
        Arc::new(Metrics::new())
    }

    fn body() -> Vec<u8> {
        serde_json::json!({
            "symbol": "BTCUSDT",
            "timeframe": "5m",
            "strategy": "S2",
            "signal": "BUY",
            "price": 45000.0,
            "takeProfitPrice": 46000.0,
            "stopLossPrice": 44000.0,
        })
        .to_string()
        .into_bytes()
    }

    fn pipeline() -> (IngestionPipeline, mpsc::Receiver<String>) {
        let store: SharedAlertStore = Arc::new(InMemoryAlertStore::new(Duration::from_secs(60)));
        IngestionPipeline::new(store, None, Arc::new(SystemClock), 16, metrics(), 2_000)
    }

    #[tokio::test]
    async fn accepts_and_enqueues_a_fresh_alert() {
        let (pipeline, mut rx) = pipeline();
        let outcome = pipeline.ingest(&body(), None, None).await.unwrap();
        match outcome {
            IngestOutcome::Received { alert_id } => {
                let queued = rx.recv().await.unwrap();
                assert_eq!(queued, alert_id);
            }
            _ => panic!("expected Received"),
        }
    }

    #[tokio::test]
    async fn second_delivery_of_same_payload_is_deduped() {
        let (pipeline, _rx) = pipeline();
        let first = pipeline.ingest(&body(), None, None).await.unwrap();
        assert!(matches!(first, IngestOutcome::Received { .. }));
        let second = pipeline.ingest(&body(), None, None).await.unwrap();
        assert!(matches!(second, IngestOutcome::Duplicate));
    }

    #[tokio::test]
    async fn rejects_missing_signature_when_secret_configured() {
        let store: SharedAlertStore = Arc::new(InMemoryAlertStore::new(Duration::from_secs(60)));
        let (pipeline, _rx) = IngestionPipeline::new(store, Some("topsecret".into()), Arc::new(SystemClock), 16, metrics(), 2_000);
        let result = pipeline.ingest(&body(), None, None).await;
        assert!(matches!(result, Err(CoreError::Auth(_))));
    }

    #[tokio::test]
    async fn accepts_a_correctly_signed_body() {
        let store: SharedAlertStore = Arc::new(InMemoryAlertStore::new(Duration::from_secs(60)));
        let (pipeline, _rx) =
            IngestionPipeline::new(store, Some("topsecret".into()), Arc::new(SystemClock), 16, metrics(), 2_000);
        let b = body();
        let header = {
            use hmac::{Hmac, Mac};
            use sha2::Sha256;
            let mut mac = Hmac::<Sha256>::new_from_slice(b"topsecret").unwrap();
            mac.update(&b);
            format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
        };
        let result = pipeline.ingest(&b, Some(&header), None).await;
        assert!(matches!(result, Ok(IngestOutcome::Received { .. })));
    }

    #[tokio::test]
    async fn rejects_malformed_json() {
        let (pipeline, _rx) = pipeline();
        let result = pipeline.ingest(b"not json", None, None).await;
        assert!(matches!(result, Err(CoreError::Validation(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn returns_rate_limited_when_queue_is_saturated() {
        let store: SharedAlertStore = Arc::new(InMemoryAlertStore::new(Duration::from_secs(60)));
        let (pipeline, _rx) = IngestionPipeline::new(store, None, Arc::new(SystemClock), 1, metrics(), 2_000);
        // Fill the single queue slot without draining it.
        let first = serde_json::json!({
            "symbol": "BTCUSDT", "timeframe": "5m", "strategy": "S2", "signal": "BUY", "price": 1.0
        })
        .to_string()
        .into_bytes();
        pipeline.ingest(&first, None, None).await.unwrap();

        let second = serde_json::json!({
            "symbol": "ETHUSDT", "timeframe": "5m", "strategy": "S2", "signal": "BUY", "price": 2.0
        })
        .to_string()
        .into_bytes();
        let result = pipeline.ingest(&second, None, None).await;
        assert!(matches!(result, Err(CoreError::RateLimited(_))));
    }
}
