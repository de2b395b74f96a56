// Lock-free counters for the ingestion/matching/trade/dispatch pipeline,
// plus the liveness/readiness flags the HTTP layer exposes. Mirrors the
// teacher's `AtomicU64` counter style (see `app_state::state_version`)
// rather than pulling in a metrics crate the rest of the stack doesn't use.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

#[derive(Default)]
pub struct Metrics {
    pub alerts_ingested: AtomicU64,
    pub alerts_duplicated: AtomicU64,
    pub alerts_rejected: AtomicU64,
    pub alerts_matched: AtomicU64,
    pub alerts_unmatched: AtomicU64,

    pub trades_opened: AtomicU64,
    pub trades_closed: AtomicU64,
    pub trades_replaced: AtomicU64,
    pub trades_skipped: AtomicU64,

    pub notifications_sent: AtomicU64,
    pub notifications_failed: AtomicU64,

    pub user_alerts_evaluated: AtomicU64,
    pub user_alerts_triggered: AtomicU64,
    pub user_alerts_eval_failed: AtomicU64,

    pub ingestion_queue_depth: AtomicU64,
    pub ingestion_queue_dropped: AtomicU64,

    /// Set once a `CoreError::Internal` (an unrecoverable invariant
    /// violation) has been observed anywhere in the pipeline. `/readyz`
    /// flips to unready and stays that way; the process is expected to be
    /// restarted, not self-heal.
    fatal_fault: AtomicBool,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fatal_fault(&self) {
        self.fatal_fault.store(true, Ordering::SeqCst);
    }

    pub fn is_ready(&self) -> bool {
        !self.fatal_fault.load(Ordering::SeqCst)
    }

    pub fn set_queue_depth(&self, depth: u64) {
        self.ingestion_queue_depth.store(depth, Ordering::Relaxed);
    }

    /// A point-in-time JSON snapshot of every counter, used by the
    /// `/api/v1/metrics` endpoint.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            alerts_ingested: self.alerts_ingested.load(Ordering::Relaxed),
            alerts_duplicated: self.alerts_duplicated.load(Ordering::Relaxed),
            alerts_rejected: self.alerts_rejected.load(Ordering::Relaxed),
            alerts_matched: self.alerts_matched.load(Ordering::Relaxed),
            alerts_unmatched: self.alerts_unmatched.load(Ordering::Relaxed),
            trades_opened: self.trades_opened.load(Ordering::Relaxed),
            trades_closed: self.trades_closed.load(Ordering::Relaxed),
            trades_replaced: self.trades_replaced.load(Ordering::Relaxed),
            trades_skipped: self.trades_skipped.load(Ordering::Relaxed),
            notifications_sent: self.notifications_sent.load(Ordering::Relaxed),
            notifications_failed: self.notifications_failed.load(Ordering::Relaxed),
            user_alerts_evaluated: self.user_alerts_evaluated.load(Ordering::Relaxed),
            user_alerts_triggered: self.user_alerts_triggered.load(Ordering::Relaxed),
            user_alerts_eval_failed: self.user_alerts_eval_failed.load(Ordering::Relaxed),
            ingestion_queue_depth: self.ingestion_queue_depth.load(Ordering::Relaxed),
            ingestion_queue_dropped: self.ingestion_queue_dropped.load(Ordering::Relaxed),
            ready: self.is_ready(),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub alerts_ingested: u64,
    pub alerts_duplicated: u64,
    pub alerts_rejected: u64,
    pub alerts_matched: u64,
    pub alerts_unmatched: u64,
    pub trades_opened: u64,
    pub trades_closed: u64,
    pub trades_replaced: u64,
    pub trades_skipped: u64,
    pub notifications_sent: u64,
    pub notifications_failed: u64,
    pub user_alerts_evaluated: u64,
    pub user_alerts_triggered: u64,
    pub user_alerts_eval_failed: u64,
    pub ingestion_queue_depth: u64,
    pub ingestion_queue_dropped: u64,
    pub ready: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_metrics_start_ready_and_zeroed() {
        let m = Metrics::new();
        assert!(m.is_ready());
        let snap = m.snapshot();
        assert_eq!(snap.alerts_ingested, 0);
        assert!(snap.ready);
    }

    #[test]
    fn fatal_fault_flips_readiness_permanently() {
        let m = Metrics::new();
        m.record_fatal_fault();
        assert!(!m.is_ready());
        m.alerts_ingested.fetch_add(1, Ordering::Relaxed);
        // A later successful operation never clears the fault.
        assert!(!m.is_ready());
    }

    #[test]
    fn counters_accumulate_independently() {
        let m = Metrics::new();
        m.alerts_ingested.fetch_add(3, Ordering::Relaxed);
        m.trades_opened.fetch_add(1, Ordering::Relaxed);
        let snap = m.snapshot();
        assert_eq!(snap.alerts_ingested, 3);
        assert_eq!(snap.trades_opened, 1);
        assert_eq!(snap.trades_closed, 0);
    }
}
