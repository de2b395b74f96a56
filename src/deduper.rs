// Short-TTL fingerprint set used to make webhook intake idempotent. Modeled
// on the brute-force guard's `DashMap<String, _>` TTL-tracker shape.

use dashmap::DashMap;
use std::time::{Duration, Instant};

use crate::clock::Clock;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    Fresh,
    Duplicate,
}

pub struct Deduper {
    seen: DashMap<String, Instant>,
    ttl: Duration,
    clock_anchor: Instant,
}

impl Deduper {
    pub fn new(ttl: Duration) -> Self {
        Self {
            seen: DashMap::new(),
            ttl,
            clock_anchor: Instant::now(),
        }
    }

    /// Record an observation of `fingerprint`. Returns `Fresh` the first
    /// time it is seen within the TTL window, `Duplicate` thereafter.
    ///
    /// Uses `Instant` (monotonic, process-local) rather than the injectable
    /// `Clock`, since TTL bookkeeping only needs wall-clock-independent
    /// elapsed time, not a value tests need to control absolutely.
    pub fn observe(&self, fingerprint: &str) -> Observation {
        let now = Instant::now();
        self.evict_expired(now);

        match self.seen.entry(fingerprint.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(entry) => {
                if now.duration_since(*entry.get()) < self.ttl {
                    Observation::Duplicate
                } else {
                    // Expired entry we haven't swept yet; treat as fresh.
                    drop(entry);
                    self.seen.insert(fingerprint.to_string(), now);
                    Observation::Fresh
                }
            }
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(now);
                Observation::Fresh
            }
        }
    }

    fn evict_expired(&self, now: Instant) {
        // Lazy sweep: bound the cost by only running when the map has grown
        // past a small multiple of what a single TTL window should hold.
        if self.seen.len() < 4096 {
            return;
        }
        self.seen.retain(|_, at| now.duration_since(*at) < self.ttl);
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// Deterministic hash of a canonicalized webhook payload, used as the
/// dedup key. Price is rounded to 8 decimals and any provided timestamp is
/// truncated to the minute so that sub-second resends of the same signal
/// collide.
pub fn fingerprint(
    symbol: &str,
    timeframe: &str,
    strategy: &str,
    signal: &str,
    price: f64,
    trade_number: Option<i64>,
    timestamp_minute: Option<i64>,
) -> String {
    use sha2::{Digest, Sha256};
    let rounded_price = (price * 1e8).round() / 1e8;
    let canonical = format!(
        "{}|{}|{}|{}|{:.8}|{}|{}",
        symbol,
        timeframe,
        strategy,
        signal,
        rounded_price,
        trade_number.map(|n| n.to_string()).unwrap_or_default(),
        timestamp_minute.map(|m| m.to_string()).unwrap_or_default(),
    );
    let digest = Sha256::digest(canonical.as_bytes());
    hex::encode(digest)
}

/// Injectable-clock-aware wrapper kept for API symmetry with the rest of the
/// engine; the TTL logic above intentionally uses `Instant` directly.
pub fn ttl_from_secs(secs: u64, _clock: &Arc<dyn Clock>) -> Duration {
    Duration::from_secs(secs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread::sleep;

    #[test]
    fn first_observation_is_fresh() {
        let d = Deduper::new(Duration::from_secs(60));
        assert_eq!(d.observe("fp1"), Observation::Fresh);
    }

    #[test]
    fn repeated_observation_within_ttl_is_duplicate() {
        let d = Deduper::new(Duration::from_secs(60));
        assert_eq!(d.observe("fp1"), Observation::Fresh);
        assert_eq!(d.observe("fp1"), Observation::Duplicate);
        assert_eq!(d.observe("fp1"), Observation::Duplicate);
    }

    #[test]
    fn observation_after_ttl_expiry_is_fresh_again() {
        let d = Deduper::new(Duration::from_millis(20));
        assert_eq!(d.observe("fp1"), Observation::Fresh);
        sleep(Duration::from_millis(40));
        assert_eq!(d.observe("fp1"), Observation::Fresh);
    }

    #[test]
    fn distinct_fingerprints_do_not_collide() {
        let d = Deduper::new(Duration::from_secs(60));
        assert_eq!(d.observe("fp1"), Observation::Fresh);
        assert_eq!(d.observe("fp2"), Observation::Fresh);
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let a = fingerprint("BTCUSDT", "5m", "S2", "BUY", 45000.5, None, Some(100));
        let b = fingerprint("BTCUSDT", "5m", "S2", "BUY", 45000.5, None, Some(100));
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_differs_on_price_change() {
        let a = fingerprint("BTCUSDT", "5m", "S2", "BUY", 45000.5, None, Some(100));
        let b = fingerprint("BTCUSDT", "5m", "S2", "BUY", 45001.5, None, Some(100));
        assert_ne!(a, b);
    }
}
