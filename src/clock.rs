// Injectable time source. The scheduler, deduper and cooldown logic all read
// "now" through this trait so tests can drive them without real sleeps.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock that only advances when told to. Used by tests that need exact
/// control over cooldowns, TTL expiry and crossing sequences.
#[derive(Clone)]
pub struct ManualClock {
    inner: Arc<RwLock<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(start)),
        }
    }

    pub fn advance(&self, duration: chrono::Duration) {
        let mut guard = self.inner.write();
        *guard += duration;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.inner.write() = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.inner.read()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances() {
        let start = DateTime::parse_from_rfc3339("2026-01-01T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);
        clock.advance(chrono::Duration::seconds(30));
        assert_eq!(clock.now(), start + chrono::Duration::seconds(30));
    }

    #[test]
    fn system_clock_moves_forward() {
        let clock = SystemClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
