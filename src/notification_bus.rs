// Outbound notification abstraction. Channel-agnostic: formatting for
// Telegram/email/etc. happens on the far side of this trait, which is
// intentionally out of scope here. Modeled on the notification-service
// crate's `NotificationChannel` trait plus fire-and-forget dispatch helper.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::types::NotificationKind;

#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub user_id: String,
    pub kind: NotificationKind,
    pub body: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("delivery failed: {0}")]
    DeliveryFailed(String),
}

#[async_trait]
pub trait NotificationBus: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError>;
}

/// Default bus: logs every notification at `info!` level. Stands in for a
/// real downstream channel until one is wired up; always succeeds.
pub struct LoggingNotificationBus;

#[async_trait]
impl NotificationBus for LoggingNotificationBus {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        tracing::info!(
            user_id = %notification.user_id,
            kind = %notification.kind,
            body = %notification.body,
            "notification dispatched"
        );
        Ok(())
    }
}

/// Captures every delivery attempt in-memory; used by dispatcher/scheduler
/// tests to assert on what was sent, and optionally primed to fail the next
/// N attempts to exercise retry/backoff.
pub struct InMemoryNotificationBus {
    sent: RwLock<Vec<Notification>>,
    fail_next: RwLock<u32>,
}

impl Default for InMemoryNotificationBus {
    fn default() -> Self {
        Self {
            sent: RwLock::new(Vec::new()),
            fail_next: RwLock::new(0),
        }
    }
}

impl InMemoryNotificationBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_next_n(&self, n: u32) {
        *self.fail_next.write() = n;
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.read().clone()
    }
}

#[async_trait]
impl NotificationBus for InMemoryNotificationBus {
    async fn send(&self, notification: &Notification) -> Result<(), NotificationError> {
        {
            let mut remaining = self.fail_next.write();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(NotificationError::DeliveryFailed(
                    "simulated failure".to_string(),
                ));
            }
        }
        self.sent.write().push(notification.clone());
        Ok(())
    }
}

pub type SharedNotificationBus = Arc<dyn NotificationBus>;

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Notification {
        Notification {
            user_id: "u1".into(),
            kind: NotificationKind::Entry,
            body: "BUY BTCUSDT @ 45000".into(),
            metadata: serde_json::json!({}),
        }
    }

    #[tokio::test]
    async fn logging_bus_always_succeeds() {
        let bus = LoggingNotificationBus;
        assert!(bus.send(&sample()).await.is_ok());
    }

    #[tokio::test]
    async fn in_memory_bus_records_sent_notifications() {
        let bus = InMemoryNotificationBus::new();
        bus.send(&sample()).await.unwrap();
        assert_eq!(bus.sent().len(), 1);
    }

    #[tokio::test]
    async fn in_memory_bus_can_simulate_failures() {
        let bus = InMemoryNotificationBus::new();
        bus.fail_next_n(2);
        assert!(bus.send(&sample()).await.is_err());
        assert!(bus.send(&sample()).await.is_err());
        assert!(bus.send(&sample()).await.is_ok());
        assert_eq!(bus.sent().len(), 1);
    }
}
