// Formats triggered alerts/trade actions into channel-agnostic
// notifications and hands them to the `NotificationBus`, retrying
// transient failures with capped exponential backoff.

use std::time::Duration;

use crate::config::DispatcherParams;
use crate::notification_bus::{Notification, SharedNotificationBus};
use crate::types::NotificationKind;

#[derive(Debug, Clone)]
pub enum DispatchOutcome {
    Delivered { attempts: u32 },
    Failed { attempts: u32, error: String },
}

impl DispatchOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, DispatchOutcome::Delivered { .. })
    }
}

pub struct Dispatcher {
    bus: SharedNotificationBus,
    base_delay: Duration,
    backoff_factor: u32,
    max_attempts: u32,
    max_delay: Duration,
}

impl Dispatcher {
    pub fn new(bus: SharedNotificationBus, params: DispatcherParams) -> Self {
        Self {
            bus,
            base_delay: Duration::from_millis(params.base_backoff_ms),
            backoff_factor: params.backoff_factor,
            max_attempts: params.max_attempts,
            max_delay: Duration::from_millis(params.max_backoff_ms),
        }
    }

    /// Attempt delivery with capped exponential backoff. Never returns an
    /// `Err` — a final failure is reported in the outcome, not propagated,
    /// so the caller's evaluation loop is never re-opened for this trigger.
    pub async fn dispatch(&self, notification: Notification) -> DispatchOutcome {
        let mut delay = self.base_delay;
        for attempt in 1..=self.max_attempts {
            match self.bus.send(&notification).await {
                Ok(()) => return DispatchOutcome::Delivered { attempts: attempt },
                Err(e) => {
                    if attempt == self.max_attempts {
                        return DispatchOutcome::Failed {
                            attempts: attempt,
                            error: e.to_string(),
                        };
                    }
                    tokio::time::sleep(delay).await;
                    delay = (delay * self.backoff_factor).min(self.max_delay);
                }
            }
        }
        unreachable!("loop always returns within max_attempts iterations")
    }

    pub async fn dispatch_to_users(
        &self,
        user_ids: &[String],
        kind: NotificationKind,
        body: String,
        metadata: serde_json::Value,
    ) -> Vec<DispatchOutcome> {
        let mut outcomes = Vec::with_capacity(user_ids.len());
        for user_id in user_ids {
            let notification = Notification {
                user_id: user_id.clone(),
                kind,
                body: body.clone(),
                metadata: metadata.clone(),
            };
            outcomes.push(self.dispatch(notification).await);
        }
        outcomes
    }
}
