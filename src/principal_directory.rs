// Read-only view onto the upstream identity provider. `Principal` is
// consumed, not produced, by this crate (no login/auth state lives here) —
// this trait is the seam, matching `MarketDataProvider`'s shape for another
// externally-owned concern.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::Principal;
use crate::error::CoreResult;

#[async_trait]
pub trait PrincipalDirectory: Send + Sync {
    /// Every principal known to the identity provider, in no particular
    /// order; callers that need determinism (the matcher) sort by `userId`
    /// themselves.
    async fn list_all(&self) -> CoreResult<Vec<Principal>>;
    async fn get(&self, user_id: &str) -> CoreResult<Option<Principal>>;
}

/// Fixed in-memory roster, used by tests and until a real identity-provider
/// client is wired up.
#[derive(Default)]
pub struct InMemoryPrincipalDirectory {
    principals: RwLock<HashMap<String, Principal>>,
}

impl InMemoryPrincipalDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, principal: Principal) {
        self.principals.write().insert(principal.user_id.clone(), principal);
    }
}

#[async_trait]
impl PrincipalDirectory for InMemoryPrincipalDirectory {
    async fn list_all(&self) -> CoreResult<Vec<Principal>> {
        Ok(self.principals.read().values().cloned().collect())
    }

    async fn get(&self, user_id: &str) -> CoreResult<Option<Principal>> {
        Ok(self.principals.read().get(user_id).cloned())
    }
}

pub type SharedPrincipalDirectory = Arc<dyn PrincipalDirectory>;

#[cfg(test)]
mod tests {
    use super::*;

    fn principal(user_id: &str) -> Principal {
        Principal {
            user_id: user_id.into(),
            active_plan_ids: vec!["free".into()],
            preferred_channels: vec!["telegram".into()],
            timezone: "UTC".into(),
            enabled: true,
        }
    }

    #[tokio::test]
    async fn lists_every_upserted_principal() {
        let dir = InMemoryPrincipalDirectory::new();
        dir.upsert(principal("u1"));
        dir.upsert(principal("u2"));
        let all = dir.list_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn get_returns_none_for_unknown_user() {
        let dir = InMemoryPrincipalDirectory::new();
        assert!(dir.get("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn upsert_replaces_existing_entry() {
        let dir = InMemoryPrincipalDirectory::new();
        dir.upsert(principal("u1"));
        let mut updated = principal("u1");
        updated.enabled = false;
        dir.upsert(updated);
        let all = dir.list_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(!all[0].enabled);
    }
}
