// Consumed, not produced: identity and subscription state live in an
// upstream identity provider. The core only needs this read-only view.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub active_plan_ids: Vec<String>,
    pub preferred_channels: Vec<String>,
    pub timezone: String,
    pub enabled: bool,
}

impl Principal {
    pub fn is_eligible_for_plan(&self, plan_ids: &[String]) -> bool {
        self.enabled
            && self
                .active_plan_ids
                .iter()
                .any(|p| plan_ids.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(plans: &[&str], enabled: bool) -> Principal {
        Principal {
            user_id: "u1".into(),
            active_plan_ids: plans.iter().map(|s| s.to_string()).collect(),
            preferred_channels: vec!["telegram".into()],
            timezone: "UTC".into(),
            enabled,
        }
    }

    #[test]
    fn eligible_when_plan_intersects_and_enabled() {
        let p = user(&["pro"], true);
        assert!(p.is_eligible_for_plan(&["free".into(), "pro".into()]));
    }

    #[test]
    fn not_eligible_when_disabled() {
        let p = user(&["pro"], false);
        assert!(!p.is_eligible_for_plan(&["pro".into()]));
    }

    #[test]
    fn not_eligible_when_no_plan_overlap() {
        let p = user(&["basic"], true);
        assert!(!p.is_eligible_for_plan(&["pro".into()]));
    }
}
