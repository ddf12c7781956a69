//! Seed data: catalog plans and member records loaded at startup.

use gym_types::{Member, MembershipPlan, StoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Plans and members to pre-populate a store with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedData {
    #[serde(default)]
    pub plans: Vec<MembershipPlan>,
    #[serde(default)]
    pub members: Vec<Member>,
}

impl SeedData {
    pub fn from_json_str(s: &str) -> Result<Self, StoreError> {
        serde_json::from_str(s).map_err(|e| StoreError::Other(format!("invalid seed data: {}", e)))
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| StoreError::Other(format!("{}: {}", path.display(), e)))?;
        Self::from_json_str(&content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gym_types::{MembershipStatus, PlanCategory};

    #[test]
    fn parses_plans_and_members_with_defaults() {
        let seed = SeedData::from_json_str(
            r#"{
                "plans": [
                    {"id": "basic", "name": "Basic", "category": "Member"},
                    {"id": "guest", "name": "Guest", "category": "Non-Member"},
                    {"id": "trainer", "name": "Trainer", "category": "Staff", "linked_role_id": "trainer"}
                ],
                "members": [{"id": "m1", "name": "Ada"}]
            }"#,
        )
        .unwrap();
        assert_eq!(seed.plans.len(), 3);
        assert_eq!(seed.plans[1].category, PlanCategory::NonMember);
        assert_eq!(seed.plans[2].linked_role_id.as_deref(), Some("trainer"));
        assert_eq!(seed.members[0].membership_status, MembershipStatus::Inactive);
        assert_eq!(seed.members[0].version, 0);
    }

    #[test]
    fn rejects_unknown_category() {
        let err = SeedData::from_json_str(
            r#"{"plans": [{"id": "x", "name": "X", "category": "Gold"}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("invalid seed data"));
    }
}
