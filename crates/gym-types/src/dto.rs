//! Records, lifecycle requests and response envelopes.

use crate::lifecycle::{
    AccessRole, AssignmentStatus, AuditAction, AuditStatus, MembershipStatus, PlanCategory,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Plan as resolved from the catalog. Read-only for the lifecycle engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MembershipPlan {
    pub id: String,
    pub name: String,
    pub category: PlanCategory,
    /// Staff permission set granted by the plan; only meaningful for `Staff` plans.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linked_role_id: Option<String>,
}

/// Member identity plus the summary fields derived from active assignments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub assigned_plan_ids: Vec<String>,
    #[serde(default)]
    pub current_plan_id: Option<String>,
    #[serde(default)]
    pub access_role: AccessRole,
    #[serde(default)]
    pub linked_role_id: Option<String>,
    #[serde(default)]
    pub membership_status: MembershipStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    /// Optimistic concurrency counter, bumped on every write.
    #[serde(default)]
    pub version: u32,
}

impl Member {
    /// A member with no assignments: `member` role, `Inactive`.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            assigned_plan_ids: Vec::new(),
            current_plan_id: None,
            access_role: AccessRole::Member,
            linked_role_id: None,
            membership_status: MembershipStatus::Inactive,
            updated_at: None,
            version: 0,
        }
    }
}

/// Link between one member and one plan for a period.
///
/// `end_date` is `None` iff `status` is `Active`. The planned end passed at assignment time is
/// kept in `expires_on` so that the invariant holds for open assignments with a known expiry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub member_id: String,
    pub plan_id: String,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<NaiveDate>,
    pub status: AssignmentStatus,
    #[serde(default)]
    pub price_paid: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub version: u32,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.status == AssignmentStatus::Active
    }
}

/// One immutable audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Deduplication key; a second append with the same id is ignored.
    pub entry_id: String,
    pub member_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignment_id: Option<String>,
    pub plan_id: String,
    /// Plan name at the time of the transition.
    pub plan_name: String,
    pub action: AuditAction,
    #[serde(default)]
    pub status_before: Option<AuditStatus>,
    #[serde(default)]
    pub status_after: Option<AuditStatus>,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub price_paid: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub logged_at: DateTime<Utc>,
}

/// Assign a plan to a member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssignRequest {
    pub member_id: String,
    pub plan_id: String,
    pub start_date: NaiveDate,
    /// Planned expiry; stored as `expires_on`.
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub price_paid: f64,
    #[serde(default)]
    pub notes: Option<String>,
    /// Caller-supplied idempotency key; makes audit entry ids deterministic across retries.
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Explicit status transition of one assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusChangeRequest {
    pub assignment_id: String,
    pub member_id: String,
    pub new_status: AssignmentStatus,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Hard delete of one assignment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoveRequest {
    pub member_id: String,
    pub assignment_id: String,
    /// Plan the caller expects the assignment to hold; the stored record wins on mismatch.
    pub plan_id: String,
    #[serde(default)]
    pub request_id: Option<String>,
}

/// Options for listing audit entries (filter + pagination).
#[derive(Debug, Clone, Default)]
pub struct AuditListOptions {
    pub member_id: Option<String>,
    /// Return entries with `logged_at >= since`.
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Result of a mutating lifecycle call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionOutcome {
    /// Member record after the call.
    pub member: Member,
    /// The assignment created or changed by the call; `None` after a removal.
    #[serde(default)]
    pub assignment: Option<Assignment>,
    /// Assignments ended because a new non-staff plan replaced them.
    #[serde(default)]
    pub superseded: Vec<Assignment>,
    /// True when the call was a no-op (plan already active, status already set).
    #[serde(default)]
    pub unchanged: bool,
    /// Audit appends that failed after the transition was committed.
    #[serde(default)]
    pub audit_failures: Vec<String>,
}

/// Response envelope shared by the HTTP surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseResponse<T> {
    #[serde(default = "default_code")]
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<T>,
}

fn default_code() -> i32 {
    200
}

impl<T> BaseResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            code: 200,
            message: "Success".to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

pub type TransitionResponse = BaseResponse<TransitionOutcome>;
pub type AssignmentListResponse = BaseResponse<Vec<Assignment>>;
pub type AuditListResponse = BaseResponse<Vec<AuditLogEntry>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_request_defaults() {
        let req: AssignRequest = serde_json::from_str(
            r#"{"member_id":"m1","plan_id":"basic","start_date":"2024-01-10"}"#,
        )
        .unwrap();
        assert_eq!(req.price_paid, 0.0);
        assert!(req.end_date.is_none());
        assert!(req.request_id.is_none());
    }

    #[test]
    fn new_member_is_inactive_regular_member() {
        let m = Member::new("m1", "Ada");
        assert_eq!(m.access_role, AccessRole::Member);
        assert_eq!(m.membership_status, MembershipStatus::Inactive);
        assert!(m.assigned_plan_ids.is_empty());
        let json = serde_json::to_value(&m).unwrap();
        assert_eq!(json["access_role"], "member");
        assert_eq!(json["membership_status"], "Inactive");
    }
}
