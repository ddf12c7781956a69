//! Lifecycle enums: plan category, assignment status, derived role/status, audit actions.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classification of a membership plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlanCategory {
    Member,
    Staff,
    #[serde(rename = "Non-Member")]
    NonMember,
}

impl PlanCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            PlanCategory::Member => "Member",
            PlanCategory::Staff => "Staff",
            PlanCategory::NonMember => "Non-Member",
        }
    }

    /// Staff plans are exempt from the one-active-plan rule.
    pub fn is_staff(self) -> bool {
        matches!(self, PlanCategory::Staff)
    }
}

impl fmt::Display for PlanCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PlanCategory {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Member" => Ok(PlanCategory::Member),
            "Staff" => Ok(PlanCategory::Staff),
            "Non-Member" => Ok(PlanCategory::NonMember),
            other => Err(format!("unknown plan category: {}", other)),
        }
    }
}

/// Status of an assignment record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum AssignmentStatus {
    #[default]
    Active,
    Ended,
    Cancelled,
}

impl AssignmentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AssignmentStatus::Active => "Active",
            AssignmentStatus::Ended => "Ended",
            AssignmentStatus::Cancelled => "Cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        !matches!(self, AssignmentStatus::Active)
    }

    /// Whether `self -> to` is a legal explicit transition.
    ///
    /// `Active` may end or be cancelled. Terminal states only admit the reactivation path back
    /// to `Active`, and only when `allow_reactivation` is set.
    pub fn can_transition_to(self, to: AssignmentStatus, allow_reactivation: bool) -> bool {
        match (self, to) {
            (AssignmentStatus::Active, AssignmentStatus::Ended)
            | (AssignmentStatus::Active, AssignmentStatus::Cancelled) => true,
            (from, AssignmentStatus::Active) if from.is_terminal() => allow_reactivation,
            _ => false,
        }
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AssignmentStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(AssignmentStatus::Active),
            "Ended" => Ok(AssignmentStatus::Ended),
            "Cancelled" => Ok(AssignmentStatus::Cancelled),
            other => Err(format!("unknown assignment status: {}", other)),
        }
    }
}

/// Derived authorization level of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessRole {
    #[default]
    Member,
    Staff,
}

impl AccessRole {
    pub fn as_str(self) -> &'static str {
        match self {
            AccessRole::Member => "member",
            AccessRole::Staff => "staff",
        }
    }
}

impl FromStr for AccessRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(AccessRole::Member),
            "staff" => Ok(AccessRole::Staff),
            other => Err(format!("unknown access role: {}", other)),
        }
    }
}

/// Derived membership status of a member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MembershipStatus {
    Active,
    #[default]
    Inactive,
}

impl MembershipStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            MembershipStatus::Active => "Active",
            MembershipStatus::Inactive => "Inactive",
        }
    }
}

impl FromStr for MembershipStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Active" => Ok(MembershipStatus::Active),
            "Inactive" => Ok(MembershipStatus::Inactive),
            other => Err(format!("unknown membership status: {}", other)),
        }
    }
}

/// Status as recorded in an audit entry. Adds the states an assignment can only have from the
/// log's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuditStatus {
    Active,
    Ended,
    Cancelled,
    /// Prior state could not be read.
    Unknown,
    /// Record was hard-deleted.
    Removed,
}

impl From<AssignmentStatus> for AuditStatus {
    fn from(s: AssignmentStatus) -> Self {
        match s {
            AssignmentStatus::Active => AuditStatus::Active,
            AssignmentStatus::Ended => AuditStatus::Ended,
            AssignmentStatus::Cancelled => AuditStatus::Cancelled,
        }
    }
}

/// Kind of lifecycle transition recorded in the audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum AuditAction {
    Assigned,
    EndedDueToNewAssignment,
    StatusChanged(AssignmentStatus),
    Removed,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditAction::Assigned => f.write_str("assigned"),
            AuditAction::EndedDueToNewAssignment => f.write_str("ended_due_to_new_assignment"),
            AuditAction::StatusChanged(s) => {
                write!(f, "status_changed_to_{}", s.as_str().to_ascii_lowercase())
            }
            AuditAction::Removed => f.write_str("removed"),
        }
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(AuditAction::Assigned),
            "ended_due_to_new_assignment" => Ok(AuditAction::EndedDueToNewAssignment),
            "removed" => Ok(AuditAction::Removed),
            "status_changed_to_active" => Ok(AuditAction::StatusChanged(AssignmentStatus::Active)),
            "status_changed_to_ended" => Ok(AuditAction::StatusChanged(AssignmentStatus::Ended)),
            "status_changed_to_cancelled" => {
                Ok(AuditAction::StatusChanged(AssignmentStatus::Cancelled))
            }
            other => Err(format!("unknown audit action: {}", other)),
        }
    }
}

impl TryFrom<String> for AuditAction {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<AuditAction> for String {
    fn from(a: AuditAction) -> Self {
        a.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_only_reactivate_when_allowed() {
        use AssignmentStatus::*;
        assert!(Active.can_transition_to(Ended, false));
        assert!(Active.can_transition_to(Cancelled, false));
        assert!(!Ended.can_transition_to(Cancelled, true));
        assert!(!Cancelled.can_transition_to(Ended, true));
        assert!(Ended.can_transition_to(Active, true));
        assert!(!Cancelled.can_transition_to(Active, false));
        assert!(!Active.can_transition_to(Active, true));
    }

    #[test]
    fn audit_action_wire_names() {
        let action = AuditAction::StatusChanged(AssignmentStatus::Cancelled);
        let json = serde_json::to_string(&action).unwrap();
        assert_eq!(json, "\"status_changed_to_cancelled\"");
        let back: AuditAction = serde_json::from_str(&json).unwrap();
        assert_eq!(back, action);
        assert!("status_changed_to_unknown".parse::<AuditAction>().is_err());
    }

    #[test]
    fn non_member_category_uses_hyphenated_name() {
        let json = serde_json::to_string(&PlanCategory::NonMember).unwrap();
        assert_eq!(json, "\"Non-Member\"");
        assert_eq!("Non-Member".parse::<PlanCategory>(), Ok(PlanCategory::NonMember));
    }
}
