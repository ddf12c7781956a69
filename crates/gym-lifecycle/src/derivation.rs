//! Role derivation: the member summary as a pure function of the active assignment set.

use gym_types::{AccessRole, Assignment, Member, MembershipPlan, MembershipStatus, PlanCategory};

/// One active assignment paired with what the catalog says about its plan.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveAssignment {
    pub plan_id: String,
    pub category: PlanCategory,
    pub linked_role_id: Option<String>,
}

impl ActiveAssignment {
    /// A plan the catalog no longer resolves counts as a regular membership.
    pub fn resolve(assignment: &Assignment, plan: Option<&MembershipPlan>) -> Self {
        Self {
            plan_id: assignment.plan_id.clone(),
            category: plan.map(|p| p.category).unwrap_or(PlanCategory::Member),
            linked_role_id: plan.and_then(|p| p.linked_role_id.clone()),
        }
    }

    fn granted_role(&self) -> Option<&str> {
        if !self.category.is_staff() {
            return None;
        }
        self.linked_role_id
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
    }
}

/// Derived member summary fields.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedMembership {
    pub access_role: AccessRole,
    pub linked_role_id: Option<String>,
    pub primary_plan_id: Option<String>,
    pub membership_status: MembershipStatus,
    pub assigned_plan_ids: Vec<String>,
}

impl DerivedMembership {
    /// Overwrite the derived fields of `member`; identity fields are left alone.
    pub fn apply_to(&self, member: &mut Member) {
        member.access_role = self.access_role;
        member.linked_role_id = self.linked_role_id.clone();
        member.current_plan_id = self.primary_plan_id.clone();
        member.membership_status = self.membership_status;
        member.assigned_plan_ids = self.assigned_plan_ids.clone();
    }
}

/// Derive the member summary from the active set, taken in store order.
///
/// The first staff assignment with a non-empty role id supplies `linked_role_id`; the first
/// non-staff assignment is the primary plan. No other ordering is imposed.
pub fn derive(active: &[ActiveAssignment]) -> DerivedMembership {
    let linked_role_id = active
        .iter()
        .find_map(ActiveAssignment::granted_role)
        .map(str::to_string);
    let primary_plan_id = active
        .iter()
        .find(|a| !a.category.is_staff())
        .map(|a| a.plan_id.clone());

    let mut assigned_plan_ids: Vec<String> = Vec::with_capacity(active.len());
    for a in active {
        if !assigned_plan_ids.contains(&a.plan_id) {
            assigned_plan_ids.push(a.plan_id.clone());
        }
    }

    DerivedMembership {
        access_role: if linked_role_id.is_some() {
            AccessRole::Staff
        } else {
            AccessRole::Member
        },
        linked_role_id,
        primary_plan_id,
        membership_status: if active.is_empty() {
            MembershipStatus::Inactive
        } else {
            MembershipStatus::Active
        },
        assigned_plan_ids,
    }
}
