//! AssignmentLifecycleManager: assign, change status, and remove plan assignments.

use crate::audit_trail::{AuditTrail, PlanSnapshot};
use crate::config::LifecycleConfig;
use crate::derivation::{derive, ActiveAssignment};
use crate::locks::MemberLocks;
use crate::notifier::{invalidation_keys, NoopNotifier};
use chrono::{DateTime, Utc};
use gym_types::*;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Orchestrates membership assignment transitions over the injected ports.
///
/// Every mutating call holds the member's lock from first read to last audit append, commits
/// its record writes as one [`WriteBatch`], and derives the member summary with
/// [`derive`] from the post-change active set.
pub struct AssignmentLifecycleManager {
    plans: Arc<dyn PlanCatalog>,
    assignments: Arc<dyn AssignmentStore>,
    members: Arc<dyn MemberRecordStore>,
    unit_of_work: Arc<dyn UnitOfWork>,
    audit_log: Arc<dyn AuditLog>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    locks: MemberLocks,
    config: LifecycleConfig,
}

impl AssignmentLifecycleManager {
    pub fn new(
        plans: Arc<dyn PlanCatalog>,
        assignments: Arc<dyn AssignmentStore>,
        members: Arc<dyn MemberRecordStore>,
        unit_of_work: Arc<dyn UnitOfWork>,
        audit_log: Arc<dyn AuditLog>,
    ) -> Self {
        Self {
            plans,
            assignments,
            members,
            unit_of_work,
            audit_log,
            notifier: Arc::new(NoopNotifier),
            clock: Arc::new(SystemClock),
            locks: MemberLocks::new(),
            config: LifecycleConfig::default(),
        }
    }

    /// Manager over one backend that implements all record ports.
    pub fn from_store<S>(store: Arc<S>, audit_log: Arc<dyn AuditLog>) -> Self
    where
        S: PlanCatalog + AssignmentStore + MemberRecordStore + UnitOfWork + 'static,
    {
        Self::new(
            store.clone(),
            store.clone(),
            store.clone(),
            store,
            audit_log,
        )
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifier = notifier;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_config(mut self, config: LifecycleConfig) -> Self {
        self.config = config;
        self
    }

    fn validate_id(field: &str, value: &str) -> Result<(), LifecycleError> {
        if value.trim().is_empty() {
            return Err(LifecycleError::Validation(format!("{} is required", field)));
        }
        if value.chars().any(char::is_whitespace) {
            return Err(LifecycleError::Validation(format!(
                "{} must not contain whitespace",
                field
            )));
        }
        Ok(())
    }

    fn validate_assign(req: &AssignRequest) -> Result<(), LifecycleError> {
        Self::validate_id("member_id", &req.member_id)?;
        Self::validate_id("plan_id", &req.plan_id)?;
        if !req.price_paid.is_finite() || req.price_paid < 0.0 {
            return Err(LifecycleError::Validation(format!(
                "price_paid must be a non-negative amount, got {}",
                req.price_paid
            )));
        }
        if let Some(end) = req.end_date {
            if end < req.start_date {
                return Err(LifecycleError::Validation(format!(
                    "end_date {} is before start_date {}",
                    end, req.start_date
                )));
            }
        }
        Ok(())
    }

    async fn load_member(&self, member_id: &str) -> Result<Member, LifecycleError> {
        self.members
            .get_member(member_id)
            .await?
            .ok_or_else(|| LifecycleError::MemberNotFound(member_id.to_string()))
    }

    /// Catalog lookups for a set of plan ids; unresolved ids are absent from the map.
    async fn resolve_plans(
        &self,
        plan_ids: &[String],
    ) -> Result<HashMap<String, MembershipPlan>, LifecycleError> {
        let mut out: HashMap<String, MembershipPlan> = HashMap::new();
        for id in plan_ids {
            if out.contains_key(id) {
                continue;
            }
            if let Some(plan) = self.plans.get_plan(id).await? {
                out.insert(id.clone(), plan);
            }
        }
        Ok(out)
    }

    fn is_staff(plans: &HashMap<String, MembershipPlan>, plan_id: &str) -> bool {
        plans
            .get(plan_id)
            .map(|p| p.category.is_staff())
            .unwrap_or(false)
    }

    fn plan_name<'a>(plans: &'a HashMap<String, MembershipPlan>, plan_id: &'a str) -> &'a str {
        plans.get(plan_id).map(|p| p.name.as_str()).unwrap_or(plan_id)
    }

    /// Recompute the member summary from the active set and stage the member write.
    fn stage_member(
        &self,
        batch: &mut WriteBatch,
        member: &Member,
        active: &[&Assignment],
        plans: &HashMap<String, MembershipPlan>,
        now: DateTime<Utc>,
    ) -> Member {
        let resolved: Vec<ActiveAssignment> = active
            .iter()
            .map(|a| ActiveAssignment::resolve(a, plans.get(&a.plan_id)))
            .collect();
        let mut updated = member.clone();
        derive(&resolved).apply_to(&mut updated);
        updated.updated_at = Some(now);
        updated.version = member.version + 1;
        batch.put_member(updated.clone(), member.version);
        updated
    }

    async fn commit(&self, member_id: &str, batch: WriteBatch) -> Result<(), LifecycleError> {
        self.unit_of_work.commit(batch).await.map_err(|e| {
            tracing::warn!(member_id = %member_id, error = %e, "lifecycle commit failed");
            LifecycleError::from(e)
        })
    }

    fn notify(&self, member_id: &str) {
        for key in invalidation_keys(member_id) {
            self.notifier.invalidate(&key);
        }
    }

    fn unchanged(member: Member, assignment: Option<Assignment>) -> TransitionOutcome {
        TransitionOutcome {
            member,
            assignment,
            superseded: Vec::new(),
            unchanged: true,
            audit_failures: Vec::new(),
        }
    }
}

#[async_trait::async_trait]
impl MembershipLifecycle for AssignmentLifecycleManager {
    async fn assign(&self, req: &AssignRequest) -> Result<TransitionOutcome, LifecycleError> {
        Self::validate_assign(req)?;
        let plan = self
            .plans
            .get_plan(&req.plan_id)
            .await?
            .ok_or_else(|| LifecycleError::PlanNotFound(req.plan_id.clone()))?;

        let _guard = self.locks.acquire(&req.member_id).await;
        let member = self.load_member(&req.member_id).await?;
        let active_now = self
            .assignments
            .list_active_assignments(&req.member_id)
            .await?;

        if let Some(existing) = active_now.iter().find(|a| a.plan_id == plan.id) {
            tracing::debug!(
                member_id = %member.id,
                plan_id = %plan.id,
                assignment_id = %existing.id,
                "plan already active, assign is a no-op"
            );
            return Ok(Self::unchanged(member, Some(existing.clone())));
        }

        let active_plan_ids: Vec<String> = active_now.iter().map(|a| a.plan_id.clone()).collect();
        let mut plans = self.resolve_plans(&active_plan_ids).await?;
        plans.insert(plan.id.clone(), plan.clone());

        let now = self.clock.now();
        let mut batch = WriteBatch::new();

        // A new regular plan replaces every other active regular plan; staff plans stack.
        let mut superseded: Vec<Assignment> = Vec::new();
        if !plan.category.is_staff() {
            let day_before = req.start_date.pred_opt().unwrap_or(req.start_date);
            for prior in active_now
                .iter()
                .filter(|a| a.plan_id != plan.id && !Self::is_staff(&plans, &a.plan_id))
            {
                let mut ended = prior.clone();
                ended.status = AssignmentStatus::Ended;
                ended.end_date = Some(day_before.max(prior.start_date));
                ended.updated_at = now;
                ended.version = prior.version + 1;
                batch.update_assignment(ended.clone(), prior.version);
                superseded.push(ended);
            }
        }

        let assignment = Assignment {
            id: Uuid::new_v4().to_string(),
            member_id: req.member_id.clone(),
            plan_id: plan.id.clone(),
            start_date: req.start_date,
            end_date: None,
            expires_on: req.end_date,
            status: AssignmentStatus::Active,
            price_paid: req.price_paid,
            notes: req.notes.clone().filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
            version: 0,
        };
        batch.insert_assignment(assignment.clone());

        let active: Vec<&Assignment> = active_now
            .iter()
            .filter(|a| !superseded.iter().any(|s| s.id == a.id))
            .chain(std::iter::once(&assignment))
            .collect();
        let updated = self.stage_member(&mut batch, &member, &active, &plans, now);
        self.commit(&member.id, batch).await?;

        let mut trail = AuditTrail::new(&member.id, "assign", req.request_id.as_deref(), now);
        for ended in &superseded {
            trail.record(
                AuditAction::EndedDueToNewAssignment,
                PlanSnapshot {
                    plan_id: &ended.plan_id,
                    plan_name: Self::plan_name(&plans, &ended.plan_id),
                },
                Some(ended),
                Some(AuditStatus::Active),
                Some(AuditStatus::Ended),
            );
        }
        trail.record(
            AuditAction::Assigned,
            PlanSnapshot {
                plan_id: &plan.id,
                plan_name: &plan.name,
            },
            Some(&assignment),
            None,
            Some(AuditStatus::Active),
        );
        let audit_failures = trail.flush(self.audit_log.as_ref()).await;
        self.notify(&member.id);

        tracing::info!(
            member_id = %member.id,
            plan_id = %plan.id,
            category = %plan.category,
            assignment_id = %assignment.id,
            superseded = superseded.len(),
            access_role = updated.access_role.as_str(),
            "plan assigned"
        );
        Ok(TransitionOutcome {
            member: updated,
            assignment: Some(assignment),
            superseded,
            unchanged: false,
            audit_failures,
        })
    }

    async fn update_status(
        &self,
        req: &StatusChangeRequest,
    ) -> Result<TransitionOutcome, LifecycleError> {
        Self::validate_id("member_id", &req.member_id)?;
        Self::validate_id("assignment_id", &req.assignment_id)?;

        let _guard = self.locks.acquire(&req.member_id).await;
        let current = self
            .assignments
            .get_assignment(&req.assignment_id)
            .await?
            .filter(|a| a.member_id == req.member_id)
            .ok_or_else(|| LifecycleError::AssignmentNotFound(req.assignment_id.clone()))?;
        let member = self.load_member(&req.member_id).await?;

        if current.status == req.new_status {
            return Ok(Self::unchanged(member, Some(current)));
        }
        if !current
            .status
            .can_transition_to(req.new_status, self.config.allow_reactivation)
        {
            return Err(LifecycleError::Validation(format!(
                "assignment {} cannot go from {} to {}",
                current.id, current.status, req.new_status
            )));
        }

        let all = self.assignments.list_assignments(&req.member_id).await?;
        let mut plan_ids: Vec<String> = all
            .iter()
            .filter(|a| a.is_active())
            .map(|a| a.plan_id.clone())
            .collect();
        plan_ids.push(current.plan_id.clone());
        let plans = self.resolve_plans(&plan_ids).await?;

        if req.new_status == AssignmentStatus::Active && !Self::is_staff(&plans, &current.plan_id) {
            if let Some(other) = all.iter().find(|a| {
                a.is_active() && a.id != current.id && !Self::is_staff(&plans, &a.plan_id)
            }) {
                return Err(LifecycleError::Validation(format!(
                    "cannot reactivate {}: plan {} is already active (assignment {})",
                    current.id, other.plan_id, other.id
                )));
            }
        }

        let now = self.clock.now();
        let mut changed = current.clone();
        changed.status = req.new_status;
        changed.end_date = if req.new_status.is_terminal() {
            Some(self.clock.today())
        } else {
            None
        };
        changed.updated_at = now;
        changed.version = current.version + 1;

        let mut batch = WriteBatch::new();
        batch.update_assignment(changed.clone(), current.version);
        let active: Vec<&Assignment> = all
            .iter()
            .map(|a| if a.id == changed.id { &changed } else { a })
            .filter(|a| a.is_active())
            .collect();
        let updated = self.stage_member(&mut batch, &member, &active, &plans, now);
        self.commit(&member.id, batch).await?;

        let mut trail =
            AuditTrail::new(&member.id, "update_status", req.request_id.as_deref(), now);
        trail.record(
            AuditAction::StatusChanged(req.new_status),
            PlanSnapshot {
                plan_id: &changed.plan_id,
                plan_name: Self::plan_name(&plans, &changed.plan_id),
            },
            Some(&changed),
            Some(current.status.into()),
            Some(changed.status.into()),
        );
        let audit_failures = trail.flush(self.audit_log.as_ref()).await;
        self.notify(&member.id);

        tracing::info!(
            member_id = %member.id,
            assignment_id = %changed.id,
            from = %current.status,
            to = %changed.status,
            membership_status = updated.membership_status.as_str(),
            "assignment status changed"
        );
        Ok(TransitionOutcome {
            member: updated,
            assignment: Some(changed),
            superseded: Vec::new(),
            unchanged: false,
            audit_failures,
        })
    }

    async fn remove(&self, req: &RemoveRequest) -> Result<TransitionOutcome, LifecycleError> {
        Self::validate_id("member_id", &req.member_id)?;
        Self::validate_id("assignment_id", &req.assignment_id)?;

        let _guard = self.locks.acquire(&req.member_id).await;
        let member = self.load_member(&req.member_id).await?;

        let read = match self.assignments.get_assignment(&req.assignment_id).await {
            Ok(Some(a)) if a.member_id == req.member_id => Some(a),
            Ok(_) => {
                return Err(LifecycleError::AssignmentNotFound(
                    req.assignment_id.clone(),
                ))
            }
            Err(e) => {
                tracing::warn!(
                    member_id = %req.member_id,
                    assignment_id = %req.assignment_id,
                    error = %e,
                    "pre-delete read failed, removing with unknown snapshot"
                );
                None
            }
        };

        // The member's own listing decides ownership when the single-record read failed.
        let all = self.assignments.list_assignments(&req.member_id).await?;
        let current = match &read {
            Some(a) => a.clone(),
            None => all
                .iter()
                .find(|a| a.id == req.assignment_id)
                .cloned()
                .ok_or_else(|| LifecycleError::AssignmentNotFound(req.assignment_id.clone()))?,
        };

        if !req.plan_id.is_empty() && req.plan_id != current.plan_id {
            tracing::warn!(
                member_id = %req.member_id,
                assignment_id = %current.id,
                requested_plan_id = %req.plan_id,
                stored_plan_id = %current.plan_id,
                "remove request names a different plan, using the stored one"
            );
        }

        let active: Vec<&Assignment> = all
            .iter()
            .filter(|a| a.is_active() && a.id != current.id)
            .collect();
        let mut plan_ids: Vec<String> = active.iter().map(|a| a.plan_id.clone()).collect();
        plan_ids.push(current.plan_id.clone());
        let plans = self.resolve_plans(&plan_ids).await?;

        let now = self.clock.now();
        let mut batch = WriteBatch::new();
        batch.delete_assignment(&current.id, &member.id, current.version);
        let updated = self.stage_member(&mut batch, &member, &active, &plans, now);
        self.commit(&member.id, batch).await?;

        // Without a successful pre-delete read the prior state is recorded as unknown.
        let mut trail = AuditTrail::new(&member.id, "remove", req.request_id.as_deref(), now);
        trail.record(
            AuditAction::Removed,
            PlanSnapshot {
                plan_id: &current.plan_id,
                plan_name: Self::plan_name(&plans, &current.plan_id),
            },
            read.as_ref(),
            Some(
                read.as_ref()
                    .map(|a| a.status.into())
                    .unwrap_or(AuditStatus::Unknown),
            ),
            Some(AuditStatus::Removed),
        );
        let audit_failures = trail.flush(self.audit_log.as_ref()).await;
        self.notify(&member.id);

        tracing::info!(
            member_id = %member.id,
            assignment_id = %current.id,
            plan_id = %current.plan_id,
            access_role = updated.access_role.as_str(),
            "assignment removed"
        );
        Ok(TransitionOutcome {
            member: updated,
            assignment: None,
            superseded: Vec::new(),
            unchanged: false,
            audit_failures,
        })
    }

    async fn list_for_member(&self, member_id: &str) -> Result<Vec<Assignment>, LifecycleError> {
        Self::validate_id("member_id", member_id)?;
        let mut all = self.assignments.list_assignments(member_id).await?;
        all.sort_by(|a, b| b.start_date.cmp(&a.start_date));
        Ok(all)
    }

    async fn get_log(
        &self,
        member_id: &str,
        opts: &AuditListOptions,
    ) -> Result<Vec<AuditLogEntry>, LifecycleError> {
        Self::validate_id("member_id", member_id)?;
        let opts = AuditListOptions {
            member_id: Some(member_id.to_string()),
            ..opts.clone()
        };
        Ok(self.audit_log.list(&opts).await?)
    }
}
