//! Audit entries of one lifecycle operation, built in order and appended after commit.

use chrono::{DateTime, Utc};
use gym_types::{Assignment, AuditAction, AuditLog, AuditLogEntry, AuditStatus};
use uuid::Uuid;

/// Collects the entries of one operation.
///
/// With a request id, entry ids are `<member_id>:<operation>:<request_id>:<n>`, so a retry of
/// the same call maps onto the same ids and the log drops the duplicates, while the same request
/// id reused for another member or operation yields distinct ids. Without one, ids are random.
pub(crate) struct AuditTrail {
    member_id: String,
    operation: &'static str,
    request_id: Option<String>,
    logged_at: DateTime<Utc>,
    entries: Vec<AuditLogEntry>,
}

/// Plan id and name as they were at the time of the transition.
pub(crate) struct PlanSnapshot<'a> {
    pub plan_id: &'a str,
    pub plan_name: &'a str,
}

impl AuditTrail {
    pub fn new(
        member_id: &str,
        operation: &'static str,
        request_id: Option<&str>,
        logged_at: DateTime<Utc>,
    ) -> Self {
        Self {
            member_id: member_id.to_string(),
            operation,
            request_id: request_id
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string),
            logged_at,
            entries: Vec::new(),
        }
    }

    fn next_id(&self) -> String {
        match &self.request_id {
            Some(rid) => format!(
                "{}:{}:{}:{}",
                self.member_id,
                self.operation,
                rid,
                self.entries.len()
            ),
            None => Uuid::new_v4().to_string(),
        }
    }

    /// Record one transition. `assignment` is the record's state after the transition, or the
    /// last known state for a removal; `None` when nothing could be read.
    pub fn record(
        &mut self,
        action: AuditAction,
        plan: PlanSnapshot<'_>,
        assignment: Option<&Assignment>,
        status_before: Option<AuditStatus>,
        status_after: Option<AuditStatus>,
    ) {
        let entry = AuditLogEntry {
            entry_id: self.next_id(),
            member_id: self.member_id.clone(),
            assignment_id: assignment.map(|a| a.id.clone()),
            plan_id: plan.plan_id.to_string(),
            plan_name: plan.plan_name.to_string(),
            action,
            status_before,
            status_after,
            start_date: assignment.map(|a| a.start_date),
            end_date: assignment.and_then(|a| a.end_date),
            price_paid: assignment.map(|a| a.price_paid),
            notes: assignment.and_then(|a| a.notes.clone()),
            logged_at: self.logged_at,
        };
        self.entries.push(entry);
    }

    #[cfg(test)]
    pub fn entries(&self) -> &[AuditLogEntry] {
        &self.entries
    }

    /// Append every entry in order. Failures do not stop later appends; their messages are
    /// returned for the caller.
    pub async fn flush(self, log: &dyn AuditLog) -> Vec<String> {
        let mut failures = Vec::new();
        for entry in self.entries {
            let entry_id = entry.entry_id.clone();
            let action = entry.action;
            if let Err(e) = log.append(entry).await {
                tracing::warn!(
                    member_id = %self.member_id,
                    entry_id = %entry_id,
                    action = %action,
                    error = %e,
                    "audit append failed after commit"
                );
                failures.push(format!("{} ({}): {}", action, entry_id, e));
            }
        }
        failures
    }
}
