//! Ports consumed by the lifecycle engine and the lifecycle service trait itself.

use crate::{
    Assignment, AssignRequest, AuditListOptions, AuditLogEntry, Member, MembershipPlan,
    RemoveRequest, StatusChangeRequest, TransitionOutcome,
};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

/// Resolves plan ids (read-only).
#[async_trait]
pub trait PlanCatalog: Send + Sync {
    async fn get_plan(&self, id: &str) -> Result<Option<MembershipPlan>, StoreError>;
}

/// Read side of assignment persistence. Writes go through [`UnitOfWork`].
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, StoreError>;

    /// All assignments of a member, in store order.
    async fn list_assignments(&self, member_id: &str) -> Result<Vec<Assignment>, StoreError>;

    /// Active assignments of a member, in store order.
    async fn list_active_assignments(
        &self,
        member_id: &str,
    ) -> Result<Vec<Assignment>, StoreError> {
        let mut all = self.list_assignments(member_id).await?;
        all.retain(Assignment::is_active);
        Ok(all)
    }
}

/// Read side of member summary persistence. Writes go through [`UnitOfWork`].
#[async_trait]
pub trait MemberRecordStore: Send + Sync {
    async fn get_member(&self, id: &str) -> Result<Option<Member>, StoreError>;
}

/// One record write inside a [`WriteBatch`].
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Insert (`expected_version: None`, must not exist) or replace (stored version must match).
    UpsertAssignment {
        assignment: Assignment,
        expected_version: Option<u32>,
    },
    /// Delete a record of `member_id`; the stored version must match.
    DeleteAssignment {
        id: String,
        member_id: String,
        expected_version: u32,
    },
    /// Replace a member summary; stored version must match.
    PutMember {
        member: Member,
        expected_version: u32,
    },
}

/// Writes of one lifecycle operation, applied all-or-nothing.
#[derive(Debug, Clone, Default)]
pub struct WriteBatch {
    pub ops: Vec<WriteOp>,
}

impl WriteBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_assignment(&mut self, assignment: Assignment) -> &mut Self {
        self.ops.push(WriteOp::UpsertAssignment {
            assignment,
            expected_version: None,
        });
        self
    }

    pub fn update_assignment(&mut self, assignment: Assignment, expected_version: u32) -> &mut Self {
        self.ops.push(WriteOp::UpsertAssignment {
            assignment,
            expected_version: Some(expected_version),
        });
        self
    }

    pub fn delete_assignment(
        &mut self,
        id: &str,
        member_id: &str,
        expected_version: u32,
    ) -> &mut Self {
        self.ops.push(WriteOp::DeleteAssignment {
            id: id.to_string(),
            member_id: member_id.to_string(),
            expected_version,
        });
        self
    }

    pub fn put_member(&mut self, member: Member, expected_version: u32) -> &mut Self {
        self.ops.push(WriteOp::PutMember {
            member,
            expected_version,
        });
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }
}

/// Transaction boundary over assignment and member writes.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Apply every op or none. A version mismatch, or a delete of a record that is missing or
    /// owned by another member, fails with [`StoreError::Conflict`].
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError>;
}

/// Append-only audit sink.
#[async_trait]
pub trait AuditLog: Send + Sync {
    /// Append one entry. An entry whose `entry_id` is already stored is ignored.
    async fn append(&self, entry: AuditLogEntry) -> Result<(), AuditLogError>;

    /// Entries matching `opts`, newest first.
    async fn list(&self, opts: &AuditListOptions) -> Result<Vec<AuditLogEntry>, AuditLogError>;
}

/// Cache invalidation signal for the application layer.
pub trait Notifier: Send + Sync {
    fn invalidate(&self, key: &str);
}

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}

/// Wall clock (UTC).
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Membership lifecycle service: assign, change status, remove, and read projections.
#[async_trait]
pub trait MembershipLifecycle: Send + Sync {
    async fn assign(&self, req: &AssignRequest) -> Result<TransitionOutcome, LifecycleError>;

    async fn update_status(
        &self,
        req: &StatusChangeRequest,
    ) -> Result<TransitionOutcome, LifecycleError>;

    async fn remove(&self, req: &RemoveRequest) -> Result<TransitionOutcome, LifecycleError>;

    /// Assignments of a member, newest `start_date` first.
    async fn list_for_member(&self, member_id: &str) -> Result<Vec<Assignment>, LifecycleError>;

    /// Audit entries of a member, newest first.
    async fn get_log(
        &self,
        member_id: &str,
        opts: &AuditListOptions,
    ) -> Result<Vec<AuditLogEntry>, LifecycleError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("version conflict: {0}")]
    Conflict(String),
    #[error("store error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum AuditLogError {
    #[error("audit log error: {0}")]
    Other(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("plan not found: {0}")]
    PlanNotFound(String),
    #[error("assignment not found: {0}")]
    AssignmentNotFound(String),
    #[error("member not found: {0}")]
    MemberNotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("concurrency conflict: {0}")]
    ConcurrencyConflict(String),
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("audit log: {0}")]
    Audit(#[from] AuditLogError),
}

impl From<StoreError> for LifecycleError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict(msg) => LifecycleError::ConcurrencyConflict(msg),
            StoreError::Other(msg) => LifecycleError::Persistence(msg),
        }
    }
}
