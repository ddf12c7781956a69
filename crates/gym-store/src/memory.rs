//! In-memory gym store: plans, members and assignments behind one lock.

use crate::SeedData;
use gym_types::{
    Assignment, AssignmentStore, Member, MemberRecordStore, MembershipPlan, PlanCatalog,
    StoreError, UnitOfWork, WriteBatch, WriteOp,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct State {
    plans: HashMap<String, MembershipPlan>,
    members: HashMap<String, Member>,
    /// assignment_id -> assignment.
    assignments: HashMap<String, Assignment>,
    /// member_id -> assignment ids in insertion order (the store order seen by readers).
    member_index: HashMap<String, Vec<String>>,
}

impl State {
    fn index_assignment(&mut self, member_id: &str, id: &str) {
        let list = self.member_index.entry(member_id.to_string()).or_default();
        if !list.iter().any(|x| x == id) {
            list.push(id.to_string());
        }
    }

    fn unindex_assignment(&mut self, member_id: &str, id: &str) {
        if let Some(list) = self.member_index.get_mut(member_id) {
            list.retain(|x| x != id);
            if list.is_empty() {
                self.member_index.remove(member_id);
            }
        }
    }

    fn assignment_state(&self, id: &str) -> Option<(u32, &str)> {
        self.assignments
            .get(id)
            .map(|a| (a.version, a.member_id.as_str()))
    }

    /// Check every op against current versions before anything is applied.
    fn check(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        // Version and owner as they would be after the ops seen so far; None = absent.
        let mut assignment_versions: HashMap<&str, Option<(u32, &str)>> = HashMap::new();
        let mut member_versions: HashMap<&str, Option<u32>> = HashMap::new();
        for op in &batch.ops {
            match op {
                WriteOp::UpsertAssignment {
                    assignment,
                    expected_version,
                } => {
                    let id = assignment.id.as_str();
                    let current = assignment_versions
                        .get(id)
                        .copied()
                        .unwrap_or_else(|| self.assignment_state(id))
                        .map(|(v, _)| v);
                    if current != *expected_version {
                        return Err(StoreError::Conflict(format!(
                            "assignment {}: expected version {:?}, found {:?}",
                            id, expected_version, current
                        )));
                    }
                    assignment_versions
                        .insert(id, Some((assignment.version, assignment.member_id.as_str())));
                }
                WriteOp::DeleteAssignment {
                    id,
                    member_id,
                    expected_version,
                } => {
                    let current = assignment_versions
                        .get(id.as_str())
                        .copied()
                        .unwrap_or_else(|| self.assignment_state(id));
                    match current {
                        None => {
                            return Err(StoreError::Conflict(format!(
                                "assignment {} no longer exists",
                                id
                            )))
                        }
                        Some((_, owner)) if owner != member_id.as_str() => {
                            return Err(StoreError::Conflict(format!(
                                "assignment {} does not belong to member {}",
                                id, member_id
                            )))
                        }
                        Some((found, _)) if found != *expected_version => {
                            return Err(StoreError::Conflict(format!(
                                "assignment {}: expected version {}, found {}",
                                id, expected_version, found
                            )))
                        }
                        Some(_) => {}
                    }
                    assignment_versions.insert(id.as_str(), None);
                }
                WriteOp::PutMember {
                    member,
                    expected_version,
                } => {
                    let id = member.id.as_str();
                    let current = member_versions
                        .get(id)
                        .copied()
                        .unwrap_or_else(|| self.members.get(id).map(|m| m.version));
                    if current != Some(*expected_version) {
                        return Err(StoreError::Conflict(format!(
                            "member {}: expected version {}, found {:?}",
                            id, expected_version, current
                        )));
                    }
                    member_versions.insert(id, Some(member.version));
                }
            }
        }
        Ok(())
    }

    fn apply(&mut self, batch: WriteBatch) {
        for op in batch.ops {
            match op {
                WriteOp::UpsertAssignment { assignment, .. } => {
                    let member_id = assignment.member_id.clone();
                    let id = assignment.id.clone();
                    self.assignments.insert(id.clone(), assignment);
                    self.index_assignment(&member_id, &id);
                }
                WriteOp::DeleteAssignment { id, .. } => {
                    if let Some(old) = self.assignments.remove(&id) {
                        self.unindex_assignment(&old.member_id, &id);
                    }
                }
                WriteOp::PutMember { member, .. } => {
                    self.members.insert(member.id.clone(), member);
                }
            }
        }
    }
}

/// In-memory implementation of every lifecycle store port.
/// A batch is checked and applied under a single write lock, so readers never see half of it.
#[derive(Clone, Default)]
pub struct InMemoryGymStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryGymStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with catalog plans and member records.
    pub async fn from_seed(seed: SeedData) -> Self {
        let store = Self::new();
        for plan in seed.plans {
            store.insert_plan(plan).await;
        }
        for member in seed.members {
            store.insert_member(member).await;
        }
        store
    }

    /// Add or replace a catalog plan.
    pub async fn insert_plan(&self, plan: MembershipPlan) {
        self.state.write().await.plans.insert(plan.id.clone(), plan);
    }

    /// Add or replace a member record (outside the lifecycle, e.g. registration).
    pub async fn insert_member(&self, member: Member) {
        self.state
            .write()
            .await
            .members
            .insert(member.id.clone(), member);
    }
}

#[async_trait::async_trait]
impl PlanCatalog for InMemoryGymStore {
    async fn get_plan(&self, id: &str) -> Result<Option<MembershipPlan>, StoreError> {
        Ok(self.state.read().await.plans.get(id).cloned())
    }
}

#[async_trait::async_trait]
impl AssignmentStore for InMemoryGymStore {
    async fn get_assignment(&self, id: &str) -> Result<Option<Assignment>, StoreError> {
        Ok(self.state.read().await.assignments.get(id).cloned())
    }

    async fn list_assignments(&self, member_id: &str) -> Result<Vec<Assignment>, StoreError> {
        let guard = self.state.read().await;
        let ids = match guard.member_index.get(member_id) {
            Some(ids) => ids,
            None => return Ok(Vec::new()),
        };
        Ok(ids
            .iter()
            .filter_map(|id| guard.assignments.get(id).cloned())
            .collect())
    }
}

#[async_trait::async_trait]
impl MemberRecordStore for InMemoryGymStore {
    async fn get_member(&self, id: &str) -> Result<Option<Member>, StoreError> {
        Ok(self.state.read().await.members.get(id).cloned())
    }
}

#[async_trait::async_trait]
impl UnitOfWork for InMemoryGymStore {
    async fn commit(&self, batch: WriteBatch) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let mut guard = self.state.write().await;
        guard.check(&batch)?;
        guard.apply(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use gym_types::AssignmentStatus;

    fn assignment(id: &str, member_id: &str, plan_id: &str) -> Assignment {
        let now = Utc::now();
        Assignment {
            id: id.to_string(),
            member_id: member_id.to_string(),
            plan_id: plan_id.to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: None,
            expires_on: None,
            status: AssignmentStatus::Active,
            price_paid: 10.0,
            notes: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    #[tokio::test]
    async fn list_keeps_insertion_order() {
        let store = InMemoryGymStore::new();
        store.insert_member(Member::new("m1", "Ada")).await;
        let mut batch = WriteBatch::new();
        batch
            .insert_assignment(assignment("a2", "m1", "basic"))
            .insert_assignment(assignment("a1", "m1", "trainer"));
        store.commit(batch).await.unwrap();

        let all = store.list_assignments("m1").await.unwrap();
        let ids: Vec<&str> = all.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["a2", "a1"]);
        assert!(store.list_assignments("m2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn conflicting_batch_applies_nothing() {
        let store = InMemoryGymStore::new();
        store.insert_member(Member::new("m1", "Ada")).await;

        let mut member = Member::new("m1", "Ada");
        member.version = 1;
        let mut batch = WriteBatch::new();
        batch
            .insert_assignment(assignment("a1", "m1", "basic"))
            .put_member(member, 7);
        let err = store.commit(batch).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        assert!(store.get_assignment("a1").await.unwrap().is_none());
        assert_eq!(store.get_member("m1").await.unwrap().unwrap().version, 0);
    }

    #[tokio::test]
    async fn insert_of_existing_id_conflicts_and_delete_unindexes() {
        let store = InMemoryGymStore::new();
        let mut batch = WriteBatch::new();
        batch.insert_assignment(assignment("a1", "m1", "basic"));
        store.commit(batch).await.unwrap();

        let mut again = WriteBatch::new();
        again.insert_assignment(assignment("a1", "m1", "basic"));
        assert!(matches!(
            store.commit(again).await,
            Err(StoreError::Conflict(_))
        ));

        let mut delete = WriteBatch::new();
        delete.delete_assignment("a1", "m1", 0);
        store.commit(delete).await.unwrap();
        assert!(store.list_assignments("m1").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn delete_is_scoped_to_owner() {
        let store = InMemoryGymStore::new();
        let mut batch = WriteBatch::new();
        batch.insert_assignment(assignment("a1", "m2", "trainer"));
        store.commit(batch).await.unwrap();

        let mut foreign = WriteBatch::new();
        foreign.delete_assignment("a1", "m1", 0);
        let err = store.commit(foreign).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(ref m) if m.contains("does not belong")));
        assert!(store.get_assignment("a1").await.unwrap().is_some());

        let mut stale = WriteBatch::new();
        stale.delete_assignment("a1", "m2", 3);
        assert!(matches!(
            store.commit(stale).await,
            Err(StoreError::Conflict(_))
        ));
        assert_eq!(store.list_assignments("m2").await.unwrap().len(), 1);
    }
}
