//! Per-member serialization of lifecycle operations.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Async lock per member id. Operations on different members run concurrently; operations on
/// the same member run one at a time.
#[derive(Default)]
pub struct MemberLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl MemberLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for the member's lock. Released when the guard is dropped.
    pub async fn acquire(&self, member_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.locks.lock().await;
            // Entries nobody holds or waits on only have the map's reference.
            map.retain(|id, l| id == member_id || Arc::strong_count(l) > 1);
            Arc::clone(
                map.entry(member_id.to_string())
                    .or_insert_with(|| Arc::new(Mutex::new(()))),
            )
        };
        lock.lock_owned().await
    }

    /// Number of members with a live lock entry.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_member_waits_other_member_does_not() {
        let locks = Arc::new(MemberLocks::new());
        let guard = locks.acquire("m1").await;

        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire("m2")).await;
        assert!(other.is_ok());

        let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire("m1")).await;
        assert!(same.is_err());

        drop(guard);
        let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire("m1")).await;
        assert!(same.is_ok());
    }

    #[tokio::test]
    async fn idle_entries_are_pruned() {
        let locks = MemberLocks::new();
        drop(locks.acquire("m1").await);
        drop(locks.acquire("m2").await);
        drop(locks.acquire("m3").await);
        assert_eq!(locks.len().await, 1);
    }
}
