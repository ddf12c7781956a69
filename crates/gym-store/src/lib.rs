//! Store backends for the gym lifecycle ports: in-memory, JSONL audit file, and SQLite.

mod audit;
mod memory;
mod seed;

#[cfg(feature = "sqlite")]
mod sqlite;

pub use audit::{InMemoryAuditLog, JsonlAuditLog};
pub use gym_types::{
    AssignmentStore, AuditLog, MemberRecordStore, PlanCatalog, StoreError, UnitOfWork, WriteBatch,
    WriteOp,
};
pub use memory::InMemoryGymStore;
pub use seed::SeedData;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteGymStore;
