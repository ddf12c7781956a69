//! Membership assignment lifecycle: exclusivity, role derivation, audit trail.

mod audit_trail;
mod config;
mod derivation;
mod locks;
mod manager;
mod notifier;

pub use config::LifecycleConfig;
pub use derivation::{derive, ActiveAssignment, DerivedMembership};
pub use gym_types::LifecycleError;
pub use locks::MemberLocks;
pub use manager::AssignmentLifecycleManager;
pub use notifier::{invalidation_keys, BroadcastNotifier, NoopNotifier};
