//! Core types, lifecycle enums, and port traits for gym membership assignment management.
//!
//! Records serialize with serde so the same shapes back the stores, the audit file and the
//! HTTP surface.

mod dto;
mod lifecycle;
mod traits;

pub use dto::*;
pub use lifecycle::*;
pub use traits::*;
