//! HTTP surface for the gym membership lifecycle.

pub mod config;
pub mod server;
