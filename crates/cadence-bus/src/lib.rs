//! # cadence-bus
//!
//! Message bus implementations for Cadence. Supports two providers:
//!
//! - **redis**: Redis Streams consumer groups (durable, at-least-once)
//! - **memory**: in-process fan-out to queue groups, for tests and local runs
//!
//! The provider is selected at runtime based on configuration.

#[cfg(feature = "memory")]
pub mod memory;
pub mod provider;
#[cfg(feature = "redis-backend")]
pub mod redis;

pub use provider::connect;
