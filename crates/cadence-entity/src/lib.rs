//! # cadence-entity
//!
//! Domain entity models for Cadence. Every struct in this crate represents
//! a database table row or a value carried on the message bus. Database
//! entities derive `sqlx::FromRow`.

pub mod asset;
pub mod job;
