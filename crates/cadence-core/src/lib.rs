//! # cadence-core
//!
//! Core crate for Cadence. Contains the collaborator traits the job engine
//! depends on (job store, message bus, asset store, media toolkit),
//! configuration schemas, typed identifiers, the job status enumeration,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other Cadence crates.

pub mod config;
pub mod error;
pub mod result;
pub mod traits;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
