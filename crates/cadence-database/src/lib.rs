//! # cadence-database
//!
//! PostgreSQL connection management, the job and asset repositories that
//! implement the store contracts from `cadence-core`, and in-memory
//! equivalents used by tests and local runs.

pub mod connection;
pub mod memory;
pub mod migration;
pub mod repositories;

pub use connection::DatabasePool;
pub use memory::{MemoryAssetStore, MemoryJobStore};
pub use repositories::{AssetRepository, JobRepository};
