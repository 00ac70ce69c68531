//! PostgreSQL repository implementations.

pub mod asset;
pub mod job;

pub use asset::AssetRepository;
pub use job::{JobFilter, JobRepository};
