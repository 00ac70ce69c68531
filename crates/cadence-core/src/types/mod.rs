//! Core type definitions used across the Cadence workspace.

pub mod id;
pub mod media;
pub mod pagination;
pub mod status;

pub use id::{AssetId, JobId};
pub use media::{MusicalAnalysis, ProbeInfo};
pub use pagination::PageRequest;
pub use status::{JobStatus, RetryState};
