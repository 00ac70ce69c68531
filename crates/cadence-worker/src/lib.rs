//! # cadence-worker
//!
//! The job engine. Job references arrive from the message bus, land in a
//! bounded intake queue and are picked up by a fixed set of worker tasks.
//! Each worker claims the job through the store, runs the stage pipeline
//! registered for its type and routes the outcome to `done`, to a delayed
//! retry or to `failed`.

pub mod claim;
pub mod executor;
pub mod lifecycle;
pub mod metrics;
pub mod pipeline;
pub mod pool;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod stages;

pub use executor::{PipelineError, StageExecutor};
pub use metrics::{MetricsSnapshot, PoolMetrics};
pub use pool::WorkerPool;
pub use queue::{EnqueueError, IntakeQueue};
pub use runner::WorkerRunner;
