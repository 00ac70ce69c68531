//! Persistence boundary for job state.

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{JobId, JobStatus, RetryState};

/// A guarded status write: the new status, the progress to record and an
/// optional line to append to the job log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Target status.
    pub status: JobStatus,
    /// Progress percentage (0–100).
    pub progress: i32,
    /// Human-readable line appended to the job log (skipped when empty).
    pub log_line: String,
    /// Replaces `last_error` when set.
    pub last_error: Option<String>,
}

impl StatusUpdate {
    /// Create a new status update.
    pub fn new(status: JobStatus, progress: i32, log_line: impl Into<String>) -> Self {
        Self {
            status,
            progress: progress.clamp(0, 100),
            log_line: log_line.into(),
            last_error: None,
        }
    }

    /// Also record `error` as the job's `last_error`.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.last_error = Some(error.into());
        self
    }
}

/// Durable job store shared by every worker in every process.
///
/// Every method must be safe under concurrent invocation. Ownership of a job
/// is expressed solely through [`JobStore::try_claim`]; implementations must
/// make the predicate and the write a single atomic step.
#[async_trait]
pub trait JobStore: Send + Sync + std::fmt::Debug + 'static {
    /// Transition `queued → running` if and only if the job is still queued.
    ///
    /// Returns `Ok(false)` when another worker (or an earlier delivery)
    /// already claimed or finished the job. Errors are reserved for store
    /// failures. A successful claim sets progress to 1 and clears
    /// `last_error`.
    async fn try_claim(&self, job_id: JobId, owner: &str) -> AppResult<bool>;

    /// Apply a status update if the stored status is a legal predecessor of
    /// the target (see [`JobStatus::predecessors`]).
    ///
    /// Returns whether the update applied. While the job stays `running`,
    /// progress never decreases.
    async fn update_status(&self, job_id: JobId, update: StatusUpdate) -> AppResult<bool>;

    /// Atomically increment `retry_count` and store `error` as `last_error`.
    async fn increment_retry(&self, job_id: JobId, error: &str) -> AppResult<()>;

    /// Read the current retry counters.
    async fn read_retry_state(&self, job_id: JobId) -> AppResult<RetryState>;
}
