//! Guarded status writes for a claimed job.
//!
//! Every write goes through [`JobStore::update_status`], which applies only
//! when the stored status is a legal predecessor of the target. A write that
//! does not apply is reported as `false`, never as an error.

use std::sync::Arc;

use tracing::{debug, warn};

use cadence_core::result::AppResult;
use cadence_core::traits::{JobStore, StatusUpdate};
use cadence_core::types::{JobId, JobStatus};

/// Writes the transitions of the job state machine.
#[derive(Debug, Clone)]
pub struct JobLifecycle {
    store: Arc<dyn JobStore>,
}

impl JobLifecycle {
    /// Create a lifecycle writer over `store`.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    async fn transition(&self, job_id: JobId, update: StatusUpdate) -> AppResult<bool> {
        let target = update.status;
        let applied = self.store.update_status(job_id, update).await?;
        if !applied {
            debug!(job_id = %job_id, target = %target, "Transition not applied");
        }
        Ok(applied)
    }

    /// Record in-attempt progress and a log line.
    ///
    /// Failures are logged and swallowed: a lost progress write never aborts
    /// the pipeline.
    pub async fn progress(&self, job_id: JobId, progress: i32, note: &str) {
        let update = StatusUpdate::new(JobStatus::Running, progress, note);
        if let Err(e) = self.transition(job_id, update).await {
            warn!(job_id = %job_id, progress, error = %e, "Failed to record progress");
        }
    }

    /// `running → done`.
    pub async fn complete(&self, job_id: JobId, note: &str) -> AppResult<bool> {
        self.transition(job_id, StatusUpdate::new(JobStatus::Done, 100, note))
            .await
    }

    /// `running → queued`, ahead of a scheduled retry.
    pub async fn requeue(&self, job_id: JobId, note: &str) -> AppResult<bool> {
        self.transition(job_id, StatusUpdate::new(JobStatus::Queued, 0, note))
            .await
    }

    /// `running → failed`, storing `error` as the job's `last_error`.
    pub async fn fail(&self, job_id: JobId, error: &str, note: &str) -> AppResult<bool> {
        let update = StatusUpdate::new(JobStatus::Failed, 0, note).with_error(error);
        self.transition(job_id, update).await
    }
}
