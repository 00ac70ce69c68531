//! Job entity model.

use cadence_core::types::{AssetId, JobId, JobStatus, RetryState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::message::JobMessage;

/// Job type processed when the ingress does not name one.
pub const DEFAULT_JOB_TYPE: &str = "transcode";

/// Retry ceiling applied to new jobs.
pub const DEFAULT_MAX_RETRIES: i32 = 3;

/// A unit of processing work for one asset.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Job {
    /// Store-assigned identifier.
    pub id: JobId,
    /// Asset this job processes.
    pub asset_id: AssetId,
    /// Pipeline selector (e.g. `"transcode"`).
    pub job_type: String,
    /// Current lifecycle status.
    pub status: JobStatus,
    /// Completion percentage of the current attempt.
    pub progress: i32,
    /// Newline-separated, append-only log trail.
    pub logs: String,
    /// Failed attempts so far.
    pub retry_count: i32,
    /// Retry ceiling.
    pub max_retries: i32,
    /// Message of the most recent fatal failure; empty after a claim.
    pub last_error: String,
    /// Label of the worker that last claimed the job.
    pub worker_id: Option<String>,
    /// When the job was created.
    pub created_at: DateTime<Utc>,
    /// When the job row last changed.
    pub updated_at: DateTime<Utc>,
    /// When the most recent attempt was claimed.
    pub started_at: Option<DateTime<Utc>>,
    /// When the job reached a terminal status.
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Retry counters of this job.
    pub fn retry_state(&self) -> RetryState {
        RetryState {
            retry_count: self.retry_count,
            max_retries: self.max_retries,
        }
    }

    /// The bus message that references this job.
    pub fn message(&self) -> JobMessage {
        JobMessage::new(self.id, self.asset_id, self.job_type.clone())
    }

    /// Log lines in append order.
    pub fn log_lines(&self) -> impl Iterator<Item = &str> {
        self.logs.lines().filter(|line| !line.is_empty())
    }
}

/// Data required to create a new job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    /// Asset to process.
    pub asset_id: AssetId,
    /// Pipeline selector.
    pub job_type: String,
    /// Retry ceiling.
    pub max_retries: i32,
}

impl CreateJob {
    /// A default `transcode` job for an asset.
    pub fn for_asset(asset_id: AssetId) -> Self {
        Self {
            asset_id,
            job_type: DEFAULT_JOB_TYPE.to_string(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(logs: &str) -> Job {
        let now = Utc::now();
        Job {
            id: JobId(7),
            asset_id: AssetId(3),
            job_type: DEFAULT_JOB_TYPE.to_string(),
            status: JobStatus::Running,
            progress: 60,
            logs: logs.to_string(),
            retry_count: 1,
            max_retries: 3,
            last_error: String::new(),
            worker_id: Some("host-w0".to_string()),
            created_at: now,
            updated_at: now,
            started_at: Some(now),
            finished_at: None,
        }
    }

    #[test]
    fn test_log_lines_skip_blank_entries() {
        let job = job("claimed by host-w0\n\ntranscoded to a.mp3\n");
        let lines: Vec<_> = job.log_lines().collect();
        assert_eq!(lines, vec!["claimed by host-w0", "transcoded to a.mp3"]);
    }

    #[test]
    fn test_message_carries_job_reference() {
        let msg = job("").message();
        assert_eq!(msg.job_id, JobId(7));
        assert_eq!(msg.asset_id, AssetId(3));
        assert_eq!(msg.job_type, "transcode");
    }

    #[test]
    fn test_create_job_defaults() {
        let create = CreateJob::for_asset(AssetId(1));
        assert_eq!(create.job_type, DEFAULT_JOB_TYPE);
        assert_eq!(create.max_retries, DEFAULT_MAX_RETRIES);
    }
}
