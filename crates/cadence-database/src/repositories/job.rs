//! Job repository implementation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use cadence_core::error::{AppError, ErrorKind};
use cadence_core::result::AppResult;
use cadence_core::traits::{JobStore, StatusUpdate};
use cadence_core::types::{JobId, JobStatus, PageRequest, RetryState};
use cadence_entity::job::{CreateJob, Job};

/// Optional filters for [`JobRepository::list`].
#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    /// Only jobs in this status.
    pub status: Option<JobStatus>,
    /// Only jobs of this type.
    pub job_type: Option<String>,
}

/// PostgreSQL-backed job store.
#[derive(Debug, Clone)]
pub struct JobRepository {
    pool: PgPool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Find a job by ID.
    pub async fn find_by_id(&self, id: JobId) -> AppResult<Option<Job>> {
        sqlx::query_as::<_, Job>("SELECT * FROM jobs WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to find job", e))
    }

    /// List jobs, newest first.
    pub async fn list(&self, filter: &JobFilter, page: &PageRequest) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "SELECT * FROM jobs \
             WHERE ($1::job_status IS NULL OR status = $1) \
             AND ($2::text IS NULL OR job_type = $2) \
             ORDER BY id DESC LIMIT $3 OFFSET $4",
        )
        .bind(filter.status)
        .bind(filter.job_type.as_deref())
        .bind(page.limit() as i64)
        .bind(page.offset() as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to list jobs", e))
    }

    /// Insert a new `queued` job.
    pub async fn create(&self, data: &CreateJob) -> AppResult<Job> {
        sqlx::query_as::<_, Job>(
            "INSERT INTO jobs (asset_id, job_type, max_retries) VALUES ($1, $2, $3) RETURNING *",
        )
        .bind(data.asset_id)
        .bind(&data.job_type)
        .bind(data.max_retries)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to create job", e))
    }

    /// Number of jobs per status. Statuses with no jobs are omitted.
    pub async fn count_by_status(&self) -> AppResult<Vec<(JobStatus, i64)>> {
        sqlx::query_as::<_, (JobStatus, i64)>(
            "SELECT status, COUNT(*) FROM jobs GROUP BY status ORDER BY status",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to count jobs", e))
    }

    /// Move `running` jobs that have not been touched since `before` back to
    /// `queued`, returning the jobs that moved.
    ///
    /// Used to recover work owned by a worker process that died mid-attempt.
    pub async fn requeue_stale(&self, before: DateTime<Utc>) -> AppResult<Vec<Job>> {
        sqlx::query_as::<_, Job>(
            "UPDATE jobs SET status = 'queued', worker_id = NULL, updated_at = NOW(), \
             logs = CASE WHEN logs = '' THEN $2 ELSE logs || E'\\n' || $2 END \
             WHERE status = 'running' AND updated_at < $1 \
             RETURNING *",
        )
        .bind(before)
        .bind("recovered: stale running attempt re-queued")
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to requeue stale jobs", e)
        })
    }
}

#[async_trait]
impl JobStore for JobRepository {
    async fn try_claim(&self, job_id: JobId, owner: &str) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE jobs SET status = 'running', progress = 1, last_error = '', \
             worker_id = $2, started_at = NOW(), updated_at = NOW() \
             WHERE id = $1 AND status = 'queued'",
        )
        .bind(job_id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::with_source(ErrorKind::Database, "Failed to claim job", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn update_status(&self, job_id: JobId, update: StatusUpdate) -> AppResult<bool> {
        let predecessors: Vec<&str> = update
            .status
            .predecessors()
            .iter()
            .map(JobStatus::as_str)
            .collect();

        let result = sqlx::query(
            "UPDATE jobs SET \
                progress = CASE WHEN status = 'running' AND $2 = 'running'::job_status \
                    THEN GREATEST(progress, $3) ELSE $3 END, \
                status = $2, \
                logs = CASE WHEN $4 = '' THEN logs \
                    WHEN logs = '' THEN $4 \
                    ELSE logs || E'\\n' || $4 END, \
                last_error = COALESCE($5, last_error), \
                finished_at = CASE WHEN $6 THEN NOW() ELSE finished_at END, \
                updated_at = NOW() \
             WHERE id = $1 AND status::text = ANY($7)",
        )
        .bind(job_id)
        .bind(update.status)
        .bind(update.progress)
        .bind(&update.log_line)
        .bind(update.last_error.as_deref())
        .bind(update.status.is_terminal())
        .bind(predecessors)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to update job status", e)
        })?;

        Ok(result.rows_affected() == 1)
    }

    async fn increment_retry(&self, job_id: JobId, error: &str) -> AppResult<()> {
        let result = sqlx::query(
            "UPDATE jobs SET retry_count = retry_count + 1, last_error = $2, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(job_id)
        .bind(error)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            AppError::with_source(ErrorKind::Database, "Failed to increment retry count", e)
        })?;

        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("Job {job_id} not found")));
        }
        Ok(())
    }

    async fn read_retry_state(&self, job_id: JobId) -> AppResult<RetryState> {
        let row: Option<(i32, i32)> =
            sqlx::query_as("SELECT retry_count, max_retries FROM jobs WHERE id = $1")
                .bind(job_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(|e| {
                    AppError::with_source(ErrorKind::Database, "Failed to read retry state", e)
                })?;

        row.map(|(retry_count, max_retries)| RetryState {
            retry_count,
            max_retries,
        })
        .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))
    }
}
