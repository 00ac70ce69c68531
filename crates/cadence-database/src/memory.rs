//! In-process job and asset stores backed by `dashmap`.
//!
//! Each mutating operation holds the shard lock of the entry it touches for
//! the whole read-check-write, which gives the same atomicity as the
//! conditional `UPDATE` statements of the PostgreSQL repositories.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use cadence_core::error::AppError;
use cadence_core::result::AppResult;
use cadence_core::traits::{AssetStore, JobStore, StatusUpdate};
use cadence_core::types::{AssetId, JobId, JobStatus, MusicalAnalysis, ProbeInfo, RetryState};
use cadence_entity::asset::{Asset, CreateAsset};
use cadence_entity::job::{CreateJob, Job};

fn append_log(logs: &mut String, line: &str) {
    if line.is_empty() {
        return;
    }
    if !logs.is_empty() {
        logs.push('\n');
    }
    logs.push_str(line);
}

/// Job store held entirely in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryJobStore {
    jobs: Arc<DashMap<JobId, Job>>,
    next_id: Arc<AtomicI64>,
    unavailable: Arc<AtomicBool>,
}

impl MemoryJobStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `queued` job.
    pub fn insert(&self, data: &CreateJob) -> Job {
        let id = JobId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = Utc::now();
        let job = Job {
            id,
            asset_id: data.asset_id,
            job_type: data.job_type.clone(),
            status: JobStatus::Queued,
            progress: 0,
            logs: String::new(),
            retry_count: 0,
            max_retries: data.max_retries,
            last_error: String::new(),
            worker_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
        };
        self.jobs.insert(id, job.clone());
        job
    }

    /// Snapshot of a job.
    pub fn get(&self, id: JobId) -> Option<Job> {
        self.jobs.get(&id).map(|job| job.clone())
    }

    /// Snapshot of every job, ordered by id.
    pub fn all(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self.jobs.iter().map(|entry| entry.value().clone()).collect();
        jobs.sort_by_key(|job| job.id);
        jobs
    }

    /// Make every store call fail with a database error until reset.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> AppResult<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(AppError::database("job store unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn try_claim(&self, job_id: JobId, owner: &str) -> AppResult<bool> {
        self.check_available()?;
        let Some(mut job) = self.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if job.status != JobStatus::Queued {
            return Ok(false);
        }
        let now = Utc::now();
        job.status = JobStatus::Running;
        job.progress = 1;
        job.last_error.clear();
        job.worker_id = Some(owner.to_string());
        job.started_at = Some(now);
        job.updated_at = now;
        Ok(true)
    }

    async fn update_status(&self, job_id: JobId, update: StatusUpdate) -> AppResult<bool> {
        self.check_available()?;
        let Some(mut job) = self.jobs.get_mut(&job_id) else {
            return Ok(false);
        };
        if !job.status.can_transition_to(update.status) {
            return Ok(false);
        }

        job.progress = if job.status == JobStatus::Running && update.status == JobStatus::Running {
            job.progress.max(update.progress)
        } else {
            update.progress
        };
        job.status = update.status;
        append_log(&mut job.logs, &update.log_line);
        if let Some(error) = update.last_error {
            job.last_error = error;
        }
        let now = Utc::now();
        if update.status.is_terminal() {
            job.finished_at = Some(now);
        }
        job.updated_at = now;
        Ok(true)
    }

    async fn increment_retry(&self, job_id: JobId, error: &str) -> AppResult<()> {
        self.check_available()?;
        let mut job = self
            .jobs
            .get_mut(&job_id)
            .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))?;
        job.retry_count += 1;
        job.last_error = error.to_string();
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn read_retry_state(&self, job_id: JobId) -> AppResult<RetryState> {
        self.check_available()?;
        self.jobs
            .get(&job_id)
            .map(|job| job.retry_state())
            .ok_or_else(|| AppError::not_found(format!("Job {job_id} not found")))
    }
}

/// Asset store held entirely in memory, resolving paths against a data root.
#[derive(Debug, Clone)]
pub struct MemoryAssetStore {
    data_root: PathBuf,
    assets: Arc<DashMap<AssetId, Asset>>,
    next_id: Arc<AtomicI64>,
}

impl MemoryAssetStore {
    /// Create an empty store rooted at `data_root`.
    pub fn new(data_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            assets: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Root directory that asset paths are relative to.
    pub fn data_root(&self) -> &Path {
        &self.data_root
    }

    /// Register an asset.
    pub fn insert(&self, data: &CreateAsset) -> Asset {
        let id = AssetId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let asset = Asset {
            id,
            original_name: data.original_name.clone(),
            path: data.path.clone(),
            output_path: None,
            waveform_path: None,
            duration_seconds: None,
            format_name: None,
            bit_rate: None,
            integrated_lufs: None,
            bpm: None,
            musical_key: None,
            created_at: Utc::now(),
        };
        self.assets.insert(id, asset.clone());
        asset
    }

    /// Snapshot of an asset.
    pub fn get(&self, id: AssetId) -> Option<Asset> {
        self.assets.get(&id).map(|asset| asset.clone())
    }

    fn with_asset(&self, id: AssetId, apply: impl FnOnce(&mut Asset)) -> AppResult<()> {
        let mut asset = self
            .assets
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("Asset {id} not found")))?;
        apply(&mut *asset);
        Ok(())
    }
}

#[async_trait]
impl AssetStore for MemoryAssetStore {
    async fn resolve_path(&self, asset_id: AssetId) -> AppResult<Option<PathBuf>> {
        Ok(self
            .assets
            .get(&asset_id)
            .map(|asset| self.absolute(&asset.path)))
    }

    async fn relative_path(&self, asset_id: AssetId) -> AppResult<Option<String>> {
        Ok(self.assets.get(&asset_id).map(|asset| asset.path.clone()))
    }

    fn absolute(&self, relative: &str) -> PathBuf {
        self.data_root.join(relative)
    }

    async fn record_probe(&self, asset_id: AssetId, info: &ProbeInfo) -> AppResult<()> {
        self.with_asset(asset_id, |asset| {
            asset.duration_seconds = Some(info.duration_seconds);
            asset.format_name = Some(info.format_name.clone());
            asset.bit_rate = info.bit_rate;
        })
    }

    async fn record_output(&self, asset_id: AssetId, output_path: &str) -> AppResult<()> {
        self.with_asset(asset_id, |asset| {
            asset.output_path = Some(output_path.to_string());
        })
    }

    async fn record_loudness(&self, asset_id: AssetId, lufs: f64) -> AppResult<()> {
        self.with_asset(asset_id, |asset| asset.integrated_lufs = Some(lufs))
    }

    async fn record_analysis(
        &self,
        asset_id: AssetId,
        analysis: &MusicalAnalysis,
    ) -> AppResult<()> {
        self.with_asset(asset_id, |asset| {
            asset.bpm = Some(analysis.bpm);
            asset.musical_key = Some(analysis.key.clone());
        })
    }

    async fn record_waveform(&self, asset_id: AssetId, waveform_path: &str) -> AppResult<()> {
        self.with_asset(asset_id, |asset| {
            asset.waveform_path = Some(waveform_path.to_string());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queued_job(store: &MemoryJobStore) -> JobId {
        store.insert(&CreateJob::for_asset(AssetId(1))).id
    }

    #[tokio::test]
    async fn test_claim_is_exclusive() {
        let store = MemoryJobStore::new();
        let id = queued_job(&store);

        assert!(store.try_claim(id, "a-w0").await.unwrap());
        assert!(!store.try_claim(id, "b-w0").await.unwrap());

        let job = store.get(id).unwrap();
        assert_eq!(job.status, JobStatus::Running);
        assert_eq!(job.progress, 1);
        assert_eq!(job.worker_id.as_deref(), Some("a-w0"));
    }

    #[tokio::test]
    async fn test_claim_unknown_job_is_not_claimed() {
        let store = MemoryJobStore::new();
        assert!(!store.try_claim(JobId(99), "a-w0").await.unwrap());
    }

    #[tokio::test]
    async fn test_update_rejects_illegal_transition() {
        let store = MemoryJobStore::new();
        let id = queued_job(&store);

        let applied = store
            .update_status(id, StatusUpdate::new(JobStatus::Done, 100, "done"))
            .await
            .unwrap();
        assert!(!applied);
        assert_eq!(store.get(id).unwrap().status, JobStatus::Queued);
        assert!(store.get(id).unwrap().logs.is_empty());
    }

    #[tokio::test]
    async fn test_progress_never_decreases_while_running() {
        let store = MemoryJobStore::new();
        let id = queued_job(&store);
        store.try_claim(id, "a-w0").await.unwrap();

        store
            .update_status(id, StatusUpdate::new(JobStatus::Running, 60, "transcoded"))
            .await
            .unwrap();
        store
            .update_status(id, StatusUpdate::new(JobStatus::Running, 10, "late write"))
            .await
            .unwrap();

        let job = store.get(id).unwrap();
        assert_eq!(job.progress, 60);
        assert_eq!(job.logs, "transcoded\nlate write");
    }

    #[tokio::test]
    async fn test_retry_bookkeeping() {
        let store = MemoryJobStore::new();
        let id = queued_job(&store);

        store.increment_retry(id, "probe failed").await.unwrap();
        store.increment_retry(id, "probe failed again").await.unwrap();

        let state = store.read_retry_state(id).await.unwrap();
        assert_eq!(state.retry_count, 2);
        assert_eq!(state.max_retries, 3);
        assert_eq!(store.get(id).unwrap().last_error, "probe failed again");
    }

    #[tokio::test]
    async fn test_unavailable_store_returns_infrastructure_error() {
        let store = MemoryJobStore::new();
        let id = queued_job(&store);
        store.set_unavailable(true);

        let err = store.try_claim(id, "a-w0").await.unwrap_err();
        assert!(err.is_infrastructure());
    }

    #[tokio::test]
    async fn test_asset_paths_resolve_against_root() {
        let root = tempfile::tempdir().unwrap();
        let store = MemoryAssetStore::new(root.path());
        let asset = store.insert(&CreateAsset {
            original_name: "take1.wav".to_string(),
            path: "uploads/take1.wav".to_string(),
        });

        let resolved = store.resolve_path(asset.id).await.unwrap().unwrap();
        assert_eq!(resolved, root.path().join("uploads/take1.wav"));
        assert!(store.resolve_path(AssetId(404)).await.unwrap().is_none());

        store.record_loudness(asset.id, -14.2).await.unwrap();
        assert_eq!(store.get(asset.id).unwrap().integrated_lufs, Some(-14.2));
    }
}
