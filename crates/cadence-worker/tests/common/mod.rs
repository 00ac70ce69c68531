//! Shared fixtures for worker integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use cadence_core::AppResult;
use cadence_core::config::{PipelineConfig, WorkerConfig};
use cadence_core::error::AppError;
use cadence_core::traits::MediaToolkit;
use cadence_core::types::{JobId, JobStatus, MusicalAnalysis, ProbeInfo};
use cadence_database::{MemoryAssetStore, MemoryJobStore};
use cadence_entity::asset::CreateAsset;
use cadence_entity::job::{CreateJob, Job};
use cadence_worker::lifecycle::JobLifecycle;
use cadence_worker::{MetricsSnapshot, StageExecutor, WorkerPool};

/// Toolkit whose tools succeed instantly unless told to fail or stall.
#[derive(Debug, Default)]
pub struct ScriptedToolkit {
    failures: Mutex<HashMap<&'static str, usize>>,
    delays: Mutex<HashMap<&'static str, Duration>>,
    calls: Mutex<HashMap<&'static str, usize>>,
}

impl ScriptedToolkit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `tool` fail the next `times` calls.
    pub fn fail(self, tool: &'static str, times: usize) -> Self {
        self.failures.lock().insert(tool, times);
        self
    }

    /// Make every call to `tool` fail.
    pub fn fail_always(self, tool: &'static str) -> Self {
        self.fail(tool, usize::MAX)
    }

    /// Make every call to `tool` take `delay`.
    pub fn delay(self, tool: &'static str, delay: Duration) -> Self {
        self.delays.lock().insert(tool, delay);
        self
    }

    /// How many times `tool` was invoked.
    pub fn calls(&self, tool: &'static str) -> usize {
        self.calls.lock().get(tool).copied().unwrap_or(0)
    }

    async fn enter(&self, tool: &'static str) -> AppResult<()> {
        *self.calls.lock().entry(tool).or_default() += 1;

        let delay = self.delays.lock().get(tool).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut failures = self.failures.lock();
        match failures.get_mut(tool) {
            Some(remaining) if *remaining > 0 => {
                if *remaining != usize::MAX {
                    *remaining -= 1;
                }
                Err(AppError::external_tool(format!("{tool} exited with code 1")))
            }
            _ => Ok(()),
        }
    }
}

async fn touch(path: &Path) -> AppResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(path, b"fake media").await?;
    Ok(())
}

#[async_trait]
impl MediaToolkit for ScriptedToolkit {
    async fn probe(&self, _input: &Path, _deadline: Duration) -> AppResult<ProbeInfo> {
        self.enter("probe").await?;
        Ok(ProbeInfo {
            duration_seconds: 184.03,
            format_name: "wav".to_string(),
            bit_rate: Some(1_411_200),
        })
    }

    async fn transcode(&self, _input: &Path, output: &Path, _deadline: Duration) -> AppResult<()> {
        self.enter("transcode").await?;
        touch(output).await
    }

    async fn loudness(&self, _input: &Path, _deadline: Duration) -> AppResult<f64> {
        self.enter("loudness").await?;
        Ok(-14.2)
    }

    async fn analyze(&self, _input: &Path, _deadline: Duration) -> AppResult<MusicalAnalysis> {
        self.enter("analysis").await?;
        Ok(MusicalAnalysis {
            bpm: 124.0,
            key: "Am".to_string(),
        })
    }

    async fn waveform(&self, _input: &Path, output: &Path, _deadline: Duration) -> AppResult<()> {
        self.enter("waveform").await?;
        touch(output).await
    }
}

/// Worker settings with short delays suitable for tests.
pub fn worker_config() -> WorkerConfig {
    WorkerConfig {
        concurrency: 2,
        queue_size: 16,
        job_timeout_seconds: 30,
        retry_base_delay_ms: 10,
        max_pending_retries: 64,
        shutdown_grace_seconds: 5,
        instance_name: "it".to_string(),
    }
}

/// A pool over in-memory stores and a scripted toolkit.
pub struct Harness {
    pub store: MemoryJobStore,
    pub assets: MemoryAssetStore,
    pub toolkit: Arc<ScriptedToolkit>,
    pub pool: Arc<WorkerPool>,
    pub cancel: CancellationToken,
    uploads: AtomicUsize,
    _root: TempDir,
}

impl Harness {
    pub fn new(toolkit: ScriptedToolkit) -> Self {
        Self::with_config(toolkit, worker_config())
    }

    pub fn with_config(toolkit: ScriptedToolkit, config: WorkerConfig) -> Self {
        let root = tempfile::tempdir().expect("tempdir");
        let store = MemoryJobStore::new();
        let assets = MemoryAssetStore::new(root.path());
        let toolkit = Arc::new(toolkit);

        let executor = StageExecutor::with_default_pipelines(
            JobLifecycle::new(Arc::new(store.clone())),
            Arc::new(assets.clone()),
            toolkit.clone(),
            PipelineConfig::default(),
        );
        let pool = Arc::new(WorkerPool::new(config, Arc::new(store.clone()), executor));

        Self {
            store,
            assets,
            toolkit,
            pool,
            cancel: CancellationToken::new(),
            uploads: AtomicUsize::new(0),
            _root: root,
        }
    }

    pub fn start(&self) {
        self.pool.start(self.cancel.clone()).expect("start pool");
    }

    /// Register an uploaded file and create a queued job for it.
    pub fn create_job(&self, job_type: &str, max_retries: i32) -> Job {
        let n = self.uploads.fetch_add(1, Ordering::SeqCst);
        let relative = format!("uploads/track-{n}.wav");
        let input = self.assets.data_root().join(&relative);
        std::fs::create_dir_all(input.parent().expect("parent")).expect("mkdir");
        std::fs::write(&input, b"RIFF").expect("write input");

        let asset = self.assets.insert(&CreateAsset {
            original_name: format!("track-{n}.wav"),
            path: relative,
        });
        self.store.insert(&CreateJob {
            asset_id: asset.id,
            job_type: job_type.to_string(),
            max_retries,
        })
    }

    /// Create a `transcode` job and hand its message to the pool.
    pub fn submit(&self, max_retries: i32) -> Job {
        let job = self.create_job("transcode", max_retries);
        self.pool.enqueue(job.message()).expect("enqueue");
        job
    }

    pub fn job(&self, id: JobId) -> Job {
        self.store.get(id).expect("job exists")
    }

    pub async fn wait_for_status(&self, id: JobId, status: JobStatus) -> Job {
        self.wait_until(|h| h.job(id).status == status).await;
        self.job(id)
    }

    pub async fn wait_for_metrics(&self, check: impl Fn(&MetricsSnapshot) -> bool) {
        self.wait_until(|h| check(&h.pool.metrics().snapshot())).await;
    }

    async fn wait_until(&self, check: impl Fn(&Self) -> bool) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !check(self) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "condition not reached in time; jobs: {:#?}",
                self.store.all()
            );
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}
