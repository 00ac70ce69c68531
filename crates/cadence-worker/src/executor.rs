//! Stage executor: runs the pipeline registered for a job's type.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, warn};

use cadence_core::config::PipelineConfig;
use cadence_core::error::AppError;
use cadence_core::traits::{AssetStore, MediaToolkit};
use cadence_entity::job::{DEFAULT_JOB_TYPE, JobMessage};

use crate::lifecycle::JobLifecycle;
use crate::pipeline::{Stage, StageContext, StagePolicy, StageResult};
use crate::stages;

/// Why an attempt did not succeed.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A precondition that no retry can fix (missing asset, unknown job type).
    #[error("{0}")]
    NonRetryable(String),

    /// A fatal stage failed.
    #[error("{stage} failed: {}", .source.message)]
    Stage {
        /// Name of the failed stage.
        stage: &'static str,
        /// Underlying failure.
        #[source]
        source: AppError,
    },

    /// The attempt ran past the per-attempt deadline.
    #[error("attempt exceeded the {seconds}s job deadline")]
    Timeout {
        /// Deadline that elapsed.
        seconds: u64,
    },

    /// The store could not be reached while preparing the attempt.
    #[error("infrastructure error: {}", .0.message)]
    Infrastructure(#[source] AppError),
}

impl PipelineError {
    /// Whether the retry controller should handle this failure.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, Self::NonRetryable(_))
    }
}

/// Dispatches a claimed job to the pipeline registered for its type.
#[derive(Debug)]
pub struct StageExecutor {
    pipelines: HashMap<String, Vec<Arc<dyn Stage>>>,
    lifecycle: JobLifecycle,
    assets: Arc<dyn AssetStore>,
    toolkit: Arc<dyn MediaToolkit>,
    config: Arc<PipelineConfig>,
}

impl StageExecutor {
    /// Create an executor with no pipelines registered.
    pub fn new(
        lifecycle: JobLifecycle,
        assets: Arc<dyn AssetStore>,
        toolkit: Arc<dyn MediaToolkit>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            pipelines: HashMap::new(),
            lifecycle,
            assets,
            toolkit,
            config: Arc::new(config),
        }
    }

    /// Create an executor with the `transcode` pipeline registered.
    pub fn with_default_pipelines(
        lifecycle: JobLifecycle,
        assets: Arc<dyn AssetStore>,
        toolkit: Arc<dyn MediaToolkit>,
        config: PipelineConfig,
    ) -> Self {
        let mut executor = Self::new(lifecycle, assets, toolkit, config);
        executor.register(DEFAULT_JOB_TYPE, stages::transcode_pipeline());
        executor
    }

    /// Register the pipeline for a job type, replacing any previous one.
    pub fn register(&mut self, job_type: impl Into<String>, stages: Vec<Arc<dyn Stage>>) {
        let job_type = job_type.into();
        info!(job_type = %job_type, stages = stages.len(), "Registered pipeline");
        self.pipelines.insert(job_type, stages);
    }

    /// Check if a pipeline is registered for a job type.
    pub fn has_pipeline(&self, job_type: &str) -> bool {
        self.pipelines.contains_key(job_type)
    }

    /// Get the list of registered job types.
    pub fn registered_types(&self) -> Vec<String> {
        self.pipelines.keys().cloned().collect()
    }

    /// Run every stage for a claimed job, in order.
    ///
    /// Progress and one log line are written after each stage. Returns the
    /// first fatal failure; best-effort failures are only recorded.
    pub async fn execute(&self, message: &JobMessage) -> Result<(), PipelineError> {
        let job_id = message.job_id;
        let stages = self.pipelines.get(&message.job_type).ok_or_else(|| {
            PipelineError::NonRetryable(format!(
                "no pipeline registered for job type '{}'",
                message.job_type
            ))
        })?;

        let mut ctx = self.prepare(message).await?;

        for stage in stages {
            let name = stage.name();
            debug!(job_id = %job_id, stage = name, "Running stage");

            let result = match stage.run(&mut ctx).await {
                Ok(note) => StageResult {
                    progress: stage.progress(),
                    note,
                },
                Err(source) => match stage.policy() {
                    StagePolicy::Fatal => {
                        warn!(job_id = %job_id, stage = name, error = %source, "Fatal stage failure");
                        return Err(PipelineError::Stage {
                            stage: name,
                            source,
                        });
                    }
                    StagePolicy::BestEffort => {
                        warn!(job_id = %job_id, stage = name, error = %source, "Stage failed, continuing");
                        StageResult {
                            progress: stage.progress(),
                            note: format!("{name} failed: {}", source.message),
                        }
                    }
                },
            };

            self.lifecycle
                .progress(job_id, result.progress, &result.note)
                .await;
        }

        Ok(())
    }

    async fn prepare(&self, message: &JobMessage) -> Result<StageContext, PipelineError> {
        let asset_id = message.asset_id;
        let missing = || PipelineError::NonRetryable(format!("asset {asset_id} not found"));

        let input_relative = self
            .assets
            .relative_path(asset_id)
            .await
            .map_err(PipelineError::Infrastructure)?
            .ok_or_else(missing)?;
        let input = self.assets.absolute(&input_relative);

        Ok(StageContext {
            job_id: message.job_id,
            asset_id,
            input,
            input_relative,
            output_relative: None,
            assets: Arc::clone(&self.assets),
            toolkit: Arc::clone(&self.toolkit),
            config: Arc::clone(&self.config),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::time::Duration;

    use cadence_core::AppResult;
    use cadence_core::types::{AssetId, JobId, MusicalAnalysis, ProbeInfo};
    use cadence_database::{MemoryAssetStore, MemoryJobStore};

    #[test]
    fn test_only_preconditions_are_non_retryable() {
        assert!(!PipelineError::NonRetryable("asset 1 not found".into()).is_retryable());
        assert!(PipelineError::Timeout { seconds: 600 }.is_retryable());
        assert!(
            PipelineError::Stage {
                stage: "probe",
                source: AppError::external_tool("ffprobe exited with code 1"),
            }
            .is_retryable()
        );
    }

    #[test]
    fn test_stage_error_message() {
        let err = PipelineError::Stage {
            stage: "transcode",
            source: AppError::timeout("ffmpeg timed out after 300s"),
        };
        assert_eq!(err.to_string(), "transcode failed: ffmpeg timed out after 300s");
    }

    #[derive(Debug)]
    struct UnusedToolkit;

    #[async_trait::async_trait]
    impl MediaToolkit for UnusedToolkit {
        async fn probe(&self, _: &Path, _: Duration) -> AppResult<ProbeInfo> {
            unreachable!("no stage should run")
        }
        async fn transcode(&self, _: &Path, _: &Path, _: Duration) -> AppResult<()> {
            unreachable!("no stage should run")
        }
        async fn loudness(&self, _: &Path, _: Duration) -> AppResult<f64> {
            unreachable!("no stage should run")
        }
        async fn analyze(&self, _: &Path, _: Duration) -> AppResult<MusicalAnalysis> {
            unreachable!("no stage should run")
        }
        async fn waveform(&self, _: &Path, _: &Path, _: Duration) -> AppResult<()> {
            unreachable!("no stage should run")
        }
    }

    fn executor() -> StageExecutor {
        StageExecutor::with_default_pipelines(
            JobLifecycle::new(Arc::new(MemoryJobStore::new())),
            Arc::new(MemoryAssetStore::new("/srv/cadence")),
            Arc::new(UnusedToolkit),
            PipelineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_unknown_job_type_is_non_retryable() {
        let message = JobMessage::new(JobId(1), AssetId(1), "stems");
        let err = executor().execute(&message).await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "no pipeline registered for job type 'stems'");
    }

    /// Asset store that counts lookups before delegating.
    #[derive(Debug)]
    struct CountingAssets {
        inner: MemoryAssetStore,
        lookups: std::sync::atomic::AtomicUsize,
    }

    impl CountingAssets {
        fn lookups(&self) -> usize {
            self.lookups.load(std::sync::atomic::Ordering::SeqCst)
        }

        fn count(&self) {
            self.lookups.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        }
    }

    #[async_trait::async_trait]
    impl AssetStore for CountingAssets {
        async fn resolve_path(&self, id: AssetId) -> AppResult<Option<std::path::PathBuf>> {
            self.count();
            self.inner.resolve_path(id).await
        }
        async fn relative_path(&self, id: AssetId) -> AppResult<Option<String>> {
            self.count();
            self.inner.relative_path(id).await
        }
        fn absolute(&self, relative: &str) -> std::path::PathBuf {
            self.inner.absolute(relative)
        }
        async fn record_probe(&self, id: AssetId, info: &ProbeInfo) -> AppResult<()> {
            self.inner.record_probe(id, info).await
        }
        async fn record_output(&self, id: AssetId, path: &str) -> AppResult<()> {
            self.inner.record_output(id, path).await
        }
        async fn record_loudness(&self, id: AssetId, lufs: f64) -> AppResult<()> {
            self.inner.record_loudness(id, lufs).await
        }
        async fn record_analysis(&self, id: AssetId, analysis: &MusicalAnalysis) -> AppResult<()> {
            self.inner.record_analysis(id, analysis).await
        }
        async fn record_waveform(&self, id: AssetId, path: &str) -> AppResult<()> {
            self.inner.record_waveform(id, path).await
        }
    }

    #[tokio::test]
    async fn test_asset_is_looked_up_once_per_attempt() {
        let inner = MemoryAssetStore::new("/srv/cadence");
        let asset = inner.insert(&cadence_entity::asset::CreateAsset {
            original_name: "take1.wav".to_string(),
            path: "uploads/take1.wav".to_string(),
        });
        let assets = Arc::new(CountingAssets {
            inner,
            lookups: std::sync::atomic::AtomicUsize::new(0),
        });

        let mut executor = StageExecutor::new(
            JobLifecycle::new(Arc::new(MemoryJobStore::new())),
            assets.clone(),
            Arc::new(UnusedToolkit),
            PipelineConfig::default(),
        );
        executor.register("noop", Vec::new());

        let message = JobMessage::new(JobId(1), asset.id, "noop");
        executor.execute(&message).await.unwrap();
        assert_eq!(assets.lookups(), 1);
    }

    #[tokio::test]
    async fn test_missing_asset_is_non_retryable() {
        let message = JobMessage::new(JobId(1), AssetId(7), DEFAULT_JOB_TYPE);
        let err = executor().execute(&message).await.unwrap_err();
        assert!(matches!(err, PipelineError::NonRetryable(ref m) if m == "asset 7 not found"));
    }
}
