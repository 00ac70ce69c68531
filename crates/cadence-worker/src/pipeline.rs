//! Stage abstraction for job pipelines.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use cadence_core::config::PipelineConfig;
use cadence_core::result::AppResult;
use cadence_core::traits::{AssetStore, MediaToolkit};
use cadence_core::types::{AssetId, JobId};

/// How a stage failure affects the attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StagePolicy {
    /// Abort the pipeline; the attempt fails and goes to the retry controller.
    Fatal,
    /// Record a failure note and continue with the next stage.
    BestEffort,
}

/// Outcome of one stage, folded into the job's progress and log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageResult {
    /// Progress to report once the stage has finished.
    pub progress: i32,
    /// Line appended to the job log.
    pub note: String,
}

/// Everything a stage needs while processing one job attempt.
#[derive(Debug, Clone)]
pub struct StageContext {
    /// Job being processed.
    pub job_id: JobId,
    /// Asset the job belongs to.
    pub asset_id: AssetId,
    /// Absolute path of the asset's input file.
    pub input: PathBuf,
    /// Input path relative to the data root.
    pub input_relative: String,
    /// Transcoded output relative to the data root, once produced.
    pub output_relative: Option<String>,
    /// Asset lookup and metric writes.
    pub assets: Arc<dyn AssetStore>,
    /// External audio tools.
    pub toolkit: Arc<dyn MediaToolkit>,
    /// Tool settings and per-stage deadlines.
    pub config: Arc<PipelineConfig>,
}

impl StageContext {
    /// Absolute path of the transcoded output, if any.
    pub fn output(&self) -> Option<PathBuf> {
        self.output_relative
            .as_deref()
            .map(|rel| self.assets.absolute(rel))
    }

    /// File that analysis stages read: the transcoded output when present,
    /// the original input otherwise.
    pub fn media_source(&self) -> PathBuf {
        self.output().unwrap_or_else(|| self.input.clone())
    }
}

/// One step of a pipeline.
#[async_trait]
pub trait Stage: Send + Sync + std::fmt::Debug {
    /// Name used in logs and failure notes.
    fn name(&self) -> &'static str;

    /// Whether a failure aborts the attempt.
    fn policy(&self) -> StagePolicy;

    /// Progress reported after the stage, whether it succeeded or failed
    /// best-effort.
    fn progress(&self) -> i32;

    /// Run the stage and return the log note on success.
    async fn run(&self, ctx: &mut StageContext) -> AppResult<String>;
}
