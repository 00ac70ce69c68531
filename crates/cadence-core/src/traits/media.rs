//! External audio toolchain contract.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{MusicalAnalysis, ProbeInfo};

/// The audio tools the pipeline stages delegate to.
///
/// Every call is bounded by `deadline`; implementations must abandon (and
/// kill) the underlying tool once it elapses and return a timeout error.
#[async_trait]
pub trait MediaToolkit: Send + Sync + std::fmt::Debug + 'static {
    /// Read duration, container format and bit rate.
    async fn probe(&self, input: &Path, deadline: Duration) -> AppResult<ProbeInfo>;

    /// Transcode `input` into `output`; the output format follows the file extension.
    async fn transcode(&self, input: &Path, output: &Path, deadline: Duration) -> AppResult<()>;

    /// Measure integrated loudness in LUFS.
    async fn loudness(&self, input: &Path, deadline: Duration) -> AppResult<f64>;

    /// Estimate tempo and musical key.
    async fn analyze(&self, input: &Path, deadline: Duration) -> AppResult<MusicalAnalysis>;

    /// Render a waveform PNG of `input` into `output`.
    async fn waveform(&self, input: &Path, output: &Path, deadline: Duration) -> AppResult<()>;
}
