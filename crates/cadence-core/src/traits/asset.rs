//! Asset lookup and incremental metric writes.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::result::AppResult;
use crate::types::{AssetId, MusicalAnalysis, ProbeInfo};

/// Store for uploaded assets and the metrics computed from them.
///
/// Paths handed out by this trait are absolute (already joined with the
/// storage data root); paths recorded through it are relative to the root.
#[async_trait]
pub trait AssetStore: Send + Sync + std::fmt::Debug + 'static {
    /// Locate the input file for an asset. `Ok(None)` means the asset does
    /// not exist, which the engine treats as a non-retryable failure.
    async fn resolve_path(&self, asset_id: AssetId) -> AppResult<Option<PathBuf>>;

    /// Relative path of the asset's input file, used to derive output names.
    async fn relative_path(&self, asset_id: AssetId) -> AppResult<Option<String>>;

    /// Absolute location for a path relative to the data root.
    fn absolute(&self, relative: &str) -> PathBuf;

    /// Record probe results (duration, format, bit rate).
    async fn record_probe(&self, asset_id: AssetId, info: &ProbeInfo) -> AppResult<()>;

    /// Record the derived (transcoded) output path.
    async fn record_output(&self, asset_id: AssetId, output_path: &str) -> AppResult<()>;

    /// Record integrated loudness in LUFS.
    async fn record_loudness(&self, asset_id: AssetId, lufs: f64) -> AppResult<()>;

    /// Record tempo and key.
    async fn record_analysis(&self, asset_id: AssetId, analysis: &MusicalAnalysis)
    -> AppResult<()>;

    /// Record the rendered waveform image path.
    async fn record_waveform(&self, asset_id: AssetId, waveform_path: &str) -> AppResult<()>;
}
