//! Asset entity model.

use cadence_core::types::AssetId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// An uploaded media file and the metrics derived from it.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Asset {
    /// Store-assigned identifier.
    pub id: AssetId,
    /// File name as uploaded.
    pub original_name: String,
    /// Input path relative to the storage data root.
    pub path: String,
    /// Transcoded output path, relative to the data root.
    pub output_path: Option<String>,
    /// Waveform image path, relative to the data root.
    pub waveform_path: Option<String>,
    /// Duration in seconds.
    pub duration_seconds: Option<f64>,
    /// Container format name.
    pub format_name: Option<String>,
    /// Overall bit rate in bits per second.
    pub bit_rate: Option<i64>,
    /// Integrated loudness in LUFS.
    pub integrated_lufs: Option<f64>,
    /// Estimated tempo.
    pub bpm: Option<f64>,
    /// Estimated key.
    pub musical_key: Option<String>,
    /// When the asset was registered.
    pub created_at: DateTime<Utc>,
}

/// Data required to register an asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateAsset {
    /// File name as uploaded.
    pub original_name: String,
    /// Input path relative to the storage data root.
    pub path: String,
}
