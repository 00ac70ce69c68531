//! Value types produced by the media toolkit.

use serde::{Deserialize, Serialize};

/// Basic container information reported by the probe stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProbeInfo {
    /// Duration in seconds.
    pub duration_seconds: f64,
    /// Container format name (e.g. `"wav"`, `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format_name: String,
    /// Overall bit rate in bits per second, when reported.
    pub bit_rate: Option<i64>,
}

/// Tempo and key estimate from the musical analysis stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicalAnalysis {
    /// Estimated tempo in beats per minute.
    pub bpm: f64,
    /// Estimated key (e.g. `"A minor"`).
    pub key: String,
}
