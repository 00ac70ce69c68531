//! Stages of the default `transcode` pipeline.
//!
//! | stage     | policy      | progress |
//! |-----------|-------------|----------|
//! | probe     | fatal       | 10       |
//! | transcode | fatal       | 60       |
//! | loudness  | best-effort | 75       |
//! | analysis  | best-effort | 90       |
//! | waveform  | best-effort | 95       |
//! | finalize  | fatal       | 99       |

mod analysis;
mod finalize;
mod loudness;
mod probe;
mod transcode;
mod waveform;

use std::sync::Arc;

use crate::pipeline::Stage;

pub use analysis::AnalysisStage;
pub use finalize::FinalizeStage;
pub use loudness::LoudnessStage;
pub use probe::ProbeStage;
pub use transcode::{TranscodeStage, output_path_for};
pub use waveform::{WaveformStage, waveform_path_for};

/// The pipeline run for jobs of type `transcode`.
pub fn transcode_pipeline() -> Vec<Arc<dyn Stage>> {
    vec![
        Arc::new(ProbeStage),
        Arc::new(TranscodeStage),
        Arc::new(LoudnessStage),
        Arc::new(AnalysisStage),
        Arc::new(WaveformStage),
        Arc::new(FinalizeStage),
    ]
}
