//! Processing pipeline and external tool configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the audio processing stages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Path to the `ffmpeg` executable.
    #[serde(default = "default_ffmpeg")]
    pub ffmpeg_path: String,
    /// Path to the `ffprobe` executable.
    #[serde(default = "default_ffprobe")]
    pub ffprobe_path: String,
    /// Python interpreter used to run the analyzer script.
    #[serde(default = "default_python")]
    pub python_path: String,
    /// Tempo/key analyzer script.
    #[serde(default = "default_analyzer_script")]
    pub analyzer_script: String,
    /// Extension (and therefore format) of transcoded output.
    #[serde(default = "default_output_format")]
    pub output_format: String,
    /// Output sample rate in Hz.
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    /// Output channel count.
    #[serde(default = "default_channels")]
    pub channels: u32,
    /// Output audio bit rate (ffmpeg syntax, e.g. `"192k"`).
    #[serde(default = "default_bitrate")]
    pub bitrate: String,
    /// Waveform image width in pixels.
    #[serde(default = "default_waveform_width")]
    pub waveform_width: u32,
    /// Waveform image height in pixels.
    #[serde(default = "default_waveform_height")]
    pub waveform_height: u32,
    /// Per-stage deadlines.
    #[serde(default)]
    pub timeouts: StageTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg(),
            ffprobe_path: default_ffprobe(),
            python_path: default_python(),
            analyzer_script: default_analyzer_script(),
            output_format: default_output_format(),
            sample_rate: default_sample_rate(),
            channels: default_channels(),
            bitrate: default_bitrate(),
            waveform_width: default_waveform_width(),
            waveform_height: default_waveform_height(),
            timeouts: StageTimeouts::default(),
        }
    }
}

/// Deadlines, in seconds, for each external stage call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTimeouts {
    /// Probe deadline.
    #[serde(default = "default_probe_timeout")]
    pub probe_seconds: u64,
    /// Transcode deadline.
    #[serde(default = "default_transcode_timeout")]
    pub transcode_seconds: u64,
    /// Loudness measurement deadline.
    #[serde(default = "default_loudness_timeout")]
    pub loudness_seconds: u64,
    /// Musical analysis deadline.
    #[serde(default = "default_analysis_timeout")]
    pub analysis_seconds: u64,
    /// Waveform rendering deadline.
    #[serde(default = "default_waveform_timeout")]
    pub waveform_seconds: u64,
}

impl StageTimeouts {
    /// Probe deadline.
    pub fn probe(&self) -> Duration {
        Duration::from_secs(self.probe_seconds)
    }

    /// Transcode deadline.
    pub fn transcode(&self) -> Duration {
        Duration::from_secs(self.transcode_seconds)
    }

    /// Loudness deadline.
    pub fn loudness(&self) -> Duration {
        Duration::from_secs(self.loudness_seconds)
    }

    /// Analysis deadline.
    pub fn analysis(&self) -> Duration {
        Duration::from_secs(self.analysis_seconds)
    }

    /// Waveform deadline.
    pub fn waveform(&self) -> Duration {
        Duration::from_secs(self.waveform_seconds)
    }

    /// The longest single stage deadline.
    pub fn longest(&self) -> Duration {
        [
            self.probe(),
            self.transcode(),
            self.loudness(),
            self.analysis(),
            self.waveform(),
        ]
        .into_iter()
        .max()
        .unwrap_or_default()
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            probe_seconds: default_probe_timeout(),
            transcode_seconds: default_transcode_timeout(),
            loudness_seconds: default_loudness_timeout(),
            analysis_seconds: default_analysis_timeout(),
            waveform_seconds: default_waveform_timeout(),
        }
    }
}

fn default_ffmpeg() -> String {
    "ffmpeg".to_string()
}

fn default_ffprobe() -> String {
    "ffprobe".to_string()
}

fn default_python() -> String {
    "python3".to_string()
}

fn default_analyzer_script() -> String {
    "./tools/analyze.py".to_string()
}

fn default_output_format() -> String {
    "mp3".to_string()
}

fn default_sample_rate() -> u32 {
    44_100
}

fn default_channels() -> u32 {
    2
}

fn default_bitrate() -> String {
    "192k".to_string()
}

fn default_waveform_width() -> u32 {
    800
}

fn default_waveform_height() -> u32 {
    160
}

fn default_probe_timeout() -> u64 {
    30
}

fn default_transcode_timeout() -> u64 {
    300
}

fn default_loudness_timeout() -> u64 {
    120
}

fn default_analysis_timeout() -> u64 {
    60
}

fn default_waveform_timeout() -> u64 {
    60
}
