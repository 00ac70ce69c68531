//! [`MediaToolkit`] backed by ffmpeg, ffprobe and the Python analyzer.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use cadence_core::config::PipelineConfig;
use cadence_core::result::AppResult;
use cadence_core::traits::MediaToolkit;
use cadence_core::types::{MusicalAnalysis, ProbeInfo};

use crate::error::ToolError;
use crate::executor::{self, ToolCommand};
use crate::parse;

/// Loudness target passed to `loudnorm`; only the measured input values are read.
const LOUDNORM_FILTER: &str = "loudnorm=I=-16:TP=-1.5:LRA=11:print_format=summary";

/// Audio toolkit that shells out to the configured executables.
#[derive(Debug, Clone)]
pub struct FfmpegToolkit {
    config: PipelineConfig,
}

impl FfmpegToolkit {
    /// Create a toolkit from pipeline configuration.
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    fn probe_command(&self, input: &Path) -> ToolCommand {
        ToolCommand::new(&self.config.ffprobe_path)
            .args(["-v", "error", "-show_entries", "format=duration,format_name,bit_rate"])
            .args(["-of", "default=noprint_wrappers=1:nokey=0"])
            .path(input)
    }

    fn transcode_command(&self, input: &Path, output: &Path) -> ToolCommand {
        ToolCommand::new(&self.config.ffmpeg_path)
            .args(["-hide_banner", "-y", "-i"])
            .path(input)
            .arg("-vn")
            .args(["-ar".to_string(), self.config.sample_rate.to_string()])
            .args(["-ac".to_string(), self.config.channels.to_string()])
            .args(["-b:a", self.config.bitrate.as_str()])
            .path(output)
    }

    fn loudness_command(&self, input: &Path) -> ToolCommand {
        ToolCommand::new(&self.config.ffmpeg_path)
            .args(["-hide_banner", "-nostats", "-i"])
            .path(input)
            .args(["-filter_complex", LOUDNORM_FILTER, "-f", "null", "-"])
    }

    fn analysis_command(&self, input: &Path) -> ToolCommand {
        ToolCommand::new(&self.config.python_path)
            .arg(self.config.analyzer_script.as_str())
            .path(input)
    }

    fn waveform_command(&self, input: &Path, output: &Path) -> ToolCommand {
        let filter = format!(
            "aformat=channel_layouts=stereo,showwavespic=s={}x{}",
            self.config.waveform_width, self.config.waveform_height
        );
        ToolCommand::new(&self.config.ffmpeg_path)
            .args(["-hide_banner", "-y", "-i"])
            .path(input)
            .arg("-filter_complex")
            .arg(filter)
            .args(["-frames:v", "1"])
            .path(output)
    }
}

async fn ensure_parent(path: &Path) -> Result<(), ToolError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    Ok(())
}

#[async_trait]
impl MediaToolkit for FfmpegToolkit {
    async fn probe(&self, input: &Path, deadline: Duration) -> AppResult<ProbeInfo> {
        let out = executor::run(&self.probe_command(input), deadline).await?;
        Ok(parse::parse_probe(&out.stdout)?)
    }

    async fn transcode(&self, input: &Path, output: &Path, deadline: Duration) -> AppResult<()> {
        ensure_parent(output).await?;
        let out = executor::run(&self.transcode_command(input, output), deadline).await?;
        if !tokio::fs::try_exists(output).await.unwrap_or(false) {
            return Err(ToolError::parse(
                "ffmpeg",
                format!("no output written to {}", output.display()),
            )
            .into());
        }
        debug!(output = %output.display(), elapsed_ms = out.elapsed.as_millis() as u64, "Transcoded");
        Ok(())
    }

    async fn loudness(&self, input: &Path, deadline: Duration) -> AppResult<f64> {
        let out = executor::run(&self.loudness_command(input), deadline).await?;
        Ok(parse::parse_loudness(&out.stderr)?)
    }

    async fn analyze(&self, input: &Path, deadline: Duration) -> AppResult<MusicalAnalysis> {
        let out = executor::run(&self.analysis_command(input), deadline).await?;
        Ok(parse::parse_analysis(&out.stdout)?)
    }

    async fn waveform(&self, input: &Path, output: &Path, deadline: Duration) -> AppResult<()> {
        ensure_parent(output).await?;
        executor::run(&self.waveform_command(input, output), deadline).await?;
        Ok(())
    }
}
