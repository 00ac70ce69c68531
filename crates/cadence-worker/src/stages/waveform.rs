use async_trait::async_trait;

use cadence_core::result::AppResult;

use crate::pipeline::{Stage, StageContext, StagePolicy};

/// Relative path of the waveform image for a transcoded output:
/// the output's extension is replaced by `-wave.png`.
pub fn waveform_path_for(output_relative: &str) -> String {
    let stem = match output_relative.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !stem.ends_with('/') && !ext.contains('/') => {
            stem
        }
        _ => output_relative,
    };
    format!("{stem}-wave.png")
}

/// Renders a waveform image of the transcoded output.
#[derive(Debug, Clone, Copy, Default)]
pub struct WaveformStage;

#[async_trait]
impl Stage for WaveformStage {
    fn name(&self) -> &'static str {
        "waveform"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::BestEffort
    }

    fn progress(&self) -> i32 {
        95
    }

    async fn run(&self, ctx: &mut StageContext) -> AppResult<String> {
        let source = ctx.output_relative.as_deref().unwrap_or(&ctx.input_relative);
        let relative = waveform_path_for(source);
        let image = ctx.assets.absolute(&relative);
        ctx.toolkit
            .waveform(&ctx.media_source(), &image, ctx.config.timeouts.waveform())
            .await?;
        ctx.assets.record_waveform(ctx.asset_id, &relative).await?;
        Ok("waveform generated".to_string())
    }
}
