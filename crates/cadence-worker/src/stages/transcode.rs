use async_trait::async_trait;

use cadence_core::result::AppResult;

use crate::pipeline::{Stage, StageContext, StagePolicy};

/// Relative path of the transcoded output for an input path.
pub fn output_path_for(input_relative: &str, format: &str) -> String {
    format!("{input_relative}.{format}")
}

/// Converts the input into the configured delivery format.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscodeStage;

#[async_trait]
impl Stage for TranscodeStage {
    fn name(&self) -> &'static str {
        "transcode"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::Fatal
    }

    fn progress(&self) -> i32 {
        60
    }

    async fn run(&self, ctx: &mut StageContext) -> AppResult<String> {
        let relative = output_path_for(&ctx.input_relative, &ctx.config.output_format);
        let output = ctx.assets.absolute(&relative);
        ctx.toolkit
            .transcode(&ctx.input, &output, ctx.config.timeouts.transcode())
            .await?;
        ctx.assets.record_output(ctx.asset_id, &relative).await?;
        let note = format!("transcode done ({relative})");
        ctx.output_relative = Some(relative);
        Ok(note)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_keeps_input_name() {
        assert_eq!(
            output_path_for("uploads/2024/take-3.wav", "mp3"),
            "uploads/2024/take-3.wav.mp3"
        );
    }
}
