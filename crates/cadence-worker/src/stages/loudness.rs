use async_trait::async_trait;

use cadence_core::result::AppResult;

use crate::pipeline::{Stage, StageContext, StagePolicy};

/// Measures integrated loudness.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoudnessStage;

#[async_trait]
impl Stage for LoudnessStage {
    fn name(&self) -> &'static str {
        "loudness"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::BestEffort
    }

    fn progress(&self) -> i32 {
        75
    }

    async fn run(&self, ctx: &mut StageContext) -> AppResult<String> {
        let lufs = ctx
            .toolkit
            .loudness(&ctx.media_source(), ctx.config.timeouts.loudness())
            .await?;
        ctx.assets.record_loudness(ctx.asset_id, lufs).await?;
        Ok(format!("loudness={lufs:.2} LUFS"))
    }
}
