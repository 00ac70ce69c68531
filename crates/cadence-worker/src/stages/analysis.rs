use async_trait::async_trait;

use cadence_core::result::AppResult;

use crate::pipeline::{Stage, StageContext, StagePolicy};

/// Estimates tempo and key.
#[derive(Debug, Clone, Copy, Default)]
pub struct AnalysisStage;

#[async_trait]
impl Stage for AnalysisStage {
    fn name(&self) -> &'static str {
        "analysis"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::BestEffort
    }

    fn progress(&self) -> i32 {
        90
    }

    async fn run(&self, ctx: &mut StageContext) -> AppResult<String> {
        let analysis = ctx
            .toolkit
            .analyze(&ctx.media_source(), ctx.config.timeouts.analysis())
            .await?;
        ctx.assets.record_analysis(ctx.asset_id, &analysis).await?;
        Ok(format!("bpm={:.2} key={}", analysis.bpm, analysis.key))
    }
}
