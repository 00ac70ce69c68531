use async_trait::async_trait;

use cadence_core::result::AppResult;

use crate::pipeline::{Stage, StageContext, StagePolicy};

/// Reads duration, format and bit rate of the input.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProbeStage;

#[async_trait]
impl Stage for ProbeStage {
    fn name(&self) -> &'static str {
        "probe"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::Fatal
    }

    fn progress(&self) -> i32 {
        10
    }

    async fn run(&self, ctx: &mut StageContext) -> AppResult<String> {
        let info = ctx
            .toolkit
            .probe(&ctx.input, ctx.config.timeouts.probe())
            .await?;
        ctx.assets.record_probe(ctx.asset_id, &info).await?;
        Ok(format!(
            "probe ok (duration={:.2}s, format={})",
            info.duration_seconds, info.format_name
        ))
    }
}
