use async_trait::async_trait;

use cadence_core::error::AppError;
use cadence_core::result::AppResult;

use crate::pipeline::{Stage, StageContext, StagePolicy};

/// Confirms the transcoded output is in place before the job is marked done.
#[derive(Debug, Clone, Copy, Default)]
pub struct FinalizeStage;

#[async_trait]
impl Stage for FinalizeStage {
    fn name(&self) -> &'static str {
        "finalize"
    }

    fn policy(&self) -> StagePolicy {
        StagePolicy::Fatal
    }

    fn progress(&self) -> i32 {
        99
    }

    async fn run(&self, ctx: &mut StageContext) -> AppResult<String> {
        let output = ctx
            .output()
            .ok_or_else(|| AppError::internal("no transcoded output was produced"))?;
        if !tokio::fs::try_exists(&output).await? {
            return Err(AppError::storage(format!(
                "transcoded output {} is missing",
                output.display()
            )));
        }
        Ok("outputs verified".to_string())
    }
}
