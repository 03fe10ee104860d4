//! Stage 3: audio for the transcriber.

use async_trait::async_trait;
use reelforge_av::actions::extract_audio;
use reelforge_common::Result;

use super::{
    finish_partial, partial_path, require_populated, section_items, Stage, StageContext,
    StageOutcome, StageReport,
};
use crate::pipeline::mode::StageId;

/// Writes `audio/<id>.wav` for every section.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtractAudioStage;

#[async_trait]
impl Stage for ExtractAudioStage {
    fn id(&self) -> StageId {
        StageId::ExtractAudio
    }

    async fn check_preconditions(&self, ctx: &StageContext) -> Result<()> {
        require_populated(ctx, StageId::Merge)
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutcome> {
        let items = section_items(ctx)?;

        let result = ctx
            .stage_runner
            .run_stage("extract audio", items, |item, progress| async move {
                let output = ctx.store.audio_path(&item.section);
                let partial = partial_path(&output);
                let res = extract_audio(&ctx.runner, &ctx.tools, &item.source, &partial, |p| {
                    progress.set(p)
                })
                .await;
                finish_partial(res, &partial, &output)?;
                Ok(item.with_output(output))
            })
            .await;

        let report = StageReport::from(&result);
        result.into_survivors(StageId::ExtractAudio.name())?;
        Ok(StageOutcome::Completed(report))
    }
}
