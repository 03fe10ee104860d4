//! Stage 4: speech to text.

use async_trait::async_trait;
use reelforge_av::actions::transcribe;
use reelforge_av::Tool;
use reelforge_common::Result;

use super::prompt::{authoring_deferral, PromptStage};
use super::{require_populated, section_ids, Stage, StageContext, StageOutcome, StageReport};
use crate::pipeline::discovery::scan_stage_dir;
use crate::pipeline::mode::StageId;

/// Writes `transcripts/<id>.txt` for every extracted audio file.
///
/// Without a transcriber the stage offers to reuse a complete title document;
/// otherwise it writes a blank one and defers the run so titles can be
/// written by hand.
#[derive(Debug, Clone, Copy, Default)]
pub struct TranscribeStage;

#[async_trait]
impl Stage for TranscribeStage {
    fn id(&self) -> StageId {
        StageId::Transcribe
    }

    async fn check_preconditions(&self, ctx: &StageContext) -> Result<()> {
        require_populated(ctx, StageId::ExtractAudio)
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutcome> {
        if !ctx.tools.has(Tool::Whisper) {
            tracing::warn!(
                "No speech-to-text binary found (set {} or tools.whisper_path); \
                 titles must be written by hand",
                reelforge_common::config::WHISPER_ENV_VAR
            );
            let sections = section_ids(ctx)?;
            if PromptStage::offer_reuse(ctx, &sections)? {
                tracing::info!("Reusing {}", ctx.store.titles_path().display());
                return Ok(StageOutcome::Completed(StageReport {
                    items: sections.len(),
                    failed: 0,
                }));
            }
            return Ok(StageOutcome::Deferred(authoring_deferral(
                ctx,
                StageId::Transcribe,
                "no speech-to-text binary available",
                &sections,
                false,
            )?));
        }

        let items = scan_stage_dir(&ctx.store.stage_dir(StageId::ExtractAudio), "wav")?;
        let extra_args = &ctx.config.tools.whisper_args;

        let result = ctx
            .stage_runner
            .run_stage("transcribe", items, |item, _progress| async move {
                let transcript = transcribe(&ctx.runner, &ctx.tools, &item.source, extra_args).await?;
                let output = ctx.store.transcript_path(&item.section);
                std::fs::write(&output, format!("{}\n", transcript.text))?;
                tracing::debug!(
                    "Section {}: {} characters of transcript",
                    item.section,
                    transcript.text.len()
                );
                Ok(item.with_output(output))
            })
            .await;

        let report = StageReport::from(&result);
        result.into_survivors(StageId::Transcribe.name())?;
        Ok(StageOutcome::Completed(report))
    }
}
