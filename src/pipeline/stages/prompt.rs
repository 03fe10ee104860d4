//! Stage 5: hand title authoring to a person or an LLM.

use async_trait::async_trait;
use reelforge_common::{Error, Result, SectionId};

use super::{
    require_populated, section_ids, Deferral, Stage, StageContext, StageOutcome, StageReport,
};
use crate::pipeline::mode::StageId;
use crate::pipeline::titles::{combined_transcript, generation_prompt, TitleDocument};

/// Writes `prompt/transcript.txt` and `prompt/prompt.txt`, then stops the run
/// until `titles.json` is written.
///
/// An existing title document that already covers every section can be
/// reused instead, in which case the run carries on.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptStage;

/// Write a blank title document unless one exists, and build the deferral
/// telling the operator what to do next.
pub(super) fn authoring_deferral(
    ctx: &StageContext,
    stage: StageId,
    reason: &str,
    sections: &[SectionId],
    with_prompt: bool,
) -> Result<Deferral> {
    let titles = ctx.store.titles_path();
    if titles.exists() {
        tracing::info!("Keeping existing {}", titles.display());
    } else {
        TitleDocument::placeholder(sections).save(&titles)?;
        tracing::info!("Wrote title template {}", titles.display());
    }

    let mut next_steps = Vec::new();
    if with_prompt {
        next_steps.push(format!(
            "Give {} to an LLM (or read {}) and save the reply as {}",
            ctx.store.prompt_path().display(),
            ctx.store.combined_transcript_path().display(),
            titles.display()
        ));
    } else {
        next_steps.push(format!(
            "Fill in a title and description for each of the {} section(s) in {}",
            sections.len(),
            titles.display()
        ));
    }
    next_steps.push(format!(
        "Run `reelforge --continue --source {}` to render title cards and assemble",
        ctx.source_dir.display()
    ));

    Ok(Deferral {
        stage,
        reason: reason.to_string(),
        next_steps,
    })
}

impl PromptStage {
    /// Whether an existing title document can be reused. Shape problems are
    /// logged and treated as "no".
    pub(super) fn offer_reuse(ctx: &StageContext, sections: &[SectionId]) -> Result<bool> {
        let path = ctx.store.titles_path();
        if !path.exists() {
            return Ok(false);
        }
        let checked = TitleDocument::load(&path).and_then(|doc| doc.validate(sections));
        match checked {
            Ok(warnings) => {
                for w in warnings {
                    tracing::warn!("{w}");
                }
                ctx.prompter.confirm(
                    &format!(
                        "{} already covers all {} section(s). Reuse it and skip prompt generation?",
                        path.display(),
                        sections.len()
                    ),
                    true,
                )
            }
            Err(Error::TitleSpec { problems }) => {
                for p in &problems {
                    tracing::warn!("{p}");
                }
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl Stage for PromptStage {
    fn id(&self) -> StageId {
        StageId::Prompt
    }

    async fn check_preconditions(&self, ctx: &StageContext) -> Result<()> {
        require_populated(ctx, StageId::Merge)
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutcome> {
        let sections = section_ids(ctx)?;

        if Self::offer_reuse(ctx, &sections)? {
            tracing::info!("Reusing {}", ctx.store.titles_path().display());
            return Ok(StageOutcome::Completed(StageReport {
                items: sections.len(),
                failed: 0,
            }));
        }

        let mut transcripts = Vec::with_capacity(sections.len());
        for id in &sections {
            let path = ctx.store.transcript_path(id);
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    tracing::warn!("Section {id} has no transcript");
                    "(no transcript)".to_string()
                }
                Err(e) => return Err(e.into()),
            };
            transcripts.push((id.clone(), text));
        }

        std::fs::write(
            ctx.store.combined_transcript_path(),
            combined_transcript(&transcripts),
        )?;
        std::fs::write(
            ctx.store.prompt_path(),
            generation_prompt(&transcripts, &ctx.store.titles_path()),
        )?;
        tracing::info!("Wrote {}", ctx.store.prompt_path().display());

        Ok(StageOutcome::Deferred(authoring_deferral(
            ctx,
            StageId::Prompt,
            "titles must be authored from the transcripts",
            &sections,
            true,
        )?))
    }
}
