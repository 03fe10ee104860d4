//! Stage 7: the finished presentation.

use std::path::PathBuf;

use async_trait::async_trait;
use reelforge_av::actions::{concat_copy, write_concat_list};
use reelforge_av::probe::probe;
use reelforge_av::StreamParams;
use reelforge_common::{Error, Result};

use super::{
    finish_partial, partial_path, require_populated, section_ids, Stage, StageContext,
    StageOutcome, StageReport,
};
use crate::pipeline::discovery::WorkItem;
use crate::pipeline::mode::StageId;

/// Concatenates, per section in order, the title video followed by the
/// section video, by stream copy.
///
/// Every segment is probed first; any stream parameter mismatch fails the
/// stage with [`Error::IncompatibleSegments`] before anything is written.
#[derive(Debug, Clone, Copy, Default)]
pub struct AssembleStage;

impl AssembleStage {
    /// Segments in playback order. Sections without a title video are
    /// assembled without one.
    fn segments(ctx: &StageContext) -> Result<Vec<PathBuf>> {
        let mut segments = Vec::new();
        for id in section_ids(ctx)? {
            let title = ctx.store.title_asset(&id, "mp4");
            if title.is_file() {
                segments.push(title);
            } else {
                tracing::warn!("Section {id} has no title card video; it will start without one");
            }
            segments.push(ctx.store.section_path(&id));
        }
        Ok(segments)
    }
}

/// Compare every segment against the first and describe each disagreement.
pub(crate) fn incompatibilities(segments: &[(PathBuf, StreamParams)]) -> Vec<String> {
    let Some((first_path, first)) = segments.first() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (path, params) in &segments[1..] {
        for m in first.mismatches(params) {
            out.push(format!(
                "{} vs {}: {m}",
                first_path.display(),
                path.display()
            ));
        }
    }
    out
}

#[async_trait]
impl Stage for AssembleStage {
    fn id(&self) -> StageId {
        StageId::Assemble
    }

    async fn check_preconditions(&self, ctx: &StageContext) -> Result<()> {
        require_populated(ctx, StageId::Merge)
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutcome> {
        let segments = Self::segments(ctx)?;

        let mut probed = Vec::with_capacity(segments.len());
        for path in &segments {
            let params = probe(&ctx.runner, &ctx.tools, path).await?;
            probed.push((path.clone(), params));
        }
        let mismatches = incompatibilities(&probed);
        if !mismatches.is_empty() {
            return Err(Error::IncompatibleSegments { mismatches });
        }

        let list = ctx.store.segments_list_path();
        write_concat_list(&list, &segments)?;
        tracing::info!("Assembling {} segment(s)", segments.len());

        let output = ctx.store.output_path();
        let Some(first) = section_ids(ctx)?.into_iter().next() else {
            return Err(Error::NoWork {
                dir: ctx.store.stage_dir(StageId::Merge),
            });
        };
        let list_ref = &list;
        let output_ref = &output;

        let result = ctx
            .stage_runner
            .run_stage(
                "assemble",
                vec![WorkItem::new(first, list.clone())],
                |item, progress| async move {
                    let partial = partial_path(output_ref);
                    let res = concat_copy(&ctx.runner, &ctx.tools, list_ref, &partial, |p| {
                        progress.set(p)
                    })
                    .await;
                    finish_partial(res, &partial, output_ref)?;
                    Ok(item.with_output(output_ref.clone()))
                },
            )
            .await;

        let report = StageReport {
            items: segments.len(),
            failed: result.failed.len(),
        };
        result.into_survivors(StageId::Assemble.name())?;
        tracing::info!("Wrote {}", output.display());
        Ok(StageOutcome::Completed(report))
    }
}
