//! Stage 1: normalize raw clips.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use reelforge_av::actions::{normalize, NormalizeJob, PadTarget};
use reelforge_av::probe::probe;
use reelforge_av::StreamParams;
use reelforge_common::{Error, Result};

use super::{finish_partial, partial_path, Stage, StageContext, StageOutcome, StageReport};
use crate::pipeline::discovery::{check_naming, discover_raw_inputs, WorkItem};
use crate::pipeline::mode::StageId;

/// Transcodes every raw clip into `converted/<stem>.mp4` with uniform stream
/// parameters, padding clips whose size differs from the majority when the
/// operator agrees.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConvertStage;

/// The most common `(width, height)`; ties go to the size seen first.
pub fn modal_dimensions(dims: &[(u32, u32)]) -> Option<(u32, u32)> {
    let mut counts: Vec<((u32, u32), usize)> = Vec::new();
    for d in dims {
        match counts.iter_mut().find(|(seen, _)| seen == d) {
            Some((_, n)) => *n += 1,
            None => counts.push((*d, 1)),
        }
    }
    // max_by_key keeps the last maximum, so walk in reverse.
    counts
        .into_iter()
        .rev()
        .max_by_key(|(_, n)| *n)
        .map(|(d, _)| d)
}

impl ConvertStage {
    fn inputs(ctx: &StageContext) -> Result<Vec<WorkItem>> {
        let files = discover_raw_inputs(&ctx.source_dir, &ctx.config.workspace.extensions)?;
        check_naming(&files)
    }

    /// Decide per clip whether it needs padding. Asks the operator when sizes
    /// disagree; refusing aborts the run.
    fn plan(
        ctx: &StageContext,
        probed: &[(WorkItem, StreamParams)],
    ) -> Result<HashMap<PathBuf, (Option<PadTarget>, bool)>> {
        let dims: Vec<(u32, u32)> = probed.iter().map(|(_, p)| p.dimensions()).collect();
        let Some((width, height)) = modal_dimensions(&dims) else {
            return Ok(HashMap::new());
        };

        let odd: Vec<&(WorkItem, StreamParams)> = probed
            .iter()
            .filter(|(_, p)| p.dimensions() != (width, height))
            .collect();

        if !odd.is_empty() {
            for (item, params) in &odd {
                tracing::warn!(
                    "{} is {}x{}; most clips are {width}x{height}",
                    item.file_name(),
                    params.width,
                    params.height
                );
            }
            let question = format!(
                "{} clip(s) differ from the common size {width}x{height}. \
                 Pad them to {width}x{height} with centered letterboxing?",
                odd.len()
            );
            if !ctx.prompter.confirm(&question, false)? {
                return Err(Error::Aborted(format!(
                    "clips have mismatched dimensions; resize them to {width}x{height} or accept padding"
                )));
            }
        }

        let target = PadTarget { width, height };
        Ok(probed
            .iter()
            .map(|(item, params)| {
                let pad = (params.dimensions() != (width, height)).then_some(target);
                (item.source.clone(), (pad, params.has_audio()))
            })
            .collect())
    }
}

#[async_trait]
impl Stage for ConvertStage {
    fn id(&self) -> StageId {
        StageId::Convert
    }

    async fn check_preconditions(&self, ctx: &StageContext) -> Result<()> {
        let items = Self::inputs(ctx)?;
        tracing::info!(
            "Found {} raw clip(s) in {}",
            items.len(),
            ctx.source_dir.display()
        );
        Ok(())
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutcome> {
        let items = Self::inputs(ctx)?;

        let probed = ctx
            .stage_runner
            .run_stage("probe", items, |item, _progress| async move {
                let params = probe(&ctx.runner, &ctx.tools, &item.source).await?;
                Ok((item, params))
            })
            .await
            .into_survivors(StageId::Convert.name())?;

        let plan = Self::plan(ctx, &probed)?;
        let plan = &plan;
        let items = probed.into_iter().map(|(item, _)| item).collect();

        let result = ctx
            .stage_runner
            .run_stage("convert", items, |item, progress| async move {
                let (pad, has_audio) = plan.get(&item.source).copied().unwrap_or((None, true));
                let output = ctx.store.converted_path(&item.stem());
                let partial = partial_path(&output);
                let job = NormalizeJob {
                    input: &item.source,
                    output: &partial,
                    pad,
                    has_audio,
                };
                let res = normalize(&ctx.runner, &ctx.tools, &job, &ctx.config.encode, |p| {
                    progress.set(p)
                })
                .await;
                finish_partial(res, &partial, &output)?;
                Ok(item.with_output(output))
            })
            .await;

        let report = StageReport::from(&result);
        result.into_survivors(StageId::Convert.name())?;
        Ok(StageOutcome::Completed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::test_support::context;

    #[test]
    fn modal_size_wins() {
        let dims = [(1280, 720), (1920, 1080), (1920, 1080)];
        assert_eq!(modal_dimensions(&dims), Some((1920, 1080)));
    }

    #[test]
    fn ties_go_to_the_first_size_seen() {
        let dims = [(1280, 720), (1920, 1080), (1920, 1080), (1280, 720)];
        assert_eq!(modal_dimensions(&dims), Some((1280, 720)));
        assert_eq!(modal_dimensions(&[]), None);
    }

    #[tokio::test]
    async fn naming_violation_fails_before_anything_is_written() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("01-a.mov"), b"").unwrap();
        std::fs::write(dir.path().join("intro.mov"), b"").unwrap();
        let ctx = context(dir.path(), true);

        let err = ConvertStage.check_preconditions(&ctx).await.unwrap_err();
        match err {
            Error::Naming { files } => assert_eq!(files, vec![dir.path().join("intro.mov")]),
            other => panic!("unexpected: {other}"),
        }
        assert!(!ctx.store.root().exists());
    }

    fn params(width: u32, height: u32, audio: bool) -> StreamParams {
        StreamParams {
            video_codec: "h264".into(),
            width,
            height,
            frame_rate: "30/1".into(),
            pix_fmt: Some("yuv420p".into()),
            audio_codec: audio.then(|| "aac".into()),
            sample_rate: audio.then_some(48_000),
            channels: audio.then_some(2),
            duration: Some(2.0),
        }
    }

    fn probed() -> Vec<(WorkItem, StreamParams)> {
        vec![
            (WorkItem::from_path("01-a.mov").unwrap(), params(1920, 1080, true)),
            (WorkItem::from_path("01-b.mov").unwrap(), params(1280, 720, false)),
            (WorkItem::from_path("02-c.mov").unwrap(), params(1920, 1080, true)),
        ]
    }

    #[test]
    fn accepted_padding_targets_the_modal_size() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), true);
        let plan = ConvertStage::plan(&ctx, &probed()).unwrap();

        assert_eq!(plan[&PathBuf::from("01-a.mov")], (None, true));
        assert_eq!(
            plan[&PathBuf::from("01-b.mov")],
            (
                Some(PadTarget {
                    width: 1920,
                    height: 1080
                }),
                false
            )
        );
    }

    #[test]
    fn refused_padding_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), false);
        let err = ConvertStage::plan(&ctx, &probed()).unwrap_err();
        assert!(matches!(err, Error::Aborted(_)));
    }
}
