//! Stage 2: one artifact per section.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use reelforge_av::actions::{concat_parts, concat_reencode};
use reelforge_av::probe::probe;
use reelforge_common::{Error, Result, SectionId};

use super::{
    finish_partial, partial_path, require_populated, Stage, StageContext, StageOutcome, StageReport,
};
use crate::pipeline::discovery::{group_sections, scan_stage_dir, SectionGroup, WorkItem};
use crate::pipeline::mode::StageId;

/// Produces `sections/<id>-section.mp4` from the normalized clips.
///
/// Single-part sections are copied. Multi-part sections are joined in file
/// name order, by stream copy when the parts agree and by re-encoding when
/// they do not.
#[derive(Debug, Clone, Copy, Default)]
pub struct MergeStage;

async fn merge_group(ctx: &StageContext, group: &SectionGroup, output: &Path) -> Result<()> {
    if !group.is_multi_part() {
        std::fs::copy(&group.parts[0].source, output)?;
        return Ok(());
    }

    let parts = group.part_paths();
    let first = probe(&ctx.runner, &ctx.tools, &parts[0]).await?;
    let mut differences = Vec::new();
    for part in &parts[1..] {
        let params = probe(&ctx.runner, &ctx.tools, part).await?;
        differences.extend(
            first
                .mismatches(&params)
                .into_iter()
                .map(|m| format!("{}: {m}", part.display())),
        );
    }

    if differences.is_empty() {
        concat_parts(&ctx.runner, &ctx.tools, &parts, output, |_| {}).await
    } else {
        tracing::warn!(
            "Section {} parts differ ({}); re-encoding",
            group.section,
            differences.join("; ")
        );
        concat_reencode(&ctx.runner, &ctx.tools, &parts, output, &ctx.config.encode, |_| {}).await
    }
}

#[async_trait]
impl Stage for MergeStage {
    fn id(&self) -> StageId {
        StageId::Merge
    }

    async fn check_preconditions(&self, ctx: &StageContext) -> Result<()> {
        require_populated(ctx, StageId::Convert)
    }

    async fn run(&self, ctx: &StageContext) -> Result<StageOutcome> {
        let clips = scan_stage_dir(&ctx.store.stage_dir(StageId::Convert), "mp4")?;
        let groups = group_sections(clips);
        for group in groups.iter().filter(|g| g.is_multi_part()) {
            tracing::info!(
                "Section {}: joining {} parts ({})",
                group.section,
                group.parts.len(),
                group
                    .parts
                    .iter()
                    .map(WorkItem::file_name)
                    .collect::<Vec<_>>()
                    .join(", ")
            );
        }

        let items = groups
            .iter()
            .map(|g| WorkItem::new(g.section.clone(), g.parts[0].source.clone()))
            .collect();
        let by_section: HashMap<&SectionId, &SectionGroup> =
            groups.iter().map(|g| (&g.section, g)).collect();
        let by_section = &by_section;

        let result = ctx
            .stage_runner
            .run_stage("merge", items, |item, _progress| async move {
                let group = by_section.get(&item.section).ok_or_else(|| {
                    Error::stage("merge", format!("no parts for section {}", item.section))
                })?;
                let output = ctx.store.section_path(&item.section);
                let partial = partial_path(&output);
                let res = merge_group(ctx, group, &partial).await;
                finish_partial(res, &partial, &output)?;
                Ok(item.with_output(output))
            })
            .await;

        let report = StageReport::from(&result);
        result.into_survivors(StageId::Merge.name())?;
        Ok(StageOutcome::Completed(report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::test_support::context;
    use reelforge_av::ToolRegistry;
    use reelforge_common::config::ToolsConfig;
    use std::process::Command;

    fn ffmpeg_with_x264() -> bool {
        let probe_ok = Command::new("ffprobe")
            .arg("-version")
            .output()
            .is_ok_and(|o| o.status.success());
        match Command::new("ffmpeg").args(["-hide_banner", "-encoders"]).output() {
            Ok(out) if out.status.success() && probe_ok => {
                let list = String::from_utf8_lossy(&out.stdout);
                list.contains("libx264") && list.contains(" aac ")
            }
            _ => false,
        }
    }

    fn make_part(path: &Path, freq: u32) {
        let status = Command::new("ffmpeg")
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "lavfi", "-i", "testsrc=size=320x240:rate=30:duration=1"])
            .args(["-f", "lavfi", "-i"])
            .arg(format!("sine=frequency={freq}:sample_rate=48000:duration=1"))
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p", "-c:a", "aac", "-shortest"])
            .arg(path)
            .status()
            .unwrap();
        assert!(status.success(), "could not generate {}", path.display());
    }

    #[tokio::test]
    async fn single_part_sections_are_copied_and_rerun_is_identical() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), true);
        ctx.store.ensure_layout().unwrap();
        std::fs::write(ctx.store.converted_path("01-intro"), b"first clip").unwrap();
        std::fs::write(ctx.store.converted_path("02-demo"), b"second clip").unwrap();

        MergeStage.check_preconditions(&ctx).await.unwrap();
        let outcome = MergeStage.run(&ctx).await.unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Completed(StageReport { items: 2, failed: 0 })
        );

        let id: SectionId = "02".parse().unwrap();
        let first = std::fs::read(ctx.store.section_path(&id)).unwrap();
        assert_eq!(first, b"second clip");
        // Stage 1 output stays in place for later replays.
        assert!(ctx.store.converted_path("02-demo").exists());

        MergeStage.run(&ctx).await.unwrap();
        assert_eq!(std::fs::read(ctx.store.section_path(&id)).unwrap(), first);
    }

    #[tokio::test]
    async fn empty_converted_dir_fails_precondition() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context(dir.path(), true);
        ctx.store.ensure_layout().unwrap();
        let err = MergeStage.check_preconditions(&ctx).await.unwrap_err();
        assert!(err.to_string().contains("stage 1 (convert) must run first"));
    }

    #[tokio::test]
    async fn multi_part_stream_copy_rerun_is_byte_identical() {
        if !ffmpeg_with_x264() {
            eprintln!("Skipping: ffmpeg with libx264 and ffprobe are required");
            return;
        }

        let dir = tempfile::tempdir().unwrap();
        let mut ctx = context(dir.path(), true);
        ctx.tools = ToolRegistry::discover(&ToolsConfig::default());
        ctx.store.ensure_layout().unwrap();
        make_part(&ctx.store.converted_path("03-a"), 440);
        make_part(&ctx.store.converted_path("03-b"), 550);

        let outcome = MergeStage.run(&ctx).await.unwrap();
        assert_eq!(
            outcome,
            StageOutcome::Completed(StageReport { items: 1, failed: 0 })
        );
        let id: SectionId = "03".parse().unwrap();
        let first = std::fs::read(ctx.store.section_path(&id)).unwrap();
        assert!(!first.is_empty());

        MergeStage.run(&ctx).await.unwrap();
        let second = std::fs::read(ctx.store.section_path(&id)).unwrap();
        assert!(first == second, "re-running merge changed the section bytes");
    }
}
