//! Stage sequencing.
//!
//! The [`PipelineOrchestrator`] picks the first stage from the entry mode,
//! prepares the workspace, and walks [`next_stage`] until the run completes,
//! a stage defers to a human, or a stage fails. Every finished stage is
//! recorded in the manifest.
//!
//! In resume modes a stage whose input is missing is skipped with a warning
//! rather than failing the run. The run still fails if nothing could be
//! assembled.

use std::path::PathBuf;

use chrono::Utc;
use reelforge_av::Tool;
use reelforge_common::{Error, Result};

use super::discovery::discover_raw_inputs;
use super::manifest::{fingerprint_dir, fingerprint_files, Manifest, StageRecord};
use super::mode::{next_stage, EntryMode, StageId};
use super::stages::{all_stages, Deferral, Stage, StageContext, StageOutcome, StageReport};

/// How a pipeline run ended, short of an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The presentation was written.
    Completed { output: PathBuf },
    /// The run stopped waiting for a document to be edited.
    Deferred(Deferral),
}

/// Runs the stages for one entry mode.
pub struct PipelineOrchestrator {
    ctx: StageContext,
    stages: Vec<Box<dyn Stage>>,
}

impl PipelineOrchestrator {
    pub fn new(ctx: StageContext) -> Self {
        Self::with_stages(ctx, all_stages())
    }

    /// Use a custom stage set. Looked up by [`Stage::id`].
    pub fn with_stages(ctx: StageContext, stages: Vec<Box<dyn Stage>>) -> Self {
        Self { ctx, stages }
    }

    pub fn context(&self) -> &StageContext {
        &self.ctx
    }

    fn stage(&self, id: StageId) -> Result<&dyn Stage> {
        self.stages
            .iter()
            .find(|s| s.id() == id)
            .map(|s| s.as_ref())
            .ok_or_else(|| Error::stage(id.name(), "no implementation registered"))
    }

    /// Fail if a required tool is missing. A missing transcriber only warns.
    pub fn preflight(&self) -> Result<()> {
        let missing = self.ctx.tools.missing_required();
        if !missing.is_empty() {
            let names: Vec<&str> = missing.iter().map(|t| t.name()).collect();
            return Err(Error::tool_unavailable(names.join(", ")));
        }
        if !self.ctx.tools.has(Tool::Whisper) {
            tracing::warn!(
                "Speech-to-text unavailable; the run will stop after audio extraction \
                 so titles can be written by hand"
            );
        }
        Ok(())
    }

    /// Check the stage a resume mode consumes actually completed.
    fn verify_resume(&self, required: StageId, manifest: Option<&Manifest>) -> Result<()> {
        let store = &self.ctx.store;
        match manifest {
            Some(m) => m.verify(required, store),
            None => {
                tracing::warn!(
                    "No manifest in {}; assuming {required} completed because its directory is not empty",
                    store.root().display()
                );
                if store.is_populated(required) {
                    Ok(())
                } else {
                    Err(Error::precondition(format!(
                        "{} is empty; {required} has not completed",
                        store.stage_dir(required).display()
                    )))
                }
            }
        }
    }

    fn input_fingerprint(&self, stage: StageId) -> Option<String> {
        let fp = match stage.prev() {
            None => discover_raw_inputs(
                &self.ctx.source_dir,
                &self.ctx.config.workspace.extensions,
            )
            .and_then(|files| fingerprint_files(&files)),
            Some(prev) => fingerprint_dir(&self.ctx.store.stage_dir(prev)),
        };
        fp.ok()
    }

    /// Run the pipeline in `mode`.
    pub async fn run(&self, mode: EntryMode) -> Result<RunOutcome> {
        let store = &self.ctx.store;
        tracing::info!("Mode: {mode} ({})", mode.reason());
        tracing::info!("Workspace: {}", store.root().display());

        self.preflight()?;

        let first = mode.first_stage();
        match mode.requires() {
            None => {
                // Raw inputs are checked before anything is written.
                self.stage(first)?.check_preconditions(&self.ctx).await?;
            }
            Some(_) if !store.root().is_dir() => {
                return Err(Error::precondition(format!(
                    "no workspace at {}; run without resume flags first",
                    store.root().display()
                )));
            }
            Some(_) => {}
        }

        store.ensure_layout()?;
        let manifest_path = store.manifest_path();
        // A fresh run starts a new manifest, so a damaged old one is no obstacle.
        let existing = match mode.requires() {
            Some(required) => {
                let existing = Manifest::load(&manifest_path)?;
                self.verify_resume(required, existing.as_ref())?;
                existing
            }
            None => None,
        };

        let kept = mode.kept_through();
        store.reset_downstream_of(kept)?;
        let mut manifest = existing.unwrap_or_default();
        manifest.drop_after(kept);
        manifest.save(&manifest_path)?;

        let resuming = mode.requires().is_some();
        let mut skipped = Vec::new();
        let mut current = None;
        while let Some(id) = next_stage(current, mode) {
            let stage = self.stage(id)?;
            tracing::info!("==> {id}: {}", id.description());
            current = Some(id);

            let input_fingerprint = self.input_fingerprint(id);
            match stage.check_preconditions(&self.ctx).await {
                Ok(()) => {}
                Err(Error::Precondition(reason)) if resuming => {
                    tracing::warn!("Skipping {id}: {reason}");
                    skipped.push(id);
                    continue;
                }
                Err(e) => return Err(e),
            }
            let outcome = stage.run(&self.ctx).await?;

            let (report, deferred) = match &outcome {
                StageOutcome::Completed(report) => (*report, false),
                StageOutcome::Deferred(_) => (StageReport::default(), true),
            };
            manifest.record(
                id,
                StageRecord {
                    completed_at: Utc::now(),
                    items: report.items,
                    failed: report.failed,
                    input_fingerprint,
                    output_fingerprint: fingerprint_dir(&store.stage_dir(id))?,
                    deferred,
                },
            );
            manifest.save(&manifest_path)?;

            match outcome {
                StageOutcome::Deferred(deferral) => {
                    tracing::info!("{id} deferred: {}", deferral.reason);
                    return Ok(RunOutcome::Deferred(deferral));
                }
                StageOutcome::Completed(report) if report.failed > 0 => {
                    tracing::warn!(
                        "{id} finished: {} item(s), {} failed",
                        report.items,
                        report.failed
                    );
                }
                StageOutcome::Completed(report) => {
                    tracing::info!("{id} finished: {} item(s)", report.items);
                }
            }
        }

        if skipped.contains(&StageId::Assemble) {
            let names: Vec<&str> = skipped.iter().map(|s| s.name()).collect();
            return Err(Error::precondition(format!(
                "nothing was assembled; skipped {}",
                names.join(", ")
            )));
        }

        Ok(RunOutcome::Completed {
            output: store.output_path(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stages::test_support::context;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use reelforge_av::ToolRegistry;
    use std::sync::{Arc, Mutex};

    /// Writes one file into its own directory and records that it ran.
    struct FakeStage {
        id: StageId,
        defer: bool,
        check: Check,
        log: Arc<Mutex<Vec<StageId>>>,
    }

    #[derive(Clone, Copy, PartialEq)]
    enum Check {
        /// The previous stage's directory must be populated.
        PreviousOutput,
        Pass,
        Fail,
    }

    #[async_trait]
    impl Stage for FakeStage {
        fn id(&self) -> StageId {
            self.id
        }

        async fn check_preconditions(&self, ctx: &StageContext) -> Result<()> {
            match (self.check, self.id.prev()) {
                (Check::Fail, _) => Err(Error::precondition(format!("{} input missing", self.id))),
                (Check::PreviousOutput, Some(prev)) if !ctx.store.is_populated(prev) => {
                    Err(Error::precondition(format!("{prev} is empty")))
                }
                _ => Ok(()),
            }
        }

        async fn run(&self, ctx: &StageContext) -> Result<StageOutcome> {
            self.log.lock().unwrap().push(self.id);
            std::fs::write(ctx.store.stage_dir(self.id).join("01-out.bin"), self.id.name())?;
            if self.defer {
                return Ok(StageOutcome::Deferred(Deferral {
                    stage: self.id,
                    reason: "waiting".into(),
                    next_steps: vec!["edit titles.json".into()],
                }));
            }
            Ok(StageOutcome::Completed(StageReport { items: 1, failed: 0 }))
        }
    }

    fn orchestrator(
        source: &std::path::Path,
        defer_at: Option<StageId>,
    ) -> (PipelineOrchestrator, Arc<Mutex<Vec<StageId>>>) {
        build(source, |id| FakeStage {
            id,
            defer: Some(id) == defer_at,
            check: Check::PreviousOutput,
            log: Arc::default(),
        })
    }

    /// Every stage's preconditions pass except `blocked`'s.
    fn blocking_orchestrator(
        source: &std::path::Path,
        blocked: StageId,
    ) -> (PipelineOrchestrator, Arc<Mutex<Vec<StageId>>>) {
        build(source, |id| FakeStage {
            id,
            defer: false,
            check: if id == blocked { Check::Fail } else { Check::Pass },
            log: Arc::default(),
        })
    }

    fn build(
        source: &std::path::Path,
        make: impl Fn(StageId) -> FakeStage,
    ) -> (PipelineOrchestrator, Arc<Mutex<Vec<StageId>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let stages: Vec<Box<dyn Stage>> = StageId::ALL
            .into_iter()
            .map(|id| {
                Box::new(FakeStage {
                    log: log.clone(),
                    ..make(id)
                }) as Box<dyn Stage>
            })
            .collect();
        let mut ctx = context(source, true);
        ctx.tools = ToolRegistry::from_paths([
            (Tool::Ffmpeg, PathBuf::from("/bin/true")),
            (Tool::Ffprobe, PathBuf::from("/bin/true")),
            (Tool::Browser, PathBuf::from("/bin/true")),
        ]);
        (PipelineOrchestrator::with_stages(ctx, stages), log)
    }

    fn ran(log: &Arc<Mutex<Vec<StageId>>>) -> Vec<StageId> {
        std::mem::take(&mut *log.lock().unwrap())
    }

    #[tokio::test]
    async fn fresh_run_executes_every_stage_and_records_them() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(dir.path(), None);

        let outcome = orch.run(EntryMode::Fresh).await.unwrap();
        assert_eq!(
            outcome,
            RunOutcome::Completed {
                output: orch.context().store.output_path()
            }
        );
        assert_eq!(ran(&log), StageId::ALL.to_vec());

        let manifest = Manifest::load(&orch.context().store.manifest_path())
            .unwrap()
            .unwrap();
        assert_eq!(manifest.completed(), StageId::ALL.to_vec());
    }

    #[tokio::test]
    async fn deferral_stops_the_run_and_continue_resumes_at_titles() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(dir.path(), Some(StageId::Prompt));

        let outcome = orch.run(EntryMode::Fresh).await.unwrap();
        assert_matches!(outcome, RunOutcome::Deferred(ref d) if d.stage == StageId::Prompt);
        assert_eq!(ran(&log), StageId::ALL[..5].to_vec());
        let manifest = Manifest::load(&orch.context().store.manifest_path())
            .unwrap()
            .unwrap();
        assert!(manifest.get(StageId::Prompt).unwrap().deferred);

        let outcome = orch.run(EntryMode::ResumeAfterTitles).await.unwrap();
        assert_matches!(outcome, RunOutcome::Completed { .. });
        assert_eq!(ran(&log), vec![StageId::RenderTitles, StageId::Assemble]);
        // Upstream output survives the resume.
        assert!(orch.context().store.is_populated(StageId::Transcribe));
    }

    #[tokio::test]
    async fn resume_after_conversion_resets_downstream() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(dir.path(), None);
        orch.run(EntryMode::Fresh).await.unwrap();
        ran(&log);

        let store = &orch.context().store;
        let stray = store.stage_dir(StageId::Merge).join("02-stale.bin");
        std::fs::write(&stray, b"old").unwrap();

        orch.run(EntryMode::ResumeAfterConversion).await.unwrap();
        assert_eq!(ran(&log), StageId::ALL[1..].to_vec());
        assert!(!stray.exists());
    }

    #[tokio::test]
    async fn modified_stage_output_blocks_resume() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(dir.path(), None);
        orch.run(EntryMode::Fresh).await.unwrap();
        ran(&log);

        let converted = orch.context().store.stage_dir(StageId::Convert);
        std::fs::write(converted.join("02-partial.mp4"), b"half").unwrap();

        let err = orch.run(EntryMode::ResumeAfterConversion).await.unwrap_err();
        assert!(err.to_string().contains("partial or modified"));
        assert!(ran(&log).is_empty());
    }

    #[tokio::test]
    async fn resume_without_workspace_is_a_precondition_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(dir.path(), None);

        let err = orch.run(EntryMode::ResumeAfterTitles).await.unwrap_err();
        assert_matches!(err, Error::Precondition(_));
        assert!(!orch.context().store.root().exists());
        assert!(ran(&log).is_empty());
    }

    #[tokio::test]
    async fn missing_required_tool_is_fatal_before_any_stage() {
        let dir = tempfile::tempdir().unwrap();
        let (mut orch, log) = orchestrator(dir.path(), None);
        orch.ctx.tools = ToolRegistry::from_paths([(Tool::Ffmpeg, PathBuf::from("/bin/true"))]);

        let err = orch.run(EntryMode::Fresh).await.unwrap_err();
        assert_matches!(err, Error::ExternalToolUnavailable { .. });
        assert!(err.to_string().contains("ffprobe"));
        assert!(ran(&log).is_empty());
    }

    #[tokio::test]
    async fn resume_skips_a_stage_whose_input_is_missing() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, log) = blocking_orchestrator(dir.path(), StageId::Transcribe);
        // Fresh runs fail fast on the same precondition.
        let err = orch.run(EntryMode::Fresh).await.unwrap_err();
        assert_matches!(err, Error::Precondition(_));
        assert_eq!(ran(&log), StageId::ALL[..3].to_vec());

        let outcome = orch.run(EntryMode::ResumeAfterConversion).await.unwrap();
        assert_matches!(outcome, RunOutcome::Completed { .. });
        assert_eq!(
            ran(&log),
            vec![
                StageId::Merge,
                StageId::ExtractAudio,
                StageId::Prompt,
                StageId::RenderTitles,
                StageId::Assemble,
            ]
        );
        let manifest = Manifest::load(&orch.context().store.manifest_path())
            .unwrap()
            .unwrap();
        assert!(manifest.get(StageId::Transcribe).is_none());
        assert!(manifest.get(StageId::Prompt).is_some());
    }

    #[tokio::test]
    async fn resume_that_skips_assembly_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(dir.path(), Some(StageId::Prompt));
        orch.run(EntryMode::Fresh).await.unwrap();
        ran(&log);

        let (orch, log) = blocking_orchestrator(dir.path(), StageId::Assemble);
        let err = orch.run(EntryMode::ResumeAfterTitles).await.unwrap_err();
        assert_matches!(err, Error::Precondition(ref m) if m.contains("assemble"));
        assert_eq!(ran(&log), vec![StageId::RenderTitles]);
    }

    #[tokio::test]
    async fn fresh_run_ignores_a_damaged_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let (orch, log) = orchestrator(dir.path(), None);
        let store = &orch.context().store;
        store.ensure_layout().unwrap();
        std::fs::write(store.manifest_path(), b"{ not json").unwrap();

        let outcome = orch.run(EntryMode::Fresh).await.unwrap();
        assert_matches!(outcome, RunOutcome::Completed { .. });
        assert_eq!(ran(&log), StageId::ALL.to_vec());
        assert!(Manifest::load(&store.manifest_path()).unwrap().is_some());

        std::fs::write(store.manifest_path(), b"{ not json").unwrap();
        assert!(orch.run(EntryMode::ResumeAfterConversion).await.is_err());
    }
}
