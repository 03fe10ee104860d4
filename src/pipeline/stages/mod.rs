//! The seven pipeline stages.
//!
//! Each stage reads the previous stage's directory through the
//! [`WorkspaceStore`], writes only into its own, and reports whether it
//! completed or stopped the run pending human input.

mod assemble;
mod convert;
mod extract_audio;
mod merge;
mod prompt;
mod render_titles;
mod transcribe;

pub use assemble::AssembleStage;
pub use convert::{modal_dimensions, ConvertStage};
pub use extract_audio::ExtractAudioStage;
pub use merge::MergeStage;
pub use prompt::PromptStage;
pub use render_titles::RenderTitlesStage;
pub use transcribe::TranscribeStage;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use reelforge_av::{ProcessRunner, ToolRegistry};
use reelforge_common::{Config, Error, Result, SectionId};

use super::discovery::{scan_stage_dir, WorkItem};
use super::mode::StageId;
use super::prompter::Prompter;
use super::runner::{StageResult, StageRunner};
use super::titles::TitleDocument;
use super::workspace::WorkspaceStore;

// ---------------------------------------------------------------------------
// Context and outcomes
// ---------------------------------------------------------------------------

/// Everything a stage needs, shared for the whole run.
pub struct StageContext {
    pub config: Config,
    /// Directory holding the raw clips.
    pub source_dir: PathBuf,
    pub store: WorkspaceStore,
    pub tools: ToolRegistry,
    pub runner: ProcessRunner,
    pub stage_runner: StageRunner,
    pub prompter: Arc<dyn Prompter>,
}

impl StageContext {
    /// Build a context whose workspace follows `config`, or `workspace` when
    /// given.
    pub fn new(
        config: Config,
        source_dir: PathBuf,
        workspace: Option<&Path>,
        tools: ToolRegistry,
        runner: ProcessRunner,
        prompter: Arc<dyn Prompter>,
    ) -> Self {
        let store = WorkspaceStore::from_config(&source_dir, &config, workspace);
        Self {
            config,
            source_dir,
            store,
            tools,
            runner,
            stage_runner: StageRunner::default(),
            prompter,
        }
    }

    pub fn with_stage_runner(mut self, stage_runner: StageRunner) -> Self {
        self.stage_runner = stage_runner;
        self
    }
}

impl fmt::Debug for StageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StageContext")
            .field("source_dir", &self.source_dir)
            .field("store", &self.store)
            .finish_non_exhaustive()
    }
}

/// Item counts of a completed stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub items: usize,
    pub failed: usize,
}

impl<T> From<&StageResult<T>> for StageReport {
    fn from(result: &StageResult<T>) -> Self {
        Self {
            items: result.succeeded.len(),
            failed: result.failed.len(),
        }
    }
}

/// The run stopped on purpose, waiting for someone to edit a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deferral {
    pub stage: StageId,
    pub reason: String,
    /// Instructions printed for the operator, one per line.
    pub next_steps: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    Completed(StageReport),
    Deferred(Deferral),
}

/// One pipeline stage.
#[async_trait]
pub trait Stage: Send + Sync {
    fn id(&self) -> StageId;

    /// Check the stage can start. Called before the workspace is touched when
    /// this is the first stage of the run, and again right before running.
    async fn check_preconditions(&self, ctx: &StageContext) -> Result<()>;

    async fn run(&self, ctx: &StageContext) -> Result<StageOutcome>;
}

/// The stages in execution order.
pub fn all_stages() -> Vec<Box<dyn Stage>> {
    vec![
        Box::new(ConvertStage),
        Box::new(MergeStage),
        Box::new(ExtractAudioStage),
        Box::new(TranscribeStage),
        Box::new(PromptStage),
        Box::new(RenderTitlesStage),
        Box::new(AssembleStage),
    ]
}

// ---------------------------------------------------------------------------
// Shared helpers
// ---------------------------------------------------------------------------

/// Per-section artifacts produced by the merge stage.
pub(crate) fn section_items(ctx: &StageContext) -> Result<Vec<WorkItem>> {
    scan_stage_dir(&ctx.store.stage_dir(StageId::Merge), "mp4")
}

/// Ids of the sections present after merging, in order.
pub(crate) fn section_ids(ctx: &StageContext) -> Result<Vec<SectionId>> {
    let mut ids: Vec<SectionId> = section_items(ctx)?.into_iter().map(|i| i.section).collect();
    ids.dedup();
    Ok(ids)
}

/// Fail unless `stage`'s output directory holds files.
pub(crate) fn require_populated(ctx: &StageContext, stage: StageId) -> Result<()> {
    if ctx.store.is_populated(stage) {
        Ok(())
    } else {
        Err(Error::precondition(format!(
            "{} is empty; {stage} must run first",
            ctx.store.stage_dir(stage).display()
        )))
    }
}

/// Load and validate the title document against the merged sections.
pub(crate) fn load_titles(ctx: &StageContext) -> Result<TitleDocument> {
    let doc = TitleDocument::load(&ctx.store.titles_path())?;
    for warning in doc.validate(&section_ids(ctx)?)? {
        tracing::warn!("{warning}");
    }
    Ok(doc)
}

/// Hidden sibling path an artifact is written to before it is moved into
/// place. Listings skip hidden files, so a half-written artifact is never
/// picked up as stage output.
pub(crate) fn partial_path(output: &Path) -> PathBuf {
    let name = output
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let partial = match name.rsplit_once('.') {
        Some((stem, ext)) => format!(".{stem}.partial.{ext}"),
        None => format!(".{name}.partial"),
    };
    output.with_file_name(partial)
}

/// Move a finished partial file into place, or remove it after a failure.
pub(crate) fn finish_partial(result: Result<()>, partial: &Path, output: &Path) -> Result<()> {
    match result {
        Ok(()) => {
            std::fs::rename(partial, output)?;
            Ok(())
        }
        Err(e) => {
            if let Err(rm) = std::fs::remove_file(partial) {
                if rm.kind() != std::io::ErrorKind::NotFound {
                    tracing::debug!("Could not remove {}: {rm}", partial.display());
                }
            }
            Err(e)
        }
    }
}
