//! The presentation pipeline: workspace, stages, and their sequencing.

pub mod discovery;
pub mod manifest;
pub mod mode;
pub mod orchestrator;
pub mod prompter;
pub mod runner;
pub mod stages;
pub mod titles;
pub mod workspace;

pub use discovery::{SectionGroup, WorkItem};
pub use manifest::{Manifest, StageRecord};
pub use mode::{next_stage, EntryMode, StageId};
pub use orchestrator::{PipelineOrchestrator, RunOutcome};
pub use prompter::{FixedAnswer, Prompter, TerminalPrompter};
pub use runner::{ItemProgress, StageFailure, StageResult, StageRunner};
pub use stages::{Deferral, Stage, StageContext, StageOutcome, StageReport};
pub use titles::{TitleCardSpec, TitleDocument};
pub use workspace::WorkspaceStore;
