//! Unified error type for reelforge.
//!
//! Library crates return [`Error`]; the binary wraps it in `anyhow` for
//! context and maps it to a process exit code via [`Error::exit_code`].

use std::fmt;
use std::path::PathBuf;

/// Result alias using the crate-level [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while building a presentation.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A required external binary could not be found or spawned.
    #[error("external tool unavailable: {tool}")]
    ExternalToolUnavailable {
        /// Tool name or path that failed to spawn.
        tool: String,
    },

    /// An external process ran but exited unsuccessfully.
    #[error("{command} failed ({}){}", ExitCodeDisplay(*exit_code), detail_suffix(detail))]
    ExternalProcessFailed {
        /// Name of the command that failed.
        command: String,
        /// Exit code, or `None` when the process was killed by a signal.
        exit_code: Option<i32>,
        /// Trailing diagnostic output, if any.
        detail: String,
    },

    /// Raw inputs do not carry the two-digit section prefix.
    #[error("input files must start with a two-digit section number: {}", format_paths(files))]
    Naming {
        /// Every offending file.
        files: Vec<PathBuf>,
    },

    /// A stage found nothing to work on.
    #[error("no work found in {}", dir.display())]
    NoWork {
        /// Directory that was scanned.
        dir: PathBuf,
    },

    /// A stage or mode precondition is not met.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// A stage failed as a whole (e.g. every item failed).
    #[error("stage {stage} failed: {message}")]
    Stage {
        /// Stage name.
        stage: String,
        /// Human-readable description.
        message: String,
    },

    /// Segments handed to the final concatenation do not share stream parameters.
    #[error("segments are not stream-copy compatible:\n  {}", mismatches.join("\n  "))]
    IncompatibleSegments {
        /// One line per mismatching segment.
        mismatches: Vec<String>,
    },

    /// The externally authored title document is malformed or incomplete.
    #[error("invalid title document: {}", problems.join("; "))]
    TitleSpec {
        /// Every problem found.
        problems: Vec<String>,
    },

    /// Media probing failed.
    #[error("probe failed for {}: {message}", path.display())]
    Probe {
        /// File that was probed.
        path: PathBuf,
        /// Human-readable description.
        message: String,
    },

    /// The operator declined a decision point.
    #[error("aborted: {0}")]
    Aborted(String),

    /// The run was interrupted by a signal.
    #[error("interrupted")]
    Interrupted,

    /// Configuration could not be loaded.
    #[error("config error: {0}")]
    Config(String),

    /// An I/O operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

struct ExitCodeDisplay(Option<i32>);

impl fmt::Display for ExitCodeDisplay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(code) => write!(f, "exit code {code}"),
            None => write!(f, "terminated by signal"),
        }
    }
}

fn detail_suffix(detail: &str) -> String {
    let detail = detail.trim();
    if detail.is_empty() {
        String::new()
    } else {
        format!(": {detail}")
    }
}

fn format_paths(files: &[PathBuf]) -> String {
    files
        .iter()
        .map(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| p.display().to_string())
        })
        .collect::<Vec<_>>()
        .join(", ")
}

impl Error {
    /// Convenience constructor for [`Error::ExternalToolUnavailable`].
    pub fn tool_unavailable(tool: impl Into<String>) -> Self {
        Error::ExternalToolUnavailable { tool: tool.into() }
    }

    /// Convenience constructor for [`Error::ExternalProcessFailed`].
    pub fn process_failed(
        command: impl Into<String>,
        exit_code: Option<i32>,
        detail: impl Into<String>,
    ) -> Self {
        Error::ExternalProcessFailed {
            command: command.into(),
            exit_code,
            detail: detail.into(),
        }
    }

    /// Convenience constructor for [`Error::Precondition`].
    pub fn precondition(message: impl Into<String>) -> Self {
        Error::Precondition(message.into())
    }

    /// Convenience constructor for [`Error::Stage`].
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Error::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Convenience constructor for [`Error::Probe`].
    pub fn probe(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Error::Probe {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Where this error sits in the failure taxonomy.
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::ExternalToolUnavailable { .. }
            | Error::Naming { .. }
            | Error::NoWork { .. }
            | Error::Precondition(_)
            | Error::IncompatibleSegments { .. }
            | Error::TitleSpec { .. }
            | Error::Config(_) => ErrorClass::FatalPrecondition,
            Error::ExternalProcessFailed { .. }
            | Error::Probe { .. }
            | Error::Io(_)
            | Error::Json(_) => ErrorClass::ItemFailure,
            Error::Stage { .. } | Error::Aborted(_) => ErrorClass::Aborted,
            Error::Interrupted => ErrorClass::Interrupted,
        }
    }

    /// Process exit code for a run that ended with this error.
    pub fn exit_code(&self) -> i32 {
        match self.class() {
            ErrorClass::Interrupted => 130,
            _ => 1,
        }
    }
}

/// Coarse classification of [`Error`] values.
///
/// Degraded mode and deferral pending human input are run outcomes, not
/// errors, so they have no class here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Checked before work starts; the run stops immediately.
    FatalPrecondition,
    /// A single work item failed; stages isolate these.
    ItemFailure,
    /// The run stopped because a stage or the operator gave up.
    Aborted,
    /// The operator interrupted the run.
    Interrupted,
}
