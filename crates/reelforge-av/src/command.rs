//! Builder describing an external tool invocation.

use std::path::{Path, PathBuf};
use std::process::ExitStatus;

/// Output captured from a finished tool execution.
#[derive(Debug, Clone)]
pub struct ToolOutput {
    /// Process exit status.
    pub status: ExitStatus,
    /// Captured standard output (lossy UTF-8). Empty unless the command was
    /// built with [`ToolCommand::capture_stdout`].
    pub stdout: String,
    /// The last few diagnostic lines, kept for error reports.
    pub stderr_tail: String,
}

/// A builder for external tool invocations executed by
/// [`ProcessRunner`](crate::ProcessRunner).
///
/// # Example
///
/// ```
/// use reelforge_av::ToolCommand;
///
/// let mut cmd = ToolCommand::new("ffmpeg");
/// cmd.args(["-hide_banner", "-i"]).arg("01-intro.mov");
/// assert_eq!(cmd.name(), "ffmpeg");
/// assert_eq!(cmd.get_args().len(), 3);
/// ```
#[derive(Debug, Clone)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<String>,
    capture_stdout: bool,
}

impl ToolCommand {
    /// Create a new command for the given program path.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            capture_stdout: false,
        }
    }

    /// Append a single argument.
    pub fn arg(&mut self, s: impl Into<String>) -> &mut Self {
        self.args.push(s.into());
        self
    }

    /// Append a path argument.
    pub fn path_arg(&mut self, p: &Path) -> &mut Self {
        self.args.push(p.to_string_lossy().into_owned());
        self
    }

    /// Append multiple arguments.
    pub fn args(&mut self, iter: impl IntoIterator<Item = impl Into<String>>) -> &mut Self {
        self.args.extend(iter.into_iter().map(Into::into));
        self
    }

    /// Capture standard output instead of discarding it.
    pub fn capture_stdout(&mut self) -> &mut Self {
        self.capture_stdout = true;
        self
    }

    /// Path of the program to run.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Arguments passed to the program.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Whether standard output is captured.
    pub fn captures_stdout(&self) -> bool {
        self.capture_stdout
    }

    /// Short program name used in logs and errors.
    pub fn name(&self) -> String {
        self.program
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.program.to_string_lossy().to_string())
    }

    /// The full command line, for debug logging.
    pub fn command_line(&self) -> String {
        let mut line = self.program.to_string_lossy().to_string();
        for arg in &self.args {
            line.push(' ');
            if arg.contains(char::is_whitespace) || arg.is_empty() {
                line.push('\'');
                line.push_str(arg);
                line.push('\'');
            } else {
                line.push_str(arg);
            }
        }
        line
    }
}
