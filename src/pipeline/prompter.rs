//! Operator decisions.
//!
//! Two points in a run need an answer from the operator: padding clips whose
//! dimensions disagree, and reusing an existing title document. Both go
//! through a [`Prompter`] so tests and `--yes` runs can answer without a
//! terminal.

use std::io::IsTerminal;

use dialoguer::{theme::ColorfulTheme, Confirm};
use reelforge_common::{Error, Result};
use tokio::runtime::{Handle, RuntimeFlavor};

/// Answers yes/no questions.
pub trait Prompter: Send + Sync {
    fn confirm(&self, question: &str, default: bool) -> Result<bool>;
}

/// Asks on the terminal.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn confirm(&self, question: &str, default: bool) -> Result<bool> {
        if !std::io::stdin().is_terminal() {
            return Err(Error::Aborted(format!(
                "{question} (no terminal to ask on; pass --yes to accept)"
            )));
        }
        let answer = blocking(|| {
            Confirm::with_theme(&ColorfulTheme::default())
                .with_prompt(question)
                .default(default)
                .interact()
        });
        answer.map_err(|e| match e {
            dialoguer::Error::IO(io) if io.kind() == std::io::ErrorKind::Interrupted => {
                Error::Interrupted
            }
            e => Error::Aborted(format!("{question}: {e}")),
        })
    }
}

/// Run a blocking call, moving the runtime's other tasks off this worker
/// first when on a multi-threaded runtime.
pub(crate) fn blocking<T>(f: impl FnOnce() -> T) -> T {
    let multi_thread = Handle::try_current()
        .is_ok_and(|h| matches!(h.runtime_flavor(), RuntimeFlavor::MultiThread));
    if multi_thread {
        tokio::task::block_in_place(f)
    } else {
        f()
    }
}

/// Gives the same answer to every question.
#[derive(Debug, Clone, Copy)]
pub struct FixedAnswer(pub bool);

impl Prompter for FixedAnswer {
    fn confirm(&self, question: &str, _default: bool) -> Result<bool> {
        tracing::info!("{question} -> {}", if self.0 { "yes" } else { "no" });
        Ok(self.0)
    }
}
