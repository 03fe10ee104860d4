//! Per-item failure isolation.
//!
//! A [`StageRunner`] feeds work items to a worker one at a time. An error from
//! one item is logged and recorded; the remaining items still run.

use std::future::Future;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use reelforge_common::{Error, Result};

use super::discovery::WorkItem;

/// An item whose worker returned an error.
#[derive(Debug)]
pub struct StageFailure {
    pub item: WorkItem,
    pub error: Error,
}

/// Outcome of running one stage over its work items.
///
/// `T` is what a successful worker returns; usually the item itself with its
/// outputs filled in.
#[derive(Debug)]
pub struct StageResult<T = WorkItem> {
    /// Worker results, in the order the items were supplied.
    pub succeeded: Vec<T>,
    pub failed: Vec<StageFailure>,
}

impl<T> Default for StageResult<T> {
    fn default() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
        }
    }
}

impl<T> StageResult<T> {
    /// Total number of items processed.
    pub fn total(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    /// Whether every item failed.
    pub fn all_failed(&self) -> bool {
        self.succeeded.is_empty() && !self.failed.is_empty()
    }

    /// File names of the failed items, for summaries.
    pub fn failed_labels(&self) -> Vec<String> {
        self.failed.iter().map(|f| f.item.file_name()).collect()
    }

    /// The surviving items, or a stage error when nothing survived.
    ///
    /// A stage with no survivors leaves the next stage nothing to read.
    pub fn into_survivors(self, stage: &str) -> Result<Vec<T>> {
        if self.all_failed() {
            let names = self.failed_labels().join(", ");
            let last = self
                .failed
                .last()
                .map(|f| f.error.to_string())
                .unwrap_or_default();
            return Err(Error::stage(
                stage,
                format!("every item failed ({names}); last error: {last}"),
            ));
        }
        Ok(self.succeeded)
    }
}

/// Handle a worker uses to report the active item's percentage.
#[derive(Debug, Clone)]
pub struct ItemProgress {
    bar: ProgressBar,
    label: String,
}

impl ItemProgress {
    pub fn set(&self, pct: u8) {
        self.bar.set_message(format!("{} {pct:>3}%", self.label));
    }
}

/// Runs a stage's items sequentially with failure isolation.
#[derive(Debug, Clone)]
pub struct StageRunner {
    show_progress: bool,
}

impl Default for StageRunner {
    fn default() -> Self {
        Self::new(true)
    }
}

impl StageRunner {
    /// Create a runner. With `show_progress` off, no bar is drawn.
    pub fn new(show_progress: bool) -> Self {
        Self { show_progress }
    }

    fn bar(&self, label: &str, len: usize) -> ProgressBar {
        if !self.show_progress || len == 0 {
            return ProgressBar::hidden();
        }
        let pb = ProgressBar::new(len as u64);
        if let Ok(style) =
            ProgressStyle::default_bar().template("{prefix:>14} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
        {
            pb.set_style(style.progress_chars("##-"));
        }
        pb.set_prefix(label.to_string());
        pb.enable_steady_tick(Duration::from_millis(250));
        pb
    }

    /// Run `worker` over `items` in order.
    ///
    /// Each call receives the item and a progress handle. Errors never stop
    /// the loop.
    pub async fn run_stage<T, F, Fut>(
        &self,
        label: &str,
        items: Vec<WorkItem>,
        mut worker: F,
    ) -> StageResult<T>
    where
        F: FnMut(WorkItem, ItemProgress) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let bar = self.bar(label, items.len());
        let mut result = StageResult::default();

        for item in items {
            let progress = ItemProgress {
                bar: bar.clone(),
                label: item.file_name(),
            };
            progress.set(0);
            tracing::debug!("{label}: {}", item.file_name());

            match worker(item.clone(), progress).await {
                Ok(done) => result.succeeded.push(done),
                Err(error) => {
                    bar.suspend(|| {
                        tracing::warn!(
                            "{label}: section {} ({}) failed: {error}",
                            item.section,
                            item.file_name()
                        )
                    });
                    result.failed.push(StageFailure { item, error });
                }
            }
            bar.inc(1);
        }

        bar.finish_and_clear();
        if !result.failed.is_empty() {
            tracing::warn!(
                "{label}: {} of {} items failed: {}",
                result.failed.len(),
                result.total(),
                result.failed_labels().join(", ")
            );
        }
        result
    }
}
