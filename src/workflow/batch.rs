//! Sequential batch execution.
//!
//! Tasks run one after another. Before each task its state is re-read from disk so a
//! stale list never drives the wrong workflow; tasks that no longer fit the mode are
//! skipped. Cancellation skips every remaining task.

use std::sync::Mutex;

use serde::Serialize;
use tracing::{info, warn};

use super::{run, WorkflowSettings};
use crate::cancel::CancelToken;
use crate::progress::{ProgressUpdate, Reporter};
use crate::task::{MigrationMode, MigrationTask, TaskStatus};

/// Counts for one batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchSummary {
    pub completed: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl BatchSummary {
    pub fn total(&self) -> usize {
        self.completed + self.failed + self.skipped
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Prefixes log lines with the task name and remembers the last progress snapshot.
struct TaskReporter<'a> {
    name: &'a str,
    inner: &'a dyn Reporter,
    last: Mutex<Option<ProgressUpdate>>,
}

impl Reporter for TaskReporter<'_> {
    fn progress(&self, update: &ProgressUpdate) {
        if let Ok(mut last) = self.last.lock() {
            *last = Some(update.clone());
        }
        self.inner.progress(update);
    }

    fn log(&self, line: &str) {
        self.inner.log(&format!("[{}] {line}", self.name));
    }
}

/// Run `mode` over every task in order and fold the results back into the tasks.
pub fn run_batch(
    tasks: &mut [MigrationTask],
    mode: MigrationMode,
    settings: &WorkflowSettings,
    cancel: &CancelToken,
    reporter: &dyn Reporter,
) -> BatchSummary {
    let mut summary = BatchSummary::default();
    let count = tasks.len();

    for (i, task) in tasks.iter_mut().enumerate() {
        if cancel.is_cancelled() {
            task.skip("cancelled");
            summary.skipped += 1;
            continue;
        }

        let state = task.refresh_state();
        if !task.is_eligible(mode) {
            reporter.log(&format!("Skipping {}: state is {state}", task.display_name));
            task.skip(&format!("not eligible for {mode} in state {state}"));
            summary.skipped += 1;
            continue;
        }

        reporter.log(&format!("Task {}/{count}: {} ({mode})", i + 1, task.display_name));
        task.begin();
        let name = task.display_name.clone();
        let task_reporter = TaskReporter {
            name: &name,
            inner: reporter,
            last: Mutex::new(None),
        };
        let outcome = run(mode, task.source(), task.target(), settings, cancel, &task_reporter);

        if let Ok(mut last) = task_reporter.last.lock()
            && let Some(update) = last.take()
        {
            task.apply_progress(&update);
        }
        task.finish(&outcome);

        match task.status {
            TaskStatus::Completed => summary.completed += 1,
            TaskStatus::Skipped => summary.skipped += 1,
            _ => {
                warn!(task = %task.display_name, error = ?task.error, "Task failed");
                summary.failed += 1;
            }
        }
    }

    info!(
        mode = %mode,
        completed = summary.completed,
        failed = summary.failed,
        skipped = summary.skipped,
        "Batch finished"
    );
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs_ops::link;
    use crate::progress::ChannelReporter;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn cancelled_batch_skips_everything() {
        let mut tasks = vec![MigrationTask::new("/nope/a", "/nope/b"), MigrationTask::new("/nope/c", "/nope/d")];
        let cancel = CancelToken::new();
        cancel.cancel();
        let summary = run_batch(
            &mut tasks,
            MigrationMode::Migrate,
            &WorkflowSettings::default(),
            &cancel,
            &crate::progress::NullReporter,
        );
        assert_eq!(summary.skipped, 2);
        assert!(tasks.iter().all(|t| t.status == TaskStatus::Skipped));
    }

    #[test]
    fn ineligible_tasks_are_skipped() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("plain");
        fs::create_dir(&src).unwrap();
        let mut tasks = vec![MigrationTask::new(&src, dir.path().join("t"))];
        let summary = run_batch(
            &mut tasks,
            MigrationMode::Restore,
            &WorkflowSettings::default(),
            &CancelToken::new(),
            &crate::progress::NullReporter,
        );
        assert_eq!(summary, BatchSummary { completed: 0, failed: 0, skipped: 1 });
        assert!(tasks[0].message.contains("not eligible"));
    }

    #[test]
    fn repair_batch_prefixes_logs_and_completes() {
        let dir = tempdir().unwrap();
        let tgt = dir.path().join("data_target");
        fs::create_dir(&tgt).unwrap();
        let src = dir.path().join("data");
        let mut tasks = vec![MigrationTask::new(&src, &tgt)];
        let (rep, _prx, lrx) = ChannelReporter::new();

        let summary = run_batch(
            &mut tasks,
            MigrationMode::Repair,
            &WorkflowSettings::default(),
            &CancelToken::new(),
            &rep,
        );
        drop(rep);

        assert_eq!(summary.completed, 1);
        assert!(summary.all_succeeded());
        assert!(link::points_to(&src, &tgt));
        assert_eq!(tasks[0].percent, 100.0);
        assert!(tasks[0].completed_at.is_some());
        let logs: Vec<String> = lrx.iter().collect();
        assert!(logs.iter().any(|l| l.starts_with("[data] [1/4]")));
    }
}
