//! Workflow engine.
//!
//! Three phase machines built from the same parts:
//! - migrate: validate, scan, copy, link, verify, clean up backup
//! - restore: validate, scan target, copy back into a temp sibling, swap link for data, verify, clean up
//! - repair: validate, relink, verify, clean up backup (never copies data)
//!
//! Every run ends in a `WorkflowOutcome`. Errors are caught at this boundary, logged,
//! classified and used to drive the mode's rollback; rollback failures are reported in
//! the outcome but never replace the original error.

pub mod batch;
pub mod migrate;
pub mod repair;
pub mod restore;

pub use batch::{run_batch, BatchSummary};
pub use migrate::migrate;
pub use repair::repair;
pub use restore::restore;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::config::Config;
use crate::copy::CopyTool;
use crate::errors::{ErrorKind, MoveError, Result};
use crate::progress::{ProgressUpdate, Reporter};
use crate::task::MigrationMode;

/// Knobs shared by all workflows; built once per run from the effective config.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    pub threads: u32,
    /// Files at or above this size count as "large" in scan statistics
    pub large_file_threshold: u64,
    pub sample_interval: Duration,
    pub copy_tool: CopyTool,
    pub keep_target_on_restore: bool,
    pub cleanup_repair_backup: bool,
    pub handle_tool: Option<PathBuf>,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            threads: 8,
            large_file_threshold: 1024 * 1024 * 1024,
            sample_interval: Duration::from_millis(1000),
            copy_tool: CopyTool::platform_default(),
            keep_target_on_restore: false,
            cleanup_repair_backup: false,
            handle_tool: None,
        }
    }
}

impl WorkflowSettings {
    pub fn from_config(cfg: &Config) -> Result<Self> {
        Ok(Self {
            threads: cfg.threads,
            large_file_threshold: cfg.large_file_threshold_mb.saturating_mul(1024 * 1024),
            sample_interval: Duration::from_millis(cfg.sample_interval_ms),
            copy_tool: CopyTool::parse(&cfg.copy_tool)?,
            keep_target_on_restore: cfg.keep_target_on_restore,
            cleanup_repair_backup: cfg.cleanup_repair_backup,
            handle_tool: cfg.handle_tool.clone(),
        })
    }
}

/// What happened to the rollback after a failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// Success, or nothing had been changed yet
    NotNeeded,
    Succeeded,
    Failed(String),
}

/// Definitive result of one workflow run.
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowOutcome {
    pub mode: MigrationMode,
    pub success: bool,
    pub cancelled: bool,
    /// Target actually used (after auto-adjustment)
    pub final_target: Option<PathBuf>,
    /// Backup left on disk, if any
    pub backup_path: Option<PathBuf>,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    /// `MoveError::code()` of the failure, 0 on success
    pub code: i32,
    pub rollback: RollbackStatus,
}

impl WorkflowOutcome {
    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> i32 {
        self.code
    }
}

/// Phase bookkeeping for one run: `[i/n] description` log lines plus the fixed
/// percentage of each phase boundary (`None` for phases that report their own progress).
pub(crate) struct Phases<'a> {
    mode: MigrationMode,
    percents: &'static [Option<f64>],
    reporter: &'a dyn Reporter,
}

impl<'a> Phases<'a> {
    pub(crate) fn new(mode: MigrationMode, percents: &'static [Option<f64>], reporter: &'a dyn Reporter) -> Self {
        Self {
            mode,
            percents,
            reporter,
        }
    }

    pub(crate) fn total(&self) -> u8 {
        self.percents.len() as u8
    }

    /// Announce phase `index` (1-based).
    pub(crate) fn enter(&self, index: u8, description: &str) {
        let total = self.total();
        self.reporter.log(&format!("[{index}/{total}] {description}"));
        info!(mode = %self.mode, phase = index, total, "{description}");
        if let Some(Some(percent)) = self.percents.get(usize::from(index.saturating_sub(1))) {
            self.reporter
                .progress(&ProgressUpdate::phase(index, total, description, *percent));
        }
    }

    pub(crate) fn complete(&self, message: &str) {
        let total = self.total();
        let mut done = ProgressUpdate::phase(total, total, "Done", 100.0);
        done.message = message.to_string();
        self.reporter.progress(&done);
        self.reporter.log(message);
    }
}

/// Common tail of every workflow: on failure run `rollback` and assemble the outcome.
/// `rollback` returns `Ok(true)` when it undid something, `Ok(false)` when nothing needed undoing.
pub(crate) fn conclude(
    mode: MigrationMode,
    result: Result<()>,
    final_target: &Path,
    backup_path: Option<PathBuf>,
    reporter: &dyn Reporter,
    rollback: impl FnOnce() -> Result<bool>,
) -> WorkflowOutcome {
    match result {
        Ok(()) => WorkflowOutcome {
            mode,
            success: true,
            cancelled: false,
            final_target: Some(final_target.to_path_buf()),
            backup_path,
            error: None,
            error_kind: None,
            code: 0,
            rollback: RollbackStatus::NotNeeded,
        },
        Err(err) => {
            let cancelled = err.is_cancelled();
            if cancelled {
                warn!(mode = %mode, "Workflow cancelled");
                reporter.log("Operation cancelled; rolling back...");
            } else {
                error!(mode = %mode, kind = err.kind_str(), error = %err, "Workflow failed");
                reporter.log(&format!("Error: {err}"));
            }
            let rollback = match rollback() {
                Ok(true) => {
                    reporter.log("Rollback complete");
                    RollbackStatus::Succeeded
                }
                Ok(false) => RollbackStatus::NotNeeded,
                Err(rb) => {
                    error!(mode = %mode, error = %rb, "Rollback failed");
                    reporter.log(&format!("Rollback failed: {rb}"));
                    RollbackStatus::Failed(rb.to_string())
                }
            };
            let kind = err.error_kind();
            if !cancelled {
                reporter.log(&format!("Hint ({kind}): {}", kind.hint()));
            }
            WorkflowOutcome {
                mode,
                success: false,
                cancelled,
                final_target: Some(final_target.to_path_buf()),
                backup_path: backup_path.filter(|p| p.exists()),
                error: Some(err.to_string()),
                error_kind: Some(kind),
                code: err.code(),
                rollback,
            }
        }
    }
}

/// Warn when link creation will likely need privileges we do not have.
pub(crate) fn warn_if_unprivileged(reporter: &dyn Reporter) {
    if cfg!(windows) && !crate::validate::is_elevated() {
        reporter.log("Warning: not running elevated; link creation may fail unless developer mode is enabled");
    }
}

/// Remove a directory tree, logging instead of failing.
pub(crate) fn remove_tree_best_effort(path: &Path, what: &str, reporter: &dyn Reporter) -> bool {
    match std::fs::remove_dir_all(path) {
        Ok(()) => {
            reporter.log(&format!("Removed {what}: {}", path.display()));
            true
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove {what}");
            reporter.log(&format!(
                "Warning: could not remove {what} {}: {e}; it was left in place",
                path.display()
            ));
            false
        }
    }
}

/// Run one workflow by mode.
pub fn run(
    mode: MigrationMode,
    source: &Path,
    target: &Path,
    settings: &WorkflowSettings,
    cancel: &CancelToken,
    reporter: &dyn Reporter,
) -> WorkflowOutcome {
    match mode {
        MigrationMode::Migrate => migrate(source, target, settings, cancel, reporter),
        MigrationMode::Restore => restore(source, target, settings, cancel, reporter),
        MigrationMode::Repair => repair(source, target, settings, reporter),
    }
}

/// Scan `root` and log the summary lines every workflow prints.
pub(crate) fn scan_and_report(
    root: &Path,
    settings: &WorkflowSettings,
    reporter: &dyn Reporter,
) -> crate::fs_ops::DirectoryStats {
    reporter.log(&format!("Scanning: {}", root.display()));
    let stats = crate::fs_ops::scan(root, settings.large_file_threshold, |line| reporter.log(line));
    reporter.log(&format!("Total files: {}", stats.total_files));
    reporter.log(&format!("Total size: {}", crate::fs_ops::format_bytes(stats.total_bytes)));
    reporter.log(&format!(
        "Large files (>= {}): {}",
        crate::fs_ops::format_bytes(settings.large_file_threshold),
        stats.large_files
    ));
    stats
}

/// Fail with `InsufficientSpace` unless `bytes` (+10%) fit at `path`.
pub(crate) fn require_space(path: &Path, bytes: u64, reporter: &dyn Reporter) -> Result<()> {
    let check = crate::validate::check_disk_space(path, bytes)?;
    reporter.log(&format!(
        "Available space: {} | required (incl. 10% margin): {}",
        crate::fs_ops::format_bytes(check.available),
        crate::fs_ops::format_bytes(check.required)
    ));
    if check.sufficient {
        Ok(())
    } else {
        Err(MoveError::InsufficientSpace {
            path: path.to_path_buf(),
            required: check.required,
            available: check.available,
        })
    }
}
