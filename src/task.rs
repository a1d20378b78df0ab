//! Units of work.
//!
//! A `MigrationTask` is a plain record: the batch driver mutates it from progress
//! snapshots and workflow outcomes, and `refresh_state` re-derives everything that
//! comes from the filesystem. Nothing here is observed or shared across threads.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::ErrorKind;
use crate::progress::ProgressUpdate;
use crate::state::{self, MigrationState};
use crate::workflow::WorkflowOutcome;

/// Which workflow to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationMode {
    Migrate,
    Restore,
    Repair,
}

impl fmt::Display for MigrationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MigrationMode::Migrate => "migrate",
            MigrationMode::Restore => "restore",
            MigrationMode::Repair => "repair",
        })
    }
}

/// Lifecycle of one task inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationTask {
    pub id: String,
    pub display_name: String,
    pub source: PathBuf,
    pub target: PathBuf,
    /// Sub-path below a profile's base directory; empty for standalone sources
    pub relative_path: String,
    pub profile: Option<String>,
    pub status: TaskStatus,
    pub migration_state: MigrationState,
    pub phase: u8,
    pub percent: f64,
    pub message: String,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub backup_path: Option<PathBuf>,
    pub link_target: Option<PathBuf>,
    /// Only meaningful to interactive front ends
    pub selected: bool,
    pub completed_at: Option<DateTime<Local>>,
    /// Copy finished but the link was never created
    pub is_resumable: bool,
}

impl MigrationTask {
    pub fn new(source: impl Into<PathBuf>, target: impl Into<PathBuf>) -> Self {
        let source = source.into();
        let display_name = source
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| source.display().to_string());
        Self {
            id: Uuid::new_v4().to_string(),
            display_name,
            source,
            target: target.into(),
            relative_path: String::new(),
            profile: None,
            status: TaskStatus::Pending,
            migration_state: MigrationState::Pending,
            phase: 0,
            percent: 0.0,
            message: String::new(),
            error: None,
            error_kind: None,
            backup_path: None,
            link_target: None,
            selected: false,
            completed_at: None,
            is_resumable: false,
        }
    }

    /// Attach profile provenance.
    pub fn with_profile(mut self, profile: impl Into<String>, relative_path: impl Into<String>) -> Self {
        self.profile = Some(profile.into());
        self.relative_path = relative_path.into();
        self
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn target(&self) -> &Path {
        &self.target
    }

    /// Recompute the filesystem-derived fields.
    pub fn refresh_state(&mut self) -> MigrationState {
        let ev = state::inspect(&self.source, &self.target);
        self.migration_state = state::classify(&ev);
        self.backup_path = ev.backups.into_iter().next();
        self.link_target = ev.link_target;
        self.is_resumable = self.migration_state == MigrationState::NeedsCompletion;
        self.migration_state
    }

    /// Whether a batch in `mode` should run this task.
    pub fn is_eligible(&self, mode: MigrationMode) -> bool {
        match mode {
            MigrationMode::Migrate => matches!(
                self.migration_state,
                MigrationState::Pending | MigrationState::NeedsCompletion
            ),
            MigrationMode::Restore => matches!(
                self.migration_state,
                MigrationState::Migrated | MigrationState::Inconsistent | MigrationState::NeedsCleanup
            ),
            MigrationMode::Repair => true,
        }
    }

    pub fn begin(&mut self) {
        self.status = TaskStatus::InProgress;
        self.phase = 0;
        self.percent = 0.0;
        self.error = None;
        self.error_kind = None;
    }

    pub fn skip(&mut self, reason: &str) {
        self.status = TaskStatus::Skipped;
        self.message = reason.to_string();
    }

    pub fn apply_progress(&mut self, update: &ProgressUpdate) {
        self.phase = update.phase;
        self.percent = update.percent.clamp(0.0, 100.0);
        self.message = update.message.clone();
    }

    /// Fold a finished workflow into the task and re-derive its state.
    pub fn finish(&mut self, outcome: &WorkflowOutcome) {
        if let Some(final_target) = &outcome.final_target {
            self.target = final_target.clone();
        }
        if outcome.success {
            self.status = TaskStatus::Completed;
            self.percent = 100.0;
            self.message = format!("{} completed", outcome.mode);
            self.completed_at = Some(Local::now());
        } else {
            self.status = if outcome.cancelled {
                TaskStatus::Skipped
            } else {
                TaskStatus::Failed
            };
            self.error = outcome.error.clone();
            self.error_kind = outcome.error_kind;
            self.message = outcome
                .error
                .clone()
                .unwrap_or_else(|| format!("{} failed", outcome.mode));
        }
        self.refresh_state();
        if outcome.backup_path.is_some() {
            self.backup_path = outcome.backup_path.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::RollbackStatus;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn new_task_uses_leaf_as_name() {
        let t = MigrationTask::new("/games/Steam", "/mnt/big/Steam").with_profile("steam", "steamapps");
        assert_eq!(t.display_name, "Steam");
        assert_eq!(t.profile.as_deref(), Some("steam"));
        assert_eq!(t.status, TaskStatus::Pending);
        assert!(Uuid::parse_str(&t.id).is_ok());
    }

    #[test]
    fn serializes_enums_in_snake_case() {
        let mut t = MigrationTask::new("/a", "/b");
        t.status = TaskStatus::InProgress;
        t.migration_state = MigrationState::NeedsCompletion;
        let v = serde_json::to_value(&t).unwrap();
        assert_eq!(v["status"], "in_progress");
        assert_eq!(v["migration_state"], "needs_completion");
    }

    #[test]
    fn eligibility_per_mode() {
        let mut t = MigrationTask::new("/a", "/b");
        assert!(t.is_eligible(MigrationMode::Migrate));
        assert!(!t.is_eligible(MigrationMode::Restore));
        t.migration_state = MigrationState::Inconsistent;
        assert!(t.is_eligible(MigrationMode::Restore));
        assert!(!t.is_eligible(MigrationMode::Migrate));
        assert!(t.is_eligible(MigrationMode::Repair));
    }

    #[test]
    fn refresh_reads_filesystem() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("s");
        let tgt = dir.path().join("t");
        fs::create_dir_all(&src).unwrap();
        fs::create_dir_all(&tgt).unwrap();
        let mut t = MigrationTask::new(&src, &tgt);
        assert_eq!(t.refresh_state(), MigrationState::Pending);
        crate::state::markers::create_migrate_done(&tgt, &src).unwrap();
        assert_eq!(t.refresh_state(), MigrationState::NeedsCompletion);
        assert!(t.is_resumable);
    }

    #[test]
    fn finish_records_failure() {
        let mut t = MigrationTask::new("/nope/a", "/nope/b");
        t.begin();
        let outcome = WorkflowOutcome {
            mode: MigrationMode::Migrate,
            success: false,
            cancelled: false,
            final_target: None,
            backup_path: None,
            error: Some("Access is denied".into()),
            error_kind: Some(ErrorKind::Permission),
            code: 9,
            rollback: RollbackStatus::NotNeeded,
        };
        t.finish(&outcome);
        assert_eq!(t.status, TaskStatus::Failed);
        assert_eq!(t.error_kind, Some(ErrorKind::Permission));
        assert!(t.completed_at.is_none());
    }
}
