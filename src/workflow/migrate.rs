//! Migrate: move a directory to a new location and leave a link behind.
//!
//! Phases and their fixed progress: validate 0, scan 5, copy 10..90, link 90, verify 93,
//! clean up backup 96, done 100.
//!
//! Notes:
//! - The source is never touched before the copy has finished and the done marker is written.
//! - A target already holding a marker from an interrupted migration of the same source is
//!   resumed instead of rejected as non-empty; the mirror copy reconciles it.
//! - On failure the link is removed, the backup renamed back and the target's markers deleted.
//!   Copied data on the target is left for the operator.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::{conclude, remove_tree_best_effort, require_space, scan_and_report, warn_if_unprivileged};
use super::{Phases, WorkflowOutcome, WorkflowSettings};
use crate::cancel::CancelToken;
use crate::copy::{run_copy, CopyRequest, PhaseLabel};
use crate::errors::{MoveError, Result};
use crate::fs_ops::{dir_size, link};
use crate::probe::LockProbe;
use crate::progress::Reporter;
use crate::state::markers;
use crate::task::MigrationMode;
use crate::validate;

static PERCENTS: [Option<f64>; 6] = [Some(0.0), Some(5.0), None, Some(90.0), Some(93.0), Some(96.0)];

struct Migration<'a> {
    source: PathBuf,
    target: PathBuf,
    settings: &'a WorkflowSettings,
    cancel: &'a CancelToken,
    reporter: &'a dyn Reporter,
    /// Set the moment the source is renamed away
    backup: Option<PathBuf>,
    lock_placed: bool,
    resuming: bool,
}

/// Run a migration of `source` to `target`.
pub fn migrate(
    source: &Path,
    target: &Path,
    settings: &WorkflowSettings,
    cancel: &CancelToken,
    reporter: &dyn Reporter,
) -> WorkflowOutcome {
    let phases = Phases::new(MigrationMode::Migrate, &PERCENTS, reporter);
    let mut run = Migration {
        source: source.to_path_buf(),
        target: target.to_path_buf(),
        settings,
        cancel,
        reporter,
        backup: None,
        lock_placed: false,
        resuming: false,
    };
    let result = run.execute(&phases);
    let final_target = run.target.clone();
    let backup = run.backup.clone();
    conclude(MigrationMode::Migrate, result, &final_target, backup, reporter, || run.rollback())
}

impl Migration<'_> {
    fn execute(&mut self, phases: &Phases<'_>) -> Result<()> {
        phases.enter(1, "Validating paths");
        self.validate()?;
        self.cancel.check()?;

        phases.enter(2, "Scanning source");
        let stats = scan_and_report(&self.source, self.settings, self.reporter);
        let already = if self.resuming { dir_size(&self.target) } else { 0 };
        require_space(&self.target, stats.total_bytes.saturating_sub(already), self.reporter)?;
        self.cancel.check()?;

        phases.enter(3, "Copying files");
        let req = CopyRequest {
            source: &self.source,
            target: &self.target,
            total_bytes: stats.total_bytes,
            threads: self.settings.threads,
            sample_interval: self.settings.sample_interval,
            tool: &self.settings.copy_tool,
            phase: PhaseLabel {
                index: 3,
                total: phases.total(),
                description: "Copying files".into(),
            },
        };
        run_copy(&req, self.cancel, self.reporter)?;
        markers::create_migrate_done(&self.target, &self.source)?;
        self.cancel.check()?;

        self.link_and_verify(phases)?;

        phases.enter(6, "Cleaning up backup");
        if let Some(backup) = self.backup.clone()
            && remove_tree_best_effort(&backup, "backup", self.reporter)
        {
            self.backup = None;
        }
        markers::delete_marker(&self.target, markers::MIGRATE_LOCK);

        info!(source = %self.source.display(), target = %self.target.display(), "Migration complete");
        phases.complete("Migration complete");
        Ok(())
    }

    /// Swap the source for a link and confirm it resolves. The backup stays until this passes.
    fn link_and_verify(&mut self, phases: &Phases<'_>) -> Result<()> {
        phases.enter(4, "Creating link");
        self.reporter.log(&format!(
            "Creating link: {} -> {}",
            self.source.display(),
            self.target.display()
        ));
        let backup = link::create_backup_and_link(&self.source, &self.target, &mut self.backup)?;
        self.reporter.log(&format!("Original data kept at {} until verified", backup.display()));

        phases.enter(5, "Verifying link");
        link::verify(&self.source, Some(&self.target))?;
        self.reporter.log("Link verified");
        Ok(())
    }

    /// A marker from an earlier, interrupted migration of this same source.
    fn is_resume_target(&self, target: &Path) -> bool {
        [markers::MIGRATE_DONE, markers::MIGRATE_LOCK]
            .iter()
            .filter_map(|name| markers::read_marker(target, name))
            .any(|m| link::same_location(&m.source, &self.source))
    }

    fn validate(&mut self) -> Result<()> {
        if link::is_link(&self.source) {
            return Err(MoveError::Validation(format!(
                "source is already a link: {} (use restore or repair)",
                self.source.display()
            )));
        }
        // a restore may have copied markers back into the source
        if self.source.is_dir() {
            markers::delete_migrate_markers(&self.source);
            markers::delete_restore_markers(&self.source);
        }

        if let Some(warning) = validate::validate_source(&self.source)? {
            self.reporter.log(&format!("Warning: {warning}"));
        }

        self.resuming = self.is_resume_target(&self.target);
        if !self.resuming
            && let Some(adjusted) = validate::adjusted_target(&self.source, &self.target)
        {
            self.reporter.log("Warning: target is not empty and is not named after the source");
            self.reporter.log(&format!(
                "Target adjusted: {} -> {}",
                self.target.display(),
                adjusted.display()
            ));
            self.target = adjusted;
            self.resuming = self.is_resume_target(&self.target);
        }

        validate::validate_target(&self.target)?;
        if self.resuming {
            self.reporter.log("Resuming an interrupted migration into the existing target");
        } else {
            validate::ensure_target_empty(&self.target)?;
        }
        validate::validate_relation(&self.source, &self.target)?;
        warn_if_unprivileged(self.reporter);

        LockProbe::new(self.settings.handle_tool.clone()).check_migrate(&self.source, &self.target)?;
        fs::create_dir_all(&self.target).map_err(MoveError::io("create target directory", &self.target))?;
        markers::create_migrate_lock(&self.target, &self.source)?;
        self.lock_placed = true;

        self.reporter.log(&format!("Source: {}", self.source.display()));
        self.reporter.log(&format!("Target: {}", self.target.display()));
        Ok(())
    }

    fn rollback(&mut self) -> Result<bool> {
        let mut undone = false;
        if let Some(backup) = self.backup.take() {
            self.reporter.log("Rolling back...");
            if link::is_link(&self.source) {
                link::remove(&self.source)?;
            }
            if backup.exists() {
                link::restore_backup(&backup, &self.source)?;
                self.reporter.log("Original directory restored");
            }
            undone = true;
        }
        if self.lock_placed {
            markers::delete_migrate_markers(&self.target);
            debug!(target = %self.target.display(), "Migrate markers removed during rollback");
            undone = true;
        }
        Ok(undone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullReporter;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn rejects_link_source_without_side_effects() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        let src = dir.path().join("src");
        link::create_link(&src, &real).unwrap();
        let tgt = dir.path().join("tgt");

        let out = migrate(&src, &tgt, &WorkflowSettings::default(), &CancelToken::new(), &NullReporter);
        assert!(!out.success);
        assert_eq!(out.code, 2);
        assert!(!tgt.exists());
        assert!(link::is_link(&src));
    }

    #[test]
    fn non_empty_target_with_matching_leaf_is_rejected() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("data");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a"), b"a").unwrap();
        let tgt = dir.path().join("elsewhere/data");
        fs::create_dir_all(&tgt).unwrap();
        fs::write(tgt.join("foreign"), b"x").unwrap();

        let out = migrate(&src, &tgt, &WorkflowSettings::default(), &CancelToken::new(), &NullReporter);
        assert!(!out.success);
        assert_eq!(out.code, 4, "{:?}", out.error);
        assert!(src.join("a").exists());
    }

    #[test]
    fn cancelled_before_copy_leaves_source_and_clears_markers() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("data");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a"), b"a").unwrap();
        let tgt = dir.path().join("t");
        let cancel = CancelToken::new();
        cancel.cancel();

        let out = migrate(&src, &tgt, &WorkflowSettings::default(), &cancel, &NullReporter);
        assert!(out.cancelled);
        assert!(src.join("a").exists());
        assert!(!markers::has_marker(&tgt, markers::MIGRATE_LOCK));
    }

    #[cfg(unix)]
    #[test]
    fn verify_failure_puts_backup_back_at_source() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("data");
        fs::create_dir_all(src.join("nested")).unwrap();
        fs::write(src.join("nested/keep.txt"), b"original").unwrap();
        // target never materialized: the link is created but does not resolve
        let tgt = dir.path().join("gone/data");
        let settings = WorkflowSettings::default();
        let cancel = CancelToken::new();
        let phases = Phases::new(MigrationMode::Migrate, &PERCENTS, &NullReporter);
        let mut run = Migration {
            source: src.clone(),
            target: tgt.clone(),
            settings: &settings,
            cancel: &cancel,
            reporter: &NullReporter,
            backup: None,
            lock_placed: false,
            resuming: false,
        };

        let result = run.link_and_verify(&phases);
        assert!(matches!(result, Err(MoveError::Verification(_))), "{result:?}");
        assert!(link::is_link(&src));
        let backup = run.backup.clone().expect("backup recorded before linking");
        assert!(backup.join("nested/keep.txt").exists());

        let out = conclude(MigrationMode::Migrate, result, &tgt, Some(backup.clone()), &NullReporter, || {
            run.rollback()
        });
        assert!(!out.success);
        assert_eq!(out.code, 7);
        assert_eq!(out.rollback, crate::workflow::RollbackStatus::Succeeded);
        assert!(!link::is_link(&src));
        assert!(src.is_dir());
        assert_eq!(fs::read(src.join("nested/keep.txt")).unwrap(), b"original");
        assert!(!backup.exists());
        assert!(link::find_backups(&src).is_empty());
    }
}
