//! Restore: bring the data back behind a link and remove the link.
//!
//! The data is copied into `<source>.restore_temp_<stamp>` first, so swapping the link
//! for the data is one removal plus one rename and the source path is never missing
//! for longer than that.
//!
//! Phases and their fixed progress match migrate: 0, 5, copy 10..90, 90, 93, 96, done 100.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use super::{conclude, remove_tree_best_effort, require_space, scan_and_report};
use super::{Phases, WorkflowOutcome, WorkflowSettings};
use crate::cancel::CancelToken;
use crate::copy::{run_copy, CopyRequest, PhaseLabel};
use crate::errors::{MoveError, Result};
use crate::fs_ops::{dir_size, link};
use crate::probe::LockProbe;
use crate::progress::Reporter;
use crate::state::markers;
use crate::task::MigrationMode;

static PERCENTS: [Option<f64>; 6] = [Some(0.0), Some(5.0), None, Some(90.0), Some(93.0), Some(96.0)];

/// Infix of temporary restore directories.
pub const RESTORE_TEMP_INFIX: &str = ".restore_temp_";

struct Restoration<'a> {
    source: PathBuf,
    target: PathBuf,
    settings: &'a WorkflowSettings,
    cancel: &'a CancelToken,
    reporter: &'a dyn Reporter,
    lock_placed: bool,
    /// Set once the link at the source has been deleted
    link_removed: bool,
}

/// Restore the data at `target` into `source`, which must currently be a link to it.
pub fn restore(
    source: &Path,
    target: &Path,
    settings: &WorkflowSettings,
    cancel: &CancelToken,
    reporter: &dyn Reporter,
) -> WorkflowOutcome {
    let phases = Phases::new(MigrationMode::Restore, &PERCENTS, reporter);
    let mut run = Restoration {
        source: source.to_path_buf(),
        target: target.to_path_buf(),
        settings,
        cancel,
        reporter,
        lock_placed: false,
        link_removed: false,
    };
    let result = run.execute(&phases);
    let final_target = run.target.clone();
    conclude(MigrationMode::Restore, result, &final_target, None, reporter, || run.rollback())
}

/// `<source>.restore_temp_<YYYYMMDDHHMMSS>`
fn temp_restore_path(source: &Path) -> PathBuf {
    let leaf = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    source.with_file_name(format!(
        "{leaf}{RESTORE_TEMP_INFIX}{}",
        Local::now().format("%Y%m%d%H%M%S")
    ))
}

/// Existing temporary restore directories next to `source`.
pub fn find_restore_temps(source: &Path) -> Vec<PathBuf> {
    let (Some(parent), Some(leaf)) = (source.parent(), source.file_name()) else {
        return Vec::new();
    };
    let prefix = format!("{}{RESTORE_TEMP_INFIX}", leaf.to_string_lossy());
    let parent = if parent.as_os_str().is_empty() { Path::new(".") } else { parent };
    match fs::read_dir(parent) {
        Ok(rd) => rd
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect(),
        Err(_) => Vec::new(),
    }
}

impl Restoration<'_> {
    fn execute(&mut self, phases: &Phases<'_>) -> Result<()> {
        phases.enter(1, "Validating paths");
        self.validate()?;
        self.cancel.check()?;

        phases.enter(2, "Scanning data directory");
        let stats = scan_and_report(&self.target, self.settings, self.reporter);
        self.cancel.check()?;

        phases.enter(3, "Restoring files");
        let temp = temp_restore_path(&self.source);
        fs::create_dir_all(&temp).map_err(MoveError::io("create restore directory", &temp))?;
        let req = CopyRequest {
            source: &self.target,
            target: &temp,
            total_bytes: stats.total_bytes,
            threads: self.settings.threads,
            sample_interval: self.settings.sample_interval,
            tool: &self.settings.copy_tool,
            phase: PhaseLabel {
                index: 3,
                total: phases.total(),
                description: "Restoring files".into(),
            },
        };
        run_copy(&req, self.cancel, self.reporter)?;
        markers::create_restore_done(&temp, &self.source, &self.target)?;
        self.cancel.check()?;

        phases.enter(4, "Removing link");
        self.reporter.log(&format!("Removing link: {}", self.source.display()));
        if link::is_link(&self.source) {
            link::remove(&self.source)?;
            self.link_removed = true;
        }
        self.reporter.log(&format!(
            "Promoting restored data: {} -> {}",
            temp.display(),
            self.source.display()
        ));
        fs::rename(&temp, &self.source).map_err(MoveError::io("promote restored directory", &temp))?;

        phases.enter(5, "Verifying restored directory");
        if !self.source.is_dir() {
            return Err(MoveError::Verification(format!(
                "restored directory is not accessible: {}",
                self.source.display()
            )));
        }
        if link::is_link(&self.source) {
            return Err(MoveError::Verification(format!(
                "restored path is still a link: {}",
                self.source.display()
            )));
        }
        self.reporter.log("Restored directory verified");

        phases.enter(6, "Cleaning up");
        self.cleanup();

        info!(source = %self.source.display(), target = %self.target.display(), "Restore complete");
        phases.complete("Restore complete");
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        if !link::is_link(&self.source) {
            let why = if self.source.exists() {
                "is not a link"
            } else {
                "does not exist"
            };
            return Err(MoveError::Validation(format!(
                "source {} {why}; nothing to restore",
                self.source.display()
            )));
        }
        if !self.target.is_dir() {
            return Err(MoveError::Validation(format!(
                "target directory does not exist, cannot restore: {}",
                self.target.display()
            )));
        }
        if !link::points_to(&self.source, &self.target) {
            let actual = link::read_link_target(&self.source)
                .map(|p| p.display().to_string())
                .unwrap_or_else(|_| "<unreadable>".into());
            return Err(MoveError::Validation(format!(
                "link {} points at {actual}, not at {}",
                self.source.display(),
                self.target.display()
            )));
        }

        let space_root = self
            .source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        require_space(&space_root, dir_size(&self.target), self.reporter)?;

        LockProbe::new(self.settings.handle_tool.clone()).check_restore(&self.source, &self.target)?;
        // written through the link, so it lands in the target directory
        markers::create_restore_lock(&self.source, &self.source, &self.target)?;
        self.lock_placed = true;

        self.reporter.log(&format!("Link: {}", self.source.display()));
        self.reporter.log(&format!("Data: {}", self.target.display()));
        self.reporter.log(&format!(
            "Restore mode: {}",
            if self.settings.keep_target_on_restore {
                "keep target data"
            } else {
                "delete target data"
            }
        ));
        Ok(())
    }

    fn cleanup(&self) {
        if !self.settings.keep_target_on_restore && self.target.is_dir() {
            remove_tree_best_effort(&self.target, "target data", self.reporter);
        } else {
            self.reporter.log("Keeping target data");
            if self.target.is_dir() {
                markers::delete_migrate_markers(&self.target);
                markers::delete_restore_markers(&self.target);
            }
        }
        // the copy brought the target's markers along
        markers::delete_restore_markers(&self.source);
        markers::delete_migrate_markers(&self.source);
    }

    fn rollback(&mut self) -> Result<bool> {
        let mut undone = false;
        if self.link_removed && fs::symlink_metadata(&self.source).is_err() {
            warn!(source = %self.source.display(), "Link removed but data not promoted; recreating link");
            link::create_link(&self.source, &self.target)?;
            self.reporter.log("Link recreated");
            undone = true;
        }
        for temp in find_restore_temps(&self.source) {
            if link::is_link(&temp) {
                continue;
            }
            match fs::remove_dir_all(&temp) {
                Ok(()) => self.reporter.log(&format!("Removed temporary directory: {}", temp.display())),
                Err(e) => warn!(path = %temp.display(), error = %e, "Failed to remove temporary restore directory"),
            }
            undone = true;
        }
        if self.lock_placed {
            markers::delete_restore_markers(&self.target);
            undone = true;
        }
        Ok(undone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NullReporter;
    use tempfile::tempdir;

    #[test]
    fn temp_name_shape() {
        let p = temp_restore_path(Path::new("/a/b/data"));
        let name = p.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("data.restore_temp_"));
        assert_eq!(name.len(), "data.restore_temp_".len() + 14);
        assert_eq!(p.parent(), Some(Path::new("/a/b")));
    }

    #[test]
    fn plain_directory_source_is_rejected() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        let tgt = dir.path().join("tgt");
        fs::create_dir(&src).unwrap();
        fs::create_dir(&tgt).unwrap();
        let out = restore(&src, &tgt, &WorkflowSettings::default(), &CancelToken::new(), &NullReporter);
        assert!(!out.success);
        assert_eq!(out.code, 2);
        assert!(out.error.unwrap().contains("is not a link"));
        assert_eq!(out.rollback, super::super::RollbackStatus::NotNeeded);
    }

    #[test]
    fn rollback_removes_temp_dirs_only_for_this_source() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("data");
        fs::create_dir(dir.path().join("data.restore_temp_20240101000000")).unwrap();
        fs::create_dir(dir.path().join("other.restore_temp_20240101000000")).unwrap();
        let found = find_restore_temps(&src);
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("data.restore_temp_20240101000000"));
    }
}
