//! Repair: rebuild the link at the source without copying any data.
//!
//! Phases and their fixed progress: validate 10, relink 40, verify 70, clean up 90, done 100.
//!
//! Source cases:
//! - missing: create the link
//! - link to the target already: nothing to do
//! - link elsewhere (or unreadable): replace it
//! - plain directory without user content: delete it, then link
//! - plain directory with user content: move it to a `.bak_` sibling carrying a
//!   `.junction_move.repair.json` provenance note, then link

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{info, warn};

use super::{conclude, remove_tree_best_effort, warn_if_unprivileged};
use super::{Phases, WorkflowOutcome, WorkflowSettings};
use crate::errors::{MoveError, Result};
use crate::fs_ops::link;
use crate::progress::Reporter;
use crate::state::markers::{self, RepairInfo};
use crate::task::MigrationMode;
use crate::validate;

static PERCENTS: [Option<f64>; 4] = [Some(10.0), Some(40.0), Some(70.0), Some(90.0)];

struct Repair<'a> {
    source: PathBuf,
    target: PathBuf,
    settings: &'a WorkflowSettings,
    reporter: &'a dyn Reporter,
    backup: Option<PathBuf>,
    /// Target of a link we replaced, so a failed relink can put it back
    replaced_link: Option<PathBuf>,
}

/// Point `source` at the existing `target`.
pub fn repair(
    source: &Path,
    target: &Path,
    settings: &WorkflowSettings,
    reporter: &dyn Reporter,
) -> WorkflowOutcome {
    let phases = Phases::new(MigrationMode::Repair, &PERCENTS, reporter);
    let mut run = Repair {
        source: source.to_path_buf(),
        target: target.to_path_buf(),
        settings,
        reporter,
        backup: None,
        replaced_link: None,
    };
    let result = run.execute(&phases);
    let final_target = run.target.clone();
    let backup = run.backup.clone();
    conclude(MigrationMode::Repair, result, &final_target, backup, reporter, || run.rollback())
}

impl Repair<'_> {
    fn execute(&mut self, phases: &Phases<'_>) -> Result<()> {
        phases.enter(1, "Validating paths");
        self.validate()?;

        self.relink_and_verify(phases)?;

        phases.enter(4, "Cleaning up backup");
        match self.backup.clone() {
            None => self.reporter.log("No backup to clean up"),
            Some(backup) if self.settings.cleanup_repair_backup => {
                if remove_tree_best_effort(&backup, "backup", self.reporter) {
                    self.backup = None;
                }
            }
            Some(backup) => self.reporter.log(&format!(
                "Backup kept at {} (see {} inside for details)",
                backup.display(),
                markers::REPAIR_INFO
            )),
        }

        info!(source = %self.source.display(), target = %self.target.display(), "Repair complete");
        phases.complete("Repair complete");
        Ok(())
    }

    fn relink_and_verify(&mut self, phases: &Phases<'_>) -> Result<()> {
        phases.enter(2, "Replacing source with link");
        self.relink()?;

        phases.enter(3, "Verifying link");
        link::verify(&self.source, Some(&self.target))?;
        if let Ok(actual) = link::read_link_target(&self.source) {
            self.reporter.log(&format!("Link target: {}", actual.display()));
        }
        self.reporter.log("Link verified");
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        validate::validate_target(&self.target)?;
        if !self.target.is_dir() {
            return Err(MoveError::Validation(format!(
                "target directory does not exist: {}",
                self.target.display()
            )));
        }
        validate::validate_relation(&self.source, &self.target)?;
        warn_if_unprivileged(self.reporter);
        self.reporter.log(&format!("Source: {}", self.source.display()));
        self.reporter.log(&format!("Target: {}", self.target.display()));
        Ok(())
    }

    fn link_now(&self) -> Result<()> {
        self.reporter.log(&format!(
            "Creating link: {} -> {}",
            self.source.display(),
            self.target.display()
        ));
        link::create_link(&self.source, &self.target)?;
        self.reporter.log("Link created");
        Ok(())
    }

    fn relink(&mut self) -> Result<()> {
        let meta = match fs::symlink_metadata(&self.source) {
            Ok(m) => Some(m),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(MoveError::io("inspect source", &self.source)(e)),
        };

        let Some(meta) = meta else {
            self.reporter.log("Source does not exist; creating link directly");
            return self.link_now();
        };

        if link::is_link(&self.source) {
            if link::points_to(&self.source, &self.target) {
                self.reporter.log("Link already exists and points at the target");
                return Ok(());
            }
            match link::read_link_target(&self.source) {
                Ok(old) => {
                    self.reporter.log(&format!("Link points at the wrong target: {}", old.display()));
                    self.replaced_link = Some(old);
                }
                Err(_) => self.reporter.log("Link target is unreadable"),
            }
            self.reporter.log("Removing old link and recreating it");
            link::remove(&self.source)?;
            return self.link_now();
        }

        if !meta.is_dir() {
            return Err(MoveError::Validation(format!(
                "source exists and is not a directory: {}",
                self.source.display()
            )));
        }

        if !validate::has_user_content(&self.source) {
            self.reporter.log("Source is an empty directory; replacing it with the link");
            markers::delete_migrate_markers(&self.source);
            markers::delete_restore_markers(&self.source);
            markers::delete_marker(&self.source, markers::REPAIR_INFO);
            fs::remove_dir(&self.source).map_err(MoveError::io("remove empty source", &self.source))?;
            return self.link_now();
        }

        let backup = link::backup_path_for(&self.source, Local::now());
        if backup.exists() {
            return Err(MoveError::Validation(format!(
                "backup path already exists: {}",
                backup.display()
            )));
        }
        self.reporter.log(&format!(
            "Source is a non-empty directory; backing it up to {}",
            backup.display()
        ));
        fs::rename(&self.source, &backup).map_err(MoveError::io("rename source to backup", &self.source))?;
        self.backup = Some(backup.clone());
        let info = RepairInfo::new(&self.source, &self.target, &backup);
        if let Err(e) = markers::write_repair_info(&backup, &info) {
            warn!(backup = %backup.display(), error = %e, "Could not write repair info");
            self.reporter.log(&format!("Warning: could not write repair info: {e}"));
        }
        self.link_now()
    }

    fn rollback(&mut self) -> Result<bool> {
        if let Some(backup) = self.backup.take().filter(|b| b.is_dir()) {
            self.reporter.log("Rolling back...");
            if link::is_link(&self.source) {
                link::remove(&self.source)?;
            }
            markers::delete_marker(&backup, markers::REPAIR_INFO);
            link::restore_backup(&backup, &self.source)?;
            self.reporter.log("Original directory restored");
            return Ok(true);
        }
        if let Some(old) = self.replaced_link.take() {
            if link::is_link(&self.source) {
                link::remove(&self.source)?;
            }
            if fs::symlink_metadata(&self.source).is_ok() {
                return Ok(false);
            }
            link::create_link(&self.source, &old)?;
            self.reporter.log(&format!("Previous link restored -> {}", old.display()));
            return Ok(true);
        }
        Ok(false)
    }
}
