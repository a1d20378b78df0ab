//! Migration state detection.
//!
//! Classifies a (source, target) pair from filesystem evidence alone: whether the
//! source exists, whether it is a link, whether the link resolves, whether backups
//! linger next to it, and which markers sit on the target. `detect` never mutates;
//! the marker helpers in `markers` are the explicit mutating side.

pub mod markers;

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::fs_ops::link;

/// Where a source/target pair stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    /// Untouched: the source is a plain directory (or missing) with no finished copy.
    #[default]
    Pending,
    /// The source is a link resolving to an existing directory.
    Migrated,
    /// The source is a link whose target is missing or unreadable.
    Inconsistent,
    /// Migrated, but a stale backup of the original source remains.
    NeedsCleanup,
    /// The copy finished (done marker on target) but the source was never replaced by a link.
    NeedsCompletion,
}

impl fmt::Display for MigrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            MigrationState::Pending => "pending",
            MigrationState::Migrated => "migrated",
            MigrationState::Inconsistent => "inconsistent",
            MigrationState::NeedsCleanup => "needs_cleanup",
            MigrationState::NeedsCompletion => "needs_completion",
        };
        f.write_str(s)
    }
}

/// Evidence gathered for one pair; exposed so callers can show why a state was chosen.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateEvidence {
    pub source_exists: bool,
    pub source_is_link: bool,
    pub link_target: Option<PathBuf>,
    pub link_target_is_dir: bool,
    pub backups: Vec<PathBuf>,
    pub target_has_done_marker: bool,
}

/// Collect evidence without touching anything.
pub fn inspect(source: &Path, target: &Path) -> StateEvidence {
    let source_is_link = link::is_link(source);
    let source_exists = source_is_link || source.exists();
    let link_target = if source_is_link {
        link::read_link_target(source).ok()
    } else {
        None
    };
    let link_target_is_dir = link_target.as_deref().map(Path::is_dir).unwrap_or(false);
    StateEvidence {
        source_exists,
        source_is_link,
        link_target,
        link_target_is_dir,
        backups: link::find_backups(source),
        target_has_done_marker: markers::has_marker(target, markers::MIGRATE_DONE),
    }
}

/// Classify evidence into a state.
pub fn classify(ev: &StateEvidence) -> MigrationState {
    if ev.source_is_link {
        if !ev.link_target_is_dir {
            return MigrationState::Inconsistent;
        }
        if !ev.backups.is_empty() {
            return MigrationState::NeedsCleanup;
        }
        return MigrationState::Migrated;
    }
    if ev.source_exists && ev.target_has_done_marker {
        return MigrationState::NeedsCompletion;
    }
    MigrationState::Pending
}

/// Pure state detection for a pair.
pub fn detect(source: &Path, target: &Path) -> MigrationState {
    let ev = inspect(source, target);
    let state = classify(&ev);
    trace!(source = %source.display(), target = %target.display(), ?ev, %state, "State detected");
    state
}
