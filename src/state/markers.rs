//! Marker files.
//!
//! Hidden JSON files recording in-flight operations:
//! - `.junction_move.migrate.lock` on the target while a migration runs
//! - `.junction_move.migrate.done` on the target once its copy finished
//! - `.junction_move.restore.lock` on the link side while a restore runs
//! - `.junction_move.restore.done` on the temporary restore directory once its copy finished
//! - `.junction_move.repair.json` inside a backup created by repair
//!
//! Notes:
//! - Markers are never user content: emptiness checks skip them.
//! - Whichever side receives a full copy of the other side's tree gets its markers purged.
//! - Deletion is best-effort; a missing marker is not an error.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::{MoveError, Result};

pub const MIGRATE_LOCK: &str = ".junction_move.migrate.lock";
pub const MIGRATE_DONE: &str = ".junction_move.migrate.done";
pub const RESTORE_LOCK: &str = ".junction_move.restore.lock";
pub const RESTORE_DONE: &str = ".junction_move.restore.done";
pub const REPAIR_INFO: &str = ".junction_move.repair.json";

const ALL_MARKERS: [&str; 5] = [MIGRATE_LOCK, MIGRATE_DONE, RESTORE_LOCK, RESTORE_DONE, REPAIR_INFO];

/// Contents of a lock/done marker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRecord {
    /// "migrate" or "restore"
    pub mode: String,
    /// "in_progress" or "done"
    pub stage: String,
    pub source: PathBuf,
    pub target: PathBuf,
    /// RFC 3339 local timestamp
    pub created_at: String,
    pub pid: u32,
}

impl MarkerRecord {
    fn new(mode: &str, stage: &str, source: &Path, target: &Path) -> Self {
        Self {
            mode: mode.to_string(),
            stage: stage.to_string(),
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            created_at: Local::now().to_rfc3339(),
            pid: std::process::id(),
        }
    }
}

/// Provenance note written inside a backup made by repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairInfo {
    pub repaired_at: String,
    pub original_name: String,
    pub original_path: PathBuf,
    pub target_path: PathBuf,
    pub backup_path: PathBuf,
    pub repair_mode: String,
    pub note: String,
}

impl RepairInfo {
    pub fn new(source: &Path, target: &Path, backup: &Path) -> Self {
        Self {
            repaired_at: Local::now().to_rfc3339(),
            original_name: source
                .file_name()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default(),
            original_path: source.to_path_buf(),
            target_path: target.to_path_buf(),
            backup_path: backup.to_path_buf(),
            repair_mode: "link_recreation".to_string(),
            note: "Created by repair, which only rebuilds the link and never copies data. \
                   This is the directory that occupied the source path before repair, \
                   not a migration backup."
                .to_string(),
        }
    }
}

/// True if `name` is one of our bookkeeping files.
pub fn is_marker_name(name: &OsStr) -> bool {
    ALL_MARKERS.iter().any(|m| name == OsStr::new(m))
}

fn write_json<T: Serialize>(dir: &Path, name: &str, value: &T) -> Result<()> {
    let path = dir.join(name);
    let body = serde_json::to_vec_pretty(value)
        .map_err(|e| MoveError::Other(format!("serialize marker {name}: {e}")))?;
    fs::write(&path, body).map_err(MoveError::io("write marker", &path))?;
    debug!(marker = %path.display(), "Marker written");
    Ok(())
}

fn write_marker(dir: &Path, name: &str, mode: &str, stage: &str, source: &Path, target: &Path) -> Result<()> {
    write_json(dir, name, &MarkerRecord::new(mode, stage, source, target))
}

pub fn create_migrate_lock(target: &Path, source: &Path) -> Result<()> {
    write_marker(target, MIGRATE_LOCK, "migrate", "in_progress", source, target)
}

pub fn create_migrate_done(target: &Path, source: &Path) -> Result<()> {
    write_marker(target, MIGRATE_DONE, "migrate", "done", source, target)
}

/// `dir` is the restore side being locked (the link path during restore).
pub fn create_restore_lock(dir: &Path, source: &Path, target: &Path) -> Result<()> {
    write_marker(dir, RESTORE_LOCK, "restore", "in_progress", source, target)
}

/// `dir` is the temporary restore directory holding the copied data.
pub fn create_restore_done(dir: &Path, source: &Path, target: &Path) -> Result<()> {
    write_marker(dir, RESTORE_DONE, "restore", "done", source, target)
}

pub fn write_repair_info(backup: &Path, info: &RepairInfo) -> Result<()> {
    write_json(backup, REPAIR_INFO, info)
}

pub fn has_marker(dir: &Path, name: &str) -> bool {
    dir.join(name).is_file()
}

/// Parse a marker if present and well-formed.
pub fn read_marker(dir: &Path, name: &str) -> Option<MarkerRecord> {
    let text = fs::read_to_string(dir.join(name)).ok()?;
    serde_json::from_str(&text).ok()
}

fn delete_named(dir: &Path, names: &[&str]) {
    for name in names {
        let path = dir.join(name);
        match fs::remove_file(&path) {
            Ok(()) => debug!(marker = %path.display(), "Marker removed"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(marker = %path.display(), error = %e, "Failed to remove marker"),
        }
    }
}

/// Remove a single marker by name.
pub fn delete_marker(dir: &Path, name: &str) {
    delete_named(dir, &[name]);
}

pub fn delete_migrate_markers(dir: &Path) {
    delete_named(dir, &[MIGRATE_LOCK, MIGRATE_DONE]);
}

pub fn delete_restore_markers(dir: &Path) {
    delete_named(dir, &[RESTORE_LOCK, RESTORE_DONE]);
}
