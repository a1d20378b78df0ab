//! Path validation rules.
//!
//! Stateless checks over a source/target pair. Nothing here mutates the filesystem;
//! directory creation for the target happens in the workflows.
//!
//! Notes:
//! - Cloud-sync folders are a warning, not a block: sync clients fight with links.
//! - Emptiness checks ignore our own marker files so a resumed run is not blocked by
//!   bookkeeping left by an earlier attempt.
//! - Relation checks never resolve the source itself, which may already be a link to
//!   the target (restore, repair).

use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use crate::errors::{MoveError, Result};
use crate::fs_ops::{available_space, format_bytes};
use crate::platform::SYSTEM_ROOTS;
use crate::state::markers::is_marker_name;

/// Folder names of sync clients that tend to conflict with relocated data.
pub const CLOUD_SYNC_NAMES: &[&str] = &["OneDrive", "Dropbox", "Google Drive", "iCloudDrive", "iCloud Drive"];

/// Safety margin applied to the bytes that must fit on the target volume.
pub const SPACE_MARGIN: f64 = 1.10;

/// Result of a free-space check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpaceCheck {
    pub sufficient: bool,
    pub available: u64,
    /// Requested bytes including the 10% margin
    pub required: u64,
}

fn is_blank(p: &Path) -> bool {
    p.as_os_str().to_string_lossy().trim().is_empty()
}

fn absolute(p: &Path) -> Result<PathBuf> {
    std::path::absolute(p).map_err(MoveError::io("resolve absolute path", p))
}

/// Absolute path with `.`/`..` folded and the deepest existing ancestor canonicalized,
/// with the missing tail re-appended. The leaf is never resolved, so a link stays a link.
fn normalize(p: &Path) -> Result<PathBuf> {
    let abs = absolute(p)?;
    let mut folded = PathBuf::new();
    for c in abs.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                folded.pop();
            }
            other => folded.push(other.as_os_str()),
        }
    }
    let Some(leaf) = folded.file_name().map(|l| l.to_os_string()) else {
        return Ok(folded);
    };
    let mut tail = vec![leaf];
    let mut cursor = folded.parent();
    while let Some(dir) = cursor {
        if let Ok(real) = dunce::canonicalize(dir) {
            let mut out = real;
            out.extend(tail.iter().rev());
            return Ok(out);
        }
        match dir.file_name() {
            Some(name) => tail.push(name.to_os_string()),
            None => break,
        }
        cursor = dir.parent();
    }
    Ok(folded)
}

fn text_key(p: &Path) -> String {
    let s = p.to_string_lossy();
    let trimmed = s.trim_end_matches(['/', '\\']);
    if cfg!(windows) {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

fn starts_with_root(path: &Path, root: &str) -> bool {
    let p = text_key(path);
    let r = text_key(Path::new(root));
    if p == r {
        return true;
    }
    let sep = std::path::MAIN_SEPARATOR;
    p.starts_with(&format!("{r}{sep}"))
}

/// Validate a migration source. Returns an optional warning on success.
pub fn validate_source(path: &Path) -> Result<Option<String>> {
    if is_blank(path) {
        return Err(MoveError::Validation("source path is empty".into()));
    }
    if !path.is_dir() {
        return Err(MoveError::Validation(format!(
            "source directory does not exist: {}",
            path.display()
        )));
    }
    let full = normalize(path)?;
    if full.parent().is_none() {
        return Err(MoveError::Validation(format!(
            "refusing to relocate a filesystem root: {}",
            full.display()
        )));
    }
    if let Some(root) = SYSTEM_ROOTS.iter().find(|r| starts_with_root(&full, r)) {
        return Err(MoveError::Validation(format!(
            "refusing to relocate a critical system directory under {root}"
        )));
    }
    let lowered = full.to_string_lossy().to_lowercase();
    let warning = CLOUD_SYNC_NAMES
        .iter()
        .find(|n| lowered.contains(&n.to_lowercase()))
        .map(|n| {
            format!("source appears to be inside a cloud sync folder ({n}); relocating it may cause sync conflicts")
        });
    Ok(warning)
}

/// Validate a target path. It need not exist, but its volume must be reachable.
pub fn validate_target(path: &Path) -> Result<()> {
    if is_blank(path) {
        return Err(MoveError::Validation("target path is empty".into()));
    }
    let full = absolute(path)?;
    let Some(parent) = full.parent() else {
        return Err(MoveError::Validation(format!(
            "cannot resolve the parent directory of target {}",
            full.display()
        )));
    };
    if full.exists() && !full.is_dir() {
        return Err(MoveError::Validation(format!(
            "target exists and is not a directory: {}",
            full.display()
        )));
    }
    if !parent.exists() {
        let root: PathBuf = full
            .components()
            .take_while(|c| matches!(c, Component::Prefix(_) | Component::RootDir))
            .collect();
        if root.as_os_str().is_empty() || !root.exists() {
            return Err(MoveError::Validation(format!(
                "target volume is not available: {}",
                full.display()
            )));
        }
    }
    Ok(())
}

/// True when `path` is missing or contains nothing but marker files.
pub fn is_target_empty(path: &Path) -> Result<bool> {
    if !path.exists() {
        return Ok(true);
    }
    let rd = fs::read_dir(path).map_err(MoveError::io("read target directory", path))?;
    for entry in rd {
        let entry = entry.map_err(MoveError::io("read target directory", path))?;
        if !is_marker_name(&entry.file_name()) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// True when `path` holds anything besides markers. Unreadable counts as content.
pub fn has_user_content(path: &Path) -> bool {
    !is_target_empty(path).unwrap_or(false)
}

/// Err(TargetNotEmpty) unless the target is empty.
pub fn ensure_target_empty(path: &Path) -> Result<()> {
    if is_target_empty(path)? {
        Ok(())
    } else {
        Err(MoveError::TargetNotEmpty(path.to_path_buf()))
    }
}

/// Reject identical paths and a target nested inside the source.
pub fn validate_relation(source: &Path, target: &Path) -> Result<()> {
    let src = normalize(source)?;
    let dst = normalize(target)?;
    let (sk, dk) = (text_key(&src), text_key(&dst));
    if sk == dk {
        return Err(MoveError::Validation(
            "source and target must not be the same path".into(),
        ));
    }
    let sep = std::path::MAIN_SEPARATOR;
    if dk.starts_with(&format!("{sk}{sep}")) {
        return Err(MoveError::Validation(format!(
            "target {} must not be inside source {}",
            dst.display(),
            src.display()
        )));
    }
    Ok(())
}

/// Check that `required_bytes` plus a 10% margin fits on the volume of `path`.
/// Zero bytes always fit.
pub fn check_disk_space(path: &Path, required_bytes: u64) -> Result<SpaceCheck> {
    let required = (required_bytes as f64 * SPACE_MARGIN).ceil() as u64;
    if required_bytes == 0 {
        let available = available_space(path).unwrap_or(0);
        return Ok(SpaceCheck {
            sufficient: true,
            available,
            required: 0,
        });
    }
    let available = available_space(path).map_err(MoveError::io("query free space", path))?;
    debug!(
        path = %path.display(),
        available = %format_bytes(available),
        required = %format_bytes(required),
        "Disk space checked"
    );
    Ok(SpaceCheck {
        sufficient: available >= required,
        available,
        required,
    })
}

/// Best-effort privilege check. Missing elevation is only a warning.
pub fn is_elevated() -> bool {
    crate::platform::is_elevated()
}

/// When `target` is an existing directory with user content whose leaf differs from the
/// source leaf, the operator most likely picked a parent "drop zone": use target/<source leaf>.
pub fn adjusted_target(source: &Path, target: &Path) -> Option<PathBuf> {
    let src_leaf = source.file_name()?;
    if !target.is_dir() || !has_user_content(target) {
        return None;
    }
    let same_leaf = match target.file_name() {
        Some(t) if cfg!(windows) => t.to_string_lossy().eq_ignore_ascii_case(&src_leaf.to_string_lossy()),
        Some(t) => t == src_leaf,
        None => false,
    };
    (!same_leaf).then(|| target.join(src_leaf))
}
