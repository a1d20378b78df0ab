//! Directory redirection links.
//!
//! Creates, inspects, verifies and removes the link left at the original source path.
//!
//! Design:
//! - Creation is an ordered strategy list: the native platform call first, then the
//!   shell commands from `platform::shell_link_commands`. First success wins; when every
//!   strategy fails, all their errors are joined into one message.
//! - Removal only ever deletes the link entry, never the data behind it.
//! - The backup of the original source is a timestamped sibling rename, recorded in the
//!   caller's slot before linking so a failed link can be rolled back.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use tracing::{debug, info, warn};

use crate::errors::{MoveError, Result};
use crate::platform;

/// Timestamp layout of backup suffixes.
const BACKUP_STAMP: &str = "%Y%m%d_%H%M%S";

/// `<leaf>.bak_` prefix used for backups of `source`.
pub fn backup_prefix(source: &Path) -> String {
    let leaf = source
        .file_name()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("{leaf}.bak_")
}

/// Backup path for `source` at time `now`: `<parent>/<leaf>.bak_<YYYYMMDD_HHMMSS>`.
pub fn backup_path_for(source: &Path, now: DateTime<Local>) -> PathBuf {
    let name = format!("{}{}", backup_prefix(source), now.format(BACKUP_STAMP));
    source.with_file_name(name)
}

/// True when `path` itself (not its target) is a link / reparse point.
pub fn is_link(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| platform::is_reparse_point(&m))
        .unwrap_or(false)
}

/// Strip Win32 namespace prefixes (`\\?\`, `\??\`) that junction targets carry.
fn strip_namespace_prefix(p: PathBuf) -> PathBuf {
    let s = p.to_string_lossy();
    if let Some(rest) = s.strip_prefix(r"\??\") {
        return PathBuf::from(rest);
    }
    dunce::simplified(&p).to_path_buf()
}

/// Where `link` points, made absolute relative to the link's parent.
pub fn read_link_target(link: &Path) -> Result<PathBuf> {
    let raw = fs::read_link(link).map_err(MoveError::io("read link", link))?;
    let raw = strip_namespace_prefix(raw);
    if raw.is_absolute() {
        Ok(raw)
    } else {
        let parent = link.parent().unwrap_or_else(|| Path::new("."));
        Ok(parent.join(raw))
    }
}

/// Normalized comparison key: canonical path when resolvable, else trimmed text.
fn comparable(p: &Path) -> String {
    let resolved = dunce::canonicalize(p).unwrap_or_else(|_| p.to_path_buf());
    let s = resolved.to_string_lossy();
    let trimmed = s.trim_end_matches(['/', '\\']);
    if cfg!(windows) {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

/// Whether `a` and `b` name the same location.
pub fn same_location(a: &Path, b: &Path) -> bool {
    comparable(a) == comparable(b)
}

/// True when `link` is a link whose target is `expected`.
pub fn points_to(link: &Path, expected: &Path) -> bool {
    match read_link_target(link) {
        Ok(actual) => same_location(&actual, expected),
        Err(_) => false,
    }
}

/// Create a directory link at `link` pointing at `target`.
pub fn create_link(link: &Path, target: &Path) -> Result<()> {
    let mut failures: Vec<String> = Vec::new();

    match platform::create_link_native(target, link) {
        Ok(()) => {
            debug!(link = %link.display(), target = %target.display(), "Link created natively");
            return Ok(());
        }
        Err(e) => {
            debug!(error = %e, "Native link creation failed; trying shell fallbacks");
            failures.push(format!("native: {}", crate::fs_ops::helpers::describe(&e)));
        }
    }

    for (label, mut cmd) in platform::shell_link_commands(target, link) {
        match cmd.output() {
            Ok(out) if out.status.success() && is_link(link) => {
                info!(link = %link.display(), target = %target.display(), via = label, "Link created");
                return Ok(());
            }
            Ok(out) => {
                let stderr = String::from_utf8_lossy(&out.stderr);
                let stdout = String::from_utf8_lossy(&out.stdout);
                let text = if stderr.trim().is_empty() { stdout } else { stderr };
                failures.push(format!("{label}: {} ({})", text.trim(), out.status));
            }
            Err(e) => failures.push(format!("{label}: {e}")),
        }
    }

    Err(MoveError::Link(format!(
        "could not create link '{}' -> '{}': {}",
        link.display(),
        target.display(),
        failures.join("; ")
    )))
}

/// Rename `source` to a timestamped backup (recorded in `backup_slot` immediately),
/// then create the link at `source` pointing at `target`. Returns the backup path.
///
/// A link failure leaves the backup in place; the caller's rollback restores it.
pub fn create_backup_and_link(
    source: &Path,
    target: &Path,
    backup_slot: &mut Option<PathBuf>,
) -> Result<PathBuf> {
    let backup = backup_path_for(source, Local::now());
    if backup.exists() {
        return Err(MoveError::Validation(format!(
            "backup path already exists: {}",
            backup.display()
        )));
    }
    fs::rename(source, &backup).map_err(MoveError::io("rename source to backup", source))?;
    info!(source = %source.display(), backup = %backup.display(), "Source backed up");
    *backup_slot = Some(backup.clone());

    create_link(source, target)?;
    Ok(backup)
}

/// Confirm `link` is a genuine link that resolves to an accessible directory,
/// and (when given) that it points at `expected`.
pub fn verify(link: &Path, expected: Option<&Path>) -> Result<()> {
    if !is_link(link) {
        return Err(MoveError::Verification(format!(
            "'{}' is not a link",
            link.display()
        )));
    }
    let meta = fs::metadata(link).map_err(|e| {
        MoveError::Verification(format!("link '{}' does not resolve: {e}", link.display()))
    })?;
    if !meta.is_dir() {
        return Err(MoveError::Verification(format!(
            "link '{}' does not resolve to a directory",
            link.display()
        )));
    }
    fs::read_dir(link).map_err(|e| {
        MoveError::Verification(format!("link target of '{}' is not accessible: {e}", link.display()))
    })?;
    if let Some(expected) = expected
        && !points_to(link, expected)
    {
        return Err(MoveError::Verification(format!(
            "link '{}' does not point at '{}'",
            link.display(),
            expected.display()
        )));
    }
    Ok(())
}

/// Delete the link entry at `path`. Refuses to touch anything that is not a link.
pub fn remove(path: &Path) -> Result<()> {
    if !is_link(path) {
        return Err(MoveError::Link(format!(
            "refusing to remove '{}': not a link",
            path.display()
        )));
    }
    platform::remove_link_entry(path).map_err(MoveError::io("remove link", path))?;
    debug!(path = %path.display(), "Link removed");
    Ok(())
}

/// Move a backup back to the original path. The original path must be free.
pub fn restore_backup(backup: &Path, source: &Path) -> Result<()> {
    if fs::symlink_metadata(source).is_ok() {
        warn!(source = %source.display(), "Cannot restore backup: source path is occupied");
        return Err(MoveError::Validation(format!(
            "cannot restore backup, '{}' still exists",
            source.display()
        )));
    }
    fs::rename(backup, source).map_err(MoveError::io("restore backup", backup))?;
    info!(backup = %backup.display(), source = %source.display(), "Backup restored");
    Ok(())
}

/// Backup directories of `source`, newest first (by name, which embeds the timestamp).
pub fn find_backups(source: &Path) -> Vec<PathBuf> {
    let Some(parent) = source.parent() else {
        return Vec::new();
    };
    let prefix = backup_prefix(source);
    let mut found: Vec<PathBuf> = match fs::read_dir(parent) {
        Ok(rd) => rd
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().starts_with(&prefix))
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.path())
            .collect(),
        Err(_) => Vec::new(),
    };
    found.sort();
    found.reverse();
    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    #[test]
    fn backup_name_format() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let p = backup_path_for(Path::new("/data/app"), now);
        assert_eq!(p, PathBuf::from("/data/app.bak_20240309_070501"));
    }

    #[test]
    fn verify_rejects_plain_directory() {
        let dir = tempdir().unwrap();
        let err = verify(dir.path(), None).unwrap_err();
        assert_eq!(err.kind_str(), "verification");
    }

    #[test]
    fn remove_refuses_plain_directory() {
        let dir = tempdir().unwrap();
        assert!(remove(dir.path()).is_err());
        assert!(dir.path().is_dir());
    }

    #[cfg(unix)]
    #[test]
    fn backup_link_verify_remove_cycle() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("app");
        let target = dir.path().join("store");
        fs::create_dir(&source).unwrap();
        fs::write(source.join("f"), b"data").unwrap();
        fs::create_dir(&target).unwrap();

        let mut slot = None;
        let backup = create_backup_and_link(&source, &target, &mut slot).unwrap();
        assert_eq!(slot.as_deref(), Some(backup.as_path()));
        assert!(is_link(&source));
        assert!(points_to(&source, &target));
        verify(&source, Some(&target)).unwrap();
        assert_eq!(find_backups(&source), vec![backup.clone()]);

        remove(&source).unwrap();
        assert!(target.is_dir(), "removing the link must not touch the target");
        restore_backup(&backup, &source).unwrap();
        assert_eq!(fs::read(source.join("f")).unwrap(), b"data");
    }

    #[cfg(unix)]
    #[test]
    fn verify_fails_for_dangling_link() {
        let dir = tempdir().unwrap();
        let link = dir.path().join("l");
        std::os::unix::fs::symlink(dir.path().join("gone"), &link).unwrap();
        assert!(verify(&link, None).is_err());
        assert!(is_link(&link));
    }

    #[cfg(unix)]
    #[test]
    fn relative_link_target_is_resolved() {
        let dir = tempdir().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        let link = dir.path().join("l");
        std::os::unix::fs::symlink("real", &link).unwrap();
        assert!(points_to(&link, &dir.path().join("real")));
    }
}
