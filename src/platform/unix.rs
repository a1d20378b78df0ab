//! Unix implementations of platform helpers.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt};
use std::os::unix::process::CommandExt;
use std::path::Path;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::temp::unique_sibling_name;

/// Open log file for appending; set 0600 only when creating a new file.
/// Existing files keep their permissions (e.g. group-readable for log shipping).
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let existed = path.exists();
    let f = OpenOptions::new()
        .create(true)
        .append(true)
        .mode(0o600)
        .open(path)?;
    if !existed {
        let _ = fs::set_permissions(path, fs::Permissions::from_mode(0o600));
    }
    Ok(f)
}

/// Write config atomically: temp file (0600, O_EXCL) + fsync + rename + fsync dir.
/// The temp file is removed best-effort when the rename fails.
pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "config path has no parent"))?;
    fs::create_dir_all(parent).with_context(|| format!("create parent '{}'", parent.display()))?;

    let tmp = unique_sibling_name(path, ".junction_move.config.tmp");
    let mut f = OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(&tmp)
        .with_context(|| format!("create temp '{}'", tmp.display()))?;
    f.write_all(contents).context("write temp")?;
    f.sync_all().context("fsync temp")?;
    drop(f);

    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e)
            .with_context(|| format!("rename '{}' -> '{}'", tmp.display(), path.display()));
    }
    File::open(parent)
        .and_then(|d| d.sync_all())
        .with_context(|| format!("fsync dir '{}'", parent.display()))?;
    Ok(())
}

/// POSIX chmod 0700 for directories.
pub fn set_dir_mode_0700(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o700))
}

/// POSIX chmod 0600 for files.
pub fn set_file_mode_0600(path: &Path) -> io::Result<()> {
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

/// Effective uid 0. Symlinks need no privilege on Unix, so callers only warn.
pub fn is_elevated() -> bool {
    unsafe { libc::geteuid() == 0 }
}

/// A directory redirection on Unix is a symbolic link.
pub fn is_reparse_point(meta: &fs::Metadata) -> bool {
    meta.file_type().is_symlink()
}

/// Create `link` pointing at `target` via symlink(2).
pub fn create_link_native(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

/// Shell-level fallbacks, tried in order after the native call fails.
pub fn shell_link_commands(target: &Path, link: &Path) -> Vec<(&'static str, Command)> {
    let mut ln = Command::new("ln");
    ln.arg("-s").arg("--").arg(target).arg(link);
    vec![("ln -s", ln)]
}

/// Remove the link entry itself; never touches the link's target.
pub fn remove_link_entry(path: &Path) -> io::Result<()> {
    fs::remove_file(path)
}

/// Start the child as leader of a new process group so the whole tree can be signalled.
pub fn isolate_process_group(cmd: &mut Command) {
    cmd.process_group(0);
}

fn wait_for_exit(child: &mut Child, timeout: Duration) -> io::Result<bool> {
    let deadline = Instant::now() + timeout;
    loop {
        if child.try_wait()?.is_some() {
            return Ok(true);
        }
        if Instant::now() >= deadline {
            return Ok(false);
        }
        thread::sleep(Duration::from_millis(50));
    }
}

/// Terminate `child` and every process in its group: SIGTERM, wait, then SIGKILL.
/// Requires the child to have been spawned through `isolate_process_group`.
pub fn kill_process_tree(child: &mut Child, grace: Duration) -> io::Result<()> {
    let pgid = child.id() as libc::pid_t;
    debug!(pgid, "Sending SIGTERM to copy process group");
    if unsafe { libc::killpg(pgid, libc::SIGTERM) } != 0 {
        let _ = child.kill();
    }
    let exited = wait_for_exit(child, grace / 2)?;
    // Helpers may outlive the leader; sweep the group regardless.
    let _ = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if exited {
        return Ok(());
    }
    let _ = child.kill();
    if !wait_for_exit(child, grace / 2)? {
        warn!(pid = pgid, "Copy process did not exit within the grace period");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn preserve_existing_log_file_mode() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.txt");
        fs::write(&path, b"hello").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();
        let _f = open_log_file_secure_append(&path).unwrap();
        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640, "existing permissions should be preserved");
    }

    #[test]
    fn atomic_config_write_sets_mode_and_no_temp_leftover() {
        let dir = tempdir().unwrap();
        let cfg = dir.path().join("config.xml");
        write_config_secure_new_0600(&cfg, b"<x/>").unwrap();
        assert_eq!(fs::read(&cfg).unwrap(), b"<x/>");
        let mode = fs::metadata(&cfg).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o600);
        for entry in fs::read_dir(dir.path()).unwrap() {
            let name = entry.unwrap().file_name().to_string_lossy().into_owned();
            assert!(!name.starts_with(".junction_move.config.tmp"), "leftover temp file: {name}");
        }
    }

    #[test]
    fn native_and_shell_links_resolve() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("target");
        fs::create_dir(&target).unwrap();

        let a = dir.path().join("a");
        create_link_native(&target, &a).unwrap();
        assert!(is_reparse_point(&fs::symlink_metadata(&a).unwrap()));

        let b = dir.path().join("b");
        let (_, mut cmd) = shell_link_commands(&target, &b).remove(0);
        assert!(cmd.status().unwrap().success());
        assert_eq!(fs::read_link(&b).unwrap(), target);

        remove_link_entry(&a).unwrap();
        assert!(!a.exists());
        assert!(target.is_dir());
    }

    #[test]
    fn kills_whole_group() {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg("sleep 30 & sleep 30; wait");
        isolate_process_group(&mut cmd);
        let mut child = cmd.spawn().unwrap();
        thread::sleep(Duration::from_millis(200));
        let started = Instant::now();
        kill_process_tree(&mut child, Duration::from_secs(3)).unwrap();
        assert!(child.try_wait().unwrap().is_some());
        assert!(started.elapsed() < Duration::from_secs(4));
    }
}
