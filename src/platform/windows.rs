//! Windows implementations of platform helpers (best-effort, minimal ACL awareness).
//!
//! Notes:
//! - Windows lacks POSIX mode semantics; we do not attempt ACL management here.
//! - Directory redirections are reparse points: junctions or directory symlinks.
//!   The native call creates a directory symlink (needs elevation or developer mode);
//!   `mklink /J` works unprivileged on local volumes and is tried next.

use anyhow::{bail, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::os::windows::fs::MetadataExt;
use std::path::Path;
use std::process::{Child, Command};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use super::temp::unique_sibling_name;

const FILE_ATTRIBUTE_REPARSE_POINT: u32 = 0x400;

/// Open log file for appending (no symlink defense available via std on Windows).
pub fn open_log_file_secure_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Write a new config file atomically (create_new) using a temp file + rename.
/// Fails if the target already exists.
pub fn write_config_secure_new_0600(path: &Path, contents: &[u8]) -> Result<()> {
    if path.exists() {
        bail!("Config file already exists: {}", path.display());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = unique_sibling_name(path, ".junction_move.config.tmp");
    let mut f = OpenOptions::new().write(true).create_new(true).open(&tmp)?;
    f.write_all(contents)?;
    f.sync_all()?;
    drop(f);
    if let Err(e) = fs::rename(&tmp, path) {
        let _ = fs::remove_file(&tmp);
        return Err(e.into());
    }
    Ok(())
}

/// No-op on Windows; POSIX-style directory modes are not applicable.
pub fn set_dir_mode_0700(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// No-op on Windows; POSIX-style file modes are not applicable.
pub fn set_file_mode_0600(_path: &Path) -> io::Result<()> {
    Ok(())
}

/// True when the process token is elevated (TokenElevation).
pub fn is_elevated() -> bool {
    use windows_sys::Win32::Foundation::{CloseHandle, HANDLE};
    use windows_sys::Win32::Security::{
        GetTokenInformation, TokenElevation, TOKEN_ELEVATION, TOKEN_QUERY,
    };
    use windows_sys::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

    unsafe {
        let mut token: HANDLE = std::ptr::null_mut();
        if OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut token) == 0 {
            return false;
        }
        let mut elevation = TOKEN_ELEVATION { TokenIsElevated: 0 };
        let mut returned: u32 = 0;
        let ok = GetTokenInformation(
            token,
            TokenElevation,
            &mut elevation as *mut TOKEN_ELEVATION as *mut _,
            std::mem::size_of::<TOKEN_ELEVATION>() as u32,
            &mut returned,
        );
        CloseHandle(token);
        ok != 0 && elevation.TokenIsElevated != 0
    }
}

/// Junctions and directory symlinks both carry the reparse-point attribute.
pub fn is_reparse_point(meta: &fs::Metadata) -> bool {
    meta.file_attributes() & FILE_ATTRIBUTE_REPARSE_POINT != 0
}

/// Create `link` as a directory symlink to `target`.
pub fn create_link_native(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Shell-level fallbacks, tried in order after the native call fails.
pub fn shell_link_commands(target: &Path, link: &Path) -> Vec<(&'static str, Command)> {
    let mut junction = Command::new("cmd");
    junction.args(["/C", "mklink", "/J"]).arg(link).arg(target);
    let mut dir_symlink = Command::new("cmd");
    dir_symlink.args(["/C", "mklink", "/D"]).arg(link).arg(target);
    vec![("mklink /J", junction), ("mklink /D", dir_symlink)]
}

/// Remove the link entry itself; RemoveDirectory on a reparse point never recurses.
pub fn remove_link_entry(path: &Path) -> io::Result<()> {
    fs::remove_dir(path)
}

/// No process-group setup needed; taskkill /T walks the tree by parent pid.
pub fn isolate_process_group(_cmd: &mut Command) {}

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

/// Terminate `child` and its descendants via `taskkill /T /F`, falling back to a plain kill.
pub fn kill_process_tree(child: &mut Child, grace: Duration) -> io::Result<()> {
    let pid = child.id();
    debug!(pid, "Running taskkill on copy process tree");
    let killed = Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/T", "/F"])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false);
    if !killed {
        let _ = child.kill();
    }
    if !wait_for_exit(child, grace)? {
        warn!(pid, "Copy process did not exit within the grace period");
    }
    Ok(())
}
