//! Occupancy probing.
//!
//! Instead of asking the OS who holds a handle, the probe tries the operations the workflow
//! is about to perform on a small scale and reports the first refusal. When a lock-diagnostic
//! tool is configured its output is attached to the error so the operator knows which
//! process to close.
//!
//! Notes:
//! - The probe and the real operation are not atomic; a handle opened in between is only
//!   caught when the real operation fails.
//! - The rename-back after the migrate probe is always attempted, even when the caller
//!   cannot use the result.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::errors::{MoveError, Result};
use crate::fs_ops::helpers::describe;

/// Upper bound for one run of the diagnostic tool.
const HANDLE_TIMEOUT: Duration = Duration::from_secs(5);

/// One open handle reported by the diagnostic tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleEntry {
    pub process: String,
    pub pid: u32,
    pub handle_type: String,
    pub path: String,
}

fn handle_line_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^(\S+)\s+pid:\s*(\d+)\s+type:\s*(\w+)\s+(.+)$").ok())
        .as_ref()
}

/// Parse diagnostic tool output; banner and "nothing found" lines are skipped.
pub fn parse_handle_output(output: &str) -> Vec<HandleEntry> {
    output
        .split(['\r', '\n'])
        .map(str::trim)
        .filter(|l| {
            !l.is_empty()
                && !l.contains("Handle v")
                && !l.contains("Copyright")
                && !l.contains("Sysinternals")
                && !l.contains("No matching handles found")
        })
        .filter_map(|l| {
            let c = handle_line_re()?.captures(l)?;
            Some(HandleEntry {
                process: c[1].to_string(),
                pid: c[2].parse().ok()?,
                handle_type: c[3].to_string(),
                path: c[4].trim().to_string(),
            })
        })
        .collect()
}

/// Human-readable holder summary, one line per process name.
pub fn format_holders(entries: &[HandleEntry]) -> String {
    if entries.is_empty() {
        return "no holders reported".to_string();
    }
    let mut grouped: BTreeMap<&str, (Vec<u32>, usize)> = BTreeMap::new();
    for e in entries {
        let slot = grouped.entry(e.process.as_str()).or_default();
        if !slot.0.contains(&e.pid) {
            slot.0.push(e.pid);
        }
        slot.1 += 1;
    }
    let mut out = String::from("held by:");
    for (process, (pids, handles)) in grouped {
        let pids: Vec<String> = pids.iter().map(u32::to_string).collect();
        out.push_str(&format!("\n  {process} (PID {}) - {handles} handle(s)", pids.join(", ")));
    }
    out
}

/// Run the diagnostic tool against `path`. `None` when it is missing, fails, or times out.
pub fn query_holders(tool: &Path, path: &Path) -> Option<Vec<HandleEntry>> {
    let mut child = Command::new(tool)
        .arg("-accepteula")
        .arg("-nobanner")
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| debug!(tool = %tool.display(), error = %e, "Lock-diagnostic tool unavailable"))
        .ok()?;

    let mut stdout = child.stdout.take()?;
    let reader = thread::spawn(move || {
        let mut buf = String::new();
        let _ = stdout.read_to_string(&mut buf);
        buf
    });

    let deadline = Instant::now() + HANDLE_TIMEOUT;
    loop {
        match child.try_wait() {
            Ok(Some(_)) => break,
            Ok(None) if Instant::now() < deadline => thread::sleep(Duration::from_millis(50)),
            _ => {
                warn!(tool = %tool.display(), "Lock-diagnostic tool timed out");
                let _ = child.kill();
                let _ = child.wait();
                return None;
            }
        }
    }
    let output = reader.join().ok()?;
    Some(parse_handle_output(&output))
}

/// Pre-flight occupancy checks for the migrate and restore workflows.
#[derive(Debug, Clone, Default)]
pub struct LockProbe {
    handle_tool: Option<PathBuf>,
}

impl LockProbe {
    pub fn new(handle_tool: Option<PathBuf>) -> Self {
        Self { handle_tool }
    }

    fn holders(&self, path: &Path) -> String {
        match self.handle_tool.as_deref().and_then(|t| query_holders(t, path)) {
            Some(entries) => format_holders(&entries),
            None => "holders unknown".to_string(),
        }
    }

    fn occupied(&self, path: &Path, reason: String) -> MoveError {
        let detail = format!("{reason}; {}", self.holders(path));
        warn!(path = %path.display(), %detail, "Directory is occupied");
        MoveError::Occupied {
            path: path.to_path_buf(),
            detail,
        }
    }

    /// Migrate: the source must be renamable and the target writable.
    pub fn check_migrate(&self, source: &Path, target: &Path) -> Result<()> {
        if let Err(reason) = rename_round_trip(source) {
            return Err(self.occupied(source, reason));
        }
        write_test(target).map_err(|reason| MoveError::Validation(format!(
            "target directory is not writable: {}: {reason}",
            target.display()
        )))
    }

    /// Restore: the source's parent must allow create/rename/delete and the target must be readable.
    pub fn check_restore(&self, source: &Path, target: &Path) -> Result<()> {
        let parent = source
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        if let Err(reason) = operation_test(parent) {
            return Err(self.occupied(source, format!(
                "cannot modify {}: {reason}; close programs using it and retry",
                parent.display()
            )));
        }
        read_test(target).map_err(|reason| MoveError::Validation(format!(
            "target directory is not readable: {}: {reason}",
            target.display()
        )))
    }
}

fn probe_file_name() -> String {
    format!("~migration_test_{}.tmp", Uuid::new_v4().simple())
}

fn rename_round_trip(dir: &Path) -> std::result::Result<(), String> {
    if !dir.is_dir() {
        return Err("directory does not exist".into());
    }
    let leaf = dir
        .file_name()
        .ok_or_else(|| "cannot resolve directory name".to_string())?
        .to_string_lossy()
        .into_owned();
    let parent = dir.parent().ok_or_else(|| "cannot resolve parent directory".to_string())?;
    let probe = parent.join(format!("{leaf}_lock_test_{}", Uuid::new_v4().simple()));

    fs::rename(dir, &probe).map_err(|e| format!("rename test failed: {}", describe(&e)))?;
    if let Err(e) = fs::rename(&probe, dir) {
        // leave a loud trace; the data now lives under the probe name
        warn!(probe = %probe.display(), source = %dir.display(), error = %e, "Rename-back after lock probe failed");
        return Err(format!(
            "directory was renamed to {} and could not be renamed back: {}",
            probe.display(),
            describe(&e)
        ));
    }
    debug!(path = %dir.display(), "Rename probe passed");
    Ok(())
}

fn write_test(dir: &Path) -> std::result::Result<(), String> {
    fs::create_dir_all(dir).map_err(|e| describe(&e))?;
    let file = dir.join(probe_file_name());
    fs::write(&file, b"test").map_err(|e| describe(&e))?;
    fs::remove_file(&file).map_err(|e| describe(&e))
}

fn operation_test(dir: &Path) -> std::result::Result<(), String> {
    if !dir.is_dir() {
        return Err("directory does not exist".into());
    }
    let file = dir.join(probe_file_name());
    let renamed = file.with_extension("tmp_renamed");
    fs::write(&file, b"test").map_err(|e| describe(&e))?;
    if let Err(e) = fs::rename(&file, &renamed) {
        let _ = fs::remove_file(&file);
        return Err(describe(&e));
    }
    fs::remove_file(&renamed).map_err(|e| describe(&e))
}

fn read_test(dir: &Path) -> std::result::Result<(), String> {
    if !dir.is_dir() {
        return Err("directory does not exist".into());
    }
    let mut first_file = None;
    for entry in fs::read_dir(dir).map_err(|e| describe(&e))? {
        let entry = entry.map_err(|e| describe(&e))?;
        if first_file.is_none() && entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
            first_file = Some(entry.path());
        }
    }
    if let Some(f) = first_file {
        File::open(&f).map_err(|e| format!("{}: {}", f.display(), describe(&e)))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SAMPLE: &str = "Nthandle v5.0 - Handle viewer\r\n\
Copyright (C) 1997-2022 Mark Russinovich\r\n\
Sysinternals - www.sysinternals.com\r\n\
\r\n\
explorer.exe       pid: 1234   type: File          C:\\data\\app\r\n\
chrome.exe         pid: 5678   type: File          C:\\data\\app\\cache.db\r\n\
chrome.exe         pid: 5678   type: File          C:\\data\\app\\log.txt\r\n\
chrome.exe         pid: 91     type: File          C:\\data\\app\\x\r\n\
garbage line\r\n";

    #[test]
    fn parses_and_groups_handles() {
        let entries = parse_handle_output(SAMPLE);
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].process, "explorer.exe");
        assert_eq!(entries[0].pid, 1234);
        assert_eq!(entries[1].path, "C:\\data\\app\\cache.db");

        let text = format_holders(&entries);
        assert!(text.contains("chrome.exe (PID 5678, 91) - 3 handle(s)"), "{text}");
        assert!(text.contains("explorer.exe (PID 1234) - 1 handle(s)"));
    }

    #[test]
    fn no_matches_is_empty() {
        assert!(parse_handle_output("No matching handles found.\n").is_empty());
        assert_eq!(format_holders(&[]), "no holders reported");
    }

    #[test]
    fn missing_tool_reports_unknown_holders() {
        let probe = LockProbe::new(Some(PathBuf::from("no-such-handle-tool-xyz")));
        assert_eq!(probe.holders(Path::new("/tmp")), "holders unknown");
        assert_eq!(LockProbe::default().holders(Path::new("/tmp")), "holders unknown");
    }

    #[test]
    fn migrate_probe_leaves_tree_untouched() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        fs::create_dir(&src).unwrap();
        fs::write(src.join("a.txt"), b"a").unwrap();
        let target = dir.path().join("t/deep");

        LockProbe::default().check_migrate(&src, &target).unwrap();

        assert!(src.join("a.txt").exists());
        assert!(target.is_dir(), "write test creates the target");
        assert_eq!(fs::read_dir(&target).unwrap().count(), 0);
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert!(names.iter().all(|n| !n.contains("_lock_test_")));
    }

    #[test]
    fn migrate_probe_on_missing_source_is_occupied() {
        let dir = tempdir().unwrap();
        let err = LockProbe::default()
            .check_migrate(&dir.path().join("nope"), &dir.path().join("t"))
            .unwrap_err();
        assert!(matches!(err, MoveError::Occupied { .. }));
        assert!(err.to_string().contains("holders unknown"));
    }

    #[test]
    fn restore_probe_checks_parent_and_target() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("t");
        fs::create_dir(&target).unwrap();
        fs::write(target.join("f.bin"), b"1").unwrap();
        let source = dir.path().join("s");
        LockProbe::default().check_restore(&source, &target).unwrap();
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);

        let err = LockProbe::default()
            .check_restore(&source, &dir.path().join("missing"))
            .unwrap_err();
        assert!(matches!(err, MoveError::Validation(_)));
    }
}
