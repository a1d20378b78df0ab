//! I/O helper utilities.
//!
//! Enriches io::Error values with actionable hints so failures surfaced during a
//! relocation tell the operator what to check. The original ErrorKind is preserved.
//!
//! Usage:
//!   fs::rename(&src, &bak).map_err(MoveError::io("rename source to backup", &src))?;
//!
//!   // when the surrounding function returns io::Result
//!   fs::remove_dir(link).map_err(with_hint)?;

use std::io;

#[cfg(unix)]
use libc;

/// Platform-aware hint for a raw OS error code, if we know one.
fn hint_for_code(code: i32) -> Option<&'static str> {
    #[cfg(unix)]
    {
        match code {
            libc::EACCES | libc::EPERM => {
                Some("permission denied; check ownership or run with elevated privileges")
            }
            libc::EXDEV => Some("cross-filesystem; a rename cannot move data between volumes"),
            libc::EBUSY => Some("resource busy; another process holds files in this directory"),
            libc::ENOENT => Some("path not found; verify it exists"),
            libc::EEXIST => Some("already exists; remove it or pick another target"),
            libc::ENOTEMPTY => Some("directory not empty"),
            libc::ENOSPC => Some("insufficient space on device"),
            libc::EROFS => Some("read-only filesystem; cannot write here"),
            libc::ELOOP => Some("too many symbolic link levels; possible link cycle"),
            libc::ENAMETOOLONG => Some("filename or path too long; shorten path segments"),
            libc::EMFILE => Some("process file descriptor limit reached"),
            _ => None,
        }
    }
    #[cfg(windows)]
    {
        match code {
            5 => Some("access denied; run elevated or enable developer mode"), // ERROR_ACCESS_DENIED
            17 => Some("not same device; a rename cannot cross volumes"),     // ERROR_NOT_SAME_DEVICE
            32 | 33 => Some("sharing violation; a file is in use by another process"), // SHARING / LOCK
            2 | 3 => Some("path not found; verify it exists"),
            80 | 183 => Some("already exists; remove it or pick another target"),
            112 => Some("insufficient disk space"),                           // ERROR_DISK_FULL
            145 => Some("directory not empty"),                               // ERROR_DIR_NOT_EMPTY
            1314 => Some("privilege not held; link creation needs elevation or developer mode"),
            4390 => Some("not a reparse point"),
            _ => None,
        }
    }
    #[cfg(not(any(unix, windows)))]
    {
        let _ = code;
        None
    }
}

/// Build the enriched message for `e`.
pub(crate) fn describe(e: &io::Error) -> String {
    let mut msg = e.to_string();
    if let Some(code) = e.raw_os_error() {
        if let Some(h) = hint_for_code(code) {
            msg.push_str(" (");
            msg.push_str(h);
            msg.push(')');
        }
        msg.push_str(&format!(" [os code: {}]", code));
    } else {
        let h = match e.kind() {
            io::ErrorKind::PermissionDenied => Some("permission denied; check ownership"),
            io::ErrorKind::NotFound => Some("path not found; verify it exists"),
            io::ErrorKind::AlreadyExists => Some("already exists; remove it or pick another target"),
            _ => None,
        };
        if let Some(h) = h {
            msg.push_str(" (");
            msg.push_str(h);
            msg.push(')');
        }
    }
    msg
}

/// Re-create `e` with a hinted message while keeping its ErrorKind.
pub fn with_hint(e: io::Error) -> io::Error {
    io::Error::new(e.kind(), describe(&e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notfound_fallback_hint() {
        let e = with_hint(io::Error::from(io::ErrorKind::NotFound));
        assert_eq!(e.kind(), io::ErrorKind::NotFound);
        assert!(e.to_string().contains("path not found"));
    }

    #[cfg(unix)]
    #[test]
    fn enospc_hint_and_code() {
        let msg = describe(&io::Error::from_raw_os_error(libc::ENOSPC));
        assert!(msg.contains("insufficient space"), "msg was: {msg}");
        assert!(msg.contains("os code"));
    }

    #[cfg(unix)]
    #[test]
    fn exdev_hint() {
        let msg = describe(&io::Error::from_raw_os_error(libc::EXDEV));
        assert!(msg.contains("cross-filesystem"), "msg was: {msg}");
    }
}
