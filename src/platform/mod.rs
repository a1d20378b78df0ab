//! Platform-specific helpers.
//! This module hides OS differences (Unix/Windows) behind a uniform API so
//! the rest of the codebase can remain platform-agnostic.
//!
//! Covers: secure config/log file creation, privilege detection, directory link
//! primitives (native call plus shell fallbacks), and process-tree termination.

mod temp;
#[cfg(unix)]
mod unix;
#[cfg(windows)]
mod windows;

pub use temp::unique_sibling_name;

#[cfg(unix)]
pub use unix::{
    create_link_native, is_elevated, is_reparse_point, isolate_process_group, kill_process_tree,
    open_log_file_secure_append, remove_link_entry, set_dir_mode_0700, set_file_mode_0600,
    shell_link_commands, write_config_secure_new_0600,
};

#[cfg(windows)]
pub use windows::{
    create_link_native, is_elevated, is_reparse_point, isolate_process_group, kill_process_tree,
    open_log_file_secure_append, remove_link_entry, set_dir_mode_0700, set_file_mode_0600,
    shell_link_commands, write_config_secure_new_0600,
};

/// Paths that must never be relocated, checked case-insensitively by prefix.
#[cfg(windows)]
pub const SYSTEM_ROOTS: &[&str] = &[
    r"C:\Windows",
    r"C:\Program Files",
    r"C:\Program Files (x86)",
    r"C:\ProgramData\Microsoft",
    r"C:\$Recycle.Bin",
    r"C:\System Volume Information",
    r"C:\Recovery",
    r"C:\Boot",
];

/// Paths that must never be relocated, checked by path prefix.
#[cfg(not(windows))]
pub const SYSTEM_ROOTS: &[&str] = &[
    "/bin", "/boot", "/dev", "/etc", "/lib", "/lib32", "/lib64", "/proc", "/sbin", "/sys",
    "/usr/bin", "/usr/lib", "/usr/sbin", "/System", "/Library/Apple",
];
