//! Core configuration types.
//! - Config holds runtime settings with sensible defaults.
//! - LogLevel represents verbosity with simple parsing helpers.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use super::{
    COPY_TOOL_DEFAULT, LARGE_FILE_THRESHOLD_MB_DEFAULT, SAMPLE_INTERVAL_MS_DEFAULT, THREADS_DEFAULT,
};

/// Program-defined verbosity levels exposed to users/config.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Only errors
    Quiet,
    /// Informational output (default)
    #[default]
    Normal,
    /// More info (like verbose)
    Info,
    /// Debug/trace
    Debug,
}

impl LogLevel {
    /// Parse common string names into our LogLevel (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "quiet" | "error" | "none" => Some(LogLevel::Quiet),
            "normal" => Some(LogLevel::Normal),
            "info" | "verbose" | "detailed" => Some(LogLevel::Info),
            "debug" | "trace" => Some(LogLevel::Debug),
            _ => None,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Quiet => "quiet",
            LogLevel::Normal => "normal",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        f.write_str(s)
    }
}

impl FromStr for LogLevel {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("invalid log level: '{s}'"))
    }
}

/// Runtime configuration shared by every workflow run.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Parallel streams handed to the copy tool
    pub threads: u32,
    /// Files at or above this size are counted as large
    pub large_file_threshold_mb: u64,
    /// Progress sampling period
    pub sample_interval_ms: u64,
    /// Console verbosity
    pub log_level: LogLevel,
    /// Optional path to a log file
    pub log_file: Option<PathBuf>,
    /// `auto`, `robocopy`, `rsync`, or a command line with `{source}`/`{target}`/`{threads}`
    pub copy_tool: String,
    /// Leave the data at the target after a successful restore
    pub keep_target_on_restore: bool,
    /// Delete the backup repair makes of a non-empty source
    pub cleanup_repair_backup: bool,
    /// Lock-diagnostic executable used to name processes holding a directory open
    pub handle_tool: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            threads: THREADS_DEFAULT,
            large_file_threshold_mb: LARGE_FILE_THRESHOLD_MB_DEFAULT,
            sample_interval_ms: SAMPLE_INTERVAL_MS_DEFAULT,
            log_level: LogLevel::Normal,
            log_file: None,
            copy_tool: COPY_TOOL_DEFAULT.to_string(),
            keep_target_on_restore: false,
            cleanup_repair_backup: false,
            handle_tool: default_handle_tool(),
        }
    }
}

/// Sysinternals handle on Windows; nothing elsewhere.
pub fn default_handle_tool() -> Option<PathBuf> {
    if !cfg!(windows) {
        return None;
    }
    let exe = if cfg!(target_pointer_width = "64") {
        "handle64.exe"
    } else {
        "handle.exe"
    };
    Some(PathBuf::from(exe))
}
