//! Typed error definitions for junction_move.
//! Provides the well-known failure families of a relocation run for better logs and tests,
//! plus a keyword classifier that turns free-form error text into a user-facing kind and hint.
//!
//! Notes:
//! - `code()` values double as process exit codes for the CLI.
//! - `ErrorKind::classify` is a heuristic over message text, not an authoritative diagnosis.

use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MoveError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Insufficient disk space at {path}: need {required} bytes, have {available} bytes")]
    InsufficientSpace {
        path: PathBuf,
        required: u64,
        available: u64,
    },

    #[error("Target directory is not empty: {0}")]
    TargetNotEmpty(PathBuf),

    #[error("Directory is in use and cannot be moved: {path}: {detail}")]
    Occupied { path: PathBuf, detail: String },

    #[error("Copy tool failed with exit code {code}: {message}")]
    CopyFailed { code: i32, message: String },

    #[error("Verification failed: {0}")]
    Verification(String),

    #[error("Link operation failed: {0}")]
    Link(String),

    #[error("Operation cancelled by user")]
    Cancelled,

    #[error("{op} '{path}': {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, MoveError>;

impl MoveError {
    /// Stable numeric code per failure family (also used as the CLI exit code).
    pub fn code(&self) -> i32 {
        match self {
            MoveError::Validation(_) => 2,
            MoveError::InsufficientSpace { .. } => 3,
            MoveError::TargetNotEmpty(_) => 4,
            MoveError::Occupied { .. } => 5,
            MoveError::CopyFailed { .. } => 6,
            MoveError::Verification(_) => 7,
            MoveError::Link(_) => 8,
            MoveError::Io { .. } => 9,
            MoveError::Other(_) => 1,
            MoveError::Cancelled => 130,
        }
    }

    /// Snake-case tag used as the `kind` field in structured logs.
    pub fn kind_str(&self) -> &'static str {
        match self {
            MoveError::Validation(_) => "validation",
            MoveError::InsufficientSpace { .. } => "insufficient_space",
            MoveError::TargetNotEmpty(_) => "target_not_empty",
            MoveError::Occupied { .. } => "occupied",
            MoveError::CopyFailed { .. } => "copy_failed",
            MoveError::Verification(_) => "verification",
            MoveError::Link(_) => "link",
            MoveError::Cancelled => "cancelled",
            MoveError::Io { .. } => "io",
            MoveError::Other(_) => "other",
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MoveError::Cancelled)
    }

    /// Classified kind for user-facing display. Structured variants map directly;
    /// the rest fall back to keyword matching on the rendered message.
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            MoveError::InsufficientSpace { .. } => ErrorKind::DiskSpace,
            MoveError::Occupied { .. } => ErrorKind::FileInUse,
            MoveError::Io { source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
                ErrorKind::Permission
            }
            other => ErrorKind::classify(&other.to_string()),
        }
    }

    /// Adapter for `.map_err(...)`: wraps an io::Error with the failing operation, the path,
    /// and a platform-aware hint (see `fs_ops::helpers`).
    pub fn io(op: &'static str, path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> MoveError {
        let path = path.into();
        move |e| MoveError::Io {
            op,
            path,
            source: crate::fs_ops::with_hint(e),
        }
    }
}

impl From<anyhow::Error> for MoveError {
    fn from(e: anyhow::Error) -> Self {
        match e.downcast::<MoveError>() {
            Ok(me) => me,
            Err(other) => MoveError::Other(format!("{other:#}")),
        }
    }
}

/// User-facing error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Permission,
    DiskSpace,
    FileInUse,
    Network,
    System,
    Unknown,
}

impl ErrorKind {
    /// Keyword heuristic over an error message (case-insensitive).
    pub fn classify(text: &str) -> Self {
        let t = text.to_lowercase();
        let has = |words: &[&str]| words.iter().any(|w| t.contains(w));
        if has(&["access", "denied", "permission"]) {
            ErrorKind::Permission
        } else if has(&["space", "disk"]) {
            ErrorKind::DiskSpace
        } else if has(&["lock", "used", "in use", "occupied"]) {
            ErrorKind::FileInUse
        } else if has(&["network", "connection"]) {
            ErrorKind::Network
        } else if has(&["system", "critical"]) {
            ErrorKind::System
        } else {
            ErrorKind::Unknown
        }
    }

    /// Short remediation hint for the operator.
    pub fn hint(&self) -> &'static str {
        match self {
            ErrorKind::Permission => {
                "Run with elevated privileges (or enable developer mode) and check ownership of both directories."
            }
            ErrorKind::DiskSpace => "Free up space on the target volume or choose a different target.",
            ErrorKind::FileInUse => {
                "Close the programs holding files in the source directory, then retry."
            }
            ErrorKind::Network => "Check that the network share is reachable and stable, then retry.",
            ErrorKind::System => "Do not relocate system directories; pick an application data folder instead.",
            ErrorKind::Unknown => "Check the log for details and verify both paths manually.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Permission => "permission",
            ErrorKind::DiskSpace => "disk_space",
            ErrorKind::FileInUse => "file_in_use",
            ErrorKind::Network => "network",
            ErrorKind::System => "system",
            ErrorKind::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_by_keywords() {
        assert_eq!(ErrorKind::classify("Access is denied."), ErrorKind::Permission);
        assert_eq!(ErrorKind::classify("not enough disk space"), ErrorKind::DiskSpace);
        assert_eq!(
            ErrorKind::classify("The file is being used by another process"),
            ErrorKind::FileInUse
        );
        assert_eq!(ErrorKind::classify("network path was not found"), ErrorKind::Network);
        assert_eq!(ErrorKind::classify("critical failure"), ErrorKind::System);
        assert_eq!(ErrorKind::classify("something odd"), ErrorKind::Unknown);
    }

    #[test]
    fn permission_wins_over_later_keywords() {
        // "denied" is checked before "disk"
        assert_eq!(ErrorKind::classify("disk access denied"), ErrorKind::Permission);
    }

    #[test]
    fn structured_variants_map_directly() {
        let e = MoveError::InsufficientSpace {
            path: PathBuf::from("/t"),
            required: 10,
            available: 1,
        };
        assert_eq!(e.error_kind(), ErrorKind::DiskSpace);
        assert_eq!(e.code(), 3);
        assert_eq!(MoveError::Cancelled.code(), 130);
        assert!(MoveError::Cancelled.is_cancelled());
    }

    #[test]
    fn anyhow_roundtrip_keeps_variant() {
        let any: anyhow::Error = MoveError::TargetNotEmpty(PathBuf::from("/x")).into();
        let back: MoveError = any.into();
        assert_eq!(back.kind_str(), "target_not_empty");
    }
}
