//! Directory statistics.
//! Walks a tree (without following links) and aggregates file count, byte count
//! and the number of large files. Unreadable entries are skipped, never fatal.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, trace};
use walkdir::WalkDir;

use super::space::format_bytes;

/// Emit a textual progress line every this many files.
const SCAN_REPORT_EVERY: u64 = 1000;

/// Aggregate statistics for a directory tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DirectoryStats {
    pub total_files: u64,
    pub total_bytes: u64,
    pub large_files: u64,
}

/// Scan `root`, counting regular files. Files with `len >= large_file_threshold`
/// count as large. `on_progress` receives occasional human-readable lines.
///
/// A missing root yields empty stats.
pub fn scan(root: &Path, large_file_threshold: u64, mut on_progress: impl FnMut(&str)) -> DirectoryStats {
    let mut stats = DirectoryStats::default();
    let mut skipped = 0u64;

    for entry in WalkDir::new(root).follow_links(false) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                skipped += 1;
                trace!(error = %e, "Skipping unreadable entry during scan");
                continue;
            }
        };
        if !entry.file_type().is_file() {
            continue;
        }
        let len = match entry.metadata() {
            Ok(m) => m.len(),
            Err(e) => {
                skipped += 1;
                trace!(path = %entry.path().display(), error = %e, "Skipping file without metadata");
                continue;
            }
        };
        stats.total_files += 1;
        stats.total_bytes = stats.total_bytes.saturating_add(len);
        if len >= large_file_threshold {
            stats.large_files += 1;
        }
        if stats.total_files % SCAN_REPORT_EVERY == 0 {
            on_progress(&format!(
                "Scanned {} files ({})...",
                stats.total_files,
                format_bytes(stats.total_bytes)
            ));
        }
    }

    debug!(
        root = %root.display(),
        files = stats.total_files,
        bytes = stats.total_bytes,
        large = stats.large_files,
        skipped,
        "Scan finished"
    );
    stats
}

/// Total bytes of regular files under `root`. Used for copy progress sampling,
/// so it stays silent and tolerant of files vanishing mid-walk.
pub fn dir_size(root: &Path) -> u64 {
    WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| e.metadata().ok())
        .map(|m| m.len())
        .fold(0u64, |acc, n| acc.saturating_add(n))
}
