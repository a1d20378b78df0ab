//! Progress and log reporting.
//!
//! Workflows never print. They emit two ordered streams through a `Reporter`:
//! immutable `ProgressUpdate` snapshots and free-text log lines.
//!
//! Implementations:
//! - `ChannelReporter`: two `mpsc` channels for any front end to drain
//! - `TracingReporter`: forwards both streams to `tracing` (used by the CLI)
//! - `NullReporter`: discards everything

use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::fs_ops::format_bytes;

/// Snapshot of a workflow's progress.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProgressUpdate {
    /// 1-based phase index
    pub phase: u8,
    pub total_phases: u8,
    pub phase_description: String,
    /// Overall percentage, 0..=100
    pub percent: f64,
    pub copied_bytes: u64,
    pub total_bytes: u64,
    pub speed_bytes_per_sec: f64,
    pub eta: Option<Duration>,
    pub message: String,
}

impl ProgressUpdate {
    /// Phase boundary event with no byte counters.
    pub fn phase(phase: u8, total_phases: u8, description: &str, percent: f64) -> Self {
        Self {
            phase,
            total_phases,
            phase_description: description.to_string(),
            percent,
            message: description.to_string(),
            ..Self::default()
        }
    }
}

/// Sink for progress snapshots and log lines.
pub trait Reporter: Send + Sync {
    fn progress(&self, update: &ProgressUpdate);
    fn log(&self, line: &str);
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullReporter;

impl Reporter for NullReporter {
    fn progress(&self, _update: &ProgressUpdate) {}
    fn log(&self, _line: &str) {}
}

/// Forwards log lines at info level and progress at debug level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn progress(&self, u: &ProgressUpdate) {
        debug!(
            phase = u.phase,
            total_phases = u.total_phases,
            percent = u.percent,
            copied = u.copied_bytes,
            total = u.total_bytes,
            "{}",
            u.message
        );
    }

    fn log(&self, line: &str) {
        info!("{line}");
    }
}

/// Sends each stream down its own channel. Dropped receivers are ignored.
pub struct ChannelReporter {
    progress_tx: Mutex<Sender<ProgressUpdate>>,
    log_tx: Mutex<Sender<String>>,
}

impl ChannelReporter {
    /// Returns the reporter plus the progress and log receivers.
    pub fn new() -> (Self, Receiver<ProgressUpdate>, Receiver<String>) {
        let (ptx, prx) = mpsc::channel();
        let (ltx, lrx) = mpsc::channel();
        (
            Self {
                progress_tx: Mutex::new(ptx),
                log_tx: Mutex::new(ltx),
            },
            prx,
            lrx,
        )
    }
}

impl Reporter for ChannelReporter {
    fn progress(&self, update: &ProgressUpdate) {
        if let Ok(tx) = self.progress_tx.lock() {
            let _ = tx.send(update.clone());
        }
    }

    fn log(&self, line: &str) {
        if let Ok(tx) = self.log_tx.lock() {
            let _ = tx.send(line.to_string());
        }
    }
}

/// Human readable speed, e.g. "12.5 MiB/s".
pub fn format_speed(bytes_per_sec: f64) -> String {
    format!("{}/s", format_bytes(bytes_per_sec.max(0.0) as u64))
}

/// Short ETA such as "1h 02m", "3m 07s" or "12s".
pub fn format_eta(eta: Duration) -> String {
    let secs = eta.as_secs();
    let (h, m, s) = (secs / 3600, (secs % 3600) / 60, secs % 60);
    if h > 0 {
        format!("{h}h {m:02}m")
    } else if m > 0 {
        format!("{m}m {s:02}s")
    } else {
        format!("{s}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn channel_reporter_keeps_streams_separate_and_ordered() {
        let (rep, prx, lrx) = ChannelReporter::new();
        rep.log("one");
        rep.progress(&ProgressUpdate::phase(1, 6, "Validate", 0.0));
        rep.log("two");
        rep.progress(&ProgressUpdate::phase(2, 6, "Scan", 5.0));
        drop(rep);

        let logs: Vec<String> = lrx.iter().collect();
        assert_eq!(logs, vec!["one", "two"]);
        let phases: Vec<u8> = prx.iter().map(|u| u.phase).collect();
        assert_eq!(phases, vec![1, 2]);
    }

    #[test]
    fn eta_formatting() {
        assert_eq!(format_eta(Duration::from_secs(12)), "12s");
        assert_eq!(format_eta(Duration::from_secs(187)), "3m 07s");
        assert_eq!(format_eta(Duration::from_secs(3720)), "1h 02m");
    }
}
