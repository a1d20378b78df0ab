//! Bulk copy orchestration.
//!
//! Runs an external mirror copy from source to target and turns its progress into
//! `ProgressUpdate`s in the 10..90 window of the calling workflow.
//!
//! Flow:
//! - spawn the tool (own process group, drained stdout/stderr)
//! - every sample interval: check cancellation, measure the target, feed the estimator, report
//! - on cancellation: kill the whole process tree, wait up to 3 s, return `MoveError::Cancelled`
//! - on exit: map the exit code, re-measure the target and warn when it holds < 98 % of the
//!   expected bytes (a size check only; contents are not compared)

pub mod estimator;
pub mod process;
pub mod tool;

pub use estimator::{Estimate, ProgressEstimator};
pub use tool::CopyTool;

use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::errors::{MoveError, Result};
use crate::fs_ops::{dir_size, format_bytes};
use crate::progress::{format_eta, format_speed, ProgressUpdate, Reporter};
use process::Supervised;

/// Grace period for the copy tree to die after cancellation.
pub const KILL_GRACE: Duration = Duration::from_secs(3);
/// Final size below this fraction of the expected total triggers a warning.
pub const MIN_SIZE_RATIO: f64 = 0.98;
/// Overall percentage reported once the copy has finished.
pub const COPY_DONE_PERCENT: f64 = 90.0;

/// Slice used while sleeping between samples so cancellation stays responsive.
const POLL_SLICE: Duration = Duration::from_millis(100);

/// Phase labelling for events emitted during the copy.
#[derive(Debug, Clone)]
pub struct PhaseLabel {
    pub index: u8,
    pub total: u8,
    pub description: String,
}

/// Everything the copy needs to know.
#[derive(Debug, Clone)]
pub struct CopyRequest<'a> {
    pub source: &'a Path,
    pub target: &'a Path,
    /// Pre-scanned byte total of the source
    pub total_bytes: u64,
    pub threads: u32,
    pub sample_interval: Duration,
    pub tool: &'a CopyTool,
    pub phase: PhaseLabel,
}

/// Outcome of a finished copy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CopyReport {
    pub exit_code: i32,
    pub final_bytes: u64,
    /// final_bytes / total_bytes (1.0 when nothing was expected)
    pub ratio: f64,
}

impl CopyReport {
    pub fn is_complete(&self) -> bool {
        self.ratio >= MIN_SIZE_RATIO
    }
}

fn sleep_unless_cancelled(total: Duration, cancel: &CancelToken) {
    let deadline = Instant::now() + total;
    while !cancel.is_cancelled() {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        thread::sleep(POLL_SLICE.min(deadline - now));
    }
}

fn progress_message(est: &Estimate, total: u64) -> String {
    if est.stalled {
        return "Processing files (metadata, many small files)...".to_string();
    }
    let mut msg = format!(
        "{:.1}% | {} / {} | {}",
        est.copy_percent,
        format_bytes(est.displayed_bytes),
        format_bytes(total),
        format_speed(est.speed)
    );
    if let Some(eta) = est.eta {
        msg.push_str(&format!(" | ETA {}", format_eta(eta)));
    }
    msg
}

/// Run the copy described by `req`, reporting through `reporter`.
pub fn run_copy(req: &CopyRequest<'_>, cancel: &CancelToken, reporter: &dyn Reporter) -> Result<CopyReport> {
    cancel.check()?;
    let label = &req.phase;
    let event = |percent: f64, copied: u64, speed: f64, eta: Option<Duration>, message: String| ProgressUpdate {
        phase: label.index,
        total_phases: label.total,
        phase_description: label.description.clone(),
        percent,
        copied_bytes: copied,
        total_bytes: req.total_bytes,
        speed_bytes_per_sec: speed,
        eta,
        message,
    };

    reporter.log(&format!(
        "Copying with {}: {} -> {}",
        req.tool.name(),
        req.source.display(),
        req.target.display()
    ));
    info!(
        tool = req.tool.name(),
        source = %req.source.display(),
        target = %req.target.display(),
        threads = req.threads,
        total = req.total_bytes,
        "Starting copy"
    );
    reporter.progress(&event(10.0, 0, 0.0, None, "Starting copy...".into()));

    let cmd = req.tool.command(req.source, req.target, req.threads);
    let mut sup = Supervised::spawn(cmd, req.tool)?;
    let mut est = ProgressEstimator::new(req.total_bytes);
    let mut last = Instant::now();

    loop {
        if cancel.is_cancelled() {
            warn!(target = %req.target.display(), "Copy cancelled; terminating process tree");
            reporter.log("Cancellation requested; stopping copy process tree...");
            sup.kill_tree(KILL_GRACE);
            return Err(MoveError::Cancelled);
        }
        match sup.try_exit_code() {
            Ok(Some(_)) => break,
            Ok(None) => {}
            Err(e) => {
                warn!(error = %e, "Lost track of the copy process; terminating process tree");
                sup.kill_tree(KILL_GRACE);
                return Err(e);
            }
        }
        sleep_unless_cancelled(req.sample_interval, cancel);
        if cancel.is_cancelled() {
            continue;
        }

        let now = Instant::now();
        let dt = now - last;
        last = now;
        let actual = dir_size(req.target);
        let e = est.sample(actual, sup.reported_percent(), dt);
        reporter.progress(&event(
            e.overall_percent,
            e.displayed_bytes,
            e.speed,
            e.eta,
            progress_message(&e, req.total_bytes),
        ));
    }

    let (code, tail) = sup.wait()?;
    if !req.tool.is_success(code) {
        let message = if tail.is_empty() {
            format!("{} exited with code {code}", req.tool.name())
        } else {
            tail
        };
        warn!(code, tool = req.tool.name(), "Copy tool reported failure");
        return Err(MoveError::CopyFailed { code, message });
    }

    let final_bytes = dir_size(req.target);
    let ratio = if req.total_bytes == 0 {
        1.0
    } else {
        final_bytes as f64 / req.total_bytes as f64
    };
    let report = CopyReport {
        exit_code: code,
        final_bytes,
        ratio,
    };
    if !report.is_complete() {
        let msg = format!(
            "Warning: target holds only {:.1}% of the source size ({} of {}); verify the copy manually",
            ratio * 100.0,
            format_bytes(final_bytes),
            format_bytes(req.total_bytes)
        );
        warn!(ratio, final_bytes, expected = req.total_bytes, "Copied size below expected");
        reporter.log(&msg);
    }
    reporter.log(&format!("Copy finished, final size: {}", format_bytes(final_bytes)));
    info!(code, final_bytes, ratio, "Copy finished");
    reporter.progress(&event(
        COPY_DONE_PERCENT,
        final_bytes,
        0.0,
        None,
        "Copy complete".into(),
    ));
    Ok(report)
}
