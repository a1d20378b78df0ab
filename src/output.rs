//! User-facing console output.
//! Small wrapper around stdout/stderr printing to provide consistent, colored
//! messages. Colors are enabled only when output is a TTY.

use owo_colors::OwoColorize;
use serde::Serialize;

use crate::fs_ops::{format_bytes, DirectoryStats};
use crate::workflow::{RollbackStatus, WorkflowOutcome};

fn is_tty() -> bool {
    atty::is(atty::Stream::Stdout)
}

pub fn print_info(msg: &str) {
    if is_tty() {
        println!("{} {}", "info:".cyan().bold(), msg);
    } else {
        println!("info: {msg}");
    }
}

pub fn print_warn(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "warn:".yellow().bold(), msg);
    } else {
        eprintln!("warn: {msg}");
    }
}

pub fn print_error(msg: &str) {
    if is_tty() {
        eprintln!("{} {}", "error:".red().bold(), msg);
    } else {
        eprintln!("error: {msg}");
    }
}

pub fn print_success(msg: &str) {
    if is_tty() {
        println!("{} {}", "ok:".green().bold(), msg);
    } else {
        println!("ok: {msg}");
    }
}

/// Print a plain line (no prefix) for output users may script against.
pub fn print_user(msg: &str) {
    println!("{msg}");
}

/// Pretty JSON on stdout; falls back to an error line if serialization fails.
pub fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(s) => println!("{s}"),
        Err(e) => print_error(&format!("could not serialize output: {e}")),
    }
}

/// Summary lines for a scan.
pub fn print_stats(stats: &DirectoryStats, large_threshold: u64) {
    print_user(&format!("files:       {}", stats.total_files));
    print_user(&format!("size:        {} ({} bytes)", format_bytes(stats.total_bytes), stats.total_bytes));
    print_user(&format!("large files: {} (>= {})", stats.large_files, format_bytes(large_threshold)));
}

/// Final verdict of a workflow run.
pub fn print_outcome(outcome: &WorkflowOutcome) {
    if outcome.success {
        let target = outcome
            .final_target
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        print_success(&format!("{} finished: {target}", outcome.mode));
        if let Some(backup) = &outcome.backup_path {
            print_info(&format!("backup kept at {}", backup.display()));
        }
        return;
    }

    if outcome.cancelled {
        print_warn(&format!("{} cancelled", outcome.mode));
    } else {
        print_error(&format!(
            "{} failed: {}",
            outcome.mode,
            outcome.error.as_deref().unwrap_or("unknown error")
        ));
        if let Some(kind) = outcome.error_kind {
            print_info(&format!("hint: {}", kind.hint()));
        }
    }
    match &outcome.rollback {
        RollbackStatus::NotNeeded => {}
        RollbackStatus::Succeeded => print_info("changes were rolled back"),
        RollbackStatus::Failed(why) => print_error(&format!("rollback failed: {why}; inspect the source and target manually")),
    }
    if let Some(backup) = &outcome.backup_path {
        print_warn(&format!("original data is still at {}", backup.display()));
    }
}
