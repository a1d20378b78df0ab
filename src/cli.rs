//! CLI definition and parsing.
//! Defines Args and provides parse() for command-line handling.
//!
//! Notes:
//! - Global flags override config values (which are loaded from XML if present).
//! - --debug is a shorthand for --log-level debug.

use clap::{Parser, Subcommand, ValueHint};
use std::path::{Path, PathBuf};

use crate::config::types::{Config, LogLevel};
use crate::task::MigrationMode;

/// Relocate a directory and leave a link behind; restore or repair it later.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about = "Move a directory to another drive and leave a link in its place"
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Parallel streams for the copy tool.
    #[arg(long, global = true, value_name = "N")]
    pub threads: Option<u32>,

    /// Copy tool: auto, robocopy, rsync, or a command line using {source} {target} {threads}.
    #[arg(long, global = true, value_name = "SPEC")]
    pub copy_tool: Option<String>,

    /// Progress sampling interval in milliseconds.
    #[arg(long, global = true, value_name = "MS")]
    pub sample_interval_ms: Option<u64>,

    /// Enable debug logging (equivalent to `--log-level debug`).
    #[arg(short = 'd', long, global = true, help = "Enable debug logging (shorthand for --log-level debug)")]
    pub debug: bool,

    /// Set log level. One of: quiet, normal, info, debug.
    #[arg(long, global = true, help = "Set log level: quiet, normal, info, debug")]
    pub log_level: Option<String>,

    /// Emit logs in structured JSON (includes timestamp, level, and structured fields).
    #[arg(long, global = true, help = "Emit logs in structured JSON")]
    pub json: bool,

    /// Print where junction_move will look for the config file, then exit.
    #[arg(long, help = "Print the config file location used by junction_move and exit")]
    pub print_config: bool,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Copy SOURCE to TARGET and replace SOURCE with a link to it.
    Migrate {
        #[arg(value_hint = ValueHint::DirPath)]
        source: PathBuf,
        #[arg(value_hint = ValueHint::DirPath)]
        target: PathBuf,
    },
    /// Copy the data back from TARGET and replace the link at SOURCE with it.
    Restore {
        #[arg(value_hint = ValueHint::DirPath)]
        source: PathBuf,
        #[arg(value_hint = ValueHint::DirPath)]
        target: PathBuf,
        /// Leave the data at TARGET after restoring.
        #[arg(long)]
        keep_target: bool,
    },
    /// Recreate the link at SOURCE pointing to the existing TARGET (no data copied).
    Repair {
        #[arg(value_hint = ValueHint::DirPath)]
        source: PathBuf,
        #[arg(value_hint = ValueHint::DirPath)]
        target: PathBuf,
        /// Delete the backup made of a non-empty SOURCE once the link is verified.
        #[arg(long)]
        cleanup_backup: bool,
    },
    /// Print the relocation state of SOURCE/TARGET.
    Status {
        #[arg(value_hint = ValueHint::DirPath)]
        source: PathBuf,
        #[arg(value_hint = ValueHint::DirPath)]
        target: PathBuf,
    },
    /// Print file count and size statistics for PATH.
    Scan {
        #[arg(value_hint = ValueHint::DirPath)]
        path: PathBuf,
    },
}

impl Command {
    /// Source and target of the path-pair commands.
    pub fn paths(&self) -> Option<(&Path, &Path)> {
        match self {
            Command::Migrate { source, target }
            | Command::Restore { source, target, .. }
            | Command::Repair { source, target, .. }
            | Command::Status { source, target } => Some((source.as_path(), target.as_path())),
            Command::Scan { .. } => None,
        }
    }

    /// Workflow run by this command; None for the read-only commands.
    pub fn mode(&self) -> Option<MigrationMode> {
        match self {
            Command::Migrate { .. } => Some(MigrationMode::Migrate),
            Command::Restore { .. } => Some(MigrationMode::Restore),
            Command::Repair { .. } => Some(MigrationMode::Repair),
            Command::Status { .. } | Command::Scan { .. } => None,
        }
    }
}

impl Args {
    /// Effective log level derived from flags.
    /// Precedence: --debug > --log-level value > None (use config default).
    pub fn effective_log_level(&self) -> Option<LogLevel> {
        if self.debug {
            return Some(LogLevel::Debug);
        }
        self.log_level.as_deref().and_then(LogLevel::parse)
    }

    /// Apply CLI overrides to a loaded Config (in-place). No-ops for unset flags.
    pub fn apply_overrides(&self, cfg: &mut Config) {
        if let Some(n) = self.threads {
            cfg.threads = n;
        }
        if let Some(tool) = &self.copy_tool {
            cfg.copy_tool = tool.clone();
        }
        if let Some(ms) = self.sample_interval_ms {
            cfg.sample_interval_ms = ms;
        }
        if let Some(level) = self.effective_log_level() {
            cfg.log_level = level;
        }
        match &self.command {
            Some(Command::Restore { keep_target: true, .. }) => cfg.keep_target_on_restore = true,
            Some(Command::Repair { cleanup_backup: true, .. }) => cfg.cleanup_repair_backup = true,
            _ => {}
        }
    }
}

pub fn parse() -> Args {
    Args::parse()
}
