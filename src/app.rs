//! Application orchestrator.
//! Loads/merges config, initializes logging, installs the signal handler, and dispatches
//! the subcommand. Returns the process exit code.

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use junction_move::cli::{Args, Command};
use junction_move::config::{self, LoadResult, CONFIG_ENV};
use junction_move::output as out;
use junction_move::progress::TracingReporter;
use junction_move::state::{self, MigrationState};
use junction_move::workflow::{self, WorkflowSettings};
use junction_move::{fs_ops, shutdown, CancelToken, Config};

use crate::logging::init_tracing;

const EXIT_USAGE: u8 = 2;

#[derive(Serialize)]
struct StatusReport<'a> {
    source: &'a Path,
    target: &'a Path,
    state: MigrationState,
    source_is_link: bool,
    link_target: Option<PathBuf>,
    backups: Vec<PathBuf>,
    target_has_done_marker: bool,
}

fn print_config_location() {
    if let Ok(cfg_env) = std::env::var(CONFIG_ENV) {
        out::print_info(&format!("Using {CONFIG_ENV} (explicit):\n  {cfg_env}\n"));
        out::print_info(&format!("To override, unset {CONFIG_ENV} or set it to another file."));
        return;
    }
    match config::default_config_path() {
        Some(p) => {
            out::print_info(&format!("Default junction_move config path:\n  {}\n", p.display()));
            if p.exists() {
                out::print_info("A config file already exists at that location.");
            } else {
                out::print_info("No config file exists there yet. Run any command to create a template.");
            }
        }
        None => out::print_error("Could not determine a default config path"),
    }
}

/// Effective config: XML (or defaults) with CLI overrides applied, validated.
fn build_config(args: &Args) -> Result<Config> {
    let mut cfg = match config::load_config()? {
        LoadResult::CreatedTemplate(path) => {
            out::print_success(&format!("A template junction_move config was written to: {}", path.display()));
            out::print_info(&format!("Edit it to change defaults. To use a different file set {CONFIG_ENV}."));
            Config::default()
        }
        other => other.into_config(),
    };
    args.apply_overrides(&mut cfg);
    cfg.validate().context("invalid configuration")?;
    Ok(cfg)
}

/// Run the CLI application.
pub fn run(args: Args) -> Result<u8> {
    // Handle --print-config before logging init
    if args.print_config {
        print_config_location();
        return Ok(0);
    }

    let Some(command) = args.command.clone() else {
        out::print_error("no command given; run with --help for usage");
        return Ok(EXIT_USAGE);
    };

    let cfg = build_config(&args)?;

    // Initialize logging and capture the guard so we can drop it on signal
    let guard_opt = init_tracing(cfg.log_level, cfg.log_file.as_deref(), args.json).map_err(|e| {
        out::print_error(&format!("Failed to initialize logging: {e}"));
        e
    })?;

    // Guard needs to be dropped on SIGINT to flush logs
    let guard_slot = Arc::new(Mutex::new(guard_opt));
    {
        let guard_slot = Arc::clone(&guard_slot);
        ctrlc::set_handler(move || {
            shutdown::request();
            out::print_warn("Received interrupt; cancelling and rolling back...");
            if let Ok(mut g) = guard_slot.lock() {
                let _ = g.take();
            }
        })
        .context("failed to install signal handler")?;
    }

    debug!(?args, "Starting junction_move");
    let result = dispatch(&command, &cfg, args.json);

    // Ensure logs are flushed before exit
    if let Ok(mut g) = guard_slot.lock() {
        let _ = g.take();
    }

    result
}

fn dispatch(command: &Command, cfg: &Config, json: bool) -> Result<u8> {
    if let Command::Scan { path } = command {
        return scan(path, cfg, json);
    }
    let Some((source, target)) = command.paths() else {
        return Ok(EXIT_USAGE);
    };
    let Some(mode) = command.mode() else {
        return status(source, target, json);
    };

    let settings = WorkflowSettings::from_config(cfg)?;
    let cancel = CancelToken::new();
    info!(%mode, source = %source.display(), target = %target.display(), "Starting workflow");
    let outcome = workflow::run(mode, source, target, &settings, &cancel, &TracingReporter);

    if json {
        out::print_json(&outcome);
    } else {
        out::print_outcome(&outcome);
    }
    Ok(u8::try_from(outcome.exit_code()).unwrap_or(1))
}

fn scan(path: &Path, cfg: &Config, json: bool) -> Result<u8> {
    if !path.is_dir() {
        out::print_error(&format!("not a directory: {}", path.display()));
        return Ok(EXIT_USAGE);
    }
    let threshold = cfg.large_file_threshold_mb.saturating_mul(1024 * 1024);
    let stats = fs_ops::scan(path, threshold, |line| debug!("{line}"));
    if json {
        out::print_json(&stats);
    } else {
        out::print_stats(&stats, threshold);
    }
    Ok(0)
}

fn status(source: &Path, target: &Path, json: bool) -> Result<u8> {
    let ev = state::inspect(source, target);
    let report = StatusReport {
        source,
        target,
        state: state::classify(&ev),
        source_is_link: ev.source_is_link,
        link_target: ev.link_target,
        backups: ev.backups,
        target_has_done_marker: ev.target_has_done_marker,
    };
    if json {
        out::print_json(&report);
        return Ok(0);
    }
    out::print_user(&format!("state: {}", report.state));
    if let Some(t) = &report.link_target {
        out::print_user(&format!("link target: {}", t.display()));
    }
    for b in &report.backups {
        out::print_user(&format!("backup: {}", b.display()));
    }
    if report.target_has_done_marker {
        out::print_user("target holds a finished copy");
    }
    Ok(0)
}
