//! XML configuration support.
//! - Loads settings from config.xml (quick_xml + serde).
//! - Creates a secure template if missing (unless JUNCTION_MOVE_CONFIG is set).
//!
//! Notes:
//! - Every element is optional; missing or empty elements keep the built-in default.
//! - Unknown elements and unparsable values are hard errors so typos surface early.

use anyhow::{anyhow, bail, Context, Result};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info, warn};

use super::paths::{config_path, path_has_symlink_ancestor};
use super::types::{Config, LogLevel};
use super::{COPY_TOOL_DEFAULT, LARGE_FILE_THRESHOLD_MB_DEFAULT, SAMPLE_INTERVAL_MS_DEFAULT, THREADS_DEFAULT};

use crate::platform::{set_dir_mode_0700, set_file_mode_0600, write_config_secure_new_0600};

/// Struct mirroring the XML config for deserialization. Values are kept as text and
/// parsed after trimming so `<threads> 8 </threads>` is accepted.
#[derive(Debug, Default, Deserialize)]
#[serde(rename = "config")]
#[serde(deny_unknown_fields)]
struct XmlConfig {
    threads: Option<String>,
    large_file_threshold_mb: Option<String>,
    sample_interval_ms: Option<String>,
    log_level: Option<String>,
    log_file: Option<String>,
    copy_tool: Option<String>,
    keep_target_on_restore: Option<String>,
    cleanup_repair_backup: Option<String>,
    handle_tool: Option<String>,
}

/// What `load_config` found.
#[derive(Debug)]
pub enum LoadResult {
    /// Parsed from the given file
    Loaded(Config, PathBuf),
    /// No file (or no resolvable location); defaults apply
    Defaults,
    /// No file existed at the default location, so a template was written there
    CreatedTemplate(PathBuf),
}

impl LoadResult {
    /// The effective config (defaults unless a file was loaded).
    pub fn into_config(self) -> Config {
        match self {
            LoadResult::Loaded(cfg, _) => cfg,
            LoadResult::Defaults | LoadResult::CreatedTemplate(_) => Config::default(),
        }
    }
}

/// Trimmed, non-empty text of an element.
fn text(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn parse_field<T>(name: &str, v: Option<String>) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match text(v) {
        None => Ok(None),
        Some(s) => s
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow!("invalid value for <{name}>: '{s}' ({e})")),
    }
}

// Map XmlConfig -> Config, starting from the defaults
fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config::default();
    if let Some(v) = parse_field("threads", parsed.threads)? {
        cfg.threads = v;
    }
    if let Some(v) = parse_field("large_file_threshold_mb", parsed.large_file_threshold_mb)? {
        cfg.large_file_threshold_mb = v;
    }
    if let Some(v) = parse_field("sample_interval_ms", parsed.sample_interval_ms)? {
        cfg.sample_interval_ms = v;
    }
    if let Some(v) = parse_field::<LogLevel>("log_level", parsed.log_level)? {
        cfg.log_level = v;
    }
    if let Some(v) = text(parsed.log_file) {
        cfg.log_file = Some(PathBuf::from(v));
    }
    if let Some(v) = text(parsed.copy_tool) {
        cfg.copy_tool = v;
    }
    if let Some(v) = parse_field("keep_target_on_restore", parsed.keep_target_on_restore)? {
        cfg.keep_target_on_restore = v;
    }
    if let Some(v) = parse_field("cleanup_repair_backup", parsed.cleanup_repair_backup)? {
        cfg.cleanup_repair_backup = v;
    }
    if let Some(v) = text(parsed.handle_tool) {
        cfg.handle_tool = Some(PathBuf::from(v));
    }
    Ok(cfg)
}

/// Load a Config from a specific XML file path.
pub fn load_config_from_xml_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let parsed: XmlConfig = from_xml_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    xml_to_config(parsed).with_context(|| format!("config xml '{}'", path.display()))
}

/// Resolve the config location and load it.
///
/// - `$JUNCTION_MOVE_CONFIG` pointing at a missing file is an error.
/// - A missing file at the default location gets a template and defaults apply.
pub fn load_config() -> Result<LoadResult> {
    let Some((path, from_env)) = config_path() else {
        debug!("No config location could be determined; using defaults");
        return Ok(LoadResult::Defaults);
    };

    if !path.exists() {
        if from_env {
            bail!(
                "config file named by {} does not exist: {}",
                super::CONFIG_ENV,
                path.display()
            );
        }
        return Ok(match create_template_config(&path) {
            Ok(()) => LoadResult::CreatedTemplate(path),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Could not create template config");
                LoadResult::Defaults
            }
        });
    }

    let cfg = load_config_from_xml_path(&path)?;
    debug!(path = %path.display(), "Loaded config");
    Ok(LoadResult::Loaded(cfg, path))
}

/// Create default template config file and parent directory (best-effort permissions).
/// Uses secure creation to avoid following attacker-controlled symlinks on Unix.
pub fn create_template_config(path: &Path) -> Result<()> {
    if path_has_symlink_ancestor(path)? {
        bail!(
            "Refusing to create config: ancestor of {} is a symlink",
            path.display()
        );
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
        let _ = set_dir_mode_0700(parent);
    }

    let content = format!(
        "<!--\n  junction_move configuration (XML)\n\n  threads                  -> parallel streams for the copy tool (1-128)\n  large_file_threshold_mb  -> files at or above this size are reported as large\n  sample_interval_ms       -> progress sampling period (min 100)\n  log_level                -> quiet | normal | info | debug\n  log_file                 -> path to log file (optional; console output is kept)\n  copy_tool                -> auto | robocopy | rsync | custom command using {{source}} {{target}} {{threads}}\n  keep_target_on_restore   -> true to leave the relocated data in place after restore\n  cleanup_repair_backup    -> true to delete the backup repair makes of a non-empty source\n  handle_tool              -> optional lock diagnostic executable (Sysinternals handle)\n\n  CLI flags override XML values.\n-->\n<config>\n  <threads>{THREADS_DEFAULT}</threads>\n  <large_file_threshold_mb>{LARGE_FILE_THRESHOLD_MB_DEFAULT}</large_file_threshold_mb>\n  <sample_interval_ms>{SAMPLE_INTERVAL_MS_DEFAULT}</sample_interval_ms>\n  <log_level>normal</log_level>\n  <log_file></log_file>\n  <copy_tool>{COPY_TOOL_DEFAULT}</copy_tool>\n  <keep_target_on_restore>false</keep_target_on_restore>\n  <cleanup_repair_backup>false</cleanup_repair_backup>\n</config>\n"
    );

    // Atomic, secure write (O_NOFOLLOW + create_new on Unix), then tighten perms.
    write_config_secure_new_0600(path, content.as_bytes())?;
    let _ = set_file_mode_0600(path);

    info!("Created template config at {}", path.display());
    Ok(())
}

/// Create the default config if JUNCTION_MOVE_CONFIG is not set; return the created path.
pub fn ensure_default_config_exists() -> Option<PathBuf> {
    let (path, from_env) = config_path()?;
    if from_env || path.exists() {
        return None;
    }
    match create_template_config(&path) {
        Ok(()) => Some(path),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to create template config");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn write(dir: &Path, body: &str) -> PathBuf {
        let p = dir.join("config.xml");
        fs::write(&p, body).unwrap();
        p
    }

    #[test]
    fn reads_all_fields_with_whitespace() {
        let dir = tempdir().unwrap();
        let p = write(
            dir.path(),
            "<config>\n <threads> 16 </threads>\n <sample_interval_ms>250</sample_interval_ms>\n <log_level> debug </log_level>\n <log_file>/var/log/jm.log</log_file>\n <copy_tool>rsync</copy_tool>\n <keep_target_on_restore>true</keep_target_on_restore>\n</config>",
        );
        let cfg = load_config_from_xml_path(&p).unwrap();
        assert_eq!(cfg.threads, 16);
        assert_eq!(cfg.sample_interval_ms, 250);
        assert_eq!(cfg.log_level, LogLevel::Debug);
        assert_eq!(cfg.log_file, Some(PathBuf::from("/var/log/jm.log")));
        assert_eq!(cfg.copy_tool, "rsync");
        assert!(cfg.keep_target_on_restore);
        assert!(!cfg.cleanup_repair_backup);
        assert_eq!(cfg.large_file_threshold_mb, LARGE_FILE_THRESHOLD_MB_DEFAULT);
    }

    #[test]
    fn empty_elements_keep_defaults() {
        let dir = tempdir().unwrap();
        let p = write(dir.path(), "<config><log_file></log_file><threads>  </threads></config>");
        let cfg = load_config_from_xml_path(&p).unwrap();
        assert_eq!(cfg.log_file, None);
        assert_eq!(cfg.threads, THREADS_DEFAULT);
    }

    #[test]
    fn unknown_field_is_an_error() {
        let dir = tempdir().unwrap();
        let p = write(dir.path(), "<config><download_base>/x</download_base></config>");
        let err = load_config_from_xml_path(&p).unwrap_err();
        assert!(format!("{err:#}").contains("unknown field"), "{err:#}");
    }

    #[test]
    fn bad_number_is_an_error() {
        let dir = tempdir().unwrap();
        let p = write(dir.path(), "<config><threads>many</threads></config>");
        let err = load_config_from_xml_path(&p).unwrap_err();
        assert!(format!("{err:#}").contains("<threads>"));
    }

    #[test]
    fn template_round_trips_to_defaults() {
        let dir = tempdir().unwrap();
        let p = dir.path().join("nested/config.xml");
        create_template_config(&p).unwrap();
        let cfg = load_config_from_xml_path(&p).unwrap();
        let mut expected = Config::default();
        expected.handle_tool = cfg.handle_tool.clone();
        assert_eq!(cfg, expected);
    }
}
