//! Default path helpers and symlink checks.
//! Determines the OS-appropriate config path, honours the env override, and detects
//! symlinked ancestors for safety.

use dirs::config_dir;
use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file (or a directory holding `config.xml`).
pub const CONFIG_ENV: &str = "JUNCTION_MOVE_CONFIG";

const CONFIG_FILE_NAME: &str = "config.xml";

/// OS-appropriate default config path.
pub fn default_config_path() -> Option<PathBuf> {
    if let Some(mut base) = config_dir() {
        base.push("junction_move");
        base.push(CONFIG_FILE_NAME);
        Some(base)
    } else {
        env::var("HOME").ok().map(|h| {
            PathBuf::from(h)
                .join(".config")
                .join("junction_move")
                .join(CONFIG_FILE_NAME)
        })
    }
}

/// Config path in effect: `$JUNCTION_MOVE_CONFIG` when set, else the default path.
/// A relative override is taken from the current directory; a directory gets `config.xml` appended.
/// The flag is true when the path came from the environment.
pub fn config_path() -> Option<(PathBuf, bool)> {
    match env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        Some(raw) => {
            let mut p = PathBuf::from(raw);
            if p.is_relative()
                && let Ok(cwd) = env::current_dir()
            {
                p = cwd.join(p);
            }
            if p.is_dir() {
                p.push(CONFIG_FILE_NAME);
            }
            Some((p, true))
        }
        None => default_config_path().map(|p| (p, false)),
    }
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    let mut p = path.parent();
    while let Some(anc) = p {
        if anc.as_os_str().is_empty() {
            break;
        }
        match fs::symlink_metadata(anc) {
            Ok(meta) if meta.file_type().is_symlink() => return Ok(true),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
        p = anc.parent();
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn env_directory_gets_file_name() {
        let dir = tempdir().unwrap();
        unsafe { env::set_var(CONFIG_ENV, dir.path()) };
        let (p, from_env) = config_path().unwrap();
        unsafe { env::remove_var(CONFIG_ENV) };
        assert!(from_env);
        assert_eq!(p, dir.path().join("config.xml"));
    }

    #[test]
    #[serial]
    fn default_path_ends_with_app_dir() {
        unsafe { env::remove_var(CONFIG_ENV) };
        if let Some((p, from_env)) = config_path() {
            assert!(!from_env);
            assert!(p.ends_with("junction_move/config.xml"));
        }
    }

    #[cfg(unix)]
    #[test]
    fn detects_symlinked_ancestor() {
        let dir = tempdir().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();
        let link = dir.path().join("link");
        std::os::unix::fs::symlink(&real, &link).unwrap();
        assert!(path_has_symlink_ancestor(&link.join("sub/config.xml")).unwrap());
        assert!(!path_has_symlink_ancestor(&real.join("config.xml")).unwrap());
    }
}
