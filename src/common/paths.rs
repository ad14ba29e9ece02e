//! Configuration and staging paths
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/debugger-conformance/`
//! - macOS: `~/Library/Application Support/debugger-conformance/`
//! - Windows: `%APPDATA%\debugger-conformance\`

use std::io;
use std::path::{Path, PathBuf};

/// Application name used for config and data directories
const APP_NAME: &str = "debugger-conformance";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the configuration file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

/// Get the path to the log directory
pub fn log_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.data_dir().join("logs"))
}

/// Ensure a staging directory exists before fragments are written to it
pub fn ensure_dir(dir: &Path) -> io::Result<PathBuf> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)?;
    }
    Ok(dir.to_path_buf())
}

/// Resolve `path` against `base` when it is relative
pub fn resolve_relative(base: &Path, path: &Path) -> PathBuf {
    if path.is_relative() {
        base.join(path)
    } else {
        path.to_path_buf()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_toml() {
        if let Some(path) = config_path() {
            assert_eq!(path.file_name().unwrap(), "config.toml");
        }
    }

    #[test]
    fn test_resolve_relative() {
        let base = Path::new("/suites");
        assert_eq!(
            resolve_relative(base, Path::new("bin/app.dll")),
            PathBuf::from("/suites/bin/app.dll")
        );
        assert_eq!(
            resolve_relative(base, Path::new("/abs/app.dll")),
            PathBuf::from("/abs/app.dll")
        );
    }

    #[test]
    fn test_ensure_dir_creates_nested() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a").join("b");
        ensure_dir(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
