//! Configuration file handling

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::paths::config_path;
use super::Result;

/// Name of the debugger looked up in PATH when none is configured
const DEFAULT_DEBUGGER: &str = "netcoredbg";

/// Main configuration structure
#[derive(Debug, Deserialize, Default, Clone)]
pub struct Config {
    /// Debugger under test
    #[serde(default)]
    pub debugger: DebuggerConfig,

    /// Timeout settings
    #[serde(default)]
    pub timeouts: Timeouts,

    /// Hot reload tooling
    #[serde(default)]
    pub hot_reload: HotReloadConfig,

    /// Breakpoint path matching
    #[serde(default)]
    pub paths: PathMatching,
}

/// Configuration for the debugger subprocess
#[derive(Debug, Deserialize, Clone)]
pub struct DebuggerConfig {
    /// Path to the debugger executable (PATH lookup when absent)
    pub path: Option<PathBuf>,

    /// Arguments selecting the MI interpreter
    #[serde(default = "default_debugger_args")]
    pub args: Vec<String>,
}

impl Default for DebuggerConfig {
    fn default() -> Self {
        Self {
            path: None,
            args: default_debugger_args(),
        }
    }
}

fn default_debugger_args() -> Vec<String> {
    vec!["--interpreter=mi".to_string()]
}

/// Timeout settings in seconds
#[derive(Debug, Deserialize, Clone)]
pub struct Timeouts {
    /// Timeout for a single MI request to be answered
    #[serde(default = "default_request")]
    pub request_secs: u64,

    /// Timeout for an asserted event to arrive
    #[serde(default = "default_event")]
    pub event_secs: u64,

    /// Grace period for the debugger to exit after -gdb-exit
    #[serde(default = "default_shutdown")]
    pub shutdown_secs: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            request_secs: default_request(),
            event_secs: default_event(),
            shutdown_secs: default_shutdown(),
        }
    }
}

fn default_request() -> u64 {
    30
}
fn default_event() -> u64 {
    60
}
fn default_shutdown() -> u64 {
    5
}

impl Timeouts {
    pub fn request(&self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    pub fn event(&self) -> Duration {
        Duration::from_secs(self.event_secs)
    }

    pub fn shutdown(&self) -> Duration {
        Duration::from_secs(self.shutdown_secs)
    }
}

/// How delta artifacts are transferred to the execution host
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum TransferMode {
    /// Debuggee runs on this host; fragments are copied locally
    #[default]
    Local,
    /// Debuggee runs on a device reachable through `sdb push`
    Sdb,
}

/// Hot reload tooling configuration
#[derive(Debug, Deserialize, Clone)]
pub struct HotReloadConfig {
    /// External delta generator executable
    pub generator: Option<PathBuf>,

    /// Runtime host queried for its version before any delta is generated
    #[serde(default = "default_runtime")]
    pub runtime: PathBuf,

    /// Extra arguments passed to the generator before the per-call ones
    #[serde(default)]
    pub generator_args: Vec<String>,

    /// Transfer mode for generated fragments
    #[serde(default)]
    pub transfer: TransferMode,

    /// Path to the sdb tool (sdb transfer mode)
    #[serde(default = "default_sdb")]
    pub sdb: PathBuf,

    /// Host directory where fragments are staged
    #[serde(default = "default_staging_dir")]
    pub staging_dir: PathBuf,

    /// Directory on the execution host the debugger reads fragments from
    #[serde(default = "default_target_dir")]
    pub target_dir: PathBuf,
}

impl Default for HotReloadConfig {
    fn default() -> Self {
        Self {
            generator: None,
            runtime: default_runtime(),
            generator_args: Vec::new(),
            transfer: TransferMode::default(),
            sdb: default_sdb(),
            staging_dir: default_staging_dir(),
            target_dir: default_target_dir(),
        }
    }
}

fn default_runtime() -> PathBuf {
    PathBuf::from("dotnet")
}
fn default_sdb() -> PathBuf {
    PathBuf::from("sdb")
}
fn default_staging_dir() -> PathBuf {
    PathBuf::from("/tmp")
}
fn default_target_dir() -> PathBuf {
    PathBuf::from("/tmp")
}

/// Source path matching rules for breakpoint aliases
#[derive(Debug, Deserialize, Clone, Default)]
pub struct PathMatching {
    /// Compare path segments case-sensitively
    #[serde(default)]
    pub case_sensitive: bool,
}

impl Config {
    /// Load configuration from the default config file
    ///
    /// Returns default configuration if file doesn't exist
    pub fn load() -> Result<Self> {
        if let Some(path) = config_path() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }
        Ok(Self::default())
    }

    /// Load configuration from an explicit file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| super::Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| super::Error::ConfigParse(e.to_string()))
    }

    /// Resolve the debugger executable
    ///
    /// Falls back to searching PATH if not explicitly configured
    pub fn debugger_path(&self) -> Result<PathBuf> {
        if let Some(path) = &self.debugger.path {
            return Ok(path.clone());
        }

        which::which(DEFAULT_DEBUGGER).map_err(|_| {
            super::Error::Config(format!(
                "Debugger not configured and '{}' not found in PATH",
                DEFAULT_DEBUGGER
            ))
        })
    }
}
