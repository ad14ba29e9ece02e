//! Hot reload prerequisites on the host and in the debuggee

use std::path::Path;

use semver::Version;

use crate::common::config::TransferMode;
use crate::common::{Error, Result};
use crate::mi::{MiClient, ResultClass};

/// First runtime major version with metadata update support
pub const MIN_RUNTIME_MAJOR: u64 = 6;

/// Expression the debuggee evaluates to confirm its own runtime version
const TARGET_VERSION_CHECK: &str = "System.Environment.Version.Major>=6";

/// Extracts the SDK version from `dotnet --version` output
///
/// Tolerates trailing noise such as build metadata on the same line.
pub fn parse_runtime_version(output: &str) -> Option<Version> {
    let token = output.lines().next()?.split_whitespace().next()?;
    Version::parse(token).ok()
}

/// Checks if a runtime version supports applying deltas (≥6.0)
pub fn is_runtime_sufficient(version: &Version) -> bool {
    version.major >= MIN_RUNTIME_MAJOR
}

/// Retrieves the runtime version by executing `--version`
///
/// Returns None on exec failure or unparseable output
pub async fn get_runtime_version(dotnet: &Path) -> Option<Version> {
    let output = tokio::process::Command::new(dotnet)
        .arg("--version")
        .output()
        .await
        .ok()?;

    if output.status.success() {
        parse_runtime_version(&String::from_utf8_lossy(&output.stdout))
    } else {
        None
    }
}

/// Fail unless the host runtime can generate deltas
pub async fn check_host_runtime(dotnet: &Path) -> Result<Version> {
    let version = get_runtime_version(dotnet).await.ok_or_else(|| {
        Error::Config(format!(
            "could not determine runtime version from '{} --version'",
            dotnet.display()
        ))
    })?;

    if !is_runtime_sufficient(&version) {
        return Err(Error::UnsupportedHost {
            operation: "hot reload".to_string(),
            host: format!("runtime {}", version),
        });
    }
    Ok(version)
}

/// Fail unless this host can run the configured transfer
pub fn check_host_os(mode: TransferMode) -> Result<()> {
    match mode {
        TransferMode::Local => Ok(()),
        TransferMode::Sdb if cfg!(target_os = "linux") => Ok(()),
        TransferMode::Sdb => Err(Error::unsupported_host("sdb push")),
    }
}

/// Ask the stopped debuggee whether its runtime supports hot reload
///
/// Only meaningful once the process has started and stopped at entry.
pub async fn check_target_runtime(client: &mut MiClient) -> Result<()> {
    let command = format!("-var-create - * {}", TARGET_VERSION_CHECK);
    let result = client.request(&command, ResultClass::Done).await?;
    let value = result.str_field("value")?;
    if value != "true" {
        return Err(Error::TestAssertion(format!(
            "target runtime does not support hot reload ({} = {})",
            TARGET_VERSION_CHECK, value
        )));
    }
    Ok(())
}
