//! Moving delta fragments to where the debugger can read them

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::common::config::{HotReloadConfig, TransferMode};
use crate::common::{Error, Result};

/// Copies one staged fragment into a directory on the execution host
#[async_trait]
pub trait ArtifactTransfer: Send + Sync {
    /// Short name for logs
    fn name(&self) -> &str;

    /// Copy `host_path` into `target_dir`, keeping its file name
    async fn push(&self, host_path: &Path, target_dir: &Path) -> Result<()>;
}

/// Build the transfer selected in configuration
pub fn from_config(config: &HotReloadConfig) -> Box<dyn ArtifactTransfer> {
    match config.transfer {
        TransferMode::Local => Box::new(LocalCopy),
        TransferMode::Sdb => Box::new(SdbPush::new(config.sdb.clone())),
    }
}

fn fragment_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Debuggee runs on this host
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalCopy;

#[async_trait]
impl ArtifactTransfer for LocalCopy {
    fn name(&self) -> &str {
        "local"
    }

    async fn push(&self, host_path: &Path, target_dir: &Path) -> Result<()> {
        let fragment = fragment_name(host_path);
        let target = target_dir.join(&fragment);
        if target == host_path {
            return Ok(());
        }

        tokio::fs::create_dir_all(target_dir)
            .await
            .map_err(|e| Error::transfer_failed(&fragment, e))?;
        tokio::fs::copy(host_path, &target)
            .await
            .map_err(|e| Error::transfer_failed(&fragment, e))?;
        Ok(())
    }
}

/// Debuggee runs on a device reachable through `sdb push`
#[derive(Debug, Clone)]
pub struct SdbPush {
    sdb: PathBuf,
}

impl SdbPush {
    pub fn new(sdb: PathBuf) -> Self {
        Self { sdb }
    }
}

#[async_trait]
impl ArtifactTransfer for SdbPush {
    fn name(&self) -> &str {
        "sdb"
    }

    async fn push(&self, host_path: &Path, target_dir: &Path) -> Result<()> {
        if !cfg!(target_os = "linux") {
            return Err(Error::unsupported_host("sdb push"));
        }

        let fragment = fragment_name(host_path);
        let script = format!(
            "{} push {} {}",
            self.sdb.display(),
            host_path.display(),
            target_dir.display()
        );
        tracing::debug!(%script, "Pushing delta fragment");

        let output = tokio::process::Command::new("bash")
            .arg("-c")
            .arg(&script)
            .output()
            .await
            .map_err(|e| Error::transfer_failed(&fragment, e))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::transfer_failed(
                &fragment,
                format!("{} ({})", output.status, stderr.trim()),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_local_copy() {
        let host = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let fragment = host.path().join("tmp_delta1.il");
        std::fs::write(&fragment, b"il").unwrap();

        let dest = target.path().join("nested");
        LocalCopy.push(&fragment, &dest).await.unwrap();
        assert_eq!(std::fs::read(dest.join("tmp_delta1.il")).unwrap(), b"il");
    }

    #[tokio::test]
    async fn test_local_copy_missing_fragment() {
        let host = tempfile::tempdir().unwrap();
        let err = LocalCopy
            .push(&host.path().join("tmp_delta1.pdb"), host.path().join("out").as_path())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TransferFailed { fragment, .. } if fragment == "tmp_delta1.pdb"));
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_sdb_failure_is_reported() {
        let host = tempfile::tempdir().unwrap();
        let fragment = host.path().join("tmp_delta1.bin");
        std::fs::write(&fragment, b"bin").unwrap();

        // `false` ignores its arguments and exits non-zero
        let sdb = SdbPush::new(PathBuf::from("false"));
        let err = sdb.push(&fragment, Path::new("/tmp")).await.unwrap_err();
        assert!(matches!(err, Error::TransferFailed { .. }));
    }
}
