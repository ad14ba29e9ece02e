//! Hot reload delta session
//!
//! Drives the generate → transfer → apply sub-protocol:
//!
//! 1. [`DeltaSession::start`] pins the project being edited
//! 2. [`DeltaSession::generate_delta`] stages the four fragments on this host
//! 3. [`DeltaSession::transfer`] copies them to the execution host
//! 4. [`DeltaSession::apply`] asks the debugger to apply them
//! 5. [`DeltaSession::end`] closes the session
//!
//! Only a completely transferred set yields [`TransferredDeltas`], so a
//! partial set can never reach `apply`.

pub mod generator;
pub mod runtime;
pub mod transfer;

use std::fmt;
use std::path::{Path, PathBuf};

use crate::common::config::HotReloadConfig;
use crate::common::{Error, Result};
use crate::mi::{MiClient, ResultClass, SyncResult};

pub use generator::{CommandDeltaGenerator, DeltaGenerator};
pub use transfer::{ArtifactTransfer, LocalCopy, SdbPush};

/// Prefix of auto-numbered fragment base names
const BASE_PREFIX: &str = "tmp_delta";

/// One of the four files making up a delta
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fragment {
    Metadata,
    Il,
    Pdb,
    Bin,
}

impl Fragment {
    /// In the order `-apply-deltas` takes them
    pub const ALL: [Fragment; 4] = [Self::Metadata, Self::Il, Self::Pdb, Self::Bin];

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Il => "il",
            Self::Pdb => "pdb",
            Self::Bin => "bin",
        }
    }

    /// `<base>.<extension>`
    pub fn path(&self, base: &Path) -> PathBuf {
        let mut name = base.as_os_str().to_owned();
        name.push(".");
        name.push(self.extension());
        PathBuf::from(name)
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Fragments staged on this host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaArtifactSet {
    base_name: String,
    host_base: PathBuf,
}

impl DeltaArtifactSet {
    /// e.g. `tmp_delta1`
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn host_path(&self, fragment: Fragment) -> PathBuf {
        fragment.path(&self.host_base)
    }
}

/// Fragments present on the execution host, ready to apply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferredDeltas {
    base_name: String,
    target_base: PathBuf,
}

impl TransferredDeltas {
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn target_path(&self, fragment: Fragment) -> PathBuf {
        fragment.path(&self.target_base)
    }

    /// `-apply-deltas <assembly> <metadata> <il> <pdb> <bin>`
    pub fn apply_command(&self, target_assembly: &str) -> String {
        let mut command = format!("-apply-deltas {}", target_assembly);
        for fragment in Fragment::ALL {
            command.push(' ');
            command.push_str(&self.target_path(fragment).display().to_string());
        }
        command
    }
}

/// Stateful generate/transfer/apply sequence for one project
pub struct DeltaSession {
    generator: Box<dyn DeltaGenerator>,
    transfer: Box<dyn ArtifactTransfer>,
    staging_dir: PathBuf,
    /// Set while a session is open
    project_dir: Option<PathBuf>,
    /// Deltas generated so far; names each staged set
    generated: u32,
}

impl DeltaSession {
    pub fn new(
        generator: Box<dyn DeltaGenerator>,
        transfer: Box<dyn ArtifactTransfer>,
        staging_dir: PathBuf,
    ) -> Self {
        Self {
            generator,
            transfer,
            staging_dir,
            project_dir: None,
            generated: 0,
        }
    }

    /// Session using the configured external generator and transfer
    pub fn from_config(config: &HotReloadConfig) -> Result<Self> {
        Ok(Self::new(
            Box::new(CommandDeltaGenerator::from_config(config)?),
            transfer::from_config(config),
            config.staging_dir.clone(),
        ))
    }

    pub fn is_open(&self) -> bool {
        self.project_dir.is_some()
    }

    fn require_open(&self) -> Result<&Path> {
        self.project_dir.as_deref().ok_or(Error::SessionNotOpen)
    }

    /// Open a session for the project in `project_dir`
    pub async fn start(&mut self, project_dir: &Path) -> Result<()> {
        if self.is_open() {
            return Err(Error::SessionAlreadyOpen);
        }
        if !project_dir.is_dir() {
            return Err(Error::InvalidProjectDirectory(
                project_dir.display().to_string(),
            ));
        }

        self.generator.start(project_dir).await?;
        self.project_dir = Some(project_dir.to_path_buf());
        tracing::info!(project = %project_dir.display(), "Delta session started");
        Ok(())
    }

    /// Compile `updated_source` as the new `file_name` and stage the result
    pub async fn generate_delta(
        &mut self,
        updated_source: &str,
        file_name: &str,
    ) -> Result<DeltaArtifactSet> {
        self.require_open()?;

        let base_name = format!("{}{}", BASE_PREFIX, self.generated + 1);
        let host_base = self.staging_dir.join(&base_name);
        tokio::fs::create_dir_all(&self.staging_dir).await?;
        // Leftovers from an earlier run must not pass for fresh output
        for fragment in Fragment::ALL {
            match tokio::fs::remove_file(fragment.path(&host_base)).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        self.generator
            .generate(updated_source, file_name, &host_base)
            .await?;
        self.generated += 1;

        tracing::info!(base = %base_name, file_name, "Delta generated");
        Ok(DeltaArtifactSet {
            base_name,
            host_base,
        })
    }

    /// Copy every fragment of `set` into `target_dir`
    ///
    /// Stops at the first failing fragment; the set then stays unapplyable.
    pub async fn transfer(
        &self,
        set: &DeltaArtifactSet,
        target_dir: &Path,
    ) -> Result<TransferredDeltas> {
        self.require_open()?;

        for fragment in Fragment::ALL {
            let host_path = set.host_path(fragment);
            tracing::debug!(
                via = self.transfer.name(),
                fragment = %host_path.display(),
                target = %target_dir.display(),
                "Transferring"
            );
            self.transfer.push(&host_path, target_dir).await?;
        }

        Ok(TransferredDeltas {
            base_name: set.base_name.clone(),
            target_base: target_dir.join(&set.base_name),
        })
    }

    /// Have the debugger apply a transferred set to `target_assembly`
    pub async fn apply(
        &self,
        client: &mut MiClient,
        target_assembly: &str,
        deltas: &TransferredDeltas,
    ) -> Result<SyncResult> {
        self.require_open()?;
        let command = deltas.apply_command(target_assembly);
        let result = client.request(&command, ResultClass::Done).await?;
        tracing::info!(base = deltas.base_name(), "Delta applied");
        Ok(result)
    }

    /// Close the session
    pub async fn end(&mut self) -> Result<()> {
        self.require_open()?;
        self.generator.end().await?;
        self.project_dir = None;
        tracing::info!("Delta session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    /// Writes the source verbatim as every fragment
    #[derive(Default)]
    struct EchoGenerator;

    #[async_trait]
    impl DeltaGenerator for EchoGenerator {
        async fn start(&mut self, _project_dir: &Path) -> Result<()> {
            Ok(())
        }

        async fn generate(&mut self, source: &str, file_name: &str, output_base: &Path) -> Result<()> {
            if source.contains("syntax error") {
                return Err(Error::DeltaGeneration {
                    file: file_name.to_string(),
                    reason: "CS1002".to_string(),
                });
            }
            for fragment in Fragment::ALL {
                std::fs::write(fragment.path(output_base), source)?;
            }
            Ok(())
        }

        async fn end(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Writes only the metadata fragment
    struct MetadataOnly;

    #[async_trait]
    impl DeltaGenerator for MetadataOnly {
        async fn start(&mut self, _project_dir: &Path) -> Result<()> {
            Ok(())
        }

        async fn generate(&mut self, source: &str, _file_name: &str, output_base: &Path) -> Result<()> {
            std::fs::write(Fragment::Metadata.path(output_base), source)?;
            Ok(())
        }

        async fn end(&mut self) -> Result<()> {
            Ok(())
        }
    }

    /// Fails on one fragment kind
    struct FlakyTransfer(Fragment);

    #[async_trait]
    impl ArtifactTransfer for FlakyTransfer {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn push(&self, host_path: &Path, target_dir: &Path) -> Result<()> {
            let ext = host_path.extension().and_then(|e| e.to_str()).unwrap_or_default();
            if ext == self.0.extension() {
                return Err(Error::transfer_failed(host_path.display(), "device offline"));
            }
            LocalCopy.push(host_path, target_dir).await
        }
    }

    fn session(staging: &Path) -> DeltaSession {
        DeltaSession::new(
            Box::new(EchoGenerator),
            Box::new(LocalCopy),
            staging.to_path_buf(),
        )
    }

    #[tokio::test]
    async fn test_operations_require_open_session() {
        let staging = tempfile::tempdir().unwrap();
        let mut session = session(staging.path());

        assert!(matches!(
            session.generate_delta("x", "Program.cs").await,
            Err(Error::SessionNotOpen)
        ));
        assert!(matches!(session.end().await, Err(Error::SessionNotOpen)));

        session.start(staging.path()).await.unwrap();
        assert!(matches!(
            session.start(staging.path()).await,
            Err(Error::SessionAlreadyOpen)
        ));
        session.end().await.unwrap();
        assert!(matches!(
            session.generate_delta("x", "Program.cs").await,
            Err(Error::SessionNotOpen)
        ));
    }

    #[tokio::test]
    async fn test_invalid_project_directory() {
        let staging = tempfile::tempdir().unwrap();
        let mut session = session(staging.path());
        let missing = staging.path().join("no-such-project");
        assert!(matches!(
            session.start(&missing).await,
            Err(Error::InvalidProjectDirectory(_))
        ));
        assert!(!session.is_open());
    }

    #[tokio::test]
    async fn test_generate_and_transfer() {
        let staging = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let mut session = session(staging.path());
        session.start(staging.path()).await.unwrap();

        let first = session.generate_delta("v1", "Program.cs").await.unwrap();
        let second = session.generate_delta("v2", "Program.cs").await.unwrap();
        assert_eq!(first.base_name(), "tmp_delta1");
        assert_eq!(second.base_name(), "tmp_delta2");

        let moved = session.transfer(&second, target.path()).await.unwrap();
        for fragment in Fragment::ALL {
            let content = std::fs::read_to_string(moved.target_path(fragment)).unwrap();
            assert_eq!(content, "v2");
        }

        let command = moved.apply_command("TestApp.dll");
        let base = target.path().join("tmp_delta2");
        assert_eq!(
            command,
            format!(
                "-apply-deltas TestApp.dll {0}.metadata {0}.il {0}.pdb {0}.bin",
                base.display()
            )
        );
    }

    #[tokio::test]
    async fn test_generation_failure_does_not_consume_name() {
        let staging = tempfile::tempdir().unwrap();
        let mut session = session(staging.path());
        session.start(staging.path()).await.unwrap();

        let err = session
            .generate_delta("syntax error", "Program.cs")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DeltaGeneration { .. }));
        let set = session.generate_delta("ok", "Program.cs").await.unwrap();
        assert_eq!(set.base_name(), "tmp_delta1");
    }

    #[tokio::test]
    async fn test_stale_fragments_are_removed_before_generation() {
        let staging = tempfile::tempdir().unwrap();
        for fragment in Fragment::ALL {
            std::fs::write(fragment.path(&staging.path().join("tmp_delta1")), "old").unwrap();
        }
        let mut session = DeltaSession::new(
            Box::new(MetadataOnly),
            Box::new(LocalCopy),
            staging.path().to_path_buf(),
        );
        session.start(staging.path()).await.unwrap();

        let set = session.generate_delta("new", "Program.cs").await.unwrap();
        let metadata = std::fs::read_to_string(set.host_path(Fragment::Metadata)).unwrap();
        assert_eq!(metadata, "new");
        for fragment in [Fragment::Il, Fragment::Pdb, Fragment::Bin] {
            assert!(!set.host_path(fragment).exists(), "{fragment} survived");
        }
    }

    #[tokio::test]
    async fn test_partial_transfer_fails_whole_set() {
        let staging = tempfile::tempdir().unwrap();
        let target = tempfile::tempdir().unwrap();
        let mut session = DeltaSession::new(
            Box::new(EchoGenerator),
            Box::new(FlakyTransfer(Fragment::Pdb)),
            staging.path().to_path_buf(),
        );
        session.start(staging.path()).await.unwrap();
        let set = session.generate_delta("v1", "Program.cs").await.unwrap();

        let err = session.transfer(&set, target.path()).await.unwrap_err();
        assert!(matches!(err, Error::TransferFailed { .. }));
        // Fragments before the failure were copied, those after were not
        assert!(target.path().join("tmp_delta1.il").exists());
        assert!(!target.path().join("tmp_delta1.bin").exists());
    }

    #[tokio::test]
    async fn test_command_generator_reports_tool_failure() {
        let staging = tempfile::tempdir().unwrap();
        let mut session = DeltaSession::new(
            Box::new(CommandDeltaGenerator::new(
                PathBuf::from("/nonexistent/delta-tool"),
                Vec::new(),
            )),
            Box::new(LocalCopy),
            staging.path().to_path_buf(),
        );
        session.start(staging.path()).await.unwrap();

        let err = session.generate_delta("class A {}", "Program.cs").await.unwrap_err();
        assert!(matches!(err, Error::DeltaGeneration { file, .. } if file == "Program.cs"));
    }
}
