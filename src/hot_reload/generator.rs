//! Delta generation seam
//!
//! A generator turns an updated program text into the four delta fragments
//! (`<base>.metadata`, `.il`, `.pdb`, `.bin`). The orchestrator never
//! compiles anything itself.

use std::io::Write;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::common::config::HotReloadConfig;
use crate::common::{Error, Result};

use super::Fragment;

/// Produces delta fragments for a project
#[async_trait]
pub trait DeltaGenerator: Send + Sync {
    /// Begin tracking `project_dir` as the baseline
    async fn start(&mut self, project_dir: &Path) -> Result<()>;

    /// Compile `source` as the new content of `file_name` and write the
    /// fragments next to `output_base`
    async fn generate(&mut self, source: &str, file_name: &str, output_base: &Path) -> Result<()>;

    /// Drop the baseline
    async fn end(&mut self) -> Result<()>;
}

/// Runs an external delta tool once per update
///
/// The tool is invoked as
/// `<program> <args...> --project <dir> --file <name> --source <staged> --output <base>`
/// and must write every fragment before exiting successfully.
#[derive(Debug, Clone)]
pub struct CommandDeltaGenerator {
    program: PathBuf,
    args: Vec<String>,
    project_dir: Option<PathBuf>,
}

impl CommandDeltaGenerator {
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self {
            program,
            args,
            project_dir: None,
        }
    }

    pub fn from_config(config: &HotReloadConfig) -> Result<Self> {
        let program = config.generator.clone().ok_or_else(|| {
            Error::Config("hot_reload.generator is not configured".to_string())
        })?;
        Ok(Self::new(program, config.generator_args.clone()))
    }
}

#[async_trait]
impl DeltaGenerator for CommandDeltaGenerator {
    async fn start(&mut self, project_dir: &Path) -> Result<()> {
        self.project_dir = Some(project_dir.to_path_buf());
        Ok(())
    }

    async fn generate(&mut self, source: &str, file_name: &str, output_base: &Path) -> Result<()> {
        let failed = |reason: String| Error::DeltaGeneration {
            file: file_name.to_string(),
            reason,
        };

        let project_dir = self
            .project_dir
            .as_deref()
            .ok_or_else(|| failed("generator was not started".to_string()))?;

        // The tool reads the update from disk
        let mut staged = tempfile::Builder::new()
            .prefix("delta_source")
            .suffix(".cs")
            .tempfile()?;
        staged.write_all(source.as_bytes())?;
        staged.flush()?;

        tracing::debug!(
            program = %self.program.display(),
            file_name,
            output = %output_base.display(),
            "Generating delta"
        );

        let output = tokio::process::Command::new(&self.program)
            .args(&self.args)
            .arg("--project")
            .arg(project_dir)
            .arg("--file")
            .arg(file_name)
            .arg("--source")
            .arg(staged.path())
            .arg("--output")
            .arg(output_base)
            .output()
            .await
            .map_err(|e| failed(format!("failed to run {}: {}", self.program.display(), e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(failed(format!("{} ({})", output.status, stderr.trim())));
        }

        for fragment in Fragment::ALL {
            let path = fragment.path(output_base);
            if !path.is_file() {
                return Err(failed(format!("{} was not written", path.display())));
            }
        }
        Ok(())
    }

    async fn end(&mut self) -> Result<()> {
        self.project_dir = None;
        Ok(())
    }
}
