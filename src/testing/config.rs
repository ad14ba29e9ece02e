//! Suite file configuration types
//!
//! Defines the data structures for deserializing YAML suite files.

use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::common::paths::resolve_relative;
use crate::common::{Error, Result};
use crate::scenarios::ControlInfo;

/// A suite of scenarios loaded from a YAML file
#[derive(Deserialize, Debug)]
pub struct Suite {
    /// Name of the suite
    pub name: String,
    /// Optional description of what the suite covers
    pub description: Option<String>,
    /// Optional configuration file overriding the user's config.toml
    pub config: Option<PathBuf>,
    /// Optional setup steps to run before any scenario (e.g., building the
    /// test programs)
    pub setup: Option<Vec<SetupStep>>,
    /// Scenarios to run, in order
    pub scenarios: Vec<SuiteEntry>,
}

/// A setup step that runs before the suite
#[derive(Deserialize, Debug)]
pub struct SetupStep {
    /// Shell command to execute
    pub shell: String,
}

/// One scenario run against one program
#[derive(Deserialize, Debug)]
pub struct SuiteEntry {
    /// Built-in scenario name (see `conformance scenarios`)
    pub scenario: String,
    /// Program under test
    pub control: ControlInfo,
    /// Event timeout override in seconds
    pub event_timeout: Option<u64>,
}

impl Suite {
    /// Load a suite, resolving relative paths against the suite file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        let mut suite = Self::parse(&content)?;

        let base = path.parent().unwrap_or(Path::new("."));
        suite.resolve_paths(base);
        Ok(suite)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let suite: Suite = serde_yaml::from_str(content)
            .map_err(|e| Error::Config(format!("Failed to parse suite: {}", e)))?;
        if suite.scenarios.is_empty() {
            return Err(Error::Config(format!("Suite '{}' has no scenarios", suite.name)));
        }
        Ok(suite)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let Some(config) = &self.config {
            self.config = Some(resolve_relative(base, config));
        }
        for entry in &mut self.scenarios {
            let control = &mut entry.control;
            control.target_assembly = resolve_relative(base, &control.target_assembly);
            control.sources_path = resolve_relative(base, &control.sources_path);
            if let Some(updates) = &control.updates {
                control.updates = Some(resolve_relative(base, updates));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SUITE: &str = r#"
name: netcoredbg MI
description: Hot reload and stepping
setup:
  - shell: dotnet build MITestStepping
scenarios:
  - scenario: stepping
    control:
      test_name: MITestStepping
      corerun: /usr/bin/dotnet
      target_assembly: MITestStepping/bin/MITestStepping.dll
      sources_path: MITestStepping/Program.cs
  - scenario: hot_reload_jmc
    event_timeout: 120
    control:
      test_name: TestAppHotReload
      corerun: /usr/bin/dotnet
      target_assembly: /abs/TestAppHotReload.dll
      sources_path: TestAppHotReload/Program.cs
      updates: TestAppHotReload/deltas
"#;

    #[test]
    fn test_parse_suite() {
        let suite = Suite::parse(SUITE).unwrap();
        assert_eq!(suite.name, "netcoredbg MI");
        assert_eq!(suite.setup.as_ref().map(Vec::len), Some(1));
        assert_eq!(suite.scenarios.len(), 2);
        assert_eq!(suite.scenarios[1].event_timeout, Some(120));
        assert!(suite.scenarios[0].event_timeout.is_none());
    }

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("suite.yaml");
        std::fs::write(&path, SUITE).unwrap();

        let suite = Suite::load(&path).unwrap();
        let stepping = &suite.scenarios[0].control;
        assert_eq!(
            stepping.target_assembly,
            dir.path().join("MITestStepping/bin/MITestStepping.dll")
        );
        // Runtime host paths are taken as given
        assert_eq!(stepping.corerun, PathBuf::from("/usr/bin/dotnet"));

        let jmc = &suite.scenarios[1].control;
        assert_eq!(jmc.target_assembly, PathBuf::from("/abs/TestAppHotReload.dll"));
        assert_eq!(jmc.updates, Some(dir.path().join("TestAppHotReload/deltas")));
    }

    #[test]
    fn test_empty_suite_is_rejected() {
        let err = Suite::parse("name: empty\nscenarios: []\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
