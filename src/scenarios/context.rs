//! Shared state for scenario checkpoints
//!
//! A [`Context`] owns the debugger connection and every helper a checkpoint
//! action may use. The assertion helpers are `#[track_caller]` so a failure
//! names the scenario line that made the call rather than this file.

use std::collections::HashMap;
use std::future::Future;
use std::panic::Location;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::breakpoints::{BreakpointValidator, LabelIndex};
use crate::common::config::{Config, HotReloadConfig};
use crate::common::{location_tag, Error, Result};
use crate::hot_reload::runtime;
use crate::hot_reload::{DeltaArtifactSet, DeltaSession, TransferredDeltas};
use crate::matcher::{EventMatcher, FuncMatch, Predicate, StopEvent, StopPredicate, StopReason};
use crate::mi::{MiClient, ResultClass};

/// Where the program under test lives
#[derive(Debug, Clone, Deserialize)]
pub struct ControlInfo {
    /// Namespace of the debuggee; its entry point is `<test_name>.Program.Main()`
    pub test_name: String,
    /// Runtime host handed to `-file-exec-and-symbols`
    pub corerun: PathBuf,
    /// Program handed to `-exec-arguments`
    pub target_assembly: PathBuf,
    /// Main source file; breakpoint labels are read from it
    pub sources_path: PathBuf,
    /// Updated program texts, `<updates>/<n>/<file>` for the n-th delta
    ///
    /// Defaults to `updates` next to the main source file.
    #[serde(default)]
    pub updates: Option<PathBuf>,
}

impl ControlInfo {
    /// File name breakpoints are requested with by default
    pub fn source_file_name(&self) -> String {
        self.sources_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Directory holding the main source file
    pub fn project_dir(&self) -> &Path {
        self.sources_path.parent().unwrap_or(Path::new("."))
    }

    /// Location of the n-th updated text of `file`
    pub fn update_source(&self, index: u32, file: &str) -> PathBuf {
        let root = self
            .updates
            .clone()
            .unwrap_or_else(|| self.project_dir().join("updates"));
        root.join(index.to_string()).join(file)
    }

    /// `-exec-arguments` and `-apply-deltas` name the assembly by file name
    pub fn target_assembly_name(&self) -> String {
        self.target_assembly
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Everything a checkpoint action can touch
pub struct Context {
    control: ControlInfo,
    client: MiClient,
    matcher: EventMatcher,
    breakpoints: BreakpointValidator,
    labels: Option<LabelIndex>,
    /// Breakpoint ids a later checkpoint refers back to
    remembered: HashMap<String, u32>,
    hot_reload: HotReloadConfig,
    deltas: Option<DeltaSession>,
    /// Last generated set, waiting to be transferred
    staged: Option<DeltaArtifactSet>,
    /// Last transferred set, waiting to be applied
    transferred: Option<TransferredDeltas>,
    updates_used: u32,
    debugger_exited: bool,
}

impl Context {
    pub fn new(control: ControlInfo, client: MiClient, config: &Config) -> Self {
        let matcher = EventMatcher::new(client.log(), config.timeouts.event());
        Self {
            control,
            client,
            matcher,
            breakpoints: BreakpointValidator::new(config.paths.case_sensitive),
            labels: None,
            remembered: HashMap::new(),
            hot_reload: config.hot_reload.clone(),
            deltas: None,
            staged: None,
            transferred: None,
            updates_used: 0,
            debugger_exited: false,
        }
    }

    /// Spawn the configured debugger and wrap it in a context
    pub async fn launch(control: ControlInfo, config: &Config) -> Result<Self> {
        let program = config.debugger_path()?;
        let client = MiClient::spawn(&program, &config.debugger.args, &config.timeouts).await?;
        Ok(Self::new(control, client, config))
    }

    /// Use `session` instead of building one from configuration
    pub fn with_delta_session(mut self, session: DeltaSession) -> Self {
        self.deltas = Some(session);
        self
    }

    pub fn control(&self) -> &ControlInfo {
        &self.control
    }

    pub fn client(&mut self) -> &mut MiClient {
        &mut self.client
    }

    pub fn matcher(&mut self) -> &mut EventMatcher {
        &mut self.matcher
    }

    pub fn breakpoints(&self) -> &BreakpointValidator {
        &self.breakpoints
    }

    /// Leave the debugger gone, whatever state the scenario stopped in
    pub async fn shutdown(&mut self) -> Result<()> {
        if self.debugger_exited {
            self.client.reap().await;
            return Ok(());
        }
        self.debugger_exited = true;
        self.client.shutdown().await
    }

    fn labels(&mut self) -> Result<&LabelIndex> {
        if self.labels.is_none() {
            self.labels = Some(LabelIndex::from_file(&self.control.sources_path)?);
        }
        self.labels
            .as_ref()
            .ok_or_else(|| Error::Internal("label index not loaded".to_string()))
    }

    /// Line of a `Label.Breakpoint` alias in the main source file
    pub fn label_line(&mut self, alias: &str) -> Result<u32> {
        self.labels()?.line(alias)
    }

    /// First line of the main source file holding `statement`
    pub fn statement_line(&mut self, statement: &str) -> Result<u32> {
        self.labels()?.statement_line(statement)
    }

    /// Load the program and start it
    #[track_caller]
    pub fn prepare(&mut self) -> impl Future<Output = Result<()>> + '_ {
        self.run_program(Location::caller())
    }

    /// [`prepare`](Self::prepare) with hot reload and just-my-code enabled
    #[track_caller]
    pub fn prepare_hot_reload(&mut self) -> impl Future<Output = Result<()>> + '_ {
        let location = Location::caller();
        async move {
            for option in ["-gdb-set enable-hot-reload 1", "-gdb-set just-my-code 1"] {
                self.client.request_at(option, ResultClass::Done, location).await?;
            }
            self.run_program(location).await
        }
    }

    async fn run_program(&mut self, location: &Location<'_>) -> Result<()> {
        let exec = format!("-file-exec-and-symbols {}", self.control.corerun.display());
        self.client.request_at(&exec, ResultClass::Done, location).await?;
        let args = format!("-exec-arguments {}", self.control.target_assembly.display());
        self.client.request_at(&args, ResultClass::Done, location).await?;
        self.client
            .request_at("-exec-run", ResultClass::Running, location)
            .await?;
        Ok(())
    }

    #[track_caller]
    pub fn continue_execution(&mut self) -> impl Future<Output = Result<()>> + '_ {
        self.exec("-exec-continue", Location::caller())
    }

    #[track_caller]
    pub fn step_over(&mut self) -> impl Future<Output = Result<()>> + '_ {
        self.exec("-exec-next", Location::caller())
    }

    #[track_caller]
    pub fn step_in(&mut self) -> impl Future<Output = Result<()>> + '_ {
        self.exec("-exec-step", Location::caller())
    }

    #[track_caller]
    pub fn step_out(&mut self) -> impl Future<Output = Result<()>> + '_ {
        self.exec("-exec-finish", Location::caller())
    }

    async fn exec(&mut self, command: &str, location: &Location<'_>) -> Result<()> {
        self.client
            .request_at(command, ResultClass::Running, location)
            .await?;
        Ok(())
    }

    /// `-gdb-exit`, answered with `^exit`
    #[track_caller]
    pub fn debugger_exit(&mut self) -> impl Future<Output = Result<()>> + '_ {
        let location = Location::caller();
        async move {
            self.debugger_exited = true;
            self.client
                .request_at("-gdb-exit", ResultClass::Exit, location)
                .await?;
            Ok(())
        }
    }

    /// Break at a label, requested by the main source's file name
    #[track_caller]
    pub fn enable_breakpoint<'a>(&'a mut self, alias: &'a str) -> impl Future<Output = Result<u32>> + 'a {
        let location = Location::caller();
        async move {
            let path = self.control.source_file_name();
            self.enable_breakpoint_inner(alias, &path, location).await
        }
    }

    /// Break at a label, requesting the source under a different spelling
    #[track_caller]
    pub fn enable_breakpoint_as<'a>(
        &'a mut self,
        alias: &'a str,
        path: &'a str,
    ) -> impl Future<Output = Result<u32>> + 'a {
        let location = Location::caller();
        self.enable_breakpoint_inner(alias, path, location)
    }

    async fn enable_breakpoint_inner(
        &mut self,
        alias: &str,
        path: &str,
        location: &'static Location<'static>,
    ) -> Result<u32> {
        let line = self.label_line(alias)?;
        let id = self.enable_line_breakpoint_at(path, line, location).await?;
        tracing::debug!(alias, id, line, "Breakpoint enabled");
        Ok(id)
    }

    /// Break at an explicit `file:line`
    #[track_caller]
    pub fn enable_line_breakpoint<'a>(
        &'a mut self,
        path: &'a str,
        line: u32,
    ) -> impl Future<Output = Result<u32>> + 'a {
        let location = Location::caller();
        self.enable_line_breakpoint_at(path, line, location)
    }

    async fn enable_line_breakpoint_at(
        &mut self,
        path: &str,
        line: u32,
        location: &'static Location<'static>,
    ) -> Result<u32> {
        let id = self
            .breakpoints
            .set_line_breakpoint(&mut self.client, path, line)
            .await
            .map_err(|e| relocate(e, location))?;
        self.expect_sequential_at(id, location)?;
        Ok(id)
    }

    /// Break on entry to a function
    #[track_caller]
    pub fn enable_function_breakpoint<'a>(
        &'a mut self,
        name: &'a str,
    ) -> impl Future<Output = Result<u32>> + 'a {
        let location = Location::caller();
        async move {
            let id = self
                .breakpoints
                .set_function_breakpoint(&mut self.client, name)
                .await
                .map_err(|e| relocate(e, location))?;
            self.expect_sequential_at(id, location)?;
            Ok(id)
        }
    }

    fn expect_sequential_at(&self, id: u32, location: &Location<'_>) -> Result<()> {
        match self.breakpoints.expect_sequential(id) {
            Err(Error::BreakpointIdMismatch { expected, actual, .. }) => Err(Error::BreakpointIdMismatch {
                expected,
                actual,
                location: location_tag(location),
            }),
            other => other,
        }
    }

    #[track_caller]
    pub fn delete_breakpoint(&mut self, id: u32) -> impl Future<Output = Result<()>> + '_ {
        let location = Location::caller();
        async move {
            self.breakpoints
                .delete(&mut self.client, id)
                .await
                .map_err(|e| relocate(e, location))
        }
    }

    pub fn remember(&mut self, name: &str, id: u32) {
        self.remembered.insert(name.to_string(), id);
    }

    pub fn remembered(&self, name: &str) -> Result<u32> {
        self.remembered
            .get(name)
            .copied()
            .ok_or_else(|| Error::TestAssertion(format!("no breakpoint remembered as '{}'", name)))
    }

    /// Line the debugger reported for a breakpoint when it resolved
    pub fn resolved_line(&self, id: u32) -> Result<Option<u32>> {
        let bp = self
            .breakpoints
            .get(id)
            .ok_or(Error::UnknownBreakpointId { id })?;
        Ok(bp.resolved.as_ref().map(|(_, line)| *line))
    }

    #[track_caller]
    pub fn was_entry_point_hit(&mut self) -> impl Future<Output = Result<()>> + '_ {
        let location = Location::caller();
        async move {
            let main = format!("{}.Program.Main()", self.control.test_name);
            let predicate = StopPredicate::entry_point().func(FuncMatch::Exact(main));
            self.matcher.expect_at(&predicate, location).await?;
            Ok(())
        }
    }

    /// A breakpoint stop on the line of `alias`
    #[track_caller]
    pub fn was_breakpoint_hit<'a>(&'a mut self, alias: &'a str) -> impl Future<Output = Result<()>> + 'a {
        let location = Location::caller();
        async move {
            let line = self.label_line(alias)?;
            let file = self.control.source_file_name();
            let predicate = StopPredicate::breakpoint_hit().at(file, line);
            self.matcher.expect_at(&predicate, location).await?;
            Ok(())
        }
    }

    /// A breakpoint stop at an explicit `file:line`
    #[track_caller]
    pub fn was_line_breakpoint_hit<'a>(
        &'a mut self,
        file: &'a str,
        line: u32,
    ) -> impl Future<Output = Result<()>> + 'a {
        let location = Location::caller();
        async move {
            let predicate = StopPredicate::breakpoint_hit().at(file, line);
            self.matcher.expect_at(&predicate, location).await?;
            Ok(())
        }
    }

    /// The very next stop must be a breakpoint hit on the line of `alias`
    ///
    /// Stricter than [`was_breakpoint_hit`](Self::was_breakpoint_hit): a
    /// duplicate stop in between fails instead of being skipped.
    #[track_caller]
    pub fn next_stop_is_breakpoint<'a>(
        &'a mut self,
        alias: &'a str,
    ) -> impl Future<Output = Result<()>> + 'a {
        let location = Location::caller();
        async move {
            let line = self.label_line(alias)?;
            let file = self.control.source_file_name();
            let record = self.matcher.expect_at(&StopPredicate::new(), location).await?;
            let expected = StopPredicate::breakpoint_hit().at(file, line);
            if !expected.matches(&record)? {
                return Err(Error::TestAssertion(format!(
                    "expected {} at {}, next stop was {}",
                    expected.describe(),
                    location_tag(location),
                    record
                )));
            }
            Ok(())
        }
    }

    /// A step ending on `line`
    #[track_caller]
    pub fn was_step(&mut self, line: u32) -> impl Future<Output = Result<()>> + '_ {
        let location = Location::caller();
        async move {
            let predicate = StopPredicate::step_end().line(line);
            self.matcher.expect_at(&predicate, location).await?;
            Ok(())
        }
    }

    /// A step ending on `line` inside a method tagged as outdated code
    #[track_caller]
    pub fn was_step_in_outdated_code(&mut self, line: u32) -> impl Future<Output = Result<()>> + '_ {
        let location = Location::caller();
        async move {
            let predicate = StopPredicate::outdated_step().line(line);
            self.matcher.expect_at(&predicate, location).await?;
            Ok(())
        }
    }

    /// Process exit with code 0
    ///
    /// Any exit is claimed, so a non-zero code fails right away instead of
    /// waiting out the event timeout.
    #[track_caller]
    pub fn was_exit(&mut self) -> impl Future<Output = Result<()>> + '_ {
        let location = Location::caller();
        async move {
            let predicate = StopPredicate::new().reason(StopReason::Exited);
            let record = self.matcher.expect_at(&predicate, location).await?;
            let actual = StopEvent::from_record(&record)
                .ok_or_else(|| Error::Internal(format!("{} is not a stop", record)))?
                .exit_code()?;
            if actual != 0 {
                return Err(Error::ExitCode {
                    expected: 0,
                    actual,
                    location: location_tag(location),
                });
            }
            Ok(())
        }
    }

    pub async fn check_host_runtime_version(&mut self) -> Result<()> {
        let version = runtime::check_host_runtime(&self.hot_reload.runtime).await?;
        tracing::info!(%version, "Host runtime supports hot reload");
        Ok(())
    }

    pub fn check_host_os(&self) -> Result<()> {
        runtime::check_host_os(self.hot_reload.transfer)
    }

    /// Must run after the debuggee stopped at its entry point
    pub async fn check_target_runtime_version(&mut self) -> Result<()> {
        runtime::check_target_runtime(&mut self.client).await
    }

    pub async fn start_delta_session(&mut self) -> Result<()> {
        if self.deltas.is_none() {
            self.deltas = Some(DeltaSession::from_config(&self.hot_reload)?);
        }
        let project_dir = self.control.project_dir().to_path_buf();
        self.session()?.start(&project_dir).await
    }

    fn session(&mut self) -> Result<&mut DeltaSession> {
        self.deltas.as_mut().ok_or(Error::SessionNotOpen)
    }

    /// Generate a delta from the next updated text of `file`
    pub async fn get_delta(&mut self, file: &str) -> Result<()> {
        let index = self.updates_used + 1;
        let path = self.control.update_source(index, file);
        let source = tokio::fs::read_to_string(&path)
            .await
            .map_err(|e| Error::FileRead {
                path: path.display().to_string(),
                error: e.to_string(),
            })?;

        let set = self.session()?.generate_delta(&source, file).await?;
        self.updates_used = index;
        self.staged = Some(set);
        Ok(())
    }

    /// Copy the staged delta named `base` to the execution host
    pub async fn write_deltas(&mut self, base: &str) -> Result<()> {
        let set = match self.staged.take() {
            Some(set) if set.base_name() == base => set,
            Some(set) => {
                return Err(Error::TestAssertion(format!(
                    "staged delta is {}, not {}",
                    set.base_name(),
                    base
                )))
            }
            None => return Err(Error::TestAssertion(format!("no delta staged for {}", base))),
        };
        let target_dir = self.hot_reload.target_dir.clone();
        let transferred = self.session()?.transfer(&set, &target_dir).await?;
        self.transferred = Some(transferred);
        Ok(())
    }

    /// Apply the transferred delta named `base`
    #[track_caller]
    pub fn apply_deltas<'a>(&'a mut self, base: &'a str) -> impl Future<Output = Result<()>> + 'a {
        let location = Location::caller();
        async move {
            let deltas = match self.transferred.take() {
                Some(deltas) if deltas.base_name() == base => deltas,
                _ => {
                    return Err(Error::TestAssertion(format!(
                        "delta {} was not transferred",
                        base
                    )))
                }
            };
            let assembly = self.control.target_assembly_name();
            let session = self.deltas.as_ref().ok_or(Error::SessionNotOpen)?;
            session
                .apply(&mut self.client, &assembly, &deltas)
                .await
                .map_err(|e| relocate(e, location))?;
            Ok(())
        }
    }

    pub async fn end_delta_session(&mut self) -> Result<()> {
        self.session()?.end().await
    }
}

/// Point a request failure at the scenario line instead of the helper
fn relocate(error: Error, location: &Location<'_>) -> Error {
    match error {
        Error::UnexpectedResultClass {
            command,
            expected,
            actual,
            message,
            ..
        } => Error::UnexpectedResultClass {
            command,
            expected,
            actual,
            message,
            location: location_tag(location),
        },
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn control() -> ControlInfo {
        ControlInfo {
            test_name: "MITestStepping".to_string(),
            corerun: PathBuf::from("/usr/bin/dotnet"),
            target_assembly: PathBuf::from("/work/MITestStepping/bin/MITestStepping.dll"),
            sources_path: PathBuf::from("/work/MITestStepping/Program.cs"),
            updates: None,
        }
    }

    #[test]
    fn test_control_paths() {
        let control = control();
        assert_eq!(control.source_file_name(), "Program.cs");
        assert_eq!(control.project_dir(), Path::new("/work/MITestStepping"));
        assert_eq!(control.target_assembly_name(), "MITestStepping.dll");
        assert_eq!(
            control.update_source(2, "Program.cs"),
            PathBuf::from("/work/MITestStepping/updates/2/Program.cs")
        );
    }

    #[test]
    fn test_control_from_yaml() {
        let control: ControlInfo = serde_yaml::from_str(
            r#"
test_name: TestAppHotReload
corerun: /usr/bin/dotnet
target_assembly: /work/TestAppHotReload.dll
sources_path: /work/src/Program.cs
updates: /work/deltas
"#,
        )
        .unwrap();
        assert_eq!(
            control.update_source(1, "Program.cs"),
            PathBuf::from("/work/deltas/1/Program.cs")
        );
    }

    #[test]
    fn test_relocate_rewrites_location() {
        let err = Error::UnexpectedResultClass {
            command: "-exec-step".to_string(),
            expected: "running".to_string(),
            actual: "error".to_string(),
            message: None,
            location: "src/scenarios/context.rs:1".to_string(),
        };
        let here = Location::caller();
        match relocate(err, here) {
            Error::UnexpectedResultClass { location, .. } => {
                assert!(location.starts_with(here.file()));
            }
            other => panic!("Expected UnexpectedResultClass, got {other:?}"),
        }
    }
}
