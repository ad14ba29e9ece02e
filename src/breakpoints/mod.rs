//! Breakpoint resolution validator
//!
//! Tracks every breakpoint id the debugger hands out during a session and
//! enforces the id invariants: ids strictly increase and a deleted id is
//! retired for good. Deletes of ids that were never issued fail locally,
//! without any debugger traffic.

pub mod labels;
pub mod paths;

use std::collections::{BTreeMap, HashSet};
use std::panic::Location;

use crate::common::{location_tag, Error, Result};
use crate::mi::{MiClient, MiValue, ResultClass, SyncResult};

pub use labels::LabelIndex;
pub use paths::{file_name, normalize_source_path, same_source};

/// What a breakpoint was requested on
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakpointKind {
    Line { path: String, line: u32 },
    Function { name: String },
}

/// A live breakpoint as acknowledged by the debugger
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Breakpoint {
    pub id: u32,
    pub kind: BreakpointKind,
    /// `(file, line)` the debugger resolved the request to, when reported
    pub resolved: Option<(String, u32)>,
}

/// Issues breakpoint commands and checks the ids that come back
#[derive(Debug, Default)]
pub struct BreakpointValidator {
    live: BTreeMap<u32, Breakpoint>,
    retired: HashSet<u32>,
    last_id: Option<u32>,
    inserts: u32,
    case_sensitive: bool,
}

impl BreakpointValidator {
    pub fn new(case_sensitive: bool) -> Self {
        Self {
            case_sensitive,
            ..Default::default()
        }
    }

    /// `-break-insert -f <path>:<line>`
    ///
    /// The path is passed through exactly as given; resolving it is the
    /// debugger's job.
    pub async fn set_line_breakpoint(
        &mut self,
        client: &mut MiClient,
        path: &str,
        line: u32,
    ) -> Result<u32> {
        let command = format!("-break-insert -f {}:{}", path, line);
        let result = client.request(&command, ResultClass::Done).await?;
        self.register(
            &result,
            BreakpointKind::Line {
                path: path.to_string(),
                line,
            },
        )
    }

    /// `-break-insert -f <function>`
    pub async fn set_function_breakpoint(&mut self, client: &mut MiClient, name: &str) -> Result<u32> {
        let command = format!("-break-insert -f {}", name);
        let result = client.request(&command, ResultClass::Done).await?;
        self.register(
            &result,
            BreakpointKind::Function {
                name: name.to_string(),
            },
        )
    }

    /// `-break-delete <id>`, refusing ids that are not live
    pub async fn delete(&mut self, client: &mut MiClient, id: u32) -> Result<()> {
        if !self.live.contains_key(&id) {
            return Err(Error::UnknownBreakpointId { id });
        }
        client
            .request(&format!("-break-delete {}", id), ResultClass::Done)
            .await?;
        self.live.remove(&id);
        self.retired.insert(id);
        tracing::debug!(id, "Breakpoint deleted");
        Ok(())
    }

    fn register(&mut self, result: &SyncResult, kind: BreakpointKind) -> Result<u32> {
        let bkpt = result.tuple_field("bkpt")?;
        let raw = bkpt
            .get_str("number")
            .ok_or_else(|| Error::missing_field("bkpt", "number"))?;
        let id: u32 = raw.parse().map_err(|_| Error::invalid_field("number", raw))?;

        self.check_new_id(id)?;

        let resolved = match (bkpt.get_str("file"), bkpt.get("line").and_then(MiValue::as_int)) {
            (Some(file), Some(line)) => {
                let line = u32::try_from(line).map_err(|_| Error::invalid_field("line", line))?;
                Some((file.to_string(), line))
            }
            _ => None,
        };

        tracing::debug!(id, ?kind, ?resolved, "Breakpoint inserted");
        self.inserts += 1;
        self.last_id = Some(id);
        self.live.insert(id, Breakpoint { id, kind, resolved });
        Ok(id)
    }

    fn check_new_id(&self, id: u32) -> Result<()> {
        if self.live.contains_key(&id) || self.retired.contains(&id) {
            return Err(Error::BreakpointIdReused { id });
        }
        if let Some(previous) = self.last_id {
            if id <= previous {
                return Err(Error::NonMonotonicBreakpointId { id, previous });
            }
        }
        Ok(())
    }

    /// Assert `id` equals the number of inserts so far
    ///
    /// Catches a debugger silently re-creating breakpoints behind our back.
    #[track_caller]
    pub fn expect_sequential(&self, id: u32) -> Result<()> {
        if id != self.inserts {
            return Err(Error::BreakpointIdMismatch {
                expected: self.inserts,
                actual: id,
                location: location_tag(Location::caller()),
            });
        }
        Ok(())
    }

    pub fn get(&self, id: u32) -> Option<&Breakpoint> {
        self.live.get(&id)
    }

    /// Ids currently armed, ascending
    pub fn live_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.live.keys().copied()
    }

    pub fn is_retired(&self, id: u32) -> bool {
        self.retired.contains(&id)
    }

    /// Whether a line breakpoint's requested path names `actual`
    pub fn resolves_to(&self, id: u32, actual: &str) -> bool {
        match self.live.get(&id).map(|b| &b.kind) {
            Some(BreakpointKind::Line { path, .. }) => same_source(path, actual, self.case_sensitive),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::Timeouts;
    use crate::mi::codec::decode_request;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Client whose debugger numbers breakpoints from the given sequence
    fn scripted(ids: Vec<u32>) -> MiClient {
        scripted_at(ids, "15")
    }

    /// Like [`scripted`], resolving every breakpoint to `resolved_line`
    fn scripted_at(ids: Vec<u32>, resolved_line: &'static str) -> MiClient {
        let (client_out, server_in) = tokio::io::duplex(4096);
        let (mut server_out, client_in) = tokio::io::duplex(4096);

        tokio::spawn(async move {
            let mut reader = BufReader::new(server_in);
            let mut ids = ids.into_iter();
            let mut line = String::new();
            while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
                let (token, command) = decode_request(line.trim_end());
                let token = token.unwrap_or_default();
                let reply = if command.starts_with("-break-insert") {
                    let id = ids.next().unwrap_or(99);
                    format!(
                        "{}^done,bkpt={{number=\"{}\",file=\"Program.cs\",line=\"{}\"}}\n",
                        token, id, resolved_line
                    )
                } else if command.starts_with("-break-delete") {
                    format!("{}^done\n", token)
                } else {
                    format!("{}^error,msg=\"unexpected\"\n", token)
                };
                server_out.write_all(reply.as_bytes()).await.unwrap();
                line.clear();
            }
        });

        let timeouts = Timeouts {
            request_secs: 2,
            ..Default::default()
        };
        MiClient::from_io(client_in, client_out, &timeouts)
    }

    #[tokio::test]
    async fn test_ids_and_delete() {
        let mut client = scripted(vec![1, 2, 3]);
        let mut validator = BreakpointValidator::new(false);

        let first = validator
            .set_line_breakpoint(&mut client, "./MITest/Program.cs", 15)
            .await
            .unwrap();
        validator.expect_sequential(first).unwrap();
        let second = validator
            .set_line_breakpoint(&mut client, "Program.cs", 15)
            .await
            .unwrap();
        validator.expect_sequential(second).unwrap();

        validator.delete(&mut client, first).await.unwrap();
        assert!(validator.is_retired(first));
        let err = validator.delete(&mut client, first).await.unwrap_err();
        assert!(matches!(err, Error::UnknownBreakpointId { id: 1 }));
        let err = validator.delete(&mut client, 42).await.unwrap_err();
        assert!(matches!(err, Error::UnknownBreakpointId { id: 42 }));

        let third = validator
            .set_function_breakpoint(&mut client, "App.Program.Main")
            .await
            .unwrap();
        assert_eq!(third, 3);
        assert_eq!(validator.live_ids().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(
            validator.get(2).unwrap().resolved,
            Some(("Program.cs".to_string(), 15))
        );
    }

    #[tokio::test]
    async fn test_reissued_id_is_rejected() {
        let mut client = scripted(vec![1, 1]);
        let mut validator = BreakpointValidator::new(false);

        validator.set_line_breakpoint(&mut client, "Program.cs", 15).await.unwrap();
        validator.delete(&mut client, 1).await.unwrap();
        let err = validator
            .set_line_breakpoint(&mut client, "Program.cs", 16)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BreakpointIdReused { id: 1 }));
    }

    #[tokio::test]
    async fn test_decreasing_id_is_rejected() {
        let mut client = scripted(vec![5, 3]);
        let mut validator = BreakpointValidator::new(false);

        validator.set_line_breakpoint(&mut client, "Program.cs", 15).await.unwrap();
        let err = validator
            .set_line_breakpoint(&mut client, "Program.cs", 16)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::NonMonotonicBreakpointId { id: 3, previous: 5 }
        ));
    }

    #[tokio::test]
    async fn test_expect_sequential_mismatch() {
        let mut client = scripted(vec![2]);
        let mut validator = BreakpointValidator::new(false);

        let id = validator.set_line_breakpoint(&mut client, "Program.cs", 15).await.unwrap();
        let err = validator.expect_sequential(id).unwrap_err();
        assert!(matches!(
            err,
            Error::BreakpointIdMismatch { expected: 1, actual: 2, .. }
        ));
    }

    #[tokio::test]
    async fn test_out_of_range_line_is_rejected() {
        let mut client = scripted_at(vec![1, 2], "-3");
        let mut validator = BreakpointValidator::new(false);

        let err = validator
            .set_line_breakpoint(&mut client, "Program.cs", 15)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField { ref field, .. } if field == "line"), "{err}");

        let mut client = scripted_at(vec![1], "4294967296");
        let mut validator = BreakpointValidator::new(false);
        let err = validator
            .set_line_breakpoint(&mut client, "Program.cs", 15)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidField { .. }), "{err}");
    }

    #[tokio::test]
    async fn test_resolves_to() {
        let mut client = scripted(vec![1]);
        let mut validator = BreakpointValidator::new(false);

        let id = validator
            .set_line_breakpoint(&mut client, r"..\tests\MITest\Program.cs", 15)
            .await
            .unwrap();
        assert!(validator.resolves_to(id, "/home/ci/tests/MITest/Program.cs"));
        assert!(!validator.resolves_to(id, "/home/ci/tests/Other/Program.cs"));
    }
}
