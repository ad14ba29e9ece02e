//! MI client for driving the debugger under test
//!
//! A background task owns the debugger's stdout. It routes result records to
//! the single in-flight request and appends every out-of-band record to the
//! shared [`RecordLog`], so notifications are never lost while the test task
//! is busy elsewhere.

use std::future::Future;
use std::panic::Location;
use std::path::Path;
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufReader, BufWriter};
use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::common::config::Timeouts;
use crate::common::{Error, Result};

use super::codec;
use super::log::RecordLog;
use super::types::*;

/// The request currently waiting for its result record
struct Pending {
    token: u64,
    reply: oneshot::Sender<SyncResult>,
}

/// Hand-off point between `send` and the reader task
#[derive(Default)]
struct Slot {
    pending: Option<Pending>,
    /// Set by the reader at end of stream; no reply can arrive after it
    closed: bool,
}

type PendingSlot = Arc<Mutex<Slot>>;

/// MI client for communicating with the debugger
pub struct MiClient {
    /// Debugger subprocess, absent when driving an in-memory stream
    child: Option<Child>,
    /// Buffered writer for debugger stdin
    writer: BufWriter<Box<dyn AsyncWrite + Send + Unpin>>,
    /// Next correlation token
    next_token: u64,
    /// Slot the reader task delivers the matching result into
    pending: PendingSlot,
    /// Every out-of-band record received so far
    log: Arc<RecordLog>,
    reader_task: JoinHandle<()>,
    request_timeout: Duration,
    shutdown_timeout: Duration,
}

impl MiClient {
    /// Spawn the debugger and start reading its output
    pub async fn spawn(program: &Path, args: &[String], timeouts: &Timeouts) -> Result<Self> {
        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            Error::DebuggerStartFailed(format!("Failed to start {}: {}", program.display(), e))
        })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::DebuggerStartFailed("Failed to get debugger stdin".to_string()))?;
        let stdout = child.stdout.take().ok_or_else(|| {
            Error::DebuggerStartFailed("Failed to get debugger stdout".to_string())
        })?;

        tracing::info!(program = %program.display(), ?args, "Spawned debugger");

        let mut client = Self::from_io(stdout, stdin, timeouts);
        client.child = Some(child);
        Ok(client)
    }

    /// Drive a debugger speaking MI over an arbitrary byte stream
    pub fn from_io<R, W>(reader: R, writer: W, timeouts: &Timeouts) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let log = RecordLog::new();
        let pending: PendingSlot = Arc::new(Mutex::new(Slot::default()));
        let reader_task = tokio::spawn(read_loop(
            BufReader::new(reader),
            Arc::clone(&log),
            Arc::clone(&pending),
        ));

        let writer: Box<dyn AsyncWrite + Send + Unpin> = Box::new(writer);

        Self {
            child: None,
            writer: BufWriter::new(writer),
            next_token: 1,
            pending,
            log,
            reader_task,
            request_timeout: timeouts.request(),
            shutdown_timeout: timeouts.shutdown(),
        }
    }

    /// The shared out-of-band record log
    pub fn log(&self) -> Arc<RecordLog> {
        Arc::clone(&self.log)
    }

    /// Non-destructive snapshot of every out-of-band record so far
    pub fn poll_async_records(&self) -> Vec<OutOfBandRecord> {
        self.log.snapshot()
    }

    fn next_token(&mut self) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        token
    }

    /// Send a command and wait for its result record
    pub async fn send(&mut self, command: &str) -> Result<SyncResult> {
        let token = self.next_token();
        let (tx, rx) = oneshot::channel();
        {
            let mut slot = self.pending.lock().unwrap_or_else(|e| e.into_inner());
            if slot.closed {
                return Err(Error::TransportClosed {
                    command: command.to_string(),
                });
            }
            slot.pending = Some(Pending { token, reply: tx });
        }

        tracing::debug!("MI >>> {}{}", token, command);
        if let Err(e) = codec::write_request(&mut self.writer, token, command).await {
            self.clear_pending();
            return match e {
                Error::Io(_) => Err(Error::TransportClosed {
                    command: command.to_string(),
                }),
                other => Err(other),
            };
        }

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(_)) => Err(Error::TransportClosed {
                command: command.to_string(),
            }),
            Err(_) => {
                self.clear_pending();
                tracing::warn!(command, "No reply within {:?}", self.request_timeout);
                Err(Error::Timeout(self.request_timeout.as_secs()))
            }
        }
    }

    fn clear_pending(&self) {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .pending
            .take();
    }

    /// Send a command and assert the class of its reply
    ///
    /// Failures name the caller's location.
    #[track_caller]
    pub fn request<'a>(
        &'a mut self,
        command: &'a str,
        expected: ResultClass,
    ) -> impl Future<Output = Result<SyncResult>> + 'a {
        self.request_at(command, expected, Location::caller())
    }

    /// [`request`](Self::request) reporting an explicit location
    pub async fn request_at(
        &mut self,
        command: &str,
        expected: ResultClass,
        location: &Location<'_>,
    ) -> Result<SyncResult> {
        let result = self.send(command).await?;
        if result.class != expected {
            return Err(Error::unexpected_class(
                command,
                expected,
                result.class,
                result.error_message().map(str::to_string),
                location,
            ));
        }
        Ok(result)
    }

    /// Ask the debugger to exit, then make sure the process is gone
    pub async fn shutdown(&mut self) -> Result<()> {
        let exit = self.request("-gdb-exit", ResultClass::Exit).await;
        self.reap().await;
        exit.map(|_| ())
    }

    /// Wait out the grace period for the debugger to exit, then kill it
    pub async fn reap(&mut self) {
        if let Some(child) = self.child.as_mut() {
            match tokio::time::timeout(self.shutdown_timeout, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "Debugger exited"),
                Ok(Err(e)) => tracing::warn!("Failed to wait for debugger: {}", e),
                Err(_) => {
                    tracing::warn!("Debugger did not exit within {:?}, killing", self.shutdown_timeout);
                    let _ = child.kill().await;
                }
            }
        }
    }
}

impl Drop for MiClient {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
        self.reader_task.abort();
    }
}

async fn read_loop<R>(mut reader: BufReader<R>, log: Arc<RecordLog>, pending: PendingSlot)
where
    R: AsyncRead + Unpin,
{
    loop {
        let line = match codec::read_line(&mut reader).await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                tracing::warn!("Debugger stdout read failed: {}", e);
                break;
            }
        };

        if line.trim().is_empty() {
            continue;
        }
        tracing::debug!("MI <<< {}", line);

        match codec::parse_line(&line) {
            Ok(MiOutput::Result(result)) => deliver(&pending, result),
            Ok(MiOutput::OutOfBand(record)) => log.append(record),
            Ok(MiOutput::Prompt) => {}
            Err(e) => tracing::warn!("Skipping malformed MI line: {}", e),
        }
    }

    log.close();
    // Dropping the sender wakes a waiting request with TransportClosed
    let mut slot = pending.lock().unwrap_or_else(|e| e.into_inner());
    slot.closed = true;
    slot.pending.take();
}

fn deliver(pending: &PendingSlot, result: SyncResult) {
    let mut slot = pending.lock().unwrap_or_else(|e| e.into_inner());
    let matches = match (slot.pending.as_ref(), result.token) {
        (Some(p), Some(token)) => p.token == token,
        // Token-less replies belong to the one request in flight
        (Some(_), None) => true,
        (None, _) => false,
    };

    if matches {
        if let Some(p) = slot.pending.take() {
            let _ = p.reply.send(result);
        }
    } else {
        tracing::warn!(token = ?result.token, class = %result.class, "Unsolicited result record");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, DuplexStream};

    fn timeouts() -> Timeouts {
        Timeouts {
            request_secs: 2,
            event_secs: 2,
            shutdown_secs: 1,
        }
    }

    /// Client wired to an in-memory debugger; returns the debugger's ends
    fn pair() -> (MiClient, BufReader<DuplexStream>, DuplexStream) {
        let (client_out, server_in) = tokio::io::duplex(4096);
        let (server_out, client_in) = tokio::io::duplex(4096);
        let client = MiClient::from_io(client_in, client_out, &timeouts());
        (client, BufReader::new(server_in), server_out)
    }

    async fn next_request(reader: &mut BufReader<DuplexStream>) -> String {
        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        line.trim_end().to_string()
    }

    #[tokio::test]
    async fn test_request_correlates_by_token() {
        let (mut client, mut server_in, mut server_out) = pair();

        let server = tokio::spawn(async move {
            let line = next_request(&mut server_in).await;
            assert_eq!(line, "1-break-insert -f Program.cs:15");
            server_out
                .write_all(b"=library-loaded,id=\"x\"\n1^done,bkpt={number=\"1\",line=\"15\"}\n(gdb)\n")
                .await
                .unwrap();
            server_out
        });

        let result = client
            .request("-break-insert -f Program.cs:15", ResultClass::Done)
            .await
            .unwrap();
        assert_eq!(result.token, Some(1));
        assert_eq!(result.tuple_field("bkpt").unwrap().get_str("number"), Some("1"));

        let _server_out = server.await.unwrap();
        assert_eq!(client.poll_async_records().len(), 1);
    }

    #[tokio::test]
    async fn test_unexpected_class_carries_message() {
        let (mut client, mut server_in, mut server_out) = pair();

        tokio::spawn(async move {
            next_request(&mut server_in).await;
            server_out
                .write_all(b"1^error,msg=\"No executable specified\"\n")
                .await
                .unwrap();
            // Keep the stream open until the client is done
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let err = client.request("-exec-run", ResultClass::Running).await.unwrap_err();
        match err {
            Error::UnexpectedResultClass {
                expected,
                actual,
                message,
                location,
                ..
            } => {
                assert_eq!(expected, "running");
                assert_eq!(actual, "error");
                assert_eq!(message.as_deref(), Some("No executable specified"));
                assert!(location.contains("client.rs"));
            }
            other => panic!("Expected UnexpectedResultClass, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_transport_closed_while_waiting() {
        let (mut client, mut server_in, server_out) = pair();

        tokio::spawn(async move {
            next_request(&mut server_in).await;
            drop(server_out);
        });

        let err = client.send("-exec-continue").await.unwrap_err();
        assert!(matches!(err, Error::TransportClosed { .. }));
        assert!(client.log().is_closed());
    }

    #[tokio::test]
    async fn test_send_after_stream_end_fails_fast() {
        let (mut client, _server_in, server_out) = pair();
        drop(server_out);

        let log = client.log();
        tokio::time::timeout(Duration::from_secs(1), async {
            while !log.is_closed() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();

        let started = std::time::Instant::now();
        let err = client.send("-exec-continue").await.unwrap_err();
        assert!(matches!(err, Error::TransportClosed { .. }), "{err}");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_non_utf8_program_output_keeps_transport_open() {
        let (mut client, mut server_in, mut server_out) = pair();

        tokio::spawn(async move {
            next_request(&mut server_in).await;
            server_out.write_all(b"Hello \xff\xfe World\n").await.unwrap();
            server_out
                .write_all(b"*stopped,reason=\"exited\",exit-code=\"0\"\n1^running\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let result = client.send("-exec-continue").await.unwrap();
        assert_eq!(result.class, ResultClass::Running);
        assert!(!client.log().is_closed());
        let records = client.poll_async_records();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_stopped());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let (mut client, mut server_in, mut server_out) = pair();

        tokio::spawn(async move {
            next_request(&mut server_in).await;
            server_out
                .write_all(b"garbage here\n*stopped,reason=\"exited\",exit-code=\"0\"\n^done\n")
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let result = client.send("-exec-continue").await.unwrap();
        assert_eq!(result.class, ResultClass::Done);
        let records = client.poll_async_records();
        assert_eq!(records.len(), 1);
        assert!(records[0].is_stopped());
    }

    #[tokio::test]
    async fn test_shutdown_expects_exit() {
        let (mut client, mut server_in, mut server_out) = pair();

        tokio::spawn(async move {
            let line = next_request(&mut server_in).await;
            assert_eq!(line, "1-gdb-exit");
            server_out.write_all(b"1^exit\n").await.unwrap();
        });

        client.shutdown().await.unwrap();
    }
}
