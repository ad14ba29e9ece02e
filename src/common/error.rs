//! Error types for the conformance orchestrator
//!
//! Every variant aborts the running checkpoint chain. Assertion-style
//! variants carry the caller location and the expected-vs-actual values so a
//! failed scenario can be diagnosed from the report alone.

use std::io;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the conformance orchestrator
#[derive(Error, Debug)]
pub enum Error {
    // === Transport Errors ===
    #[error("Debugger failed to start: {0}")]
    DebuggerStartFailed(String),

    #[error("Debugger transport closed while waiting for a reply to '{command}'")]
    TransportClosed { command: String },

    #[error("MI parse error: {0}")]
    MiParse(String),

    #[error("'{command}' returned ^{actual}, expected ^{expected}{} at {location}", msg_suffix(.message))]
    UnexpectedResultClass {
        command: String,
        expected: String,
        actual: String,
        message: Option<String>,
        location: String,
    },

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    // === Event Matching Errors ===
    #[error("No event matching {expected} arrived within {timeout_secs}s at {location}{}", actual_suffix(.actual))]
    PredicateTimeout {
        expected: String,
        /// First unclaimed stop past the cursor, if any arrived
        actual: Option<String>,
        timeout_secs: u64,
        location: String,
    },

    #[error("Debuggee exited with code {actual}, expected {expected} at {location}")]
    ExitCode {
        expected: i64,
        actual: i64,
        location: String,
    },

    #[error("Record {record} is missing required field '{field}'")]
    MissingField { record: String, field: String },

    #[error("Field '{field}' has unexpected value '{value}'")]
    InvalidField { field: String, value: String },

    // === Checkpoint Errors ===
    #[error("Invalid checkpoint chain: {0}")]
    InvalidChain(String),

    #[error("Unknown checkpoint '{0}'")]
    UnknownCheckpoint(String),

    #[error("Checkpoint '{checkpoint}' failed: {source}")]
    CheckpointFailed {
        checkpoint: String,
        #[source]
        source: Box<Error>,
    },

    // === Hot Reload Errors ===
    #[error("No delta generation session is open")]
    SessionNotOpen,

    #[error("A delta generation session is already open")]
    SessionAlreadyOpen,

    #[error("Invalid project directory '{0}'")]
    InvalidProjectDirectory(String),

    #[error("Delta generation failed for '{file}': {reason}")]
    DeltaGeneration { file: String, reason: String },

    #[error("Transfer of delta fragment '{fragment}' failed: {reason}")]
    TransferFailed { fragment: String, reason: String },

    #[error("Operation '{operation}' is not supported on host {host}")]
    UnsupportedHost { operation: String, host: String },

    // === Breakpoint Errors ===
    #[error("Breakpoint {id} is unknown or already deleted")]
    UnknownBreakpointId { id: u32 },

    #[error("Breakpoint id {id} was reissued by the debugger")]
    BreakpointIdReused { id: u32 },

    #[error("Breakpoint id {id} is not greater than the previous id {previous}")]
    NonMonotonicBreakpointId { id: u32, previous: u32 },

    #[error("Expected breakpoint id {expected}, debugger assigned {actual} at {location}")]
    BreakpointIdMismatch {
        expected: u32,
        actual: u32,
        location: String,
    },

    // === Configuration Errors ===
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid configuration file: {0}")]
    ConfigParse(String),

    // === IO Errors ===
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read file '{path}': {error}")]
    FileRead { path: String, error: String },

    // === Serialization Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Test Errors ===
    #[error("Test assertion failed: {0}")]
    TestAssertion(String),

    // === Internal Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

fn actual_suffix(actual: &Option<String>) -> String {
    actual
        .as_deref()
        .map(|a| format!(" (next stop: {a})"))
        .unwrap_or_default()
}

fn msg_suffix(message: &Option<String>) -> String {
    message
        .as_deref()
        .map(|m| format!(" (msg: {m})"))
        .unwrap_or_default()
}

impl Error {
    /// Create an unexpected result class error
    pub fn unexpected_class(
        command: &str,
        expected: impl ToString,
        actual: impl ToString,
        message: Option<String>,
        location: &std::panic::Location<'_>,
    ) -> Self {
        Self::UnexpectedResultClass {
            command: command.to_string(),
            expected: expected.to_string(),
            actual: actual.to_string(),
            message,
            location: super::location_tag(location),
        }
    }

    /// Create a missing field error
    pub fn missing_field(record: impl ToString, field: &str) -> Self {
        Self::MissingField {
            record: record.to_string(),
            field: field.to_string(),
        }
    }

    /// Create an invalid field error
    pub fn invalid_field(field: &str, value: impl ToString) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    /// Create a transfer failed error
    pub fn transfer_failed(fragment: impl ToString, reason: impl ToString) -> Self {
        Self::TransferFailed {
            fragment: fragment.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create an unsupported host error naming the current platform
    pub fn unsupported_host(operation: &str) -> Self {
        Self::UnsupportedHost {
            operation: operation.to_string(),
            host: os_info::get().os_type().to_string(),
        }
    }

    /// Wrap an error raised inside a checkpoint action
    pub fn in_checkpoint(checkpoint: &str, source: Error) -> Self {
        Self::CheckpointFailed {
            checkpoint: checkpoint.to_string(),
            source: Box::new(source),
        }
    }

    /// The innermost error, looking through checkpoint wrapping
    pub fn root(&self) -> &Error {
        match self {
            Self::CheckpointFailed { source, .. } => source.root(),
            other => other,
        }
    }

    /// Short machine-readable code, used in suite reports
    pub fn code(&self) -> &'static str {
        match self.root() {
            Error::TransportClosed { .. } => "TRANSPORT_CLOSED",
            Error::UnexpectedResultClass { .. } => "UNEXPECTED_RESULT_CLASS",
            Error::PredicateTimeout { .. } => "PREDICATE_TIMEOUT",
            Error::ExitCode { .. } => "EXIT_CODE",
            Error::SessionNotOpen => "SESSION_NOT_OPEN",
            Error::SessionAlreadyOpen => "SESSION_ALREADY_OPEN",
            Error::UnknownBreakpointId { .. } => "UNKNOWN_BREAKPOINT_ID",
            Error::UnsupportedHost { .. } => "UNSUPPORTED_HOST",
            Error::Timeout(_) => "TIMEOUT",
            Error::InvalidChain(_) | Error::UnknownCheckpoint(_) => "INVALID_CHAIN",
            Error::BreakpointIdReused { .. }
            | Error::NonMonotonicBreakpointId { .. }
            | Error::BreakpointIdMismatch { .. } => "BREAKPOINT_ID",
            _ => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_unwraps_checkpoint_failures() {
        let err = Error::in_checkpoint(
            "finish",
            Error::in_checkpoint("inner", Error::SessionNotOpen),
        );
        assert!(matches!(err.root(), Error::SessionNotOpen));
        assert_eq!(err.code(), "SESSION_NOT_OPEN");
    }

    #[test]
    fn test_unexpected_class_message() {
        let location = std::panic::Location::caller();
        let err = Error::unexpected_class(
            "-exec-run",
            "running",
            "error",
            Some("no symbols".to_string()),
            location,
        );
        let text = err.to_string();
        assert!(text.contains("-exec-run"));
        assert!(text.contains("^error"));
        assert!(text.contains("no symbols"));
        assert!(text.contains("error.rs"));
    }
}
