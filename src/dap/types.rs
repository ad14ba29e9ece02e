//! IDE-protocol (DAP) request schema
//!
//! The request shapes the debugger accepts over its DAP front end. These are
//! carried as data only: MI is the protocol scenarios drive. Optional fields
//! are omitted from the wire when absent.
//! See: https://microsoft.github.io/debug-adapter-protocol/overview

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// === Base Protocol Messages ===

/// DAP request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(flatten)]
    pub request: Request,
}

impl RequestMessage {
    pub fn new(seq: i64, request: Request) -> Self {
        Self {
            seq,
            message_type: "request".to_string(),
            request,
        }
    }
}

/// DAP response message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub request_seq: i64,
    pub success: bool,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// DAP event message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventMessage {
    pub seq: i64,
    #[serde(rename = "type")]
    pub message_type: String,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Every request the debugger's DAP front end understands
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", content = "arguments", rename_all = "camelCase")]
pub enum Request {
    Initialize(InitializeArguments),
    Launch(LaunchArguments),
    Attach(AttachArguments),
    ConfigurationDone(ConfigurationDoneArguments),
    Continue(ThreadArguments),
    Disconnect(DisconnectArguments),
    Terminate(TerminateArguments),
    SetBreakpoints(SetBreakpointsArguments),
    SetFunctionBreakpoints(SetFunctionBreakpointsArguments),
    StackTrace(StackTraceArguments),
    Pause(ThreadArguments),
    Threads,
    Scopes(ScopesArguments),
    Variables(VariablesArguments),
    Evaluate(EvaluateArguments),
    SetVariable(SetVariableArguments),
    Next(ThreadArguments),
    StepIn(StepInArguments),
    StepOut(ThreadArguments),
    SetExceptionBreakpoints(SetExceptionBreakpointsArguments),
    ExceptionInfo(ThreadArguments),
    SetExpression(SetExpressionArguments),
}

impl Request {
    /// Wire name of the command
    pub fn command(&self) -> &'static str {
        match self {
            Self::Initialize(_) => "initialize",
            Self::Launch(_) => "launch",
            Self::Attach(_) => "attach",
            Self::ConfigurationDone(_) => "configurationDone",
            Self::Continue(_) => "continue",
            Self::Disconnect(_) => "disconnect",
            Self::Terminate(_) => "terminate",
            Self::SetBreakpoints(_) => "setBreakpoints",
            Self::SetFunctionBreakpoints(_) => "setFunctionBreakpoints",
            Self::StackTrace(_) => "stackTrace",
            Self::Pause(_) => "pause",
            Self::Threads => "threads",
            Self::Scopes(_) => "scopes",
            Self::Variables(_) => "variables",
            Self::Evaluate(_) => "evaluate",
            Self::SetVariable(_) => "setVariable",
            Self::Next(_) => "next",
            Self::StepIn(_) => "stepIn",
            Self::StepOut(_) => "stepOut",
            Self::SetExceptionBreakpoints(_) => "setExceptionBreakpoints",
            Self::ExceptionInfo(_) => "exceptionInfo",
            Self::SetExpression(_) => "setExpression",
        }
    }
}

// === Request Arguments ===

/// Initialize request arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeArguments {
    #[serde(rename = "clientID", skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,
    #[serde(rename = "adapterID", skip_serializing_if = "Option::is_none")]
    pub adapter_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lines_start_at1: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub columns_start_at1: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path_format: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_variable_type: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_variable_paging: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub supports_run_in_terminal_request: Option<bool>,
}

/// Launch request arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub launch_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_launch_task: Option<String>,
    pub program: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub env: HashMap<String, String>,
    /// "internalConsole", "integratedTerminal" or "externalTerminal"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub console: Option<String>,
    #[serde(default)]
    pub stop_at_entry: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub just_my_code: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_step_filtering: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_console_options: Option<String>,
    #[serde(rename = "__sessionId", skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

/// Attach request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachArguments {
    pub process_id: u32,
}

/// configurationDone takes no arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigurationDoneArguments {}

/// Arguments of the requests that only name a thread
/// (continue, pause, next, stepOut, exceptionInfo)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadArguments {
    pub thread_id: i64,
}

/// Disconnect request arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisconnectArguments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub terminate_debuggee: Option<bool>,
}

/// Terminate request arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TerminateArguments {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart: Option<bool>,
}

/// SetBreakpoints request arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointsArguments {
    pub source: Source,
    #[serde(default)]
    pub breakpoints: Vec<SourceBreakpoint>,
    /// Deprecated in favour of `breakpoints`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lines: Vec<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_modified: Option<bool>,
}

/// SetFunctionBreakpoints request arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetFunctionBreakpointsArguments {
    pub breakpoints: Vec<FunctionBreakpoint>,
}

/// StackTrace request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTraceArguments {
    pub thread_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_frame: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<StackFrameFormat>,
}

/// Scopes request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopesArguments {
    pub frame_id: i64,
}

/// Variables request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariablesArguments {
    pub variables_reference: i64,
    /// "indexed" or "named"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ValueFormat>,
}

/// Evaluate request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateArguments {
    pub expression: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ValueFormat>,
}

/// SetVariable request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVariableArguments {
    pub variables_reference: i64,
    pub name: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ValueFormat>,
}

/// StepIn request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInArguments {
    pub thread_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_id: Option<i64>,
}

/// SetExceptionBreakpoints request arguments
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExceptionBreakpointsArguments {
    pub filters: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter_options: Option<Vec<ExceptionFilterOptions>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception_options: Option<Vec<ExceptionOptions>>,
}

/// SetExpression request arguments
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetExpressionArguments {
    pub expression: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<ValueFormat>,
}

// === Shared Types ===

/// A source file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i64>,
    /// "normal", "emphasize" or "deemphasize"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub presentation_hint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sources: Vec<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub adapter_data: Option<Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub checksums: Vec<Checksum>,
}

/// File checksum attached to a source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checksum {
    /// "MD5", "SHA1", "SHA256" or "timestamp"
    pub algorithm: String,
    pub checksum: String,
}

/// Source breakpoint for setBreakpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceBreakpoint {
    pub line: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_message: Option<String>,
}

impl SourceBreakpoint {
    pub fn at(line: i64) -> Self {
        Self {
            line,
            column: None,
            condition: None,
            hit_condition: None,
            log_message: None,
        }
    }
}

/// Function breakpoint for setFunctionBreakpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FunctionBreakpoint {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hit_condition: Option<String>,
}

/// How values are rendered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValueFormat {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex: Option<bool>,
}

/// How stack frames are rendered
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrameFormat {
    #[serde(flatten)]
    pub value: ValueFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameters: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_types: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_names: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parameter_values: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub include_all: Option<bool>,
}

/// Condition attached to an exception filter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionFilterOptions {
    pub filter_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
}

/// When to break on a set of exceptions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExceptionOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<ExceptionPathSegment>>,
    pub break_mode: ExceptionBreakMode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExceptionBreakMode {
    Never,
    Always,
    Unhandled,
    UserUnhandled,
}

/// One level of an exception name path
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExceptionPathSegment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub negate: Option<bool>,
    pub names: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_breakpoints_wire_shape() {
        let message = RequestMessage::new(
            3,
            Request::SetBreakpoints(SetBreakpointsArguments {
                source: Source {
                    path: Some("/src/Program.cs".to_string()),
                    ..Default::default()
                },
                breakpoints: vec![SourceBreakpoint::at(15)],
                ..Default::default()
            }),
        );

        assert_eq!(
            serde_json::to_value(&message).unwrap(),
            json!({
                "seq": 3,
                "type": "request",
                "command": "setBreakpoints",
                "arguments": {
                    "source": { "path": "/src/Program.cs" },
                    "breakpoints": [{ "line": 15 }]
                }
            })
        );
    }

    #[test]
    fn test_argumentless_request() {
        let value = serde_json::to_value(RequestMessage::new(1, Request::Threads)).unwrap();
        assert_eq!(value, json!({ "seq": 1, "type": "request", "command": "threads" }));
        assert_eq!(Request::Threads.command(), "threads");
    }

    #[test]
    fn test_launch_field_names() {
        let launch = LaunchArguments {
            program: "/app/TestApp.dll".to_string(),
            stop_at_entry: true,
            just_my_code: Some(true),
            session_id: Some("s1".to_string()),
            ..Default::default()
        };
        let value = serde_json::to_value(Request::Launch(launch)).unwrap();
        let args = &value["arguments"];
        assert_eq!(args["stopAtEntry"], json!(true));
        assert_eq!(args["justMyCode"], json!(true));
        assert_eq!(args["__sessionId"], json!("s1"));
        assert!(args.get("cwd").is_none());
        assert!(args.get("env").is_none());
    }

    #[test]
    fn test_parse_incoming_request() {
        let message: RequestMessage = serde_json::from_value(json!({
            "seq": 9,
            "type": "request",
            "command": "setExceptionBreakpoints",
            "arguments": {
                "filters": ["user-unhandled"],
                "exceptionOptions": [{
                    "path": [{ "names": ["System.Exception"] }],
                    "breakMode": "userUnhandled"
                }]
            }
        }))
        .unwrap();

        let Request::SetExceptionBreakpoints(args) = &message.request else {
            panic!("Expected setExceptionBreakpoints, got {:?}", message.request);
        };
        assert_eq!(args.filters, vec!["user-unhandled"]);
        let options = args.exception_options.as_ref().unwrap();
        assert_eq!(options[0].break_mode, ExceptionBreakMode::UserUnhandled);
        assert_eq!(message.request.command(), "setExceptionBreakpoints");
    }

    #[test]
    fn test_stack_frame_format_flattens_hex() {
        let format = StackFrameFormat {
            value: ValueFormat { hex: Some(true) },
            parameters: Some(false),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&format).unwrap(),
            json!({ "hex": true, "parameters": false })
        );
    }
}
