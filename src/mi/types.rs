//! GDB/MI record types
//!
//! Result records answer a specific request (correlated by token). Every other
//! record is out-of-band and lands in the shared [`RecordLog`](super::RecordLog).

use std::fmt;

use crate::common::{Error, Result};

/// Class of a synchronous result record (`^done`, `^running`, ...)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultClass {
    Done,
    Running,
    Connected,
    Error,
    Exit,
}

impl ResultClass {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "done" => Some(Self::Done),
            "running" => Some(Self::Running),
            "connected" => Some(Self::Connected),
            "error" => Some(Self::Error),
            "exit" => Some(Self::Exit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Done => "done",
            Self::Running => "running",
            Self::Connected => "connected",
            Self::Error => "error",
            Self::Exit => "exit",
        }
    }
}

impl fmt::Display for ResultClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An MI value: C-string constant, tuple or list
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiValue {
    Const(String),
    Tuple(Tuple),
    List(Vec<MiValue>),
}

impl MiValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Const(s) => Some(s),
            _ => None,
        }
    }

    /// Integer view of a constant; MI transmits numbers as strings
    pub fn as_int(&self) -> Option<i64> {
        self.as_str().and_then(|s| s.parse().ok())
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Self::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[MiValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for MiValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Const(s) => write!(f, "{:?}", s),
            Self::Tuple(t) => write!(f, "{}", t),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
        }
    }
}

/// Ordered `name=value` mapping
///
/// Order is preserved because MI permits repeated names (e.g. `frame=` inside
/// stack listings) and reports should echo what the debugger sent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tuple {
    fields: Vec<(String, MiValue)>,
}

impl Tuple {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: MiValue) {
        self.fields.push((name.into(), value));
    }

    /// First value with the given name
    pub fn get(&self, name: &str) -> Option<&MiValue> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(MiValue::as_str)
    }

    pub fn get_tuple(&self, name: &str) -> Option<&Tuple> {
        self.get(name).and_then(MiValue::as_tuple)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MiValue)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (name, value)) in self.fields.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", name, value)?;
        }
        f.write_str("}")
    }
}

/// Synchronous reply to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncResult {
    pub token: Option<u64>,
    pub class: ResultClass,
    pub fields: Tuple,
}

impl SyncResult {
    pub fn get(&self, name: &str) -> Option<&MiValue> {
        self.fields.get(name)
    }

    /// The `msg` field carried by `^error` replies
    pub fn error_message(&self) -> Option<&str> {
        self.fields.get_str("msg")
    }

    /// Required string field
    pub fn str_field(&self, name: &str) -> Result<&str> {
        self.fields
            .get_str(name)
            .ok_or_else(|| Error::missing_field(format!("^{}", self.class), name))
    }

    /// Required tuple field
    pub fn tuple_field(&self, name: &str) -> Result<&Tuple> {
        self.fields
            .get_tuple(name)
            .ok_or_else(|| Error::missing_field(format!("^{}", self.class), name))
    }
}

/// Class of an async record (`*stopped`, `=breakpoint-modified`, ...)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AsyncClass {
    Stopped,
    Running,
    Other(String),
}

impl AsyncClass {
    pub fn parse(s: &str) -> Self {
        match s {
            "stopped" => Self::Stopped,
            "running" => Self::Running,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Stopped => "stopped",
            Self::Running => "running",
            Self::Other(s) => s,
        }
    }
}

/// Which async channel a record arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AsyncKind {
    /// `*` execution state changes
    Exec,
    /// `+` progress notifications
    Status,
    /// `=` supplementary notifications
    Notify,
}

/// Which stream a text record arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// `~` debugger console output
    Console,
    /// `@` debuggee output
    Target,
    /// `&` debugger internal log
    Log,
}

/// A notification not correlated to a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutOfBandRecord {
    Async {
        kind: AsyncKind,
        token: Option<u64>,
        class: AsyncClass,
        output: Tuple,
    },
    Stream { kind: StreamKind, text: String },
}

impl OutOfBandRecord {
    /// Whether this is an `*stopped` exec record
    pub fn is_stopped(&self) -> bool {
        matches!(
            self,
            Self::Async {
                kind: AsyncKind::Exec,
                class: AsyncClass::Stopped,
                ..
            }
        )
    }
}

impl fmt::Display for OutOfBandRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Async {
                kind,
                class,
                output,
                ..
            } => {
                let prefix = match kind {
                    AsyncKind::Exec => '*',
                    AsyncKind::Status => '+',
                    AsyncKind::Notify => '=',
                };
                write!(f, "{}{}", prefix, class.as_str())?;
                for (name, value) in output.iter() {
                    write!(f, ",{}={}", name, value)?;
                }
                Ok(())
            }
            Self::Stream { kind, text } => {
                let prefix = match kind {
                    StreamKind::Console => '~',
                    StreamKind::Target => '@',
                    StreamKind::Log => '&',
                };
                write!(f, "{}{:?}", prefix, text)
            }
        }
    }
}

/// Any line of MI output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MiOutput {
    Result(SyncResult),
    OutOfBand(OutOfBandRecord),
    Prompt,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_lookup_and_display() {
        let mut frame = Tuple::new();
        frame.push("file", MiValue::Const("Program.cs".to_string()));
        frame.push("line", MiValue::Const("15".to_string()));

        assert_eq!(frame.get_str("file"), Some("Program.cs"));
        assert_eq!(frame.get("line").and_then(MiValue::as_int), Some(15));
        assert!(frame.get("func").is_none());
        assert_eq!(frame.to_string(), r#"{file="Program.cs",line="15"}"#);
    }

    #[test]
    fn test_sync_result_required_fields() {
        let mut fields = Tuple::new();
        fields.push("value", MiValue::Const("true".to_string()));
        let result = SyncResult {
            token: Some(3),
            class: ResultClass::Done,
            fields,
        };

        assert_eq!(result.str_field("value").unwrap(), "true");
        let err = result.tuple_field("bkpt").unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
    }
}
