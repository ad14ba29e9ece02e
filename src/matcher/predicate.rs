//! Predicates over out-of-band records
//!
//! [`StopPredicate`] covers the `*stopped` shapes scenarios assert on. Any
//! closure `Fn(&OutOfBandRecord) -> Result<bool>` is also a predicate.

use std::fmt;

use crate::common::{Error, Result};
use crate::mi::{OutOfBandRecord, Tuple};

/// Prefix the debugger puts on functions whose code was replaced by a delta
pub const OUTDATED_MARKER: &str = "[Outdated Code] ";

/// Something that decides whether a record is the awaited event
pub trait Predicate {
    /// `Ok(false)` means "not this record"; an error aborts the assertion
    fn matches(&self, record: &OutOfBandRecord) -> Result<bool>;

    /// Human-readable form used in timeout reports
    fn describe(&self) -> String {
        "custom predicate".to_string()
    }
}

impl<F> Predicate for F
where
    F: Fn(&OutOfBandRecord) -> Result<bool>,
{
    fn matches(&self, record: &OutOfBandRecord) -> Result<bool> {
        self(record)
    }
}

/// Why execution stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    EntryPointHit,
    BreakpointHit,
    EndSteppingRange,
    Exited,
    Other(String),
}

impl StopReason {
    pub fn parse(s: &str) -> Self {
        match s {
            "entry-point-hit" => Self::EntryPointHit,
            "breakpoint-hit" => Self::BreakpointHit,
            "end-stepping-range" => Self::EndSteppingRange,
            "exited" => Self::Exited,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::EntryPointHit => "entry-point-hit",
            Self::BreakpointHit => "breakpoint-hit",
            Self::EndSteppingRange => "end-stepping-range",
            Self::Exited => "exited",
            Self::Other(s) => s,
        }
    }

    /// Whether a stop for this reason must report a frame
    pub fn requires_frame(&self) -> bool {
        matches!(
            self,
            Self::EntryPointHit | Self::BreakpointHit | Self::EndSteppingRange
        )
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed view of a `*stopped` record
#[derive(Debug, Clone, Copy)]
pub struct StopEvent<'a> {
    output: &'a Tuple,
}

impl<'a> StopEvent<'a> {
    /// `None` unless the record is an exec `stopped` event
    pub fn from_record(record: &'a OutOfBandRecord) -> Option<Self> {
        match record {
            OutOfBandRecord::Async { output, .. } if record.is_stopped() => {
                Some(Self { output })
            }
            _ => None,
        }
    }

    pub fn reason(&self) -> Result<StopReason> {
        self.output
            .get_str("reason")
            .map(StopReason::parse)
            .ok_or_else(|| Error::missing_field("*stopped", "reason"))
    }

    pub fn frame(&self) -> Result<Frame<'a>> {
        self.output
            .get_tuple("frame")
            .map(|fields| Frame { fields })
            .ok_or_else(|| Error::missing_field("*stopped", "frame"))
    }

    /// Frame if present, else `None` for reasons that may omit it
    ///
    /// Reasons that always carry a frame fail with `MissingField`.
    pub fn frame_checked(&self) -> Result<Option<Frame<'a>>> {
        match self.output.get_tuple("frame") {
            Some(fields) => Ok(Some(Frame { fields })),
            None if self.reason()?.requires_frame() => {
                Err(Error::missing_field("*stopped", "frame"))
            }
            None => Ok(None),
        }
    }

    pub fn exit_code(&self) -> Result<i64> {
        let raw = self
            .output
            .get_str("exit-code")
            .ok_or_else(|| Error::missing_field("*stopped", "exit-code"))?;
        raw.parse()
            .map_err(|_| Error::invalid_field("exit-code", raw))
    }

    /// Number of the breakpoint that was hit
    pub fn bkptno(&self) -> Result<u32> {
        let raw = self
            .output
            .get_str("bkptno")
            .ok_or_else(|| Error::missing_field("*stopped", "bkptno"))?;
        raw.parse().map_err(|_| Error::invalid_field("bkptno", raw))
    }
}

/// Typed view of a `frame={...}` tuple
#[derive(Debug, Clone, Copy)]
pub struct Frame<'a> {
    fields: &'a Tuple,
}

impl<'a> Frame<'a> {
    pub fn file(&self) -> Result<&'a str> {
        self.fields
            .get_str("file")
            .ok_or_else(|| Error::missing_field("frame", "file"))
    }

    pub fn fullname(&self) -> Option<&'a str> {
        self.fields.get_str("fullname")
    }

    pub fn line(&self) -> Result<u32> {
        let raw = self
            .fields
            .get_str("line")
            .ok_or_else(|| Error::missing_field("frame", "line"))?;
        raw.parse().map_err(|_| Error::invalid_field("line", raw))
    }

    pub fn func(&self) -> Result<&'a str> {
        self.fields
            .get_str("func")
            .ok_or_else(|| Error::missing_field("frame", "func"))
    }
}

/// How a frame's function name is compared
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuncMatch {
    Exact(String),
    /// Marked as outdated, then exactly this name
    Outdated(String),
    /// Any function marked as outdated
    AnyOutdated,
}

impl FuncMatch {
    pub fn matches(&self, func: &str) -> bool {
        match self {
            Self::Exact(name) => func == name,
            Self::Outdated(name) => func.strip_prefix(OUTDATED_MARKER) == Some(name.as_str()),
            Self::AnyOutdated => func.starts_with(OUTDATED_MARKER),
        }
    }
}

impl fmt::Display for FuncMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => write!(f, "{}", name),
            Self::Outdated(name) => write!(f, "{}{}", OUTDATED_MARKER, name),
            Self::AnyOutdated => write!(f, "{}*", OUTDATED_MARKER),
        }
    }
}

/// Matches `*stopped` records by reason, location and exit code
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StopPredicate {
    reason: Option<StopReason>,
    file: Option<String>,
    line: Option<u32>,
    func: Option<FuncMatch>,
    exit_code: Option<i64>,
    bkptno: Option<u32>,
}

impl StopPredicate {
    /// Any stop
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry_point() -> Self {
        Self::new().reason(StopReason::EntryPointHit)
    }

    pub fn breakpoint_hit() -> Self {
        Self::new().reason(StopReason::BreakpointHit)
    }

    pub fn step_end() -> Self {
        Self::new().reason(StopReason::EndSteppingRange)
    }

    pub fn exited(code: i64) -> Self {
        Self::new().reason(StopReason::Exited).exit_code(code)
    }

    /// A step that landed in code replaced by a delta
    pub fn outdated_step() -> Self {
        Self::step_end().func(FuncMatch::AnyOutdated)
    }

    pub fn reason(mut self, reason: StopReason) -> Self {
        self.reason = Some(reason);
        self
    }

    pub fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn line(mut self, line: u32) -> Self {
        self.line = Some(line);
        self
    }

    /// Shorthand for `file` + `line`
    pub fn at(self, file: impl Into<String>, line: u32) -> Self {
        self.file(file).line(line)
    }

    pub fn func(mut self, func: FuncMatch) -> Self {
        self.func = Some(func);
        self
    }

    pub fn exit_code(mut self, code: i64) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn bkptno(mut self, id: u32) -> Self {
        self.bkptno = Some(id);
        self
    }

    fn constrains_frame(&self) -> bool {
        self.file.is_some() || self.line.is_some() || self.func.is_some()
    }

    fn matches_event(&self, event: &StopEvent<'_>) -> Result<bool> {
        let reason = event.reason()?;
        if let Some(expected) = &self.reason {
            if &reason != expected {
                return Ok(false);
            }
        }

        if self.constrains_frame() {
            let Some(frame) = event.frame_checked()? else {
                return Ok(false);
            };
            if let Some(file) = &self.file {
                if frame.file()? != file {
                    return Ok(false);
                }
            }
            if let Some(line) = self.line {
                if frame.line()? != line {
                    return Ok(false);
                }
            }
            if let Some(func) = &self.func {
                if !func.matches(frame.func()?) {
                    return Ok(false);
                }
            }
        }

        if let Some(code) = self.exit_code {
            if event.exit_code()? != code {
                return Ok(false);
            }
        }

        if let Some(id) = self.bkptno {
            if event.bkptno()? != id {
                return Ok(false);
            }
        }

        Ok(true)
    }
}

impl Predicate for StopPredicate {
    fn matches(&self, record: &OutOfBandRecord) -> Result<bool> {
        match StopEvent::from_record(record) {
            Some(event) => self.matches_event(&event),
            None => Ok(false),
        }
    }

    fn describe(&self) -> String {
        let mut parts = vec!["*stopped".to_string()];
        if let Some(reason) = &self.reason {
            parts.push(format!("reason={}", reason));
        }
        if let Some(file) = &self.file {
            parts.push(format!("file={}", file));
        }
        if let Some(line) = self.line {
            parts.push(format!("line={}", line));
        }
        if let Some(func) = &self.func {
            parts.push(format!("func={}", func));
        }
        if let Some(code) = self.exit_code {
            parts.push(format!("exit-code={}", code));
        }
        if let Some(id) = self.bkptno {
            parts.push(format!("bkptno={}", id));
        }
        parts.join(" ")
    }
}
