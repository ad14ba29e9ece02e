//! GDB/MI wire codec
//!
//! MI is line oriented:
//! ```text
//! 12^done,bkpt={number="1",file="Program.cs",line="15"}
//! *stopped,reason="breakpoint-hit",frame={file="Program.cs",line="15"}
//! ~"console text\n"
//! (gdb)
//! ```
//! Requests are a command prefixed with a decimal correlation token.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::common::{Error, Result};

use super::types::*;

/// Read one line of debugger output, without the line terminator
///
/// Returns `None` at end of stream. The debuggee shares the debugger's
/// stdout, so bytes that are not UTF-8 are replaced rather than rejected.
pub async fn read_line<R: AsyncBufRead + Unpin>(reader: &mut R) -> Result<Option<String>> {
    let mut buf = Vec::new();
    let bytes_read = reader.read_until(b'\n', &mut buf).await?;
    if bytes_read == 0 {
        return Ok(None);
    }
    while matches!(buf.last(), Some(b'\n' | b'\r')) {
        buf.pop();
    }
    Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
}

/// Write a tokenized request line
pub async fn write_request<W: AsyncWrite + Unpin>(
    writer: &mut W,
    token: u64,
    command: &str,
) -> Result<()> {
    let line = encode_request(token, command);
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Render a request line: `<token><command>\n`
pub fn encode_request(token: u64, command: &str) -> String {
    format!("{}{}\n", token, command.trim_end())
}

/// Split a request line into its token and command text
pub fn decode_request(line: &str) -> (Option<u64>, &str) {
    let digits = line.bytes().take_while(|b| b.is_ascii_digit()).count();
    let token = if digits > 0 {
        line[..digits].parse().ok()
    } else {
        None
    };
    (token, line[digits..].trim())
}

/// Parse one line of debugger output
pub fn parse_line(line: &str) -> Result<MiOutput> {
    let trimmed = line.trim_end();
    if trimmed == "(gdb)" {
        return Ok(MiOutput::Prompt);
    }
    Parser::new(trimmed).output()
}

/// Quote a string as an MI C-string
pub fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('"');
    out
}

/// Render a value in MI syntax
pub fn encode_value(value: &MiValue) -> String {
    match value {
        MiValue::Const(s) => quote(s),
        MiValue::Tuple(t) => format!("{{{}}}", encode_fields(t)),
        MiValue::List(items) => {
            let inner: Vec<String> = items.iter().map(encode_value).collect();
            format!("[{}]", inner.join(","))
        }
    }
}

fn encode_fields(tuple: &Tuple) -> String {
    tuple
        .iter()
        .map(|(name, value)| format!("{}={}", name, encode_value(value)))
        .collect::<Vec<_>>()
        .join(",")
}

/// Render a result record line
pub fn encode_result(token: Option<u64>, class: ResultClass, fields: &Tuple) -> String {
    let mut line = token.map(|t| t.to_string()).unwrap_or_default();
    line.push('^');
    line.push_str(class.as_str());
    if !fields.is_empty() {
        line.push(',');
        line.push_str(&encode_fields(fields));
    }
    line
}

/// Render an out-of-band record line
pub fn encode_record(record: &OutOfBandRecord) -> String {
    match record {
        OutOfBandRecord::Async {
            kind,
            token,
            class,
            output,
        } => {
            let mut line = token.map(|t| t.to_string()).unwrap_or_default();
            line.push(match kind {
                AsyncKind::Exec => '*',
                AsyncKind::Status => '+',
                AsyncKind::Notify => '=',
            });
            line.push_str(class.as_str());
            if !output.is_empty() {
                line.push(',');
                line.push_str(&encode_fields(output));
            }
            line
        }
        OutOfBandRecord::Stream { kind, text } => {
            let prefix = match kind {
                StreamKind::Console => '~',
                StreamKind::Target => '@',
                StreamKind::Log => '&',
            };
            format!("{}{}", prefix, quote(text))
        }
    }
}

struct Parser<'a> {
    input: &'a str,
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            bytes: input.as_bytes(),
            pos: 0,
        }
    }

    fn error(&self, what: &str) -> Error {
        Error::MiParse(format!("{} at column {} in '{}'", what, self.pos, self.input))
    }

    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek()?;
        self.pos += 1;
        Some(b)
    }

    fn expect(&mut self, expected: u8) -> Result<()> {
        match self.bump() {
            Some(b) if b == expected => Ok(()),
            _ => Err(self.error(&format!("expected '{}'", expected as char))),
        }
    }

    fn output(&mut self) -> Result<MiOutput> {
        let token = self.token();
        let prefix = self.bump().ok_or_else(|| self.error("empty record"))?;

        match prefix {
            b'^' => {
                let class_name = self.word();
                let class = ResultClass::parse(class_name)
                    .ok_or_else(|| self.error(&format!("unknown result class '{}'", class_name)))?;
                let fields = self.results()?;
                Ok(MiOutput::Result(SyncResult {
                    token,
                    class,
                    fields,
                }))
            }
            b'*' | b'+' | b'=' => {
                let kind = match prefix {
                    b'*' => AsyncKind::Exec,
                    b'+' => AsyncKind::Status,
                    _ => AsyncKind::Notify,
                };
                let class = AsyncClass::parse(self.word());
                let output = self.results()?;
                Ok(MiOutput::OutOfBand(OutOfBandRecord::Async {
                    kind,
                    token,
                    class,
                    output,
                }))
            }
            b'~' | b'@' | b'&' => {
                let kind = match prefix {
                    b'~' => StreamKind::Console,
                    b'@' => StreamKind::Target,
                    _ => StreamKind::Log,
                };
                let text = self.cstring()?;
                Ok(MiOutput::OutOfBand(OutOfBandRecord::Stream { kind, text }))
            }
            _ => Err(self.error("unknown record prefix")),
        }
    }

    fn token(&mut self) -> Option<u64> {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_digit()) {
            self.pos += 1;
        }
        if self.pos > start {
            self.input[start..self.pos].parse().ok()
        } else {
            None
        }
    }

    fn word(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(b) if b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
            self.pos += 1;
        }
        &self.input[start..self.pos]
    }

    /// `(',' result)*` to end of line
    fn results(&mut self) -> Result<Tuple> {
        let mut tuple = Tuple::new();
        while self.peek() == Some(b',') {
            self.pos += 1;
            let (name, value) = self.result()?;
            tuple.push(name, value);
        }
        if self.pos != self.bytes.len() {
            return Err(self.error("trailing characters"));
        }
        Ok(tuple)
    }

    fn result(&mut self) -> Result<(String, MiValue)> {
        let name = self.word();
        if name.is_empty() {
            return Err(self.error("expected variable name"));
        }
        let name = name.to_string();
        self.expect(b'=')?;
        let value = self.value()?;
        Ok((name, value))
    }

    fn value(&mut self) -> Result<MiValue> {
        match self.peek() {
            Some(b'"') => Ok(MiValue::Const(self.cstring()?)),
            Some(b'{') => {
                self.pos += 1;
                let mut tuple = Tuple::new();
                if self.peek() == Some(b'}') {
                    self.pos += 1;
                    return Ok(MiValue::Tuple(tuple));
                }
                loop {
                    let (name, value) = self.result()?;
                    tuple.push(name, value);
                    match self.bump() {
                        Some(b',') => continue,
                        Some(b'}') => break,
                        _ => return Err(self.error("expected ',' or '}'")),
                    }
                }
                Ok(MiValue::Tuple(tuple))
            }
            Some(b'[') => {
                self.pos += 1;
                let mut items = Vec::new();
                if self.peek() == Some(b']') {
                    self.pos += 1;
                    return Ok(MiValue::List(items));
                }
                loop {
                    let item = if matches!(self.peek(), Some(b'"' | b'{' | b'[')) {
                        self.value()?
                    } else {
                        // `[name=value,...]` lists hold results; keep each as a one-field tuple
                        let (name, value) = self.result()?;
                        let mut single = Tuple::new();
                        single.push(name, value);
                        MiValue::Tuple(single)
                    };
                    items.push(item);
                    match self.bump() {
                        Some(b',') => continue,
                        Some(b']') => break,
                        _ => return Err(self.error("expected ',' or ']'")),
                    }
                }
                Ok(MiValue::List(items))
            }
            _ => Err(self.error("expected value")),
        }
    }

    fn cstring(&mut self) -> Result<String> {
        self.expect(b'"')?;
        let mut out: Vec<u8> = Vec::new();
        loop {
            let b = self.bump().ok_or_else(|| self.error("unterminated string"))?;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self.bump().ok_or_else(|| self.error("unterminated escape"))?;
                    match esc {
                        b'n' => out.push(b'\n'),
                        b't' => out.push(b'\t'),
                        b'r' => out.push(b'\r'),
                        b'0'..=b'7' => {
                            let mut code = u32::from(esc - b'0');
                            for _ in 0..2 {
                                match self.peek() {
                                    Some(d @ b'0'..=b'7') => {
                                        code = code * 8 + u32::from(d - b'0');
                                        self.pos += 1;
                                    }
                                    _ => break,
                                }
                            }
                            out.push((code & 0xff) as u8);
                        }
                        other => out.push(other),
                    }
                }
                other => out.push(other),
            }
        }
        Ok(String::from_utf8_lossy(&out).into_owned())
    }
}
