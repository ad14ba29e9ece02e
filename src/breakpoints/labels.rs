//! Breakpoint labels embedded in test program sources
//!
//! Test programs mark interesting lines with `Label.Breakpoint("name")`
//! calls. The label names the line it sits on. Lines that cannot carry a
//! label, such as a field initializer, are found by their statement text.

use std::collections::HashMap;
use std::path::Path;

use crate::common::{Error, Result};

const MARKER: &str = "Label.Breakpoint(\"";

/// Alias → 1-based line table for one source file
#[derive(Debug, Clone, Default)]
pub struct LabelIndex {
    lines: HashMap<String, u32>,
    source: Vec<String>,
}

impl LabelIndex {
    /// Collect every label in `source`
    pub fn scan(source: &str) -> Self {
        let mut lines = HashMap::new();

        for (line_num, line) in source.lines().enumerate() {
            let mut rest = line;
            while let Some(start) = rest.find(MARKER) {
                rest = &rest[start + MARKER.len()..];
                let Some(end) = rest.find('"') else {
                    break;
                };
                lines.insert(rest[..end].to_string(), line_num as u32 + 1);
                rest = &rest[end..];
            }
        }

        Self {
            lines,
            source: source.lines().map(str::to_string).collect(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| Error::FileRead {
            path: path.display().to_string(),
            error: e.to_string(),
        })?;
        Ok(Self::scan(&content))
    }

    /// Line of `alias`
    pub fn line(&self, alias: &str) -> Result<u32> {
        self.lines
            .get(alias)
            .copied()
            .ok_or_else(|| Error::TestAssertion(format!("no breakpoint label '{}'", alias)))
    }

    /// First line whose code contains `statement`
    pub fn statement_line(&self, statement: &str) -> Result<u32> {
        self.source
            .iter()
            .position(|line| {
                let code = line.split("//").next().unwrap_or_default();
                code.contains(statement)
            })
            .map(|index| index as u32 + 1)
            .ok_or_else(|| Error::TestAssertion(format!("no line contains '{}'", statement)))
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = r#"using System;
namespace App
{
    class Program
    {
        static void Main(string[] args)
        {
Label.Breakpoint("bp1");
Label.Breakpoint("resolved_bp1");       Console.WriteLine(
                                            "Hello World!");          Label.Breakpoint("bp4");
            Console.WriteLine("x"); Label.Breakpoint("a"); Label.Breakpoint("b");
        }
    }
    class Widget
    {
        // int count = 0; is documented here
        int count = 0; // initializer
    }
}"#;

    #[test]
    fn test_scan_labels() {
        let index = LabelIndex::scan(SOURCE);
        assert_eq!(index.line("bp1").unwrap(), 8);
        assert_eq!(index.line("resolved_bp1").unwrap(), 9);
        assert_eq!(index.line("bp4").unwrap(), 10);
        assert_eq!(index.line("a").unwrap(), 11);
        assert_eq!(index.line("b").unwrap(), 11);
        assert_eq!(index.len(), 5);
        assert!(index.line("missing").is_err());
    }

    #[test]
    fn test_statement_line_skips_comments() {
        let index = LabelIndex::scan(SOURCE);
        assert_eq!(index.statement_line("int count = 0;").unwrap(), 17);
        assert_eq!(index.statement_line("Console.WriteLine(\"x\")").unwrap(), 11);
        assert!(index.statement_line("int missing;").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Program.cs");
        std::fs::write(&path, SOURCE).unwrap();
        assert_eq!(LabelIndex::from_file(&path).unwrap().line("bp4").unwrap(), 10);
        assert!(LabelIndex::from_file(&dir.path().join("missing.cs")).is_err());
    }
}
