//! Source path normalization
//!
//! Breakpoint requests name sources the way a user typed them
//! (`./dir/Program.cs`, `..\proj\dir\program.cs`, `Program.cs`). A request
//! resolves to a source file when its normalized segments are a suffix of
//! the file's segments.

/// Split a path into comparable segments
///
/// Both separators are accepted, empty and `.` segments are dropped and `..`
/// removes the previous segment (a leading `..` has nothing to remove and is
/// dropped as well).
pub fn normalize_source_path(path: &str, case_sensitive: bool) -> Vec<String> {
    let mut segments: Vec<String> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            s if case_sensitive => segments.push(s.to_string()),
            s => segments.push(s.to_ascii_lowercase()),
        }
    }
    segments
}

/// Whether `requested` names the source file at `actual`
pub fn same_source(requested: &str, actual: &str, case_sensitive: bool) -> bool {
    let requested = normalize_source_path(requested, case_sensitive);
    let actual = normalize_source_path(actual, case_sensitive);
    !requested.is_empty() && actual.ends_with(&requested)
}

/// Final path segment, used as the `file` a debugger reports for a frame
pub fn file_name(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(
            normalize_source_path("./MITest/Program.cs", true),
            vec!["MITest", "Program.cs"]
        );
        assert_eq!(
            normalize_source_path(r"..\MITest\.\sub\..\Program.cs", true),
            vec!["MITest", "Program.cs"]
        );
        assert_eq!(
            normalize_source_path("/src//MITest/PROGRAM.cs", false),
            vec!["src", "mitest", "program.cs"]
        );
        assert!(normalize_source_path("../..", true).is_empty());
    }

    #[test]
    fn test_aliases_resolve_to_same_file() {
        let actual = "/home/user/tests/MITestSrcBreakpointResolve/Program.cs";
        for requested in [
            "Program.cs",
            "./MITestSrcBreakpointResolve/Program.cs",
            "../tests/MITestSrcBreakpointResolve/Program.cs",
            r"MITestSrcBreakpointResolve\folder\..\Program.cs",
            "mitestsrcbreakpointresolve/program.cs",
        ] {
            assert!(same_source(requested, actual, false), "{requested}");
        }
    }

    #[test]
    fn test_mismatches() {
        let actual = "/src/MITestSrcBreakpointResolve/Program.cs";
        assert!(!same_source("folder/Program.cs", actual, false));
        assert!(!same_source("gram.cs", actual, false));
        assert!(!same_source("program.cs", actual, true));
        assert!(!same_source("", actual, false));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/src/dir/Program.cs"), "Program.cs");
        assert_eq!(file_name(r"dir\Program.cs"), "Program.cs");
        assert_eq!(file_name("Program.cs"), "Program.cs");
    }
}
