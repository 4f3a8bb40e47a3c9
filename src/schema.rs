//! Test case definitions.
//!
//! A spec file describes exactly one test: the command to run and the golden output
//! it is expected to produce. Spec files are line oriented:
//!
//! ```text
//! ; CMD echo hi
//! ; EXITCODE 0
//! ; STDOUT
//! hi
//! ```

use std::path::PathBuf;

/// File extension of spec files.
pub const SPEC_EXTENSION: &str = "test";

/// A single golden-file test, immutable once loaded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestCase {
    /// Dotted name derived from the spec path relative to its root.
    pub name: String,

    /// The spec file this test was loaded from.
    pub path: PathBuf,

    /// Program followed by its arguments. Empty when the spec has no `CMD` directive.
    pub command: Vec<String>,

    /// Expected stdout. `None` means stdout is not checked.
    pub expected_stdout: Option<String>,

    /// Expected stderr. `None` means stderr is not checked.
    pub expected_stderr: Option<String>,

    /// Expected exit code (default: 0).
    pub expected_exit_code: i32,

    /// Why the spec file could not be loaded. Such a test always fails.
    pub invalid: Option<String>,
}

impl TestCase {
    /// A test standing in for a spec file that failed to load.
    pub fn invalid(name: impl Into<String>, path: impl Into<PathBuf>, reason: String) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            invalid: Some(reason),
            ..Self::default()
        }
    }

    /// The command line as it would be typed in a shell.
    pub fn command_line(&self) -> String {
        shlex::try_join(self.command.iter().map(String::as_str))
            .unwrap_or_else(|_| self.command.join(" "))
    }
}

/// Serialize captured process behavior in the canonical spec format.
///
/// The stdout body is followed by a separator newline so that it reads back verbatim;
/// the stderr body runs to the end of the file.
pub fn render_spec(test: &TestCase, exit_code: i32, stdout: &str, stderr: &str) -> String {
    format!(
        "; CMD {}\n; EXITCODE {exit_code}\n; STDOUT\n{stdout}\n; STDERR\n{stderr}",
        test.command_line()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_test(command: &[&str]) -> TestCase {
        TestCase {
            name: "sample".to_string(),
            path: PathBuf::from("sample.test"),
            command: command.iter().map(|s| s.to_string()).collect(),
            ..TestCase::default()
        }
    }

    #[test]
    fn default_expectations() {
        let test = TestCase::default();
        assert_eq!(test.expected_exit_code, 0);
        assert!(test.expected_stdout.is_none());
        assert!(test.expected_stderr.is_none());
        assert!(test.invalid.is_none());
    }

    #[test]
    fn command_line_quotes_when_needed() {
        assert_eq!(make_test(&["echo", "hi"]).command_line(), "echo hi");
        assert_eq!(
            make_test(&["echo", "hello world"]).command_line(),
            "echo 'hello world'"
        );
    }

    #[test]
    fn render_spec_layout() {
        let test = make_test(&["echo", "hi"]);
        let text = render_spec(&test, 3, "hi\n", "oops\n");
        assert_eq!(
            text,
            "; CMD echo hi\n; EXITCODE 3\n; STDOUT\nhi\n\n; STDERR\noops\n"
        );
    }

    #[test]
    fn invalid_test_keeps_identity() {
        let test = TestCase::invalid("a.b", "a/b.test", "bad exit code".to_string());
        assert_eq!(test.name, "a.b");
        assert!(test.command.is_empty());
        assert_eq!(test.invalid.as_deref(), Some("bad exit code"));
    }
}
