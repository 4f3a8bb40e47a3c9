//! Spec file loader.
//!
//! Finds spec files on disk and parses them into [`TestCase`]s.

use crate::env::expand;
use crate::schema::{SPEC_EXTENSION, TestCase};
use regex::Regex;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use thiserror::Error;

static DIRECTIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^;\s+(\w+)(.*)$").expect("directive pattern is valid"));

/// Error type for spec loading operations.
#[derive(Debug, Error)]
pub enum LoadError {
    /// Failed to read the file.
    #[error("failed to read file: {0}")]
    Io(#[from] std::io::Error),
    /// `EXITCODE` is not an integer.
    #[error("invalid EXITCODE {0:?}: expected an integer")]
    ExitCode(String),
    /// `CMD` could not be split into words.
    #[error("invalid CMD {0:?}: unbalanced quotes or trailing escape")]
    Command(String),
}

/// Expectations parsed from one spec file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Spec {
    pub command: Vec<String>,
    pub expected_stdout: Option<String>,
    pub expected_stderr: Option<String>,
    pub expected_exit_code: i32,
}

impl Spec {
    fn into_test(self, name: String, path: PathBuf) -> TestCase {
        TestCase {
            name,
            path,
            command: self.command,
            expected_stdout: self.expected_stdout,
            expected_stderr: self.expected_stderr,
            expected_exit_code: self.expected_exit_code,
            invalid: None,
        }
    }
}

/// A directive line whose body is still being collected.
struct Pending<'a> {
    keyword: String,
    argument: &'a str,
    body: Vec<&'a str>,
}

/// Parse the text of a spec file.
///
/// Variables are expanded in every directive before it is interpreted. When the same
/// directive appears more than once the last one wins.
pub fn parse_spec(text: &str, vars: &BTreeMap<String, String>) -> Result<Spec, LoadError> {
    let mut spec = Spec::default();
    let mut pending: Option<Pending<'_>> = None;

    // Splitting on '\n' drops the newline that ends the last body line before the next
    // directive. At the end of the file the trailing empty segment keeps the final
    // newline, so a body there reads back exactly as written. Directive lines tolerate
    // a trailing '\r'; body lines are kept byte for byte, so a '\r' there is expected
    // output.
    for line in text.split('\n') {
        let directive_line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(caps) = DIRECTIVE.captures(directive_line) {
            if let Some(done) = pending.take() {
                apply(&mut spec, done, vars)?;
            }
            let keyword = caps.get(1).map_or("", |m| m.as_str()).to_ascii_lowercase();
            let argument = caps.get(2).map_or("", |m| m.as_str()).trim();
            pending = Some(Pending {
                keyword,
                argument,
                body: Vec::new(),
            });
        } else if let Some(current) = pending.as_mut() {
            current.body.push(line);
        }
    }

    if let Some(done) = pending.take() {
        apply(&mut spec, done, vars)?;
    }
    Ok(spec)
}

fn apply(
    spec: &mut Spec,
    directive: Pending<'_>,
    vars: &BTreeMap<String, String>,
) -> Result<(), LoadError> {
    match directive.keyword.as_str() {
        "cmd" | "command" => {
            let line = expand(directive.argument, vars);
            spec.command = shlex::split(&line).ok_or(LoadError::Command(line))?;
        }
        "exitcode" => {
            let value = expand(directive.argument, vars);
            spec.expected_exit_code = value
                .trim()
                .parse()
                .map_err(|_| LoadError::ExitCode(value.clone()))?;
        }
        "stdout" => {
            spec.expected_stdout = Some(expand(&directive.body.join("\n"), vars));
        }
        "stderr" => {
            spec.expected_stderr = Some(expand(&directive.body.join("\n"), vars));
        }
        other => tracing::debug!(directive = other, "ignoring unknown directive"),
    }
    Ok(())
}

/// Load a test from a spec file.
pub fn load_spec(
    path: &Path,
    name: String,
    vars: &BTreeMap<String, String>,
) -> Result<TestCase, LoadError> {
    let contents = std::fs::read_to_string(path)?;
    let spec = parse_spec(&contents, vars)?;
    Ok(spec.into_test(name, path.to_path_buf()))
}

/// Derive a test name from a spec path: the path relative to `root` with the extension
/// removed and separators replaced by dots.
pub fn test_name(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path).with_extension("");
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .filter(|c| !c.is_empty() && c != ".")
        .collect::<Vec<_>>()
        .join(".")
}

/// Find all spec files in a directory, or return the single file.
pub fn find_specs(path: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut specs = Vec::new();
    collect_specs_recursive(path, &mut specs)?;
    specs.sort();
    Ok(specs)
}

fn collect_specs_recursive(dir: &Path, specs: &mut Vec<PathBuf>) -> Result<(), std::io::Error> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.is_dir() {
            collect_specs_recursive(&path, specs)?;
        } else if path.extension().is_some_and(|ext| ext == SPEC_EXTENSION) {
            specs.push(path);
        }
    }
    Ok(())
}

/// Load every spec file below `root`.
///
/// A spec file that cannot be read or parsed becomes an invalid test carrying the error
/// message, so that one broken file does not hide the rest of the suite.
pub fn discover(
    root: &Path,
    vars: &BTreeMap<String, String>,
) -> Result<Vec<TestCase>, std::io::Error> {
    let base = if root.is_file() {
        root.parent().unwrap_or(root)
    } else {
        root
    };

    let specs = find_specs(root)?;
    tracing::debug!(root = %root.display(), count = specs.len(), "discovered spec files");

    Ok(specs
        .into_iter()
        .map(|path| {
            let name = test_name(base, &path);
            match load_spec(&path, name.clone(), vars) {
                Ok(test) => test,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to load spec");
                    TestCase::invalid(name, path, e.to_string())
                }
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn no_vars() -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    #[test]
    fn parse_full_spec() {
        let text = "; CMD echo hi\n; EXITCODE 0\n; STDOUT\nhi\n";
        let spec = parse_spec(text, &no_vars()).unwrap();
        assert_eq!(spec.command, vec!["echo", "hi"]);
        assert_eq!(spec.expected_exit_code, 0);
        assert_eq!(spec.expected_stdout.as_deref(), Some("hi\n"));
        assert_eq!(spec.expected_stderr, None);
    }

    #[test]
    fn parse_keywords_case_insensitive() {
        let spec = parse_spec("; command true\n; ExitCode 2\n; stderr\nboom", &no_vars()).unwrap();
        assert_eq!(spec.command, vec!["true"]);
        assert_eq!(spec.expected_exit_code, 2);
        assert_eq!(spec.expected_stderr.as_deref(), Some("boom"));
    }

    #[test]
    fn parse_body_before_directive_drops_separator() {
        let text = "; STDOUT\nline one\nline two\n\n; STDERR\n; CMD true\n";
        let spec = parse_spec(text, &no_vars()).unwrap();
        assert_eq!(spec.expected_stdout.as_deref(), Some("line one\nline two\n"));
        assert_eq!(spec.expected_stderr.as_deref(), Some(""));
    }

    #[test]
    fn parse_crlf_directives_keep_body_bytes() {
        let text = "; CMD echo hi\r\n; EXITCODE 3\r\n; STDOUT\r\nhi\r\n; STDERR\r\nwarn\r\n";
        let spec = parse_spec(text, &no_vars()).unwrap();
        assert_eq!(spec.command, vec!["echo", "hi"]);
        assert_eq!(spec.expected_exit_code, 3);
        assert_eq!(spec.expected_stdout.as_deref(), Some("hi\r"));
        assert_eq!(spec.expected_stderr.as_deref(), Some("warn\r\n"));
    }

    #[test]
    fn parse_empty_body_at_end_of_file() {
        let spec = parse_spec("; CMD true\n; STDOUT", &no_vars()).unwrap();
        assert_eq!(spec.expected_stdout.as_deref(), Some(""));
    }

    #[test]
    fn parse_missing_directives_use_defaults() {
        let spec = parse_spec("just a comment\n", &no_vars()).unwrap();
        assert!(spec.command.is_empty());
        assert_eq!(spec.expected_exit_code, 0);
        assert!(spec.expected_stdout.is_none());
        assert!(spec.expected_stderr.is_none());
    }

    #[test]
    fn parse_ignores_unknown_directives_and_preamble() {
        let text = "preamble text\n; AUTHOR someone\n; CMD echo ok\n";
        let spec = parse_spec(text, &no_vars()).unwrap();
        assert_eq!(spec.command, vec!["echo", "ok"]);
    }

    #[test]
    fn parse_last_directive_wins() {
        let text = "; EXITCODE 1\n; CMD a\n; EXITCODE 4\n; CMD b c\n";
        let spec = parse_spec(text, &no_vars()).unwrap();
        assert_eq!(spec.expected_exit_code, 4);
        assert_eq!(spec.command, vec!["b", "c"]);
    }

    #[test]
    fn parse_command_honors_quoting() {
        let spec = parse_spec(r#"; CMD printf '%s\n' "a b" c\ d"#, &no_vars()).unwrap();
        assert_eq!(spec.command, vec!["printf", "%s\\n", "a b", "c d"]);
    }

    #[test]
    fn parse_invalid_exit_code() {
        let result = parse_spec("; EXITCODE zero\n", &no_vars());
        assert!(matches!(result, Err(LoadError::ExitCode(v)) if v == "zero"));
    }

    #[test]
    fn parse_unbalanced_command() {
        let result = parse_spec("; CMD echo 'oops\n", &no_vars());
        assert!(matches!(result, Err(LoadError::Command(_))));
    }

    #[test]
    fn parse_expands_variables_everywhere() {
        let vars: BTreeMap<String, String> = [
            ("BIN", "/usr/local/bin/tool"),
            ("CODE", "3"),
            ("WHO", "world"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let text = "; CMD ${BIN} --flag\n; EXITCODE ${CODE}\n; STDOUT\nhello ${WHO}\n\n; STDERR\n${UNSET}\n";
        let spec = parse_spec(text, &vars).unwrap();

        assert_eq!(spec.command, vec!["/usr/local/bin/tool", "--flag"]);
        assert_eq!(spec.expected_exit_code, 3);
        assert_eq!(spec.expected_stdout.as_deref(), Some("hello world\n"));
        assert_eq!(spec.expected_stderr.as_deref(), Some("${UNSET}\n"));
    }

    #[test]
    fn test_name_from_relative_path() {
        let root = Path::new("suite");
        assert_eq!(test_name(root, Path::new("suite/a/b/c.test")), "a.b.c");
        assert_eq!(test_name(root, Path::new("suite/top.test")), "top");
    }

    #[test]
    fn find_specs_in_directory() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("nested/deeper")).unwrap();
        std::fs::write(dir.path().join("a.test"), "").unwrap();
        std::fs::write(dir.path().join("nested/b.test"), "").unwrap();
        std::fs::write(dir.path().join("nested/deeper/c.test"), "").unwrap();
        std::fs::write(dir.path().join("d.txt"), "").unwrap();

        let specs = find_specs(dir.path()).unwrap();
        assert_eq!(specs.len(), 3);
    }

    #[test]
    fn discover_names_and_invalid_specs() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("cli")).unwrap();
        std::fs::write(dir.path().join("cli/echo.test"), "; CMD echo hi\n").unwrap();
        std::fs::write(dir.path().join("broken.test"), "; EXITCODE x\n").unwrap();

        let tests = discover(dir.path(), &no_vars()).unwrap();
        assert_eq!(tests.len(), 2);

        let broken = tests.iter().find(|t| t.name == "broken").unwrap();
        assert!(broken.invalid.as_deref().unwrap().contains("EXITCODE"));

        let echo = tests.iter().find(|t| t.name == "cli.echo").unwrap();
        assert_eq!(echo.command, vec!["echo", "hi"]);
        assert!(echo.invalid.is_none());
    }

    #[test]
    fn discover_missing_root_is_an_error() {
        let dir = tempdir().unwrap();
        assert!(discover(&dir.path().join("nope"), &no_vars()).is_err());
    }
}
