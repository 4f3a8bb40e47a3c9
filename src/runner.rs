//! Test execution engine.
//!
//! Runs a test's command, captures its output and either judges it against the golden
//! expectations or writes the captured behavior back to the spec file.

use crate::diff;
use crate::loader::parse_spec;
use crate::report::{Console, Report};
use crate::schema::{TestCase, render_spec};
use crate::settings::Settings;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors that prevent a test from producing a verdict.
#[derive(Debug, Error)]
pub enum ExecError {
    /// The spec file declares no command.
    #[error("no command to run: the spec file has no CMD directive")]
    NoCommand,
    /// The program could not be started.
    #[error("failed to spawn {program:?}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// The captured behavior would read back differently from the spec file, typically
    /// because an output line looks like a directive.
    #[error("captured {what} cannot be stored in {}: it would not read back unchanged", .path.display())]
    Unrepresentable { path: PathBuf, what: &'static str },
    /// The regenerated spec file could not be written.
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Output captured from one run of a test command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// One way in which actual behavior diverged from the golden expectations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mismatch {
    ExitCode { expected: i32, actual: i32 },
    Stdout { expected: String, actual: String },
    Stderr { expected: String, actual: String },
}

/// Result of executing a test.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub output: CommandOutput,
    pub duration: Duration,
    pub mismatches: Vec<Mismatch>,
}

impl RunResult {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Verdict for one scheduled test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Passed,
    Mismatch(Vec<Mismatch>),
    /// The command could not be run.
    SpawnError(String),
    /// The spec file could not be loaded.
    ParseError(String),
    /// The runner itself panicked while handling the test.
    Crashed(String),
    Updated,
    UpdateError(String),
}

impl Outcome {
    /// Short description of why the test failed, or `None` if it did not.
    pub fn reason(&self) -> Option<String> {
        match self {
            Outcome::Passed | Outcome::Updated => None,
            Outcome::Mismatch(mismatches) => {
                let dimensions: Vec<&str> = mismatches
                    .iter()
                    .map(|m| match m {
                        Mismatch::ExitCode { .. } => "exit code",
                        Mismatch::Stdout { .. } => "stdout",
                        Mismatch::Stderr { .. } => "stderr",
                    })
                    .collect();
                Some(format!("unexpected {}", dimensions.join(", ")))
            }
            Outcome::SpawnError(message)
            | Outcome::ParseError(message)
            | Outcome::Crashed(message)
            | Outcome::UpdateError(message) => Some(message.clone()),
        }
    }
}

/// Run a command and capture its output.
///
/// A process terminated by a signal reports the negated signal number as exit code.
pub fn run_command(argv: &[String]) -> Result<CommandOutput, ExecError> {
    let (program, args) = argv.split_first().ok_or(ExecError::NoCommand)?;

    tracing::debug!(program = %program, ?args, "spawning test command");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| ExecError::Spawn {
            program: program.clone(),
            source,
        })?;

    #[cfg(unix)]
    let signal = {
        use std::os::unix::process::ExitStatusExt;
        output.status.signal()
    };
    #[cfg(not(unix))]
    let signal: Option<i32> = None;
    let exit_code = output
        .status
        .code()
        .or(signal.map(|s| -s))
        .unwrap_or(-1);

    Ok(CommandOutput {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Compare captured output with a test's expectations.
///
/// Exit code, stdout and stderr are checked independently; every divergence is returned.
pub fn check_expectations(test: &TestCase, output: &CommandOutput) -> Vec<Mismatch> {
    let mut mismatches = Vec::new();

    if output.exit_code != test.expected_exit_code {
        mismatches.push(Mismatch::ExitCode {
            expected: test.expected_exit_code,
            actual: output.exit_code,
        });
    }

    if let Some(expected) = &test.expected_stdout
        && !diff::matches(expected, &output.stdout)
    {
        mismatches.push(Mismatch::Stdout {
            expected: expected.clone(),
            actual: output.stdout.clone(),
        });
    }

    if let Some(expected) = &test.expected_stderr
        && !diff::matches(expected, &output.stderr)
    {
        mismatches.push(Mismatch::Stderr {
            expected: expected.clone(),
            actual: output.stderr.clone(),
        });
    }

    mismatches
}

/// Run a test's command and judge the result.
pub fn execute(test: &TestCase) -> Result<RunResult, ExecError> {
    let start = Instant::now();
    let output = run_command(&test.command)?;
    let duration = start.elapsed();
    let mismatches = check_expectations(test, &output);

    Ok(RunResult {
        output,
        duration,
        mismatches,
    })
}

/// Run a test's command and overwrite its spec file with the captured behavior.
///
/// The file is left untouched if the rendered spec would not load back as exactly the
/// captured behavior under `vars`.
pub fn regenerate(
    test: &TestCase,
    vars: &BTreeMap<String, String>,
) -> Result<CommandOutput, ExecError> {
    let output = run_command(&test.command)?;
    let text = render_spec(test, output.exit_code, &output.stdout, &output.stderr);
    check_representable(test, &text, &output, vars)?;
    write_atomically(&test.path, &text).map_err(|source| ExecError::Write {
        path: test.path.clone(),
        source,
    })?;
    Ok(output)
}

fn check_representable(
    test: &TestCase,
    text: &str,
    output: &CommandOutput,
    vars: &BTreeMap<String, String>,
) -> Result<(), ExecError> {
    let unrepresentable = |what| ExecError::Unrepresentable {
        path: test.path.clone(),
        what,
    };
    let spec = parse_spec(text, vars).map_err(|_| unrepresentable("behavior"))?;

    if spec.command != test.command {
        return Err(unrepresentable("command"));
    }
    if spec.expected_exit_code != output.exit_code {
        return Err(unrepresentable("exit code"));
    }
    if spec.expected_stdout.as_deref() != Some(output.stdout.as_str()) {
        return Err(unrepresentable("stdout"));
    }
    if spec.expected_stderr.as_deref() != Some(output.stderr.as_str()) {
        return Err(unrepresentable("stderr"));
    }
    Ok(())
}

/// Replace a file's contents without leaving it half-written if the write fails.
fn write_atomically(path: &Path, contents: &str) -> std::io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)?;
    file.write_all(contents.as_bytes())?;
    file.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Run one test in judging mode and report it to the console.
pub fn run_test(test: &TestCase, settings: &Settings, console: &Console) -> Outcome {
    let mut report = Report::new(settings);
    report.begin_test(&test.name);

    if let Some(reason) = &test.invalid {
        report.test_error(&test.name, reason);
        report.flush(console);
        return Outcome::ParseError(reason.clone());
    }

    let result = match execute(test) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(test = %test.name, error = %e, "test could not be executed");
            let message = e.to_string();
            report.test_error(&test.name, &message);
            report.flush(console);
            return Outcome::SpawnError(message);
        }
    };

    for mismatch in &result.mismatches {
        match mismatch {
            Mismatch::ExitCode { expected, actual } => {
                report.exit_code_mismatch(*expected, *actual)
            }
            Mismatch::Stdout { expected, actual } => report.stdout_mismatch(expected, actual),
            Mismatch::Stderr { expected, actual } => report.stderr_mismatch(expected, actual),
        }
    }
    tracing::debug!(
        test = %test.name,
        exit_code = result.output.exit_code,
        duration = ?result.duration,
        "test finished"
    );
    report.end_test(&test.name, result.duration, !result.passed());
    report.flush(console);

    if result.passed() {
        Outcome::Passed
    } else {
        Outcome::Mismatch(result.mismatches)
    }
}

/// Run one test in update mode. Only failures are reported.
pub fn update_test(test: &TestCase, settings: &Settings, console: &Console) -> Outcome {
    let error = match &test.invalid {
        Some(reason) => reason.clone(),
        None => match regenerate(test, &settings.variables) {
            Ok(output) => {
                tracing::debug!(test = %test.name, exit_code = output.exit_code, "updated spec file");
                return Outcome::Updated;
            }
            Err(e) => e.to_string(),
        },
    };

    tracing::warn!(test = %test.name, error = %error, "failed to update spec file");
    let mut report = Report::new(settings);
    report.update_error(&test.name, &error);
    report.flush(console);
    Outcome::UpdateError(error)
}
