//! Test scheduling.
//!
//! Tests are either run one after another on the calling thread, or handed to a fixed
//! set of worker threads through a shared FIFO queue. Workers record every verdict in a
//! [`RunState`] that the caller reads once all of them have been joined.

use crate::report::{Console, Report};
use crate::runner::{self, Outcome};
use crate::schema::TestCase;
use crate::settings::Settings;
use std::num::NonZeroUsize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// What to do with each test.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Compare actual behavior with the golden expectations.
    Judge,
    /// Rewrite the golden expectations from actual behavior.
    Update,
}

/// How many threads run tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parallelism {
    /// Run every test on the calling thread.
    Sequential,
    /// Run tests on this many worker threads.
    Workers(NonZeroUsize),
}

impl Parallelism {
    /// Interpret the `--threads` option: a positive count is used as is, zero means one
    /// worker per available CPU, and a negative count disables worker threads.
    pub fn from_threads(threads: i64) -> Self {
        match threads {
            n if n < 0 => Parallelism::Sequential,
            0 => Parallelism::Workers(
                thread::available_parallelism().unwrap_or(NonZeroUsize::MIN),
            ),
            n => Parallelism::Workers(
                usize::try_from(n)
                    .ok()
                    .and_then(NonZeroUsize::new)
                    .unwrap_or(NonZeroUsize::MIN),
            ),
        }
    }
}

/// Shared bookkeeping for one run.
#[derive(Debug, Default)]
pub struct RunState<'a> {
    ran: AtomicUsize,
    failed: Mutex<Vec<&'a TestCase>>,
}

impl<'a> RunState<'a> {
    fn record(&self, test: &'a TestCase, outcome: &Outcome) {
        if let Some(reason) = outcome.reason() {
            tracing::debug!(test = %test.name, %reason, "test failed");
            self.failed
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(test);
        }
        self.ran.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of tests that have finished.
    pub fn ran(&self) -> usize {
        self.ran.load(Ordering::SeqCst)
    }

    /// Failed tests, in the order they finished.
    pub fn failed(&self) -> Vec<&'a TestCase> {
        self.failed.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Run every test and collect the verdicts.
pub fn run_all<'a>(
    tests: &'a [TestCase],
    parallelism: Parallelism,
    mode: Mode,
    settings: &Settings,
    console: &Console,
) -> RunState<'a> {
    let state = RunState::default();

    match parallelism {
        Parallelism::Sequential => {
            for test in tests {
                let outcome = run_one(test, mode, settings, console);
                state.record(test, &outcome);
            }
        }
        Parallelism::Workers(count) => {
            let (sender, receiver) = crossbeam_channel::unbounded::<&'a TestCase>();
            thread::scope(|s| {
                for worker in 0..count.get() {
                    let receiver = receiver.clone();
                    let state = &state;
                    s.spawn(move || {
                        tracing::debug!(worker, "worker started");
                        for test in receiver.iter() {
                            let outcome = run_one(test, mode, settings, console);
                            state.record(test, &outcome);
                        }
                        tracing::debug!(worker, "worker drained the queue");
                    });
                }

                for test in tests {
                    // Workers only stop once the sender is dropped, so the queue is open.
                    let _ = sender.send(test);
                }
                drop(sender);
            });
        }
    }

    state
}

/// Run a single test, turning a panic anywhere below this point into a failed verdict.
fn run_one(test: &TestCase, mode: Mode, settings: &Settings, console: &Console) -> Outcome {
    let result = panic::catch_unwind(AssertUnwindSafe(|| match mode {
        Mode::Judge => runner::run_test(test, settings, console),
        Mode::Update => runner::update_test(test, settings, console),
    }));

    result.unwrap_or_else(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "test runner panicked".to_string());
        tracing::error!(test = %test.name, %message, "panic while running test");

        let mut report = Report::new(settings);
        report.test_error(&test.name, &message);
        report.flush(console);
        Outcome::Crashed(message)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::settings::ColorChoice;
    use std::collections::BTreeSet;
    use std::path::PathBuf;

    fn make_test(name: &str, argv: &[&str], stdout: Option<&str>) -> TestCase {
        TestCase {
            name: name.to_string(),
            path: PathBuf::from(format!("{name}.test")),
            command: argv.iter().map(|s| s.to_string()).collect(),
            expected_stdout: stdout.map(String::from),
            ..TestCase::default()
        }
    }

    fn mixed_suite() -> Vec<TestCase> {
        let mut tests = Vec::new();
        for i in 0..12 {
            let word = format!("w{i}");
            let expected = if i % 3 == 0 {
                "wrong\n".to_string()
            } else {
                format!("{word}\n")
            };
            tests.push(make_test(
                &format!("t{i}"),
                &["echo", &word],
                Some(expected.as_str()),
            ));
        }
        tests.push(make_test("missing", &["/definitely/not/a/program"], None));
        tests
    }

    fn failed_names(state: &RunState<'_>) -> BTreeSet<String> {
        state.failed().iter().map(|t| t.name.clone()).collect()
    }

    fn brief() -> Settings {
        Settings::new(ColorChoice::No, true)
    }

    #[test]
    fn from_threads_mapping() {
        assert_eq!(Parallelism::from_threads(-1), Parallelism::Sequential);
        assert_eq!(
            Parallelism::from_threads(3),
            Parallelism::Workers(NonZeroUsize::new(3).unwrap())
        );
        assert!(matches!(
            Parallelism::from_threads(0),
            Parallelism::Workers(_)
        ));
    }

    #[test]
    fn sequential_run_counts_failures() {
        let tests = mixed_suite();
        let console = Console::memory();
        let state = run_all(&tests, Parallelism::Sequential, Mode::Judge, &brief(), &console);

        assert_eq!(state.ran(), tests.len());
        let expected: BTreeSet<String> = ["t0", "t3", "t6", "t9", "missing"]
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(failed_names(&state), expected);
    }

    #[test]
    fn workers_agree_with_sequential() {
        let tests = mixed_suite();
        let settings = brief();

        let sequential = run_all(
            &tests,
            Parallelism::Sequential,
            Mode::Judge,
            &settings,
            &Console::memory(),
        );
        let parallel = run_all(
            &tests,
            Parallelism::Workers(NonZeroUsize::new(4).unwrap()),
            Mode::Judge,
            &settings,
            &Console::memory(),
        );

        assert_eq!(parallel.ran(), sequential.ran());
        assert_eq!(failed_names(&parallel), failed_names(&sequential));
    }

    #[test]
    fn more_workers_than_tests() {
        let tests = vec![make_test("only", &["true"], None)];
        let state = run_all(
            &tests,
            Parallelism::Workers(NonZeroUsize::new(8).unwrap()),
            Mode::Judge,
            &brief(),
            &Console::memory(),
        );
        assert_eq!(state.ran(), 1);
        assert!(state.failed().is_empty());
    }

    #[test]
    fn empty_suite() {
        let state = run_all(
            &[],
            Parallelism::Workers(NonZeroUsize::new(2).unwrap()),
            Mode::Judge,
            &brief(),
            &Console::memory(),
        );
        assert_eq!(state.ran(), 0);
    }

    #[test]
    fn each_failure_is_flushed_as_one_block() {
        let tests = mixed_suite();
        let console = Console::memory();
        run_all(
            &tests,
            Parallelism::Workers(NonZeroUsize::new(4).unwrap()),
            Mode::Judge,
            &brief(),
            &console,
        );

        let text = console.captured();
        for i in [0, 3, 6, 9] {
            let block = format!(
                "Unexpected stdout output from test.\nActual:\n{rule}\nw{i}\n{rule}\nExpected:\n{rule}\nwrong\n{rule}\n[  FAILED  ] t{i} (",
                rule = crate::diff::RULE
            );
            assert!(text.contains(&block), "missing block for t{i}:\n{text}");
        }
    }
}
