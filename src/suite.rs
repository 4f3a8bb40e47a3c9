//! Test suite orchestration.
//!
//! Collects tests from one or more roots, narrows and orders them, hands them to the
//! scheduler and prints the final summary.

use crate::loader;
use crate::pool::{self, Mode, Parallelism};
use crate::report::{Console, Report, Summary};
use crate::schema::TestCase;
use crate::settings::Settings;
use rand::seq::SliceRandom;
use regex::Regex;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Errors that stop a run before any test is executed.
#[derive(Debug, Error)]
pub enum SuiteError {
    #[error("failed to find tests in {}: {source}", .root.display())]
    Discover {
        root: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid filter pattern: {0}")]
    Filter(#[from] regex::Error),
}

/// The tests of one invocation, in the order they will be dispatched.
#[derive(Debug, Clone, Default)]
pub struct Suite {
    tests: Vec<TestCase>,
}

impl Suite {
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn from_tests(tests: Vec<TestCase>) -> Self {
        Self { tests }
    }

    /// Load every spec file under each root. Tests from different roots are kept even
    /// when their names collide.
    pub fn discover(roots: &[PathBuf], settings: &Settings) -> Result<Self, SuiteError> {
        let mut tests = Vec::new();
        for root in roots {
            let found =
                loader::discover(root, &settings.variables).map_err(|source| SuiteError::Discover {
                    root: root.clone(),
                    source,
                })?;
            tests.extend(found);
        }
        Ok(Self { tests })
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn tests(&self) -> &[TestCase] {
        &self.tests
    }

    /// Keep only the tests whose whole name matches `pattern`.
    pub fn filter(mut self, pattern: Option<&str>) -> Result<Self, SuiteError> {
        if let Some(pattern) = pattern {
            let re = Regex::new(&format!("^(?:{pattern})$"))?;
            self.tests.retain(|test| re.is_match(&test.name));
        }
        Ok(self)
    }

    /// Randomize the dispatch order.
    pub fn shuffle(&mut self) {
        self.tests.shuffle(&mut rand::thread_rng());
    }

    /// Print the name of every test without running anything.
    pub fn list(&self, console: &Console) {
        let mut report = Report::new(&Settings::default());
        for test in &self.tests {
            report.append(&test.name);
            report.append("\n");
        }
        report.flush(console);
    }

    /// Run or update every test and print the summary.
    pub fn run(
        &self,
        parallelism: Parallelism,
        mode: Mode,
        settings: &Settings,
        console: &Console,
    ) -> Summary {
        let mut report = Report::new(settings);
        if mode == Mode::Judge {
            report.run_started(self.tests.len());
        }
        report.flush(console);

        tracing::debug!(tests = self.tests.len(), ?parallelism, ?mode, "starting run");
        let start = Instant::now();
        let state = pool::run_all(&self.tests, parallelism, mode, settings, console);
        let summary = Summary {
            ran: state.ran(),
            failed: state.failed().iter().map(|t| t.name.clone()).collect(),
            elapsed: start.elapsed(),
        };

        match mode {
            Mode::Judge => report.run_finished(&summary),
            Mode::Update => report.updated(summary.ran),
        }
        report.flush(console);
        summary
    }
}
