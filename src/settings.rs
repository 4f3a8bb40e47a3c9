//! Run-wide settings.
//!
//! Built once from the command line before any spec file is parsed, then shared by
//! reference with the loader, the reporter and the scheduler.

use clap::ValueEnum;
use std::collections::BTreeMap;
use std::io::IsTerminal;

/// When to emit ANSI colors.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum ColorChoice {
    /// Always color the output
    Yes,
    /// Never color the output
    No,
    /// Color only when stdout is a terminal
    #[default]
    Auto,
}

impl ColorChoice {
    /// Resolve the choice against the current stdout.
    pub fn enabled(self) -> bool {
        match self {
            ColorChoice::Yes => true,
            ColorChoice::No => false,
            ColorChoice::Auto => std::io::stdout().is_terminal(),
        }
    }
}

/// Immutable configuration for one invocation of the runner.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    /// Emit ANSI colors and inline diffs.
    pub color: bool,
    /// Only print failures.
    pub brief: bool,
    /// Values substituted for `${NAME}` placeholders in spec files.
    pub variables: BTreeMap<String, String>,
}

impl Settings {
    pub fn new(color: ColorChoice, brief: bool) -> Self {
        Self {
            color: color.enabled(),
            brief,
            variables: BTreeMap::new(),
        }
    }

    /// Declare variables from the flat `NAME VALUE NAME VALUE ...` list collected for the
    /// repeatable `--var` option. A later declaration of a name replaces the earlier one.
    pub fn with_variable_pairs(mut self, pairs: &[String]) -> Self {
        for pair in pairs.chunks_exact(2) {
            self.variables.insert(pair[0].clone(), pair[1].clone());
        }
        self
    }
}
