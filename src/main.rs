mod diff;
mod env;
mod loader;
mod pool;
mod report;
mod runner;
mod schema;
mod settings;
mod suite;

use clap::Parser;
use pool::{Mode, Parallelism};
use report::Console;
use settings::{ColorChoice, Settings};
use std::path::PathBuf;
use std::process::ExitCode;
use suite::Suite;

#[derive(Parser)]
#[command(name = "goldtest")]
#[command(about = "A golden-file test runner for command-line programs")]
#[command(version)]
struct Cli {
    /// Directories to search for `.test` spec files
    #[arg(default_value = ".")]
    dirs: Vec<PathBuf>,
    /// List the names of all tests instead of running them
    #[arg(long)]
    list: bool,
    /// Run only the tests whose full name matches this regular expression
    #[arg(long)]
    filter: Option<String>,
    /// Worker threads: 0 uses every available CPU, a negative value runs tests on the
    /// main thread
    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    threads: i64,
    /// Randomize the order of tests
    #[arg(long)]
    shuffle: bool,
    /// Only print test failures
    #[arg(long)]
    brief: bool,
    /// Enable or disable colored output
    #[arg(long, value_enum, default_value_t = ColorChoice::Auto)]
    color: ColorChoice,
    /// Rewrite the expected results of each test from its actual behavior
    #[arg(long)]
    update: bool,
    /// Declare a variable expanded as `${NAME}` in spec files (repeatable)
    #[arg(long = "var", num_args = 2, value_names = ["NAME", "VALUE"], action = clap::ArgAction::Append)]
    vars: Vec<String>,
}

fn main() -> ExitCode {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .try_init();

    let cli = Cli::parse();

    let settings = Settings::new(cli.color, cli.brief).with_variable_pairs(&cli.vars);
    colored::control::set_override(settings.color);

    let suite = match Suite::discover(&cli.dirs, &settings)
        .and_then(|suite| suite.filter(cli.filter.as_deref()))
    {
        Ok(suite) => suite,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let console = Console::stdout();

    if cli.list {
        suite.list(&console);
        return ExitCode::SUCCESS;
    }

    let mut suite = suite;
    if cli.shuffle {
        suite.shuffle();
    }

    let mode = if cli.update { Mode::Update } else { Mode::Judge };
    let summary = suite.run(
        Parallelism::from_threads(cli.threads),
        mode,
        &settings,
        &console,
    );

    if summary.failed.is_empty() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
