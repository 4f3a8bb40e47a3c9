//! Human-readable progress and summary output.
//!
//! Every message is assembled in a [`Report`] owned by one thread and written to the
//! shared [`Console`] in a single locked write, so output from concurrent workers never
//! interleaves inside a message.

use crate::diff;
use crate::settings::Settings;
use colored::{ColoredString, Colorize};
use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::Mutex;
use std::time::Duration;

const RUN: &str = "[ RUN      ]";
const OK: &str = "[       OK ]";
const FAILED: &str = "[  FAILED  ]";
const PASSED: &str = "[  PASSED  ]";
const BANNER: &str = "[==========]";

/// Where flushed reports end up.
enum Sink {
    Stdout,
    Memory(String),
}

/// The shared output stream. Its lock is held for the duration of one flush.
pub struct Console {
    sink: Mutex<Sink>,
}

impl Console {
    pub fn stdout() -> Self {
        Self {
            sink: Mutex::new(Sink::Stdout),
        }
    }

    /// A console that keeps everything written to it.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn memory() -> Self {
        Self {
            sink: Mutex::new(Sink::Memory(String::new())),
        }
    }

    /// Everything written to a memory console so far.
    #[cfg_attr(not(test), allow(dead_code))]
    pub fn captured(&self) -> String {
        match &*self.sink.lock().unwrap_or_else(|e| e.into_inner()) {
            Sink::Stdout => String::new(),
            Sink::Memory(text) => text.clone(),
        }
    }

    fn write(&self, text: &str) {
        let mut sink = self.sink.lock().unwrap_or_else(|e| e.into_inner());
        match &mut *sink {
            Sink::Stdout => {
                let mut stdout = std::io::stdout().lock();
                let _ = stdout.write_all(text.as_bytes());
                let _ = stdout.flush();
            }
            Sink::Memory(buffer) => buffer.push_str(text),
        }
    }
}

/// Totals printed at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub ran: usize,
    pub failed: Vec<String>,
    pub elapsed: Duration,
}

impl Summary {
    pub fn passed(&self) -> usize {
        self.ran.saturating_sub(self.failed.len())
    }
}

/// An append-only message buffer bound to the color and brief settings at creation.
pub struct Report {
    buffer: String,
    color: bool,
    brief: bool,
}

impl Report {
    pub fn new(settings: &Settings) -> Self {
        Self {
            buffer: String::new(),
            color: settings.color,
            brief: settings.brief,
        }
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    #[cfg_attr(not(test), allow(dead_code))]
    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    fn paint(&mut self, tag: &str, style: fn(&str) -> ColoredString) {
        if self.color {
            self.buffer.push_str(&style(tag).to_string());
        } else {
            self.buffer.push_str(tag);
        }
    }

    fn green(&mut self, tag: &str) {
        self.paint(tag, |s| s.green());
    }

    fn red(&mut self, tag: &str) {
        self.paint(tag, |s| s.red());
    }

    pub fn append(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn run_started(&mut self, count: usize) {
        if self.brief {
            return;
        }
        self.green(BANNER);
        let _ = write!(self.buffer, " Running {}", plural(count, "test", "tests"));
    }

    pub fn begin_test(&mut self, name: &str) {
        if self.brief {
            return;
        }
        self.green(RUN);
        let _ = writeln!(self.buffer, " {name}");
    }

    pub fn end_test(&mut self, name: &str, duration: Duration, failed: bool) {
        if failed {
            self.red(FAILED);
        } else if !self.brief {
            self.green(OK);
        } else {
            return;
        }
        let _ = write!(self.buffer, " {name} ({})", format_duration(duration));
    }

    /// A test that could not be run at all.
    pub fn test_error(&mut self, name: &str, message: &str) {
        let _ = writeln!(self.buffer, "{message}");
        self.red(FAILED);
        let _ = write!(self.buffer, " exception occurred when running {name}");
    }

    pub fn exit_code_mismatch(&mut self, expected: i32, actual: i32) {
        self.buffer.push_str(&diff::render_exit_code(expected, actual));
    }

    pub fn stdout_mismatch(&mut self, expected: &str, actual: &str) {
        self.output_mismatch("stdout", expected, actual);
    }

    pub fn stderr_mismatch(&mut self, expected: &str, actual: &str) {
        self.output_mismatch("stderr", expected, actual);
    }

    fn output_mismatch(&mut self, stream: &str, expected: &str, actual: &str) {
        let _ = writeln!(self.buffer, "Unexpected {stream} output from test.");
        self.buffer
            .push_str(&diff::render(expected, actual, self.color));
    }

    pub fn update_error(&mut self, name: &str, message: &str) {
        let _ = write!(
            self.buffer,
            "ERROR: exception occurred when updating {name}\n{message}"
        );
    }

    pub fn updated(&mut self, count: usize) {
        let text = if count == 1 {
            "1 UPDATED TEST".to_string()
        } else {
            format!("{count} UPDATED TESTS")
        };
        let _ = writeln!(self.buffer, "\n {text}");
    }

    /// The final summary. Always printed, brief or not.
    pub fn run_finished(&mut self, summary: &Summary) {
        self.green(BANNER);
        let _ = writeln!(
            self.buffer,
            " {} ran ({}).",
            plural(summary.ran, "test", "tests"),
            format_duration(summary.elapsed)
        );
        self.green(PASSED);
        let _ = write!(self.buffer, " {}.", plural(summary.passed(), "test", "tests"));

        if summary.failed.is_empty() {
            return;
        }

        self.buffer.push('\n');
        self.red(FAILED);
        let _ = writeln!(
            self.buffer,
            " {}, listed below:",
            plural(summary.failed.len(), "test", "tests")
        );
        for name in &summary.failed {
            self.red(FAILED);
            let _ = writeln!(self.buffer, " {name}");
        }
        let count = summary.failed.len();
        let text = if count == 1 {
            "1 FAILED TEST".to_string()
        } else {
            format!("{count} FAILED TESTS")
        };
        let _ = writeln!(self.buffer, "\n {text}");
    }

    /// Write the whole message to the console as one unit and clear the buffer.
    pub fn flush(&mut self, console: &Console) {
        if self.buffer.is_empty() {
            return;
        }
        if !self.buffer.ends_with('\n') {
            self.buffer.push('\n');
        }
        console.write(&self.buffer);
        self.buffer.clear();
    }
}

fn plural(count: usize, one: &str, many: &str) -> String {
    if count == 1 {
        format!("1 {one}")
    } else {
        format!("{count} {many}")
    }
}

/// Format a duration with the largest unit that keeps the value readable.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();
    if secs >= 3600.0 {
        format!("{:.2} h", secs / 3600.0)
    } else if secs >= 60.0 {
        format!("{:.2} min", secs / 60.0)
    } else if secs >= 1.0 {
        format!("{secs:.2} s")
    } else {
        format!("{:.2} ms", secs * 1000.0)
    }
}
