//! Output comparison and mismatch rendering.

use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use std::fmt::Write as _;

/// Rule printed above and below diff and output blocks.
pub const RULE: &str = "------------------------------------------------------------";

/// Marker that makes newlines visible inside a diff.
const NEWLINE_MARKER: &str = "\u{21b2}\n";

/// Golden output comparison is exact: no whitespace or line-ending normalization.
pub fn matches(expected: &str, actual: &str) -> bool {
    expected == actual
}

/// A run of text that is equal, expected-only or actual-only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub tag: ChangeTag,
    pub text: String,
}

/// Word-level diff between expected and actual text, cleaned up for reading.
///
/// Short equal runs sandwiched between changes are absorbed into both sides, and every
/// run of changes is shown as all of its expected text followed by all of its actual
/// text. Concatenating the non-insert spans gives back `expected`; concatenating the
/// non-delete spans gives back `actual`.
pub fn spans(expected: &str, actual: &str) -> Vec<Span> {
    let raw = word_changes(expected, actual);
    let mut spans = Vec::new();
    let mut deleted = String::new();
    let mut inserted = String::new();

    for (i, span) in raw.iter().enumerate() {
        match span.tag {
            ChangeTag::Delete => deleted.push_str(&span.text),
            ChangeTag::Insert => inserted.push_str(&span.text),
            ChangeTag::Equal => {
                let before = deleted.chars().count().max(inserted.chars().count());
                let after = edit_len(&raw[i + 1..]);
                if before > 0 && after > 0 && is_absorbable(&span.text, before, after) {
                    deleted.push_str(&span.text);
                    inserted.push_str(&span.text);
                } else {
                    push_edit(&mut spans, &mut deleted, &mut inserted);
                    spans.push(span.clone());
                }
            }
        }
    }
    push_edit(&mut spans, &mut deleted, &mut inserted);
    spans
}

/// Whether an equal run between two edits is too small to be worth showing on its own.
fn is_absorbable(text: &str, before: usize, after: usize) -> bool {
    let len = text.chars().count();
    text.chars().all(char::is_whitespace) || (len <= before && len <= after)
}

/// Length of the longer side of the edit that starts `rest`, or 0 if `rest` does not
/// start with one.
fn edit_len(rest: &[Span]) -> usize {
    let (mut deleted, mut inserted) = (0, 0);
    for span in rest {
        match span.tag {
            ChangeTag::Delete => deleted += span.text.chars().count(),
            ChangeTag::Insert => inserted += span.text.chars().count(),
            ChangeTag::Equal => break,
        }
    }
    deleted.max(inserted)
}

fn push_edit(spans: &mut Vec<Span>, deleted: &mut String, inserted: &mut String) {
    if !deleted.is_empty() {
        spans.push(Span {
            tag: ChangeTag::Delete,
            text: std::mem::take(deleted),
        });
    }
    if !inserted.is_empty() {
        spans.push(Span {
            tag: ChangeTag::Insert,
            text: std::mem::take(inserted),
        });
    }
}

/// Raw word-level changes with adjacent changes of the same kind merged.
fn word_changes(expected: &str, actual: &str) -> Vec<Span> {
    let diff = TextDiff::from_words(expected, actual);
    let mut spans: Vec<Span> = Vec::new();

    for change in diff.iter_all_changes() {
        let tag = change.tag();
        let value = change.to_string_lossy();
        match spans.last_mut() {
            Some(last) if last.tag == tag => last.text.push_str(&value),
            _ => spans.push(Span {
                tag,
                text: value.into_owned(),
            }),
        }
    }
    spans
}

/// Render a stdout or stderr mismatch for display.
///
/// With color, an inline diff is shown: expected-only text in red, actual-only text in
/// green, and newlines made visible. Without color, the actual and expected outputs are
/// printed as two fenced blocks.
pub fn render(expected: &str, actual: &str, color: bool) -> String {
    let mut out = String::new();

    if color {
        out.push_str("Diff (red: expected, green: actual):\n");
        let _ = writeln!(out, "{RULE}");
        let mut at_line_start = true;
        for span in spans(expected, actual) {
            at_line_start = span.text.ends_with('\n');
            let text = span.text.replace('\n', NEWLINE_MARKER);
            match span.tag {
                ChangeTag::Delete => out.push_str(&text.red().to_string()),
                ChangeTag::Insert => out.push_str(&text.green().to_string()),
                ChangeTag::Equal => out.push_str(&text),
            }
        }
        if !at_line_start {
            out.push('\n');
        }
        let _ = writeln!(out, "{RULE}");
    } else {
        push_block(&mut out, "Actual", actual);
        push_block(&mut out, "Expected", expected);
    }
    out
}

fn push_block(out: &mut String, title: &str, body: &str) {
    let _ = writeln!(out, "{title}:");
    let _ = writeln!(out, "{RULE}");
    out.push_str(body);
    if !body.is_empty() && !body.ends_with('\n') {
        out.push('\n');
    }
    let _ = writeln!(out, "{RULE}");
}

/// Render an exit code mismatch.
pub fn render_exit_code(expected: i32, actual: i32) -> String {
    format!("Unexpected exit code from test.\n  Actual: {actual}\nExpected: {expected}\n")
}
