//! Reclassification of streamed script output into log levels.
use std::sync::LazyLock;

use regex::Regex;

use super::types::Log;
use crate::exec::{LineSink, Stream};

/// Level a script line is logged at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineLevel {
    /// Failure lines.
    Error,
    /// Warning lines.
    Warn,
    /// Default and success lines.
    Info,
    /// Chatter only shown when verbose.
    Debug,
}

fn compile(patterns: &[&str]) -> Vec<Regex> {
    patterns.iter().filter_map(|p| Regex::new(p).ok()).collect()
}

static ANSI: LazyLock<Vec<Regex>> = LazyLock::new(|| compile(&[r"\x1b\[[0-9;]*[a-zA-Z]"]));

static PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"^\[INFO\]\s*",
        r"^\[ERROR\]\s*",
        r"^\[WARNING\]\s*",
        r"^\[SUCCESS\]\s*",
        r"^\[DONE\]\s*",
        r"^\[DEBUG\]\s*",
    ])
});

static ERROR: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\[(ERROR|FAIL|FATAL)\]",
        r"(?i)^\s*(❌|✗|ERROR|FAIL|FATAL)",
        r"(?i)failed",
        r"(?i)error:",
    ])
});

static WARN: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\[(WARN|WARNING)\]",
        r"(?i)^\s*(⚠️|WARNING|WARN)",
        r"(?i)may already be installed",
    ])
});

static SUCCESS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\[(SUCCESS|DONE)\]",
        r"(?i)^\s*(✅|✓|SUCCESS|DONE|COMPLETE)",
        r"(?i)successfully",
        r"(?i)installation complete",
    ])
});

static DEBUG: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)\[(DEBUG|VERBOSE)\]",
        r"(?i)^\s*Files included",
        r"(?i)^\s*VSIX file created",
    ])
});

static IMPORTANT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    compile(&[
        r"(?i)successfully installed:",
        r"(?i)installation complete",
        r"(?i)setup complete",
        r"^\s*===.*===$",
        r"^\s*---.*---$",
    ])
});

fn any_match(set: &[Regex], line: &str) -> bool {
    set.iter().any(|re| re.is_match(line))
}

/// Remove CSI escape sequences.
pub(super) fn strip_codes(line: &str) -> String {
    ANSI.iter()
        .fold(line.to_string(), |acc, re| re.replace_all(&acc, "").into_owned())
}

/// Strip ANSI codes and redundant `[INFO]`-style prefixes, then trim.
#[must_use]
pub fn clean_line(line: &str) -> String {
    PREFIXES
        .iter()
        .fold(strip_codes(line), |acc, re| re.replace_all(&acc, "").into_owned())
        .trim()
        .to_string()
}

/// Level of a line with ANSI codes removed; `[ERROR]`-style tags still
/// count. Error patterns win over warnings, warnings over
/// success, success over debug; anything else is info.
#[must_use]
pub fn classify(line: &str) -> LineLevel {
    if any_match(&ERROR, line) {
        LineLevel::Error
    } else if any_match(&WARN, line) {
        LineLevel::Warn
    } else if any_match(&SUCCESS, line) {
        LineLevel::Info
    } else if any_match(&DEBUG, line) {
        LineLevel::Debug
    } else {
        LineLevel::Info
    }
}

/// `true` for milestone lines shown even when not verbose.
#[must_use]
pub fn is_important(line: &str) -> bool {
    any_match(&IMPORTANT, line)
}

/// [`LineSink`] that forwards child output to a [`Log`].
///
/// When not verbose only errors, warnings and milestone lines reach the
/// log; when verbose every non-empty line does, at its classified level.
#[derive(Debug)]
pub struct ScriptOutputFilter<'a> {
    log: &'a dyn Log,
    verbose: bool,
}

impl<'a> ScriptOutputFilter<'a> {
    /// Create a filter writing to `log`.
    #[must_use]
    pub const fn new(log: &'a dyn Log, verbose: bool) -> Self {
        Self { log, verbose }
    }

    fn should_show(&self, level: LineLevel, line: &str) -> bool {
        self.verbose || matches!(level, LineLevel::Error | LineLevel::Warn) || is_important(line)
    }
}

impl LineSink for ScriptOutputFilter<'_> {
    fn line(&self, _stream: Stream, line: &str) {
        let cleaned = clean_line(line);
        if cleaned.is_empty() {
            return;
        }
        let level = classify(strip_codes(line).trim());
        if !self.should_show(level, &cleaned) {
            return;
        }
        match level {
            LineLevel::Error => self.log.error(&cleaned),
            LineLevel::Warn => self.log.warn(&cleaned),
            LineLevel::Info => self.log.info(&cleaned),
            LineLevel::Debug => self.log.debug(&cleaned),
        }
    }
}
