//! Core logging types: summary entries, their status, and the [`Log`] trait.

/// One (tool, operation) outcome for the run summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    /// `tool operation`, e.g. `stow sync`.
    pub name: String,
    /// Final status of the operation.
    pub status: EntryStatus,
    /// Optional detail message (skip reason or error description).
    pub message: Option<String>,
}

/// Status of a completed tool operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Operation completed successfully.
    Ok,
    /// Operation did not apply (tool disabled, nothing configured).
    Skipped,
    /// Operation ran in dry-run mode; no changes were applied.
    DryRun,
    /// Operation failed for at least one item.
    Failed,
}

/// Abstraction over logging backends.
///
/// [`Logger`](super::logger::Logger) emits tracing events;
/// [`ToolLogger`](super::logger::ToolLogger) does the same inside a span
/// carrying the tool name. Tests substitute a recording implementation.
pub trait Log: Send + Sync + std::fmt::Debug {
    /// Log a stage header (major section).
    fn stage(&self, msg: &str);
    /// Log an informational message.
    fn info(&self, msg: &str);
    /// Log a debug message (suppressed on console unless verbose).
    fn debug(&self, msg: &str);
    /// Log a warning message.
    fn warn(&self, msg: &str);
    /// Log an error message.
    fn error(&self, msg: &str);
    /// Log a planned action that dry-run mode did not perform.
    fn dry_run(&self, msg: &str);
    /// Record an operation outcome for the summary.
    fn record(&self, name: &str, status: EntryStatus, message: Option<&str>);
}
