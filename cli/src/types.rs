//! Value types exchanged between tools, the dispatcher and the CLI.
use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::error::ToolError;

/// Free-form key/value details attached to results and items.
pub type Details = BTreeMap<String, Value>;

/// Key under which per-item failures are collected in [`OperationResult::details`].
pub const ERRORS_KEY: &str = "errors";

/// Observed state tag of a single [`ToolItem`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ItemStatus {
    /// Present and current.
    Installed,
    /// Declared but absent.
    NotInstalled,
    /// Symlink-farm package fully linked.
    Linked,
    /// Symlink-farm package missing at least one link.
    NotLinked,
    /// Sync target up to date.
    Synced,
    /// Sync target missing or stale.
    NeedsSync,
    /// Installed but a newer version exists.
    UpdateAvailable,
    /// Some, not all, members installed.
    Partial,
    /// Disabled in configuration.
    Disabled,
    /// Script-runner app whose scripts all validate.
    Ready,
    /// Probe failed or item is invalid.
    Error,
    /// State cannot be observed.
    #[default]
    Unknown,
}

impl ItemStatus {
    /// Stable lower-case tag used in output and tests.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Installed => "installed",
            Self::NotInstalled => "not_installed",
            Self::Linked => "linked",
            Self::NotLinked => "not_linked",
            Self::Synced => "synced",
            Self::NeedsSync => "needs_sync",
            Self::UpdateAvailable => "update_available",
            Self::Partial => "partial",
            Self::Disabled => "disabled",
            Self::Ready => "ready",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One managed object owned by a tool, as observed by a probe.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolItem {
    /// Item name (package, source, category, app, library).
    pub name: String,
    /// Enabled in configuration.
    pub enabled: bool,
    /// Observed installed state at probe time.
    pub installed: bool,
    /// Short human description.
    pub description: String,
    /// Observed version, when known.
    pub version: Option<String>,
    /// State tag.
    pub status: ItemStatus,
    /// Target path, for filesystem tools.
    pub target: Option<PathBuf>,
    /// Item priority within its tool.
    pub priority: i32,
    /// Category the item belongs to, for category tools.
    pub category: Option<String>,
    /// Package type (`brew`, `cask`, ...), for package tools.
    pub package_type: Option<String>,
    /// Tool-specific extra data.
    pub metadata: Details,
    /// Probe or validation error for this item.
    pub error: Option<String>,
}

impl ToolItem {
    /// Create an item with the given name and status.
    #[must_use]
    pub fn new(name: impl Into<String>, status: ItemStatus) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            status,
            ..Self::default()
        }
    }
}

/// Snapshot of a tool's health and items.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolStatus {
    /// Tool name.
    pub name: String,
    /// Tool enabled in configuration.
    pub enabled: bool,
    /// All probes succeeded and no item is in error.
    pub healthy: bool,
    /// When the probe ran.
    pub last_check: DateTime<Utc>,
    /// First probe error, if any.
    pub error: Option<String>,
    /// Items that were probed.
    pub items: Vec<ToolItem>,
}

impl ToolStatus {
    /// Start a healthy status for `name` stamped with the current time.
    #[must_use]
    pub fn new(name: &str, enabled: bool) -> Self {
        Self {
            name: name.to_string(),
            enabled,
            healthy: true,
            last_check: Utc::now(),
            error: None,
            items: Vec::new(),
        }
    }

    /// Mark the status unhealthy, keeping the first recorded error.
    pub fn fail(&mut self, err: impl fmt::Display) {
        self.healthy = false;
        if self.error.is_none() {
            self.error = Some(err.to_string());
        }
    }

    /// Number of items reported installed (or linked, synced, ready).
    #[must_use]
    pub fn installed_count(&self) -> usize {
        self.items.iter().filter(|i| i.installed).count()
    }
}

/// Operation a tool can be asked to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Install requested (or all enabled) items.
    Install,
    /// Update requested (or all enabled) items.
    Update,
    /// Remove requested items.
    Remove,
    /// Bring everything enabled to the declared state.
    Sync,
    /// Probe state.
    Status,
    /// Enumerate items.
    List,
}

impl Operation {
    /// Lower-case operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Install => "install",
            Self::Update => "update",
            Self::Remove => "remove",
            Self::Sync => "sync",
            Self::Status => "status",
            Self::List => "list",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one tool operation.
///
/// Per-item failures do not abort the operation; they are appended to
/// `details["errors"]` and flip `success` to `false`.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    /// Tool name.
    pub tool: String,
    /// Operation performed.
    pub operation: Operation,
    /// `false` iff any item (or the operation itself) failed.
    pub success: bool,
    /// Human summary.
    pub message: String,
    /// First typed error encountered.
    pub error: Option<ToolError>,
    /// Raw captured output, when the tool keeps it.
    pub output: Option<String>,
    /// Identifiers of items whose observed state changed.
    pub modified: Vec<String>,
    /// Free-form details; see [`ERRORS_KEY`].
    pub details: Details,
}

impl OperationResult {
    /// Start a successful result with no message.
    #[must_use]
    pub fn new(tool: &str, operation: Operation) -> Self {
        Self {
            tool: tool.to_string(),
            operation,
            success: true,
            message: String::new(),
            error: None,
            output: None,
            modified: Vec::new(),
            details: Details::new(),
        }
    }

    /// A result that failed as a whole before touching any item.
    #[must_use]
    pub fn failure(tool: &str, operation: Operation, err: ToolError) -> Self {
        let mut result = Self::new(tool, operation);
        result.message = err.to_string();
        result.push_error(err.to_string());
        result.success = false;
        result.error = Some(err);
        result
    }

    /// Set the human summary.
    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Record that `item` failed with `err`; later items still run.
    pub fn item_failed(&mut self, item: &str, err: ToolError) {
        self.push_error(format!("{item}: {err}"));
        self.success = false;
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    /// Record that the observed state of `item` changed.
    pub fn mark_modified(&mut self, item: &str) {
        if !self.modified.iter().any(|m| m == item) {
            self.modified.push(item.to_string());
        }
    }

    /// Insert a detail value.
    pub fn detail(&mut self, key: &str, value: impl Into<Value>) {
        self.details.insert(key.to_string(), value.into());
    }

    /// Append `value` to the list stored under `key`.
    pub fn push_detail_item(&mut self, key: &str, value: impl Into<Value>) {
        let entry = self
            .details
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(list) = entry {
            list.push(value.into());
        }
    }

    /// Per-item error lines collected so far.
    #[must_use]
    pub fn errors(&self) -> Vec<&str> {
        self.details
            .get(ERRORS_KEY)
            .and_then(Value::as_array)
            .map(|list| list.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    /// Fill in a default message from the collected errors when none was set.
    #[must_use]
    pub fn finish(mut self, ok_message: impl Into<String>) -> Self {
        if self.message.is_empty() {
            self.message = if self.success {
                ok_message.into()
            } else {
                format!("{} item(s) failed", self.errors().len())
            };
        }
        self
    }

    fn push_error(&mut self, line: String) {
        self.push_detail_item(ERRORS_KEY, line);
    }
}
