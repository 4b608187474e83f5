#![allow(
    clippy::expect_used,
    clippy::unwrap_used,
    clippy::indexing_slicing
)]
//! Integration tests for the registry and the cross-tool status and sync
//! passes.

use std::sync::{Arc, Mutex};

use dotfiles_manager::cancel::CancellationToken;
use dotfiles_manager::dispatch;
use dotfiles_manager::error::{ErrorKind, ToolError};
use dotfiles_manager::logging::{EntryStatus, Log, Logger};
use dotfiles_manager::tools::{Context, Registry, Tool};
use dotfiles_manager::types::{ItemStatus, Operation, OperationResult, ToolItem, ToolStatus};

/// Shared journal of `<tool> <operation>` calls across tools.
type Journal = Arc<Mutex<Vec<String>>>;

/// Minimal tool that journals every call.
#[derive(Debug)]
struct JournalTool {
    name: String,
    priority: i32,
    enabled: bool,
    fail: bool,
    cancel_on_sync: Option<CancellationToken>,
    journal: Journal,
}

impl JournalTool {
    fn new(name: &str, priority: i32, journal: &Journal) -> Self {
        Self {
            name: name.to_string(),
            priority,
            enabled: true,
            fail: false,
            cancel_on_sync: None,
            journal: Arc::clone(journal),
        }
    }

    fn note(&self, op: Operation) {
        self.journal
            .lock()
            .unwrap()
            .push(format!("{} {op}", self.name));
    }

    fn result(&self, op: Operation) -> OperationResult {
        self.note(op);
        if self.fail {
            OperationResult::failure(&self.name, op, ToolError::failed("boom"))
        } else {
            OperationResult::new(&self.name, op)
        }
    }
}

impl Tool for JournalTool {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn validate(&self) -> Result<(), ToolError> {
        Ok(())
    }

    fn status(&self, ctx: &Context) -> Result<ToolStatus, ToolError> {
        ctx.cancel.check()?;
        self.note(Operation::Status);
        let mut status = ToolStatus::new(&self.name, self.enabled);
        status.items.push(ToolItem::new("item", ItemStatus::Unknown));
        if self.fail {
            status.fail("probe failed");
        }
        Ok(status)
    }

    fn install(&self, _: &Context, _: &[String]) -> OperationResult {
        self.result(Operation::Install)
    }

    fn update(&self, _: &Context, _: &[String]) -> OperationResult {
        self.result(Operation::Update)
    }

    fn remove(&self, _: &Context, _: &[String]) -> OperationResult {
        self.result(Operation::Remove)
    }

    fn list<'a>(
        &'a self,
        _: &'a Context,
    ) -> Result<Box<dyn Iterator<Item = ToolItem> + 'a>, ToolError> {
        Ok(Box::new(std::iter::empty()))
    }

    fn sync(&self, _: &Context) -> OperationResult {
        if let Some(token) = &self.cancel_on_sync {
            token.cancel();
        }
        self.result(Operation::Sync)
    }
}

fn context(log: &Arc<Logger>, cancel: CancellationToken) -> Context {
    Context::new(Arc::clone(log) as Arc<dyn Log>, cancel)
}

fn names(tools: &[Arc<dyn Tool>]) -> Vec<&str> {
    tools.iter().map(|t| t.name()).collect()
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Priority order is ascending with ties broken by name.
#[test]
fn by_priority_orders_and_breaks_ties_by_name() {
    let journal = Journal::default();
    let registry = Registry::new();
    for (name, priority) in [("b", 10), ("a", 1), ("c", 5), ("d", 5)] {
        registry
            .register(Arc::new(JournalTool::new(name, priority, &journal)))
            .unwrap();
    }
    let mut off = JournalTool::new("e", 0, &journal);
    off.enabled = false;
    registry.register(Arc::new(off)).unwrap();

    let ordered = registry.by_priority();
    assert_eq!(names(&ordered), vec!["a", "c", "d", "b"]);
    assert_eq!(ordered.len(), registry.list_enabled().len());
    assert!(
        ordered
            .windows(2)
            .all(|w| w[0].priority() <= w[1].priority())
    );
}

/// A second tool under the same name replaces the first without duplication.
#[test]
fn duplicate_registration_keeps_one() {
    let journal = Journal::default();
    let registry = Registry::new();
    registry
        .register(Arc::new(JournalTool::new("npm", 1, &journal)))
        .unwrap();
    registry
        .register(Arc::new(JournalTool::new("npm", 2, &journal)))
        .unwrap();
    assert_eq!(registry.len(), 1);
    assert_eq!(names(&registry.list()), vec!["npm"]);
    assert!(registry.get("npm").is_some());
}

/// Empty names are rejected.
#[test]
fn empty_name_is_invalid() {
    let journal = Journal::default();
    let registry = Registry::new();
    let err = registry
        .register(Arc::new(JournalTool::new("", 1, &journal)))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidToolName);
    assert!(registry.is_empty());
}

// ---------------------------------------------------------------------------
// Global passes
// ---------------------------------------------------------------------------

/// Sync visits enabled tools in priority order and continues past failures.
#[test]
fn global_sync_runs_in_priority_order() {
    let journal = Journal::default();
    let registry = Registry::new();
    registry
        .register(Arc::new(JournalTool::new("A", 1, &journal)))
        .unwrap();
    let mut b = JournalTool::new("B", 10, &journal);
    b.fail = true;
    registry.register(Arc::new(b)).unwrap();
    registry
        .register(Arc::new(JournalTool::new("C", 5, &journal)))
        .unwrap();

    let log = Arc::new(Logger::with_log_file(None));
    let report = dispatch::global_sync(&registry, &context(&log, CancellationToken::new()), false);

    assert_eq!(
        *journal.lock().unwrap(),
        vec!["A sync", "C sync", "B sync"]
    );
    assert!(!report.success());
    assert_eq!(report.failures(), 1);
    let statuses: Vec<(String, EntryStatus)> = log
        .entries()
        .into_iter()
        .map(|e| (e.name, e.status))
        .collect();
    assert_eq!(
        statuses,
        vec![
            ("A sync".to_string(), EntryStatus::Ok),
            ("C sync".to_string(), EntryStatus::Ok),
            ("B sync".to_string(), EntryStatus::Failed),
        ]
    );
}

/// Cancellation stops the pass before the next tool; the rest are skipped.
#[test]
fn global_sync_stops_when_cancelled() {
    let journal = Journal::default();
    let cancel = CancellationToken::new();
    let registry = Registry::new();
    let mut first = JournalTool::new("first", 1, &journal);
    first.cancel_on_sync = Some(cancel.clone());
    registry.register(Arc::new(first)).unwrap();
    registry
        .register(Arc::new(JournalTool::new("second", 2, &journal)))
        .unwrap();

    let log = Arc::new(Logger::with_log_file(None));
    let report = dispatch::global_sync(&registry, &context(&log, cancel), false);

    assert_eq!(*journal.lock().unwrap(), vec!["first sync"]);
    assert_eq!(report.not_run, vec!["second"]);
    let skipped = log
        .entries()
        .into_iter()
        .find(|e| e.name == "second sync")
        .unwrap();
    assert_eq!(skipped.status, EntryStatus::Skipped);
}

/// Dry-run syncs are recorded as such.
#[test]
fn dry_run_sync_is_recorded_as_dry_run() {
    let journal = Journal::default();
    let registry = Registry::new();
    registry
        .register(Arc::new(JournalTool::new("stow", 1, &journal)))
        .unwrap();
    let log = Arc::new(Logger::with_log_file(None));
    let report = dispatch::global_sync(&registry, &context(&log, CancellationToken::new()), true);
    assert!(report.success());
    assert_eq!(log.entries()[0].status, EntryStatus::DryRun);
}

/// Status covers every enabled tool; an unhealthy tool does not stop the pass.
#[test]
fn global_status_collects_every_enabled_tool() {
    let journal = Journal::default();
    let registry = Registry::new();
    let mut sick = JournalTool::new("homebrew", 30, &journal);
    sick.fail = true;
    registry.register(Arc::new(sick)).unwrap();
    registry
        .register(Arc::new(JournalTool::new("apps", 40, &journal)))
        .unwrap();
    let mut off = JournalTool::new("uv", 60, &journal);
    off.enabled = false;
    registry.register(Arc::new(off)).unwrap();

    let log = Arc::new(Logger::with_log_file(None));
    let statuses =
        dispatch::global_status(&registry, &context(&log, CancellationToken::new())).unwrap();
    let summary: Vec<(&str, bool)> = statuses
        .iter()
        .map(|s| (s.name.as_str(), s.healthy))
        .collect();
    assert_eq!(summary, vec![("apps", true), ("homebrew", false)]);
}

/// Looking up a disabled or unknown tool fails with the matching kind.
#[test]
fn enabled_tool_lookup() {
    let journal = Journal::default();
    let registry = Registry::new();
    let mut off = JournalTool::new("rsync", 20, &journal);
    off.enabled = false;
    registry.register(Arc::new(off)).unwrap();

    let err = dispatch::enabled_tool(&registry, "rsync").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolDisabled);
    let err = dispatch::enabled_tool(&registry, "nope").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ToolNotFound);
}
