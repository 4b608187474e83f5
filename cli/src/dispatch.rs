//! Cross-tool flows: global status and global sync.
//!
//! The dispatcher only sequences. It never looks at concrete tool kinds, and
//! a failing tool never aborts the pass: every outcome is collected and
//! recorded in the run summary through [`Log::record`].
use std::sync::Arc;

use crate::error::{ErrorKind, ToolError};
use crate::logging::{EntryStatus, Log};
use crate::tools::{Context, Registry, Tool};
use crate::types::{Operation, OperationResult, ToolStatus};

/// Detail key tools use for a note that explains a no-op.
const MESSAGE_KEY: &str = "message";

/// Summary status for one finished operation.
#[must_use]
pub fn entry_status(result: &OperationResult, dry_run: bool) -> EntryStatus {
    if !result.success {
        EntryStatus::Failed
    } else if result.details.contains_key(MESSAGE_KEY) {
        EntryStatus::Skipped
    } else if dry_run {
        EntryStatus::DryRun
    } else {
        EntryStatus::Ok
    }
}

/// Record `result` in the run summary as `<tool> <operation>`.
pub fn record(log: &dyn Log, result: &OperationResult, dry_run: bool) {
    let status = entry_status(result, dry_run);
    let message = match status {
        EntryStatus::Failed | EntryStatus::Skipped => Some(result.message.as_str()),
        EntryStatus::Ok | EntryStatus::DryRun => None,
    }
    .filter(|m| !m.is_empty());
    log.record(
        &format!("{} {}", result.tool, result.operation),
        status,
        message,
    );
}

/// Run one operation on `tool` inside a `tool` span and record it.
pub fn run_operation(
    tool: &dyn Tool,
    ctx: &Context,
    op: Operation,
    items: &[String],
    dry_run: bool,
) -> OperationResult {
    let span = tracing::info_span!("tool", tool = %tool.name(), op = %op);
    let _guard = span.enter();
    let result = match op {
        Operation::Install => tool.install(ctx, items),
        Operation::Update => tool.update(ctx, items),
        Operation::Remove => tool.remove(ctx, items),
        Operation::Sync => tool.sync(ctx),
        Operation::Status | Operation::List => OperationResult::failure(
            tool.name(),
            op,
            ToolError::Unsupported(format!("{op} is not a mutating operation")),
        ),
    };
    if result.success {
        if !result.message.is_empty() {
            ctx.log.info(&result.message);
        }
    } else {
        let kind = result
            .error
            .as_ref()
            .map_or(ErrorKind::OperationFailed, ToolError::kind);
        ctx.log.error(&format!(
            "{} {op} failed [{kind}]: {}",
            tool.name(),
            result.message
        ));
    }
    record(ctx.log.as_ref(), &result, dry_run);
    result
}

/// Status of every enabled tool, ordered by name.
///
/// A tool whose probe fails is reported unhealthy with the error; the pass
/// continues.
///
/// # Errors
///
/// Returns [`ToolError::Cancelled`] if the context is cancelled.
pub fn global_status(registry: &Registry, ctx: &Context) -> Result<Vec<ToolStatus>, ToolError> {
    let mut statuses = Vec::new();
    for tool in registry.list_enabled() {
        ctx.cancel.check()?;
        let span = tracing::info_span!("tool", tool = %tool.name(), op = "status");
        let _guard = span.enter();
        match tool.status(ctx) {
            Ok(status) => statuses.push(status),
            Err(ToolError::Cancelled) => return Err(ToolError::Cancelled),
            Err(e) => {
                let mut status = ToolStatus::new(tool.name(), tool.is_enabled());
                status.fail(&e);
                statuses.push(status);
            }
        }
    }
    Ok(statuses)
}

/// Outcome of a [`global_sync`] pass.
#[derive(Debug, Default)]
pub struct SyncReport {
    /// One result per tool that ran, in priority order.
    pub results: Vec<OperationResult>,
    /// Tools never started because the pass was cancelled.
    pub not_run: Vec<String>,
}

impl SyncReport {
    /// Every tool ran and succeeded.
    #[must_use]
    pub fn success(&self) -> bool {
        self.not_run.is_empty() && self.results.iter().all(|r| r.success)
    }

    /// Number of tools whose sync failed.
    #[must_use]
    pub fn failures(&self) -> usize {
        self.results.iter().filter(|r| !r.success).count()
    }
}

/// Call `sync` on every enabled tool in priority order, continuing on error.
///
/// Cancellation stops the pass before the next tool starts.
pub fn global_sync(registry: &Registry, ctx: &Context, dry_run: bool) -> SyncReport {
    let mut report = SyncReport::default();
    let tools = registry.by_priority();
    for tool in &tools {
        if ctx.cancel.should_stop() {
            report.not_run.push(tool.name().to_string());
            continue;
        }
        ctx.log.stage(&format!("{} sync", tool.name()));
        report
            .results
            .push(run_operation(tool.as_ref(), ctx, Operation::Sync, &[], dry_run));
    }
    for name in &report.not_run {
        ctx.log
            .record(&format!("{name} sync"), EntryStatus::Skipped, Some("cancelled"));
    }
    report
}

/// Look up an enabled tool by name.
///
/// # Errors
///
/// Returns [`ToolError::ToolNotFound`] or [`ToolError::ToolDisabled`].
pub fn enabled_tool(registry: &Registry, name: &str) -> Result<Arc<dyn Tool>, ToolError> {
    let tool = registry
        .get(name)
        .ok_or_else(|| ToolError::ToolNotFound(name.to_string()))?;
    if tool.is_enabled() {
        Ok(tool)
    } else {
        Err(ToolError::ToolDisabled(name.to_string()))
    }
}
