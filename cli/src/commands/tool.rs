//! Command: `dotfiles <tool> <action>`.
use anyhow::{Context as _, Result};

use super::CommandSetup;
use super::status::{item_line, render};
use crate::cli::ToolAction;
use crate::dispatch;
use crate::error::ToolError;
use crate::logging::{Log, Logger};
use crate::tools::{self, Context, Tool, stow};
use crate::types::{ItemStatus, Operation};

/// Run `action` on the tool called `name`.
///
/// # Errors
///
/// Returns an error if the tool is unknown or disabled, or the action fails.
pub fn run(setup: &CommandSetup, name: &str, action: &ToolAction) -> Result<()> {
    let tool = dispatch::enabled_tool(&setup.registry, name).with_context(|| {
        format!("available tools: {}", setup.registry.names().join(", "))
    })?;
    let ctx = setup.tool_context(name);
    run_action(tool.as_ref(), &ctx, action, setup.dry_run(), &setup.log)
}

/// Dispatch one parsed action to `tool`.
///
/// # Errors
///
/// Returns an error if the action is unsupported by the tool or fails.
pub fn run_action(
    tool: &dyn Tool,
    ctx: &Context,
    action: &ToolAction,
    dry_run: bool,
    log: &Logger,
) -> Result<()> {
    let (op, items) = match action {
        ToolAction::Status => {
            render(ctx.log.as_ref(), &tool.status(ctx)?);
            return Ok(());
        }
        ToolAction::List => {
            for item in tool.list(ctx)? {
                ctx.log.info(&item_line(&item));
            }
            return Ok(());
        }
        ToolAction::Install { items } => (Operation::Install, items.as_slice()),
        ToolAction::Update { items } => (Operation::Update, items.as_slice()),
        ToolAction::Remove { items } => (Operation::Remove, items.as_slice()),
        ToolAction::Sync => (Operation::Sync, &[][..]),
        ToolAction::Link { packages } => (link_op(tool, Operation::Install)?, packages.as_slice()),
        ToolAction::Unlink { packages } => (link_op(tool, Operation::Remove)?, packages.as_slice()),
        ToolAction::Relink { packages } => (link_op(tool, Operation::Update)?, packages.as_slice()),
        ToolAction::ListPackages { category } => {
            for item in tools::list_category_items(tool, ctx, category)? {
                ctx.log.info(&item_line(&item));
            }
            return Ok(());
        }
        ToolAction::StatusPackage { category, name } => {
            let item = tools::list_category_items(tool, ctx, category)?
                .into_iter()
                .find(|i| &i.name == name)
                .ok_or_else(|| ToolError::PackageNotFound(format!("{category}/{name}")))?;
            ctx.log.info(&item_line(&item));
            if let Some(err) = item.error.as_ref().filter(|_| item.status == ItemStatus::Error) {
                ctx.log.warn(err);
            }
            return Ok(());
        }
        ToolAction::InstallPackage { category, name } => {
            let result = tools::install_category_item(tool, ctx, category, name);
            dispatch::record(ctx.log.as_ref(), &result, dry_run);
            if !result.success {
                ctx.log.error(&result.message);
            }
            return super::finish(log);
        }
    };
    dispatch::run_operation(tool, ctx, op, items, dry_run);
    super::finish(log)
}

/// Link, unlink and relink only exist on the symlink farm.
fn link_op(tool: &dyn Tool, op: Operation) -> Result<Operation, ToolError> {
    if tool.name() == stow::NAME {
        Ok(op)
    } else {
        Err(ToolError::Unsupported(format!(
            "{} does not manage symlinks",
            tool.name()
        )))
    }
}
