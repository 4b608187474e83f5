//! Command: show the status of every enabled tool.
use anyhow::Result;

use super::CommandSetup;
use crate::dispatch;
use crate::logging::Log;
use crate::types::{ToolItem, ToolStatus};

/// Run the status command.
///
/// Unhealthy tools are reported but do not fail the command.
///
/// # Errors
///
/// Returns an error if the run is cancelled.
pub fn run(setup: &CommandSetup) -> Result<()> {
    let statuses = dispatch::global_status(&setup.registry, &setup.context())?;
    for status in &statuses {
        render(setup.log.as_ref(), status);
    }
    let unhealthy = statuses.iter().filter(|s| !s.healthy).count();
    setup.log.stage("Summary");
    setup.log.info(&format!(
        "{} tool(s): {} healthy, {unhealthy} unhealthy",
        statuses.len(),
        statuses.len() - unhealthy
    ));
    Ok(())
}

/// `Healthy (2/3 items)` style headline for one tool.
#[must_use]
pub fn headline(status: &ToolStatus) -> String {
    let health = if status.healthy { "Healthy" } else { "Unhealthy" };
    format!(
        "{health} ({}/{} items)",
        status.installed_count(),
        status.items.len()
    )
}

/// One line per item: name, state tag, description.
#[must_use]
pub fn item_line(item: &ToolItem) -> String {
    let mut line = format!("  {:<24} {:<16}", item.name, item.status.as_str());
    if !item.description.is_empty() {
        line.push(' ');
        line.push_str(&item.description);
    }
    line.trim_end().to_string()
}

/// Write one tool's status to `log`.
pub fn render(log: &dyn Log, status: &ToolStatus) {
    log.stage(&status.name);
    log.info(&headline(status));
    if let Some(err) = &status.error {
        log.warn(err);
    }
    for item in &status.items {
        log.info(&item_line(item));
        if let Some(err) = &item.error {
            log.debug(&format!("    {err}"));
        }
    }
}
