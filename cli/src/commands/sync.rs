//! Command: bring every enabled tool to its declared state.
use anyhow::Result;

use super::CommandSetup;
use crate::dispatch;

/// Run the sync command.
///
/// # Errors
///
/// Returns an error if any tool failed or the run was cancelled.
pub fn run(setup: &CommandSetup) -> Result<()> {
    if setup.dry_run() {
        setup.log.info("dry run: no changes will be applied");
    }
    let report = dispatch::global_sync(&setup.registry, &setup.context(), setup.dry_run());
    if !report.not_run.is_empty() {
        setup
            .log
            .warn(&format!("cancelled before: {}", report.not_run.join(", ")));
    }
    super::finish(&setup.log)?;
    if !report.not_run.is_empty() {
        anyhow::bail!("sync cancelled");
    }
    Ok(())
}
