//! Command handlers: the boundary between the CLI and the tools.
pub mod completion;
pub mod config;
pub mod status;
pub mod sync;
pub mod tool;
pub mod version;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::cancel::CancellationToken;
use crate::cli::GlobalOpts;
use crate::config::Config;
use crate::config::loader::{self, ConfigSource};
use crate::exec::{Executor, SystemExecutor};
use crate::logging::{Log, Logger};
use crate::tools::{self, Context, Registry, ToolSettings};

/// Load the configuration and fold the CLI flags into it.
///
/// # Errors
///
/// Returns an error if an explicit `--config` file is missing or any found
/// file fails to parse.
pub fn load_config(global: &GlobalOpts) -> Result<(Config, ConfigSource)> {
    let (mut config, source) = loader::load(global.config.as_deref())?;
    apply_overrides(&mut config, global);
    Ok((config, source))
}

/// `--dry-run`, `--verbose` and `--yes` only ever switch settings on.
pub fn apply_overrides(config: &mut Config, global: &GlobalOpts) {
    config.global.dry_run |= global.dry_run;
    config.global.verbose |= global.verbose;
    config.global.auto_confirm |= global.yes;
}

/// Shared state produced by the common command setup sequence.
///
/// Encapsulates settings resolution and registry construction so that each
/// command does not have to repeat the boilerplate.
#[derive(Debug)]
pub struct CommandSetup {
    /// Effective configuration.
    pub config: Config,
    /// Settings every tool reads.
    pub settings: Arc<ToolSettings>,
    /// Every configured tool.
    pub registry: Registry,
    /// Run logger; collects the summary.
    pub log: Arc<Logger>,
    /// Root cancellation token, fired by Ctrl-C.
    pub cancel: CancellationToken,
}

impl CommandSetup {
    /// Validate `config`, resolve settings against the user's home and build
    /// the registry with the system executor.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the home directory
    /// cannot be determined, or a tool rejects its configuration.
    pub fn init(config: Config, log: Arc<Logger>, cancel: CancellationToken) -> Result<Self> {
        let home = dirs::home_dir().context("cannot determine home directory")?;
        Self::with_executor(config, &home, Arc::new(SystemExecutor), log, cancel)
    }

    /// [`init`](Self::init) with an explicit home and executor.
    ///
    /// # Errors
    ///
    /// Same as [`init`](Self::init).
    pub fn with_executor(
        config: Config,
        home: &Path,
        executor: Arc<dyn Executor>,
        log: Arc<Logger>,
        cancel: CancellationToken,
    ) -> Result<Self> {
        config.validate().context("invalid configuration")?;
        let settings = Arc::new(ToolSettings::from_config(&config, home)?);
        log.debug(&format!("dotfiles: {}", settings.dotfiles.display()));
        let registry = tools::build_registry(&config, &settings, &executor)?;
        log.debug(&format!(
            "{} tools registered: {}",
            registry.len(),
            registry.names().join(", ")
        ));
        Ok(Self {
            config,
            settings,
            registry,
            log,
            cancel,
        })
    }

    /// Context logging through the run logger.
    #[must_use]
    pub fn context(&self) -> Context {
        Context::new(Arc::clone(&self.log) as Arc<dyn Log>, self.cancel.clone())
    }

    /// Context whose events carry `tool = <name>`.
    #[must_use]
    pub fn tool_context(&self, name: &str) -> Context {
        Context::new(Arc::new(self.log.for_tool(name)), self.cancel.clone())
    }

    /// Whether this run only plans.
    #[must_use]
    pub fn dry_run(&self) -> bool {
        self.settings.dry_run
    }
}

/// Print the summary and bail if any recorded operation failed.
///
/// # Errors
///
/// Returns an error if one or more operations recorded a failure.
pub fn finish(log: &Logger) -> Result<()> {
    log.print_summary();
    let count = log.failure_count();
    if count > 0 {
        anyhow::bail!("{count} operation(s) failed");
    }
    Ok(())
}
