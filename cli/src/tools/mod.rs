//! Tool contract and the concrete reconcilers.
//!
//! Every managed domain (symlink farm, directory sync, bundle packages,
//! global packages, scripts) is a [`Tool`]. Tools are built once from the
//! configuration by [`build_registry`], stored in a [`Registry`], and driven
//! by the [`dispatch`](crate::dispatch) module and the CLI. A tool never
//! writes to the terminal itself; it logs through [`Context::log`].
pub mod apps;
pub(crate) mod fs;
pub mod global;
pub mod homebrew;
pub mod registry;
pub mod rsync;
pub mod stow;

pub use registry::Registry;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use crate::cancel::CancellationToken;
use crate::config::{Config, ToolsConfig};
use crate::error::{ConfigError, ToolError};
use crate::exec::Executor;
use crate::logging::Log;
use crate::paths;
use crate::types::{Operation, OperationResult, ToolItem, ToolStatus};

/// Per-operation context: where to log and when to stop.
#[derive(Debug, Clone)]
pub struct Context {
    /// Logging collaborator.
    pub log: Arc<dyn Log>,
    /// Cancellation handle honoured at every command and filesystem step.
    pub cancel: CancellationToken,
}

impl Context {
    /// Create a context.
    #[must_use]
    pub fn new(log: Arc<dyn Log>, cancel: CancellationToken) -> Self {
        Self { log, cancel }
    }

    /// Same cancellation, different logger.
    #[must_use]
    pub fn with_log(&self, log: Arc<dyn Log>) -> Self {
        Self {
            log,
            cancel: self.cancel.clone(),
        }
    }
}

/// Process-wide settings every tool reads, resolved once from [`Config`].
#[derive(Debug, Clone)]
pub struct ToolSettings {
    /// Expanded dotfiles root.
    pub dotfiles: PathBuf,
    /// Home directory used for `~` expansion.
    pub home: PathBuf,
    /// Plan and log only.
    pub dry_run: bool,
    /// Show all script output.
    pub verbose: bool,
    /// Backup suffix; empty when backups are disabled.
    pub backup_suffix: String,
    /// Expanded system directories.
    pub system_dirs: Vec<PathBuf>,
    /// Cross-cutting tool knobs (priorities, interpreters, timeouts).
    pub tools: ToolsConfig,
}

impl ToolSettings {
    /// Resolve settings from `config` with `home` as the user home.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ShellExpansion`] if a path references an
    /// unset environment variable.
    pub fn from_config(config: &Config, home: &Path) -> Result<Self, ConfigError> {
        let system_dirs = config
            .tools
            .system_directories
            .iter()
            .map(|raw| paths::expand(raw, home))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            dotfiles: paths::expand(&config.global.dotfiles_path, home)?,
            home: home.to_path_buf(),
            dry_run: config.global.dry_run,
            verbose: config.global.verbose,
            backup_suffix: config.global.effective_backup_suffix().to_string(),
            system_dirs,
            tools: config.tools.clone(),
        })
    }

    /// Expand `~` and `$VAR` in a configured target path.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidConfig`] if expansion fails.
    pub fn expand(&self, raw: &str) -> Result<PathBuf, ToolError> {
        Ok(paths::expand(raw, &self.home)?)
    }

    /// Expand `raw` and resolve it against the dotfiles root when relative.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidConfig`] if expansion fails.
    pub fn resolve(&self, raw: &str) -> Result<PathBuf, ToolError> {
        Ok(paths::resolve(raw, &self.dotfiles, &self.home)?)
    }

    /// Fail with [`ToolError::ValidationFailed`] if `target` is inside a
    /// system directory.
    ///
    /// # Errors
    ///
    /// See above.
    pub fn ensure_not_system(&self, target: &Path) -> Result<(), ToolError> {
        match paths::system_dir_containing(target, &self.system_dirs) {
            Some(dir) => Err(ToolError::ValidationFailed(format!(
                "refusing to write to {}: inside system directory {}",
                target.display(),
                dir.display()
            ))),
            None => Ok(()),
        }
    }

    /// Priority for `tool`, falling back to `default`.
    #[must_use]
    pub fn priority_of(&self, tool: &str, default: i32) -> i32 {
        self.tools.priority_of(tool, default)
    }

    /// Token for one external command run by `tool`, expiring after the
    /// configured command timeout.
    #[must_use]
    pub fn command_token(&self, ctx: &Context, tool: &str) -> CancellationToken {
        self.tools
            .command_timeout(tool)
            .map_or_else(|| ctx.cancel.clone(), |t| ctx.cancel.child_with_timeout(t))
    }

    /// Timeout for registry (network) queries.
    #[must_use]
    pub fn registry_timeout(&self) -> Duration {
        self.tools
            .timeouts
            .get("registry_query")
            .map_or(Duration::from_secs(30), |d| d.0)
    }

    /// Path shown in logs, with the home prefix folded to `~`.
    #[must_use]
    pub fn display(&self, path: &Path) -> String {
        paths::tilde(path, &self.home)
    }
}

/// The polymorphic contract every tool satisfies.
///
/// Per-item failures never abort an operation: they are collected into the
/// [`OperationResult`] and the remaining items still run. `status` and `list`
/// only fail when cancelled; probe failures mark the status unhealthy.
pub trait Tool: Send + Sync + std::fmt::Debug {
    /// Unique, non-empty tool name.
    fn name(&self) -> &str;

    /// Whether the tool is enabled in configuration.
    fn is_enabled(&self) -> bool;

    /// Run order across tools; lower runs first.
    fn priority(&self) -> i32;

    /// Check preconditions without mutating anything; the first unmet one
    /// is returned.
    ///
    /// # Errors
    ///
    /// Returns the first unmet precondition.
    fn validate(&self) -> Result<(), ToolError>;

    /// Probe observed state.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Cancelled`] when the context is cancelled.
    fn status(&self, ctx: &Context) -> Result<ToolStatus, ToolError>;

    /// Install `items` (empty means every enabled item).
    fn install(&self, ctx: &Context, items: &[String]) -> OperationResult;

    /// Update `items` (empty means every enabled item).
    fn update(&self, ctx: &Context, items: &[String]) -> OperationResult;

    /// Remove `items`.
    fn remove(&self, ctx: &Context, items: &[String]) -> OperationResult;

    /// Lazily enumerate items with their observed state.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::Cancelled`] when the context is cancelled.
    fn list<'a>(
        &'a self,
        ctx: &'a Context,
    ) -> Result<Box<dyn Iterator<Item = ToolItem> + 'a>, ToolError>;

    /// Bring every enabled item to its declared state.
    fn sync(&self, ctx: &Context) -> OperationResult {
        let mut result = self.install(ctx, &[]);
        result.operation = Operation::Sync;
        result
    }

    /// Category capability, for tools that group items by category.
    fn as_category(&self) -> Option<&dyn CategoryTool> {
        None
    }
}

/// Extension for tools whose items are grouped into named categories.
pub trait CategoryTool: Tool {
    /// Whether categories are supported.
    fn supports_categories(&self) -> bool {
        true
    }

    /// Items of `category` with their observed state.
    ///
    /// # Errors
    ///
    /// Fails if the category is unknown or its manifest cannot be read.
    fn list_category_items(&self, ctx: &Context, category: &str)
    -> Result<Vec<ToolItem>, ToolError>;

    /// Install one item of `category`.
    fn install_category_item(&self, ctx: &Context, category: &str, item: &str) -> OperationResult;
}

/// Typed per-tool configuration.
pub trait Configurable {
    /// Configuration section this tool reads.
    type Config;

    /// Replace the tool's configuration. The value is checked first and the
    /// tool is left unchanged on error.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::InvalidConfig`] if the value is unusable.
    fn configure(&mut self, config: Self::Config) -> Result<(), ToolError>;
}

fn unsupported_categories(tool: &dyn Tool) -> ToolError {
    ToolError::Unsupported(format!("{} does not support categories", tool.name()))
}

/// `true` if `tool` groups its items by category.
#[must_use]
pub fn supports_categories(tool: &dyn Tool) -> bool {
    tool.as_category()
        .is_some_and(CategoryTool::supports_categories)
}

/// [`CategoryTool::list_category_items`], or `Unsupported` for other tools.
///
/// # Errors
///
/// Returns [`ToolError::Unsupported`] for tools without categories.
pub fn list_category_items(
    tool: &dyn Tool,
    ctx: &Context,
    category: &str,
) -> Result<Vec<ToolItem>, ToolError> {
    match tool.as_category() {
        Some(cat) if cat.supports_categories() => cat.list_category_items(ctx, category),
        _ => Err(unsupported_categories(tool)),
    }
}

/// [`CategoryTool::install_category_item`], or an `Unsupported` failure.
#[must_use]
pub fn install_category_item(
    tool: &dyn Tool,
    ctx: &Context,
    category: &str,
    item: &str,
) -> OperationResult {
    match tool.as_category() {
        Some(cat) if cat.supports_categories() => cat.install_category_item(ctx, category, item),
        _ => OperationResult::failure(
            tool.name(),
            Operation::Install,
            unsupported_categories(tool),
        ),
    }
}

/// Every requested name that is not declared, as a per-item error.
pub(crate) fn reject_unknown<'a>(
    result: &mut OperationResult,
    requested: &'a [String],
    known: impl Fn(&str) -> bool,
    not_found: impl Fn(&str) -> ToolError,
) -> Vec<&'a str> {
    requested
        .iter()
        .filter_map(|name| {
            if known(name) {
                Some(name.as_str())
            } else {
                result.item_failed(name, not_found(name));
                None
            }
        })
        .collect()
}

/// Build every tool from `config` and register it.
///
/// # Errors
///
/// Returns an error if a tool rejects its configuration section.
pub fn build_registry(
    config: &Config,
    settings: &Arc<ToolSettings>,
    executor: &Arc<dyn Executor>,
) -> Result<Registry, ToolError> {
    let registry = Registry::new();

    let mut stow = stow::StowTool::new(Arc::clone(settings), Arc::clone(executor));
    stow.configure(config.stow.clone())?;
    registry.register(Arc::new(stow))?;

    let mut rsync = rsync::RsyncTool::new(Arc::clone(settings), Arc::clone(executor));
    rsync.configure(config.rsync.clone())?;
    registry.register(Arc::new(rsync))?;

    let mut homebrew = homebrew::HomebrewTool::new(Arc::clone(settings), Arc::clone(executor));
    homebrew.configure(config.homebrew.clone())?;
    registry.register(Arc::new(homebrew))?;

    let mut npm = global::GlobalPackageTool::npm(Arc::clone(settings), Arc::clone(executor));
    npm.configure(global::GlobalToolConfig {
        packages: config.npm.clone(),
        name_pattern: config.validation.npm_package_pattern.clone(),
    })?;
    registry.register(Arc::new(npm))?;

    let mut uv = global::GlobalPackageTool::uv(Arc::clone(settings), Arc::clone(executor));
    uv.configure(global::GlobalToolConfig {
        packages: config.uv.clone(),
        name_pattern: config.validation.uv_package_pattern.clone(),
    })?;
    registry.register(Arc::new(uv))?;

    let mut apps = apps::AppsTool::new(Arc::clone(settings), Arc::clone(executor));
    apps.configure(config.apps.clone())?;
    registry.register(Arc::new(apps))?;

    Ok(registry)
}
