//! Script runner: ordered lists of user scripts grouped by app.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::Value;

use super::{Configurable, Context, Tool, ToolSettings, reject_unknown};
use crate::config::{AppConfig, OrderedMap};
use crate::error::ToolError;
use crate::exec::{Executor, command_line};
use crate::logging::ScriptOutputFilter;
use crate::types::{ItemStatus, Operation, OperationResult, ToolItem, ToolStatus};

const NAME: &str = "apps";
const DEFAULT_PRIORITY: i32 = 40;

/// Message returned by `remove`, which has nothing to undo.
pub const REMOVE_UNSUPPORTED: &str = "remove operation not supported for custom apps";

/// Why a script cannot run.
fn script_problem(path: &Path) -> Option<&'static str> {
    let Ok(meta) = std::fs::metadata(path) else {
        return Some("not found");
    };
    if !meta.is_file() {
        return Some("not a regular file");
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if meta.permissions().mode() & 0o111 == 0 {
            return Some("not executable");
        }
    }
    None
}

/// Script runner tool.
#[derive(Debug)]
pub struct AppsTool {
    settings: Arc<ToolSettings>,
    executor: Arc<dyn Executor>,
    apps: OrderedMap<AppConfig>,
}

impl AppsTool {
    /// Create the tool with no apps.
    #[must_use]
    pub fn new(settings: Arc<ToolSettings>, executor: Arc<dyn Executor>) -> Self {
        Self {
            settings,
            executor,
            apps: OrderedMap::new(),
        }
    }

    fn script_path(&self, raw: &str) -> Result<PathBuf, ToolError> {
        self.settings.resolve(raw)
    }

    /// Interpreter for `path` by extension, if one is configured.
    fn interpreter(&self, path: &Path) -> Option<&str> {
        let ext = path.extension()?.to_str()?;
        self.settings
            .tools
            .interpreters
            .get(&format!(".{ext}"))
            .map(String::as_str)
    }

    /// `script: reason` for every script of `app` that cannot run.
    fn invalid_scripts(&self, app: &AppConfig) -> Vec<String> {
        app.scripts
            .iter()
            .filter_map(|raw| match self.script_path(raw) {
                Ok(path) => script_problem(&path).map(|why| format!("{raw}: {why}")),
                Err(e) => Some(format!("{raw}: {e}")),
            })
            .collect()
    }

    fn select<'a>(
        &'a self,
        result: &mut OperationResult,
        items: &[String],
    ) -> Vec<(&'a str, &'a AppConfig)> {
        if items.is_empty() {
            return self.apps.iter().filter(|(_, app)| app.enabled).collect();
        }
        let known = reject_unknown(
            result,
            items,
            |name| self.apps.get(name).is_some(),
            |name| ToolError::ValidationFailed(format!("unknown app: {name}")),
        );
        self.apps
            .iter()
            .filter(|(name, _)| known.contains(name))
            .filter(|&(name, app)| {
                if !app.enabled {
                    result.item_failed(name, ToolError::ToolDisabled(format!("app {name}")));
                }
                app.enabled
            })
            .collect()
    }

    /// Run every script of one app in order, stopping at the first failure.
    fn run_app(&self, ctx: &Context, name: &str, app: &AppConfig) -> Result<(), ToolError> {
        let filter = ScriptOutputFilter::new(ctx.log.as_ref(), self.settings.verbose);
        for (step, raw) in app.scripts.iter().enumerate() {
            ctx.cancel.check()?;
            let path = self.script_path(raw)?;
            if let Some(why) = script_problem(&path) {
                return Err(ToolError::ValidationFailed(format!(
                    "script {raw} is invalid: {why}"
                )));
            }
            let display = path.display().to_string();
            let (program, args): (&str, Vec<&str>) = match self.interpreter(&path) {
                Some(interp) => (interp, vec![display.as_str()]),
                None => (display.as_str(), vec![]),
            };
            if self.settings.dry_run {
                ctx.log
                    .dry_run(&format!("would run: {}", command_line(program, &args)));
                continue;
            }
            ctx.log.stage(&format!("{name}: {raw}"));
            let token = self.settings.command_token(ctx, NAME);
            self.executor
                .run_streaming(&token, &self.settings.dotfiles, program, &args, &filter)
                .map_err(|e| match ToolError::from(e) {
                    ToolError::OperationFailed { context, stderr } => ToolError::OperationFailed {
                        context: format!("script {raw} failed (step {}): {context}", step + 1),
                        stderr,
                    },
                    other => other,
                })?;
        }
        Ok(())
    }

    fn run_apps(&self, ctx: &Context, op: Operation, items: &[String]) -> OperationResult {
        let mut result = OperationResult::new(NAME, op);
        let mut executed = Vec::new();
        for (name, app) in self.select(&mut result, items) {
            if let Err(e) = ctx.cancel.check() {
                result.item_failed(name, e);
                break;
            }
            match self.run_app(ctx, name, app) {
                Ok(()) => {
                    executed.push(Value::from(name));
                    if !self.settings.dry_run && !app.scripts.is_empty() {
                        result.mark_modified(name);
                    }
                }
                Err(e) => {
                    ctx.log.error(&format!("{name}: {e}"));
                    result.item_failed(name, e);
                }
            }
        }
        let count = executed.len();
        result.detail("executed", executed);
        result.finish(format!("{count} app(s) run"))
    }

    fn probe(&self, name: &str, app: &AppConfig) -> ToolItem {
        let mut item = ToolItem::new(name, ItemStatus::Ready);
        item.enabled = app.enabled;
        item.description = format!("custom app with {} script(s)", app.scripts.len());
        if !app.enabled {
            item.status = ItemStatus::Disabled;
            return item;
        }
        let invalid = self.invalid_scripts(app);
        if invalid.is_empty() {
            item.installed = true;
        } else {
            item.status = ItemStatus::Error;
            item.error = Some(format!("invalid scripts: {}", invalid.join(", ")));
            item.metadata.insert("invalid_scripts".to_string(), invalid.into());
        }
        item
    }
}

impl Configurable for AppsTool {
    type Config = OrderedMap<AppConfig>;

    fn configure(&mut self, config: OrderedMap<AppConfig>) -> Result<(), ToolError> {
        for (name, app) in config.iter() {
            if name.trim().is_empty() {
                return Err(ToolError::InvalidConfig("app name must not be empty".to_string()));
            }
            if app.scripts.iter().any(|s| s.trim().is_empty()) {
                return Err(ToolError::InvalidConfig(format!(
                    "app {name} has an empty script path"
                )));
            }
        }
        self.apps = config;
        Ok(())
    }
}

impl Tool for AppsTool {
    fn name(&self) -> &str {
        NAME
    }

    fn is_enabled(&self) -> bool {
        !self.apps.is_empty()
    }

    fn priority(&self) -> i32 {
        self.settings.priority_of(NAME, DEFAULT_PRIORITY)
    }

    fn validate(&self) -> Result<(), ToolError> {
        for (name, app) in self.apps.iter().filter(|(_, app)| app.enabled) {
            if let Some(problem) = self.invalid_scripts(app).into_iter().next() {
                return Err(ToolError::ValidationFailed(format!("app {name}: {problem}")));
            }
            for raw in &app.scripts {
                let path = self.script_path(raw)?;
                if let Some(interp) = self.interpreter(&path)
                    && !self.executor.which(interp)
                {
                    return Err(ToolError::DependencyMissing(interp.to_string()));
                }
            }
        }
        Ok(())
    }

    fn status(&self, ctx: &Context) -> Result<ToolStatus, ToolError> {
        let mut status = ToolStatus::new(NAME, self.is_enabled());
        for (name, app) in self.apps.iter() {
            ctx.cancel.check()?;
            let item = self.probe(name, app);
            if let Some(err) = &item.error {
                status.fail(format!("{name}: {err}"));
            }
            status.items.push(item);
        }
        Ok(status)
    }

    fn install(&self, ctx: &Context, items: &[String]) -> OperationResult {
        self.run_apps(ctx, Operation::Install, items)
    }

    fn update(&self, ctx: &Context, items: &[String]) -> OperationResult {
        self.run_apps(ctx, Operation::Update, items)
    }

    fn remove(&self, _ctx: &Context, _items: &[String]) -> OperationResult {
        let mut result =
            OperationResult::new(NAME, Operation::Remove).with_message(REMOVE_UNSUPPORTED);
        result.detail("message", REMOVE_UNSUPPORTED);
        result
    }

    fn list<'a>(
        &'a self,
        ctx: &'a Context,
    ) -> Result<Box<dyn Iterator<Item = ToolItem> + 'a>, ToolError> {
        ctx.cancel.check()?;
        Ok(Box::new(
            self.apps.iter().map(|(name, app)| self.probe(name, app)),
        ))
    }

    fn sync(&self, ctx: &Context) -> OperationResult {
        self.run_apps(ctx, Operation::Sync, &[])
    }
}
