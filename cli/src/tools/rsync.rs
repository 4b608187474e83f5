//! Directory-sync tool: mirrors `<dotfiles>/<name>` into a target with rsync.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::WalkDir;

use super::fs;
use super::{Configurable, Context, Tool, ToolSettings, reject_unknown};
use crate::config::{RsyncConfig, TargetEntry};
use crate::error::ToolError;
use crate::exec::{Executor, command_line};
use crate::types::{ItemStatus, Operation, OperationResult, ToolItem, ToolStatus};

const NAME: &str = "rsync";
const DEFAULT_PRIORITY: i32 = 20;

/// Partial transfer due to error.
const EXIT_PARTIAL: i32 = 23;
/// Partial transfer because source files vanished.
const EXIT_VANISHED: i32 = 24;

/// Source and target resolved for one configured entry.
#[derive(Debug)]
struct SyncPair {
    source: PathBuf,
    target: PathBuf,
}

/// `true` iff the target is missing or the source root was modified
/// strictly after the target root.
fn needs_sync(source: &Path, target: &Path) -> bool {
    let modified = |p: &Path| p.metadata().and_then(|m| m.modified()).ok();
    match (modified(source), modified(target)) {
        (_, None) => true,
        (Some(src), Some(dst)) => src > dst,
        (None, Some(_)) => false,
    }
}

/// Every regular file under `source` exists under `target` with the same size.
fn verify_copy(source: &Path, target: &Path) -> bool {
    WalkDir::new(source)
        .min_depth(1)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .all(|e| {
            let Ok(rel) = e.path().strip_prefix(source) else {
                return false;
            };
            let src_len = e.metadata().map(|m| m.len()).ok();
            let dst_len = target.join(rel).metadata().map(|m| m.len()).ok();
            src_len.is_some() && src_len == dst_len
        })
}

/// Directory-sync tool.
#[derive(Debug)]
pub struct RsyncTool {
    settings: Arc<ToolSettings>,
    executor: Arc<dyn Executor>,
    config: RsyncConfig,
}

impl RsyncTool {
    /// Create the tool with the default configuration.
    #[must_use]
    pub fn new(settings: Arc<ToolSettings>, executor: Arc<dyn Executor>) -> Self {
        Self {
            settings,
            executor,
            config: RsyncConfig::default(),
        }
    }

    fn ordered(&self) -> Vec<&TargetEntry> {
        let mut sources: Vec<&TargetEntry> = self.config.sources.iter().collect();
        sources.sort_by_key(|s| s.priority);
        sources
    }

    fn find(&self, name: &str) -> Option<&TargetEntry> {
        self.config.sources.iter().find(|s| s.name == name)
    }

    fn pair(&self, entry: &TargetEntry) -> Result<SyncPair, ToolError> {
        Ok(SyncPair {
            source: self.settings.dotfiles.join(&entry.name),
            target: self.settings.expand(&entry.target)?,
        })
    }

    /// Resolved pair, refusing system targets and missing sources.
    fn checked_pair(&self, entry: &TargetEntry) -> Result<SyncPair, ToolError> {
        let pair = self.pair(entry)?;
        self.settings.ensure_not_system(&pair.target)?;
        if !pair.source.is_dir() {
            return Err(ToolError::ValidationFailed(format!(
                "source directory does not exist: {}",
                pair.source.display()
            )));
        }
        Ok(pair)
    }

    fn select<'a>(
        &'a self,
        result: &mut OperationResult,
        items: &[String],
    ) -> Vec<&'a TargetEntry> {
        if items.is_empty() {
            return self.ordered().into_iter().filter(|s| s.enabled).collect();
        }
        let known = reject_unknown(
            result,
            items,
            |name| self.find(name).is_some(),
            |name| ToolError::ValidationFailed(format!("unknown sync source: {name}")),
        );
        self.ordered()
            .into_iter()
            .filter(|s| known.contains(&s.name.as_str()))
            .collect()
    }

    fn rsync_args(&self, pair: &SyncPair) -> Vec<String> {
        let mut args: Vec<String> = ["-rlptD", "--compress", "--whole-file", "--partial"]
            .iter()
            .map(ToString::to_string)
            .collect();
        // Mirroring into $HOME itself must never delete unrelated files.
        if pair.target != self.settings.home {
            args.push("--delete".to_string());
        }
        if self.settings.dry_run {
            args.push("--dry-run".to_string());
        }
        args.push(format!("{}/", pair.source.display()));
        args.push(pair.target.display().to_string());
        args
    }

    /// Run rsync for one entry. Returns `true` if the target changed.
    fn sync_entry(&self, ctx: &Context, entry: &TargetEntry) -> Result<bool, ToolError> {
        let pair = self.checked_pair(entry)?;
        let args = self.rsync_args(&pair);
        let args: Vec<&str> = args.iter().map(String::as_str).collect();

        if self.settings.dry_run {
            ctx.log.dry_run(&format!("would run: {}", command_line(NAME, &args)));
        } else {
            ctx.log.info(&format!(
                "syncing {} -> {}",
                entry.name,
                self.settings.display(&pair.target)
            ));
        }

        let token = self.settings.command_token(ctx, NAME);
        let result = self.executor.run_unchecked(&token, NAME, &args)?;
        for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
            if self.settings.dry_run {
                ctx.log.dry_run(line);
            } else {
                ctx.log.debug(line);
            }
        }

        match result.code {
            Some(0) => Ok(!self.settings.dry_run),
            Some(code @ (EXIT_PARTIAL | EXIT_VANISHED))
                if self.settings.dry_run || verify_copy(&pair.source, &pair.target) =>
            {
                ctx.log.warn(&format!(
                    "{}: rsync exited {code} but every source file is present",
                    entry.name
                ));
                Ok(!self.settings.dry_run)
            }
            code => Err(ToolError::OperationFailed {
                context: format!(
                    "{} failed (exit {})",
                    command_line(NAME, &args),
                    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
                ),
                stderr: Some(result.stderr.trim().to_string()).filter(|s| !s.is_empty()),
            }),
        }
    }

    /// Delete (or back up) one target. Returns `true` if it existed.
    fn remove_entry(&self, ctx: &Context, entry: &TargetEntry) -> Result<bool, ToolError> {
        let pair = self.pair(entry)?;
        let target = &pair.target;
        self.settings.ensure_not_system(target)?;
        if self.settings.home.starts_with(target) {
            return Err(ToolError::ValidationFailed(format!(
                "refusing to remove {}: it contains the home directory",
                target.display()
            )));
        }
        if !fs::exists_no_follow(target) {
            ctx.log
                .debug(&format!("{}: nothing to remove", self.settings.display(target)));
            return Ok(false);
        }

        let suffix = &self.settings.backup_suffix;
        if suffix.is_empty() {
            if self.settings.dry_run {
                ctx.log
                    .dry_run(&format!("would delete {}", self.settings.display(target)));
                return Ok(false);
            }
            let removed = if fs::is_real_dir(target) {
                std::fs::remove_dir_all(target)
            } else {
                std::fs::remove_file(target)
            };
            removed.map_err(|e| ToolError::io(format!("removing {}", target.display()), &e))?;
            ctx.log
                .info(&format!("deleted {}", self.settings.display(target)));
            return Ok(true);
        }

        let backup = fs::with_suffix(target, suffix);
        if fs::exists_no_follow(&backup) {
            return Err(ToolError::ConflictDetected {
                path: target.clone(),
                reason: format!("backup {} already exists", backup.display()),
            });
        }
        if self.settings.dry_run {
            ctx.log.dry_run(&format!(
                "would move {} to {}",
                self.settings.display(target),
                self.settings.display(&backup)
            ));
            return Ok(false);
        }
        std::fs::rename(target, &backup)
            .map_err(|e| ToolError::io(format!("moving {}", target.display()), &e))?;
        ctx.log.info(&format!(
            "moved {} to {}",
            self.settings.display(target),
            self.settings.display(&backup)
        ));
        Ok(true)
    }

    fn run_each(
        &self,
        ctx: &Context,
        op: Operation,
        items: &[String],
        apply: impl Fn(&TargetEntry) -> Result<bool, ToolError>,
    ) -> OperationResult {
        let mut result = OperationResult::new(NAME, op);
        for entry in self.select(&mut result, items) {
            if let Err(e) = ctx.cancel.check() {
                result.item_failed(&entry.name, e);
                break;
            }
            match apply(entry) {
                Ok(true) => result.mark_modified(&entry.name),
                Ok(false) => {}
                Err(e) => {
                    ctx.log.error(&format!("{}: {e}", entry.name));
                    result.item_failed(&entry.name, e);
                }
            }
        }
        let done = if op == Operation::Remove { "removed" } else { "synced" };
        let count = result.modified.len();
        result.finish(format!("{count} source(s) {done}"))
    }

    fn probe(&self, entry: &TargetEntry) -> ToolItem {
        let mut item = ToolItem::new(&entry.name, ItemStatus::NeedsSync);
        item.enabled = entry.enabled;
        item.priority = entry.priority;
        match self.pair(entry) {
            Ok(pair) => {
                item.description = format!(
                    "{} -> {}",
                    self.settings.display(&pair.source),
                    self.settings.display(&pair.target)
                );
                let stale = needs_sync(&pair.source, &pair.target);
                item.installed = pair.target.exists() && !stale;
                item.status = if !entry.enabled {
                    ItemStatus::Disabled
                } else if !pair.source.is_dir() {
                    item.error = Some(format!(
                        "source directory does not exist: {}",
                        pair.source.display()
                    ));
                    ItemStatus::Error
                } else if stale {
                    ItemStatus::NeedsSync
                } else {
                    ItemStatus::Synced
                };
                item.target = Some(pair.target);
            }
            Err(e) => {
                item.status = ItemStatus::Error;
                item.error = Some(e.to_string());
            }
        }
        item
    }
}

impl Configurable for RsyncTool {
    type Config = RsyncConfig;

    fn configure(&mut self, config: RsyncConfig) -> Result<(), ToolError> {
        if let Some(bad) = config.sources.iter().find(|s| s.name.trim().is_empty()) {
            return Err(ToolError::InvalidConfig(format!(
                "rsync source with target {:?} has an empty name",
                bad.target
            )));
        }
        if let Some(bad) = config.sources.iter().find(|s| s.target.trim().is_empty()) {
            return Err(ToolError::InvalidConfig(format!(
                "rsync source {} has an empty target",
                bad.name
            )));
        }
        self.config = config;
        Ok(())
    }
}

impl Tool for RsyncTool {
    fn name(&self) -> &str {
        NAME
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn priority(&self) -> i32 {
        self.settings.priority_of(NAME, DEFAULT_PRIORITY)
    }

    fn validate(&self) -> Result<(), ToolError> {
        if !self.executor.which(NAME) {
            return Err(ToolError::DependencyMissing(NAME.to_string()));
        }
        for entry in self.ordered().into_iter().filter(|s| s.enabled) {
            self.checked_pair(entry)?;
        }
        Ok(())
    }

    fn status(&self, ctx: &Context) -> Result<ToolStatus, ToolError> {
        let mut status = ToolStatus::new(NAME, self.is_enabled());
        for entry in self.ordered() {
            ctx.cancel.check()?;
            let item = self.probe(entry);
            if let Some(err) = &item.error {
                status.fail(format!("{}: {err}", entry.name));
            }
            status.items.push(item);
        }
        Ok(status)
    }

    fn install(&self, ctx: &Context, items: &[String]) -> OperationResult {
        self.run_each(ctx, Operation::Install, items, |e| self.sync_entry(ctx, e))
    }

    fn update(&self, ctx: &Context, items: &[String]) -> OperationResult {
        self.run_each(ctx, Operation::Update, items, |e| self.sync_entry(ctx, e))
    }

    fn remove(&self, ctx: &Context, items: &[String]) -> OperationResult {
        if items.is_empty() {
            return OperationResult::failure(
                NAME,
                Operation::Remove,
                ToolError::ValidationFailed("remove requires at least one source".to_string()),
            );
        }
        self.run_each(ctx, Operation::Remove, items, |e| self.remove_entry(ctx, e))
    }

    fn list<'a>(
        &'a self,
        ctx: &'a Context,
    ) -> Result<Box<dyn Iterator<Item = ToolItem> + 'a>, ToolError> {
        ctx.cancel.check()?;
        Ok(Box::new(self.ordered().into_iter().map(|e| self.probe(e))))
    }
}
