//! Symlink-farm reconciler.
//!
//! Each package is a directory tree under `<dotfiles>/<packages_root>/<pkg>`.
//! Installing a package makes every file of that tree appear as a symlink at
//! the same relative path under the package target, creating directories as
//! needed. A foreign file in the way is renamed to `<path><suffix>` first and
//! restored when the package is removed.
//!
//! Every operation computes its whole plan before touching the filesystem;
//! the plan is then applied step by step with a journal so a failing step
//! rolls the package back to where it started. With `strategy: stow` the
//! links themselves are created by GNU stow; backups still happen here.
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use walkdir::{DirEntry, WalkDir};

use super::fs;
use super::{Configurable, Context, Tool, ToolSettings, reject_unknown};
use crate::config::{LinkStrategy, StowConfig, TargetEntry};
use crate::error::ToolError;
use crate::exec::Executor;
use crate::logging::Log;
use crate::types::{ItemStatus, Operation, OperationResult, ToolItem, ToolStatus};

/// Registered name of the symlink-farm tool.
pub const NAME: &str = "stow";
const DEFAULT_PRIORITY: i32 = 1;

/// Entries never linked, at any depth.
const IGNORED_NAMES: &[&str] = &[
    ".git",
    ".gitignore",
    ".gitmodules",
    ".stow-local-ignore",
    ".DS_Store",
];

/// Prefixes of documentation files ignored at the top of a package.
const IGNORED_TOP_LEVEL: &[&str] = &["README", "LICENSE", "COPYING"];

fn is_ignored(name: &OsStr, depth: usize) -> bool {
    let name = name.to_string_lossy();
    IGNORED_NAMES.contains(&name.as_ref())
        || (depth == 1 && IGNORED_TOP_LEVEL.iter().any(|p| name.starts_with(p)))
        || name.starts_with(".#")
        || name.ends_with('~')
        || (name.len() > 1 && name.starts_with('#') && name.ends_with('#'))
}

type Walker = walkdir::FilterEntry<walkdir::IntoIter, fn(&DirEntry) -> bool>;

fn keep(entry: &DirEntry) -> bool {
    !is_ignored(entry.file_name(), entry.depth())
}

/// Depth-first walk of a package, parents before children, sorted by name.
fn walker(pkg_dir: &Path) -> Walker {
    WalkDir::new(pkg_dir)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(keep as fn(&DirEntry) -> bool)
}

fn walk_error(pkg_dir: &Path, err: &walkdir::Error) -> ToolError {
    ToolError::failed(format!("walking {}: {err}", pkg_dir.display()))
}

/// One reversible filesystem mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    CreateDir(PathBuf),
    RemoveDir(PathBuf),
    Rename { from: PathBuf, to: PathBuf },
    Link { source: PathBuf, link: PathBuf },
    Unlink { source: PathBuf, link: PathBuf },
}

impl Step {
    fn apply(&self) -> std::io::Result<()> {
        match self {
            Self::CreateDir(path) => std::fs::create_dir_all(path),
            Self::RemoveDir(path) => std::fs::remove_dir(path),
            Self::Rename { from, to } => std::fs::rename(from, to),
            Self::Link { source, link } => fs::create_symlink(source, link),
            Self::Unlink { link, .. } => fs::remove_symlink(link),
        }
    }

    fn inverse(&self) -> Self {
        match self {
            Self::CreateDir(path) => Self::RemoveDir(path.clone()),
            Self::RemoveDir(path) => Self::CreateDir(path.clone()),
            Self::Rename { from, to } => Self::Rename {
                from: to.clone(),
                to: from.clone(),
            },
            Self::Link { source, link } => Self::Unlink {
                source: source.clone(),
                link: link.clone(),
            },
            Self::Unlink { source, link } => Self::Link {
                source: source.clone(),
                link: link.clone(),
            },
        }
    }

    const fn is_link(&self) -> bool {
        matches!(self, Self::Link { .. })
    }

    fn describe(&self, settings: &ToolSettings) -> String {
        let d = |p: &Path| settings.display(p);
        match self {
            Self::CreateDir(path) => format!("create directory {}", d(path)),
            Self::RemoveDir(path) => format!("remove empty directory {}", d(path)),
            Self::Rename { from, to } => format!("move {} to {}", d(from), d(to)),
            Self::Link { source, link } => format!("link {} -> {}", d(link), d(source)),
            Self::Unlink { link, .. } => format!("remove link {}", d(link)),
        }
    }
}

/// Applied steps, undone in reverse on failure.
#[derive(Debug, Default)]
struct Journal {
    done: Vec<Step>,
}

impl Journal {
    fn apply(&mut self, step: Step, settings: &ToolSettings) -> Result<(), ToolError> {
        step.apply()
            .map_err(|e| ToolError::io(step.describe(settings), &e))?;
        self.done.push(step);
        Ok(())
    }

    fn apply_all(
        &mut self,
        ctx: &Context,
        steps: impl IntoIterator<Item = Step>,
        settings: &ToolSettings,
    ) -> Result<(), ToolError> {
        for step in steps {
            ctx.cancel.check()?;
            ctx.log.debug(&step.describe(settings));
            self.apply(step, settings)?;
        }
        Ok(())
    }

    /// Undo every applied step, newest first. Failures are logged; the
    /// remaining steps are still undone.
    fn rollback(self, log: &dyn Log, settings: &ToolSettings) {
        for step in self.done.into_iter().rev() {
            let undo = step.inverse();
            if let Err(e) = undo.apply() {
                log.warn(&format!("rollback: {}: {e}", undo.describe(settings)));
            }
        }
    }

    fn changed(&self) -> bool {
        !self.done.is_empty()
    }
}

/// Steps that take a package from its current state to fully linked.
#[derive(Debug, Default)]
struct InstallPlan {
    steps: Vec<Step>,
    backups: Vec<PathBuf>,
}

/// Steps that take a package from its current state to unlinked.
#[derive(Debug, Default)]
struct RemovePlan {
    unlinks: Vec<Step>,
    restores: Vec<Step>,
}

/// Symlink-farm tool.
#[derive(Debug)]
pub struct StowTool {
    settings: Arc<ToolSettings>,
    executor: Arc<dyn Executor>,
    config: StowConfig,
}

impl StowTool {
    /// Create the tool with the default configuration.
    #[must_use]
    pub fn new(settings: Arc<ToolSettings>, executor: Arc<dyn Executor>) -> Self {
        Self {
            settings,
            executor,
            config: StowConfig::default(),
        }
    }

    fn packages_dir(&self) -> PathBuf {
        self.settings.dotfiles.join(&self.config.packages_root)
    }

    fn package_dir(&self, name: &str) -> PathBuf {
        self.packages_dir().join(name)
    }

    /// Packages in priority order, declaration order on ties.
    fn ordered(&self) -> Vec<&TargetEntry> {
        let mut packages: Vec<&TargetEntry> = self.config.packages.iter().collect();
        packages.sort_by_key(|p| p.priority);
        packages
    }

    fn find(&self, name: &str) -> Option<&TargetEntry> {
        self.config.packages.iter().find(|p| p.name == name)
    }

    /// Resolve a package's source directory and target, refusing system
    /// directories and missing packages.
    fn locate(&self, pkg: &TargetEntry) -> Result<(PathBuf, PathBuf), ToolError> {
        let target = self.settings.expand(&pkg.target)?;
        self.settings.ensure_not_system(&target)?;
        let pkg_dir = self.package_dir(&pkg.name);
        if !pkg_dir.is_dir() {
            return Err(ToolError::PackageNotFound(pkg.name.clone()));
        }
        Ok((pkg_dir, target))
    }

    /// Requested packages in run order; empty means every enabled package.
    /// Unknown and disabled names are recorded as item failures.
    fn select<'a>(
        &'a self,
        result: &mut OperationResult,
        items: &[String],
    ) -> Vec<&'a TargetEntry> {
        if items.is_empty() {
            return self.ordered().into_iter().filter(|p| p.enabled).collect();
        }
        let known = reject_unknown(
            result,
            items,
            |name| self.find(name).is_some(),
            |name| ToolError::PackageNotFound(name.to_string()),
        );
        self.ordered()
            .into_iter()
            .filter(|p| known.contains(&p.name.as_str()))
            .filter(|p| {
                if p.enabled {
                    true
                } else {
                    result.item_failed(
                        &p.name,
                        ToolError::ToolDisabled(format!("package {} is disabled", p.name)),
                    );
                    false
                }
            })
            .collect()
    }

    fn backup_step(&self, dest: &Path) -> Result<(Step, PathBuf), ToolError> {
        let suffix = &self.settings.backup_suffix;
        if suffix.is_empty() {
            return Err(ToolError::ConflictDetected {
                path: dest.to_path_buf(),
                reason: "file exists and backups are disabled".to_string(),
            });
        }
        let backup = fs::with_suffix(dest, suffix);
        if fs::exists_no_follow(&backup) {
            return Err(ToolError::ConflictDetected {
                path: dest.to_path_buf(),
                reason: format!("backup {} already exists", backup.display()),
            });
        }
        Ok((
            Step::Rename {
                from: dest.to_path_buf(),
                to: backup.clone(),
            },
            backup,
        ))
    }

    fn plan_install(&self, pkg_dir: &Path, target: &Path) -> Result<InstallPlan, ToolError> {
        let mut plan = InstallPlan::default();
        // Directories this plan creates; nothing below them exists yet.
        let mut fresh: Vec<PathBuf> = Vec::new();

        if !fs::exists_no_follow(target) {
            plan.steps.push(Step::CreateDir(target.to_path_buf()));
            fresh.push(target.to_path_buf());
        } else if !target.is_dir() {
            return Err(ToolError::TargetNotFound(target.to_path_buf()));
        }

        let mut walk = walker(pkg_dir);
        while let Some(entry) = walk.next() {
            let entry = entry.map_err(|e| walk_error(pkg_dir, &e))?;
            let source = entry.path();
            let Ok(rel) = source.strip_prefix(pkg_dir) else {
                continue;
            };
            let dest = target.join(rel);
            let is_fresh = fresh.iter().any(|d| dest.starts_with(d));

            if entry.file_type().is_dir() {
                if !is_fresh {
                    if fs::is_real_dir(&dest) {
                        continue;
                    }
                    if fs::points_to(&dest, source) {
                        walk.skip_current_dir();
                        continue;
                    }
                    if fs::exists_no_follow(&dest) {
                        let (step, backup) = self.backup_step(&dest)?;
                        plan.steps.push(step);
                        plan.backups.push(backup);
                    }
                }
                plan.steps.push(Step::CreateDir(dest.clone()));
                fresh.push(dest);
            } else {
                if !is_fresh {
                    if fs::points_to(&dest, source) {
                        continue;
                    }
                    if fs::exists_no_follow(&dest) {
                        let (step, backup) = self.backup_step(&dest)?;
                        plan.steps.push(step);
                        plan.backups.push(backup);
                    }
                }
                plan.steps.push(Step::Link {
                    source: source.to_path_buf(),
                    link: dest,
                });
            }
        }
        Ok(plan)
    }

    fn restore_step(&self, dest: &Path, will_be_absent: bool) -> Option<Step> {
        let suffix = &self.settings.backup_suffix;
        if suffix.is_empty() {
            return None;
        }
        let backup = fs::with_suffix(dest, suffix);
        (fs::exists_no_follow(&backup) && (will_be_absent || !fs::exists_no_follow(dest))).then(
            || Step::Rename {
                from: backup,
                to: dest.to_path_buf(),
            },
        )
    }

    fn plan_remove(&self, pkg_dir: &Path, target: &Path) -> Result<RemovePlan, ToolError> {
        let mut plan = RemovePlan::default();
        if !target.is_dir() {
            return Ok(plan);
        }
        let mut walk = walker(pkg_dir);
        while let Some(entry) = walk.next() {
            let entry = entry.map_err(|e| walk_error(pkg_dir, &e))?;
            let source = entry.path();
            let Ok(rel) = source.strip_prefix(pkg_dir) else {
                continue;
            };
            let dest = target.join(rel);
            let owned = fs::points_to(&dest, source);
            if owned {
                plan.unlinks.push(Step::Unlink {
                    source: source.to_path_buf(),
                    link: dest.clone(),
                });
            }
            if entry.file_type().is_dir() {
                if owned {
                    walk.skip_current_dir();
                } else if fs::is_real_dir(&dest) {
                    // Restored only if the directory is pruned.
                    if let Some(step) = self.restore_step(&dest, true) {
                        plan.restores.push(step);
                    }
                    continue;
                }
            }
            if let Some(step) = self.restore_step(&dest, owned) {
                plan.restores.push(step);
            }
        }
        Ok(plan)
    }

    /// `true` iff every package file has an owned link at its target path.
    /// Stops at the first mismatch.
    fn is_linked(pkg_dir: &Path, target: &Path) -> Result<bool, ToolError> {
        let mut walk = walker(pkg_dir);
        while let Some(entry) = walk.next() {
            let entry = entry.map_err(|e| walk_error(pkg_dir, &e))?;
            let source = entry.path();
            let Ok(rel) = source.strip_prefix(pkg_dir) else {
                continue;
            };
            let dest = target.join(rel);
            if entry.file_type().is_dir() {
                if fs::points_to(&dest, source) {
                    walk.skip_current_dir();
                }
            } else if !fs::points_to(&dest, source) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn stow_args<'a>(root: &'a str, target: &'a str, pkg: &'a str, delete: bool) -> Vec<&'a str> {
        let mut args = vec!["--no-folding"];
        if delete {
            args.push("-D");
        }
        args.extend(["-d", root, "-t", target, pkg]);
        args
    }

    fn run_stow(
        &self,
        ctx: &Context,
        pkg: &TargetEntry,
        target: &Path,
        delete: bool,
    ) -> Result<(), ToolError> {
        let root = self.packages_dir().to_string_lossy().into_owned();
        let target = target.to_string_lossy().into_owned();
        let args = Self::stow_args(&root, &target, &pkg.name, delete);
        let token = self.settings.command_token(ctx, NAME);
        self.executor.run(&token, "stow", &args)?;
        Ok(())
    }

    /// Link one package. Returns the journal of applied steps, which is
    /// empty when the package was already linked or in dry-run mode.
    fn install_package(
        &self,
        ctx: &Context,
        pkg: &TargetEntry,
        result: &mut OperationResult,
    ) -> Result<Journal, ToolError> {
        let (pkg_dir, target) = self.locate(pkg)?;
        let plan = self.plan_install(&pkg_dir, &target)?;
        let mut journal = Journal::default();

        if plan.steps.is_empty() {
            ctx.log.debug(&format!("{}: already linked", pkg.name));
            return Ok(journal);
        }

        if self.settings.dry_run {
            for step in &plan.steps {
                ctx.log
                    .dry_run(&format!("{}: would {}", pkg.name, step.describe(&self.settings)));
            }
            return Ok(journal);
        }

        ctx.log.info(&format!(
            "linking {} into {}",
            pkg.name,
            self.settings.display(&target)
        ));

        let outcome = match self.config.strategy {
            LinkStrategy::Native => journal.apply_all(ctx, plan.steps, &self.settings),
            LinkStrategy::Stow => journal
                .apply_all(
                    ctx,
                    plan.steps.into_iter().filter(|s| !s.is_link()),
                    &self.settings,
                )
                .and_then(|()| self.run_stow(ctx, pkg, &target, false)),
        };
        if let Err(e) = outcome {
            journal.rollback(ctx.log.as_ref(), &self.settings);
            return Err(e);
        }
        for backup in &plan.backups {
            ctx.log
                .warn(&format!("backed up existing file to {}", self.settings.display(backup)));
            result.push_detail_item("backups", backup.display().to_string());
        }
        Ok(journal)
    }

    /// Unlink one package and restore its backups.
    fn remove_package(&self, ctx: &Context, pkg: &TargetEntry) -> Result<Journal, ToolError> {
        let target = self.settings.expand(&pkg.target)?;
        self.settings.ensure_not_system(&target)?;
        let pkg_dir = self.package_dir(&pkg.name);
        if !pkg_dir.is_dir() {
            return Err(ToolError::PackageNotFound(pkg.name.clone()));
        }
        let plan = self.plan_remove(&pkg_dir, &target)?;
        let mut journal = Journal::default();

        if self.settings.dry_run {
            for step in plan.unlinks.iter().chain(&plan.restores) {
                ctx.log
                    .dry_run(&format!("{}: would {}", pkg.name, step.describe(&self.settings)));
            }
            return Ok(journal);
        }

        let outcome = self.apply_remove(ctx, pkg, &target, plan, &mut journal);
        if let Err(e) = outcome {
            journal.rollback(ctx.log.as_ref(), &self.settings);
            return Err(e);
        }
        Ok(journal)
    }

    fn apply_remove(
        &self,
        ctx: &Context,
        pkg: &TargetEntry,
        target: &Path,
        plan: RemovePlan,
        journal: &mut Journal,
    ) -> Result<(), ToolError> {
        let parents: Vec<PathBuf> = plan
            .unlinks
            .iter()
            .filter_map(|s| match s {
                Step::Unlink { link, .. } => link.parent().map(Path::to_path_buf),
                _ => None,
            })
            .collect();

        match self.config.strategy {
            LinkStrategy::Native => journal.apply_all(ctx, plan.unlinks, &self.settings)?,
            LinkStrategy::Stow => {
                if !plan.unlinks.is_empty() {
                    self.run_stow(ctx, pkg, target, true)?;
                    // `stow -D` removed exactly the owned links.
                    journal.done.extend(plan.unlinks);
                }
            }
        }

        let mut parents = parents;
        parents.sort_by_key(|p| std::cmp::Reverse(p.components().count()));
        parents.dedup();
        for dir in parents {
            for removed in fs::prune_empty_dirs(&dir, target) {
                ctx.log
                    .debug(&format!("removed empty directory {}", self.settings.display(&removed)));
                journal.done.push(Step::RemoveDir(removed));
            }
        }

        for restore in plan.restores {
            if let Step::Rename { to, .. } = &restore
                && fs::exists_no_follow(to)
            {
                continue;
            }
            ctx.cancel.check()?;
            ctx.log.info(&restore.describe(&self.settings));
            journal.apply(restore, &self.settings)?;
        }
        Ok(())
    }

    /// Unlink then relink one package; on relink failure the removal is
    /// undone so the package is never left half-linked.
    fn update_package(
        &self,
        ctx: &Context,
        pkg: &TargetEntry,
        result: &mut OperationResult,
    ) -> Result<bool, ToolError> {
        let removed = self.remove_package(ctx, pkg)?;
        match self.install_package(ctx, pkg, result) {
            Ok(installed) => Ok(removed.changed() || installed.changed()),
            Err(e) => {
                removed.rollback(ctx.log.as_ref(), &self.settings);
                Err(e)
            }
        }
    }

    fn probe(&self, pkg: &TargetEntry) -> ToolItem {
        let mut item = ToolItem::new(&pkg.name, ItemStatus::NotLinked);
        item.enabled = pkg.enabled;
        item.priority = pkg.priority;
        let outcome = self.settings.expand(&pkg.target).and_then(|target| {
            item.description = format!("-> {}", self.settings.display(&target));
            item.target = Some(target.clone());
            let pkg_dir = self.package_dir(&pkg.name);
            if pkg_dir.is_dir() {
                Self::is_linked(&pkg_dir, &target)
            } else {
                Err(ToolError::PackageNotFound(pkg.name.clone()))
            }
        });
        match outcome {
            Ok(linked) => {
                item.installed = linked;
                item.status = if !pkg.enabled {
                    ItemStatus::Disabled
                } else if linked {
                    ItemStatus::Linked
                } else {
                    ItemStatus::NotLinked
                };
            }
            Err(e) => {
                item.status = ItemStatus::Error;
                item.error = Some(e.to_string());
            }
        }
        item
    }

    fn run_each(
        &self,
        ctx: &Context,
        op: Operation,
        items: &[String],
        mut apply: impl FnMut(&TargetEntry, &mut OperationResult) -> Result<bool, ToolError>,
    ) -> OperationResult {
        let mut result = OperationResult::new(NAME, op);
        let packages = self.select(&mut result, items);
        for pkg in packages {
            if let Err(e) = ctx.cancel.check() {
                result.item_failed(&pkg.name, e);
                break;
            }
            match apply(pkg, &mut result) {
                Ok(true) => result.mark_modified(&pkg.name),
                Ok(false) => {}
                Err(e) => {
                    ctx.log.error(&format!("{}: {e}", pkg.name));
                    result.item_failed(&pkg.name, e);
                }
            }
        }
        result
    }

    fn finish(&self, result: OperationResult, verb: &str) -> OperationResult {
        let message = if self.settings.dry_run {
            format!("dry run: no packages {verb}")
        } else {
            format!("{} package(s) {verb}", result.modified.len())
        };
        result.finish(message)
    }
}

impl Configurable for StowTool {
    type Config = StowConfig;

    fn configure(&mut self, config: StowConfig) -> Result<(), ToolError> {
        if config.packages_root.trim().is_empty() {
            return Err(ToolError::InvalidConfig(
                "stow.packages_root must not be empty".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for pkg in &config.packages {
            if pkg.name.trim().is_empty() {
                return Err(ToolError::InvalidConfig(
                    "stow package name must not be empty".to_string(),
                ));
            }
            if !seen.insert(pkg.name.as_str()) {
                return Err(ToolError::InvalidConfig(format!(
                    "stow package {} declared more than once",
                    pkg.name
                )));
            }
            if pkg.target.trim().is_empty() {
                return Err(ToolError::InvalidConfig(format!(
                    "stow package {} has an empty target",
                    pkg.name
                )));
            }
        }
        self.config = config;
        Ok(())
    }
}

impl Tool for StowTool {
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
        if !self.settings.dotfiles.is_dir() {
            return Err(ToolError::ValidationFailed(format!(
                "dotfiles path does not exist: {}",
                self.settings.dotfiles.display()
            )));
        }
        if self.config.strategy == LinkStrategy::Stow && !self.executor.which("stow") {
            return Err(ToolError::StowNotFound);
        }
        for pkg in self.ordered().into_iter().filter(|p| p.enabled) {
            self.locate(pkg)?;
        }
        Ok(())
    }

    fn status(&self, ctx: &Context) -> Result<ToolStatus, ToolError> {
        let mut status = ToolStatus::new(NAME, self.is_enabled());
        for pkg in self.ordered() {
            ctx.cancel.check()?;
            let item = self.probe(pkg);
            if let Some(err) = &item.error {
                status.fail(format!("{}: {err}", pkg.name));
            }
            status.items.push(item);
        }
        Ok(status)
    }

    fn install(&self, ctx: &Context, items: &[String]) -> OperationResult {
        let result = self.run_each(ctx, Operation::Install, items, |pkg, result| {
            self.install_package(ctx, pkg, result).map(|j| j.changed())
        });
        self.finish(result, "linked")
    }

    fn update(&self, ctx: &Context, items: &[String]) -> OperationResult {
        let result = self.run_each(ctx, Operation::Update, items, |pkg, result| {
            self.update_package(ctx, pkg, result)
        });
        self.finish(result, "relinked")
    }

    fn remove(&self, ctx: &Context, items: &[String]) -> OperationResult {
        if items.is_empty() {
            return OperationResult::failure(
                NAME,
                Operation::Remove,
                ToolError::ValidationFailed("remove requires at least one package".to_string()),
            );
        }
        let result = self.run_each(ctx, Operation::Remove, items, |pkg, _| {
            self.remove_package(ctx, pkg).map(|j| j.changed())
        });
        self.finish(result, "unlinked")
    }

    fn list<'a>(
        &'a self,
        ctx: &'a Context,
    ) -> Result<Box<dyn Iterator<Item = ToolItem> + 'a>, ToolError> {
        ctx.cancel.check()?;
        Ok(Box::new(self.ordered().into_iter().map(|pkg| self.probe(pkg))))
    }
}
