//! Bundle-file package tool with categories.
//!
//! Each category names one Brewfile. Category-level operations drive
//! `brew bundle`; per-package operations resolve the package type from the
//! Brewfile and call the matching `brew` verb.
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use super::{CategoryTool, Configurable, Context, Tool, ToolSettings, reject_unknown};
use crate::config::{CategoryConfig, HomebrewConfig};
use crate::error::ToolError;
use crate::exec::{Executor, command_line};
use crate::types::{ItemStatus, Operation, OperationResult, ToolItem, ToolStatus};

const NAME: &str = "homebrew";
const BREW: &str = "brew";
const DEFAULT_PRIORITY: i32 = 30;

/// Kind of Brewfile declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackageType {
    /// `brew`: a formula.
    Brew,
    /// `cask`: a macOS application cask.
    Cask,
    /// `mas`: a Mac App Store app; install state is never observed.
    Mas,
    /// `tap`: a third-party repository.
    Tap,
}

impl PackageType {
    fn from_token(token: &str) -> Option<Self> {
        match token {
            "brew" => Some(Self::Brew),
            "cask" => Some(Self::Cask),
            "mas" => Some(Self::Mas),
            "tap" => Some(Self::Tap),
            _ => None,
        }
    }

    /// Brewfile keyword.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Brew => "brew",
            Self::Cask => "cask",
            Self::Mas => "mas",
            Self::Tap => "tap",
        }
    }

    /// `brew`, `cask` and `mas` lines are packages; taps are not.
    #[must_use]
    pub const fn is_package(self) -> bool {
        !matches!(self, Self::Tap)
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One declaration parsed from a Brewfile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundleEntry {
    /// Package name, quotes removed.
    pub name: String,
    /// Declaration kind.
    pub package_type: PackageType,
    /// Trailing `# ...` comment, if any.
    pub description: Option<String>,
}

/// Parse Brewfile contents. Blank lines, comments and unknown keywords are
/// skipped.
#[must_use]
pub fn parse_bundle(contents: &str) -> Vec<BundleEntry> {
    contents.lines().filter_map(parse_line).collect()
}

fn parse_line(line: &str) -> Option<BundleEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let (token, rest) = line.split_once(char::is_whitespace)?;
    let package_type = PackageType::from_token(token)?;
    let rest = rest.trim_start();

    let (name, tail) = match rest.chars().next() {
        Some(quote @ ('"' | '\'')) => {
            let body = rest.get(1..)?;
            let end = body.find(quote)?;
            (body.get(..end)?, body.get(end + 1..).unwrap_or_default())
        }
        _ => {
            let end = rest
                .find(|c: char| c.is_whitespace() || c == ',' || c == '#')
                .unwrap_or(rest.len());
            (rest.get(..end)?, rest.get(end..).unwrap_or_default())
        }
    };
    if name.is_empty() {
        return None;
    }
    let description = tail
        .split_once('#')
        .map(|(_, d)| d.trim().to_string())
        .filter(|d| !d.is_empty());

    Some(BundleEntry {
        name: name.to_string(),
        package_type,
        description,
    })
}

/// Last path segment of a tap-qualified name (`homebrew/core/wget` -> `wget`).
fn short_name(name: &str) -> &str {
    name.rsplit('/').next().unwrap_or(name)
}

/// Installed formulae, casks and taps as reported by brew.
#[derive(Debug, Default)]
struct Installed {
    versions: HashMap<(PackageType, String), String>,
    taps: HashSet<String>,
}

impl Installed {
    fn parse_versions(&mut self, package_type: PackageType, stdout: &str) {
        for line in stdout.lines() {
            let mut fields = line.split_whitespace();
            if let Some(name) = fields.next() {
                let version = fields.next().unwrap_or_default().to_string();
                self.versions
                    .insert((package_type, short_name(name).to_string()), version);
            }
        }
    }

    /// `(installed, version)` for one entry; `mas` entries are never installed.
    fn lookup(&self, entry: &BundleEntry) -> (bool, Option<String>) {
        match entry.package_type {
            PackageType::Mas => (false, None),
            PackageType::Tap => (self.taps.contains(&entry.name.to_lowercase()), None),
            kind => self
                .versions
                .get(&(kind, short_name(&entry.name).to_string()))
                .map_or((false, None), |v| {
                    (true, Some(v.clone()).filter(|v| !v.is_empty()))
                }),
        }
    }
}

/// Bundle-file package tool.
#[derive(Debug)]
pub struct HomebrewTool {
    settings: Arc<ToolSettings>,
    executor: Arc<dyn Executor>,
    config: HomebrewConfig,
}

impl HomebrewTool {
    /// Create the tool with the default configuration.
    #[must_use]
    pub fn new(settings: Arc<ToolSettings>, executor: Arc<dyn Executor>) -> Self {
        Self {
            settings,
            executor,
            config: HomebrewConfig::default(),
        }
    }

    fn brewfile(&self, category: &CategoryConfig) -> Result<PathBuf, ToolError> {
        self.settings.resolve(&category.brewfile)
    }

    fn category(&self, name: &str) -> Result<&CategoryConfig, ToolError> {
        self.config
            .categories
            .get(name)
            .ok_or_else(|| ToolError::ValidationFailed(format!("unknown category: {name}")))
    }

    /// Read and parse the Brewfile of `category`.
    fn read_bundle(&self, category: &CategoryConfig) -> Result<Vec<BundleEntry>, ToolError> {
        let path = self.brewfile(category)?;
        if !path.is_file() {
            return Err(ToolError::ValidationFailed(format!(
                "Brewfile not found: {}",
                path.display()
            )));
        }
        let contents = std::fs::read_to_string(&path)
            .map_err(|e| ToolError::io(format!("reading {}", path.display()), &e))?;
        Ok(parse_bundle(&contents))
    }

    /// Query formulae, casks and taps concurrently; all three are read-only.
    fn probe_installed(&self, ctx: &Context) -> Result<Installed, ToolError> {
        ctx.cancel.check()?;
        let list = |args: &[&str]| -> Result<String, ToolError> {
            let token = self.settings.command_token(ctx, NAME);
            Ok(self.executor.run(&token, BREW, args)?.stdout)
        };
        let (formulae, (casks, taps)) = rayon::join(
            || list(&["list", "--formula", "--versions"]),
            || {
                rayon::join(
                    || list(&["list", "--cask", "--versions"]),
                    || list(&["tap"]),
                )
            },
        );
        let mut installed = Installed::default();
        installed.parse_versions(PackageType::Brew, &formulae?);
        installed.parse_versions(PackageType::Cask, &casks?);
        installed.taps = taps?
            .lines()
            .map(|l| l.trim().to_lowercase())
            .filter(|l| !l.is_empty())
            .collect();
        Ok(installed)
    }

    fn entry_item(category: &str, entry: &BundleEntry, installed: Option<&Installed>) -> ToolItem {
        let mut item = ToolItem::new(&entry.name, ItemStatus::Unknown);
        item.category = Some(category.to_string());
        item.package_type = Some(entry.package_type.as_str().to_string());
        item.description = entry.description.clone().unwrap_or_default();
        if entry.package_type == PackageType::Mas {
            return item;
        }
        if let Some(installed) = installed {
            let (present, version) = installed.lookup(entry);
            item.installed = present;
            item.version = version;
            item.status = if present {
                ItemStatus::Installed
            } else {
                ItemStatus::NotInstalled
            };
        }
        item
    }

    /// Category item with an `(installed/total packages)` summary.
    fn category_item(
        &self,
        name: &str,
        category: &CategoryConfig,
        installed: Option<&Result<Installed, ToolError>>,
    ) -> ToolItem {
        let mut item = ToolItem::new(name, ItemStatus::Disabled);
        item.enabled = category.enabled;
        item.category = Some(name.to_string());
        item.description = format!("Brewfile: {}", category.brewfile);
        if !category.enabled {
            return item;
        }
        let counted = self.read_bundle(category).and_then(|entries| {
            let installed = match installed {
                Some(Ok(installed)) => installed,
                Some(Err(e)) => return Err(e.clone()),
                None => return Err(ToolError::failed("installed packages were not probed")),
            };
            let packages: Vec<&BundleEntry> =
                entries.iter().filter(|e| e.package_type.is_package()).collect();
            let present = packages.iter().filter(|e| installed.lookup(e).0).count();
            Ok((present, packages.len()))
        });
        match counted {
            Ok((present, total)) => {
                item.description = format!("{} ({present}/{total} packages)", item.description);
                item.installed = present == total;
                item.status = if present == total {
                    ItemStatus::Installed
                } else {
                    ItemStatus::Partial
                };
                item.metadata.insert("installed".to_string(), present.into());
                item.metadata.insert("total".to_string(), total.into());
            }
            Err(e) => {
                item.status = ItemStatus::Error;
                item.error = Some(e.to_string());
            }
        }
        item
    }

    /// Probe once if any enabled category has a Brewfile to compare against.
    fn probe_for_categories(&self, ctx: &Context) -> Option<Result<Installed, ToolError>> {
        let needed = self.config.categories.iter().any(|(_, c)| {
            c.enabled && self.brewfile(c).is_ok_and(|p| p.is_file())
        });
        needed.then(|| self.probe_installed(ctx))
    }

    fn select<'a>(
        &'a self,
        result: &mut OperationResult,
        items: &[String],
    ) -> Vec<(&'a str, &'a CategoryConfig)> {
        if items.is_empty() {
            return self
                .config
                .categories
                .iter()
                .filter(|(_, c)| c.enabled)
                .collect();
        }
        let known = reject_unknown(
            result,
            items,
            |name| self.config.categories.get(name).is_some(),
            |name| ToolError::ValidationFailed(format!("unknown category: {name}")),
        );
        self.config
            .categories
            .iter()
            .filter(|(name, _)| known.contains(name))
            .filter(|(name, c)| {
                if c.enabled {
                    true
                } else {
                    result.item_failed(
                        name,
                        ToolError::ToolDisabled(format!("category {name} is disabled")),
                    );
                    false
                }
            })
            .collect()
    }

    /// Run one `brew` command, or log it under dry-run when it mutates.
    fn brew(&self, ctx: &Context, args: &[&str], mutates: bool) -> Result<bool, ToolError> {
        if mutates && self.settings.dry_run {
            ctx.log
                .dry_run(&format!("would run: {}", command_line(BREW, args)));
            return Ok(false);
        }
        ctx.log.debug(&format!("running {}", command_line(BREW, args)));
        let token = self.settings.command_token(ctx, NAME);
        let result = self.executor.run(&token, BREW, args)?;
        for line in result.stdout.lines().filter(|l| !l.trim().is_empty()) {
            if self.settings.dry_run {
                ctx.log.dry_run(line);
            } else {
                ctx.log.debug(line);
            }
        }
        Ok(mutates)
    }

    fn install_category(
        &self,
        ctx: &Context,
        name: &str,
        category: &CategoryConfig,
    ) -> Result<bool, ToolError> {
        let path = self.brewfile(category)?;
        if !path.is_file() {
            return Err(ToolError::ValidationFailed(format!(
                "Brewfile not found: {}",
                path.display()
            )));
        }
        if !self.settings.dry_run {
            ctx.log.info(&format!("installing category {name}"));
        }
        let file = path.to_string_lossy();
        self.brew(ctx, &["bundle", "--file", &file], true)
    }

    fn note_ignored_items(ctx: &Context, result: &mut OperationResult, items: &[String]) {
        if items.is_empty() {
            return;
        }
        ctx.log.warn(&format!(
            "{NAME} {} applies to every installed package; ignoring {}",
            result.operation,
            items.join(", ")
        ));
        for item in items {
            result.push_detail_item("ignored_items", item.as_str());
        }
    }
}

impl Configurable for HomebrewTool {
    type Config = HomebrewConfig;

    fn configure(&mut self, config: HomebrewConfig) -> Result<(), ToolError> {
        for (name, category) in config.categories.iter() {
            if name.trim().is_empty() {
                return Err(ToolError::InvalidConfig(
                    "homebrew category name must not be empty".to_string(),
                ));
            }
            if category.enabled && category.brewfile.trim().is_empty() {
                return Err(ToolError::InvalidConfig(format!(
                    "homebrew category {name} has no brewfile"
                )));
            }
        }
        self.config = config;
        Ok(())
    }
}

impl Tool for HomebrewTool {
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
        if !self.executor.which(BREW) {
            return Err(ToolError::DependencyMissing(BREW.to_string()));
        }
        for (name, category) in self.config.categories.iter().filter(|(_, c)| c.enabled) {
            let path = self.brewfile(category)?;
            if !path.is_file() {
                return Err(ToolError::ValidationFailed(format!(
                    "Brewfile for category {name} not found: {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }

    fn status(&self, ctx: &Context) -> Result<ToolStatus, ToolError> {
        let mut status = ToolStatus::new(NAME, self.is_enabled());
        let installed = self.probe_for_categories(ctx);
        ctx.cancel.check()?;
        for (name, category) in self.config.categories.iter() {
            let item = self.category_item(name, category, installed.as_ref());
            if let Some(err) = &item.error {
                status.fail(format!("{name}: {err}"));
            }
            status.items.push(item);
        }
        Ok(status)
    }

    fn install(&self, ctx: &Context, items: &[String]) -> OperationResult {
        let mut result = OperationResult::new(NAME, Operation::Install);
        for (name, category) in self.select(&mut result, items) {
            if let Err(e) = ctx.cancel.check() {
                result.item_failed(name, e);
                break;
            }
            match self.install_category(ctx, name, category) {
                Ok(true) => result.mark_modified(name),
                Ok(false) => {}
                Err(e) => {
                    ctx.log.error(&format!("{name}: {e}"));
                    result.item_failed(name, e);
                }
            }
        }
        let count = result.modified.len();
        result.finish(format!("{count} categor(ies) installed"))
    }

    fn update(&self, ctx: &Context, items: &[String]) -> OperationResult {
        let mut result = OperationResult::new(NAME, Operation::Update);
        Self::note_ignored_items(ctx, &mut result, items);
        if self.config.auto_update {
            if self.settings.dry_run {
                ctx.log.dry_run("would run: brew update");
            } else if let Err(e) = self.brew(ctx, &["update"], false) {
                result.item_failed("brew update", e);
                return result.finish("");
            }
        }
        let upgrade: &[&str] = if self.settings.dry_run {
            &["upgrade", "--dry-run"]
        } else {
            &["upgrade"]
        };
        match self.brew(ctx, upgrade, false) {
            Ok(_) => {
                result.detail("updated", "all packages");
                result.finish("upgraded all packages")
            }
            Err(e) => {
                result.item_failed("brew upgrade", e);
                result.finish("")
            }
        }
    }

    fn remove(&self, ctx: &Context, items: &[String]) -> OperationResult {
        let mut result = OperationResult::new(NAME, Operation::Remove);
        Self::note_ignored_items(ctx, &mut result, items);
        for verb in ["autoremove", "cleanup"] {
            if let Err(e) = ctx.cancel.check() {
                result.item_failed(verb, e);
                break;
            }
            let args: &[&str] = if self.settings.dry_run {
                &[verb, "--dry-run"]
            } else {
                &[verb]
            };
            if let Err(e) = self.brew(ctx, args, false) {
                ctx.log.error(&format!("brew {verb}: {e}"));
                result.item_failed(verb, e);
                break;
            }
        }
        if result.success {
            result.detail("cleaned", true);
        }
        result.finish("removed orphaned packages")
    }

    fn list<'a>(
        &'a self,
        ctx: &'a Context,
    ) -> Result<Box<dyn Iterator<Item = ToolItem> + 'a>, ToolError> {
        ctx.cancel.check()?;
        let installed = self.probe_for_categories(ctx);
        Ok(Box::new(self.config.categories.iter().map(move |(name, category)| {
            self.category_item(name, category, installed.as_ref())
        })))
    }

    fn as_category(&self) -> Option<&dyn CategoryTool> {
        Some(self)
    }
}

impl CategoryTool for HomebrewTool {
    fn list_category_items(
        &self,
        ctx: &Context,
        category: &str,
    ) -> Result<Vec<ToolItem>, ToolError> {
        ctx.cancel.check()?;
        let entries = self.read_bundle(self.category(category)?)?;
        let installed = if entries.iter().any(|e| e.package_type != PackageType::Mas) {
            Some(self.probe_installed(ctx)?)
        } else {
            None
        };
        Ok(entries
            .iter()
            .map(|e| Self::entry_item(category, e, installed.as_ref()))
            .collect())
    }

    fn install_category_item(&self, ctx: &Context, category: &str, item: &str) -> OperationResult {
        let mut result = OperationResult::new(NAME, Operation::Install);
        let entry = self
            .category(category)
            .and_then(|c| self.read_bundle(c))
            .and_then(|entries| {
                entries
                    .into_iter()
                    .find(|e| e.name == item || short_name(&e.name) == item)
                    .ok_or_else(|| ToolError::PackageNotFound(item.to_string()))
            });
        let outcome = entry.and_then(|entry| {
            let args: Vec<&str> = match entry.package_type {
                PackageType::Brew => vec!["install", entry.name.as_str()],
                PackageType::Cask => vec!["install", "--cask", entry.name.as_str()],
                PackageType::Tap => vec!["tap", entry.name.as_str()],
                PackageType::Mas => {
                    return Err(ToolError::Unsupported(format!(
                        "{} is a Mac App Store app; install it with `brew bundle` or mas",
                        entry.name
                    )));
                }
            };
            ctx.cancel.check()?;
            self.brew(ctx, &args, true)
        });
        match outcome {
            Ok(true) => result.mark_modified(item),
            Ok(false) => {}
            Err(e) => result.item_failed(item, e),
        }
        result.finish(format!("{item} installed"))
    }
}
