//! Globally installed packages for the npm and uv ecosystems.
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Deserialize;

use super::{Configurable, Context, Tool, ToolSettings};
use crate::config::{GlobalPackagesConfig, ValidationConfig};
use crate::error::ToolError;
use crate::exec::{Executor, command_line};
use crate::types::{ItemStatus, Operation, OperationResult, ToolItem, ToolStatus};

/// Supported package ecosystems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ecosystem {
    /// Node packages installed with `npm install -g`.
    Npm,
    /// Python tools installed with `uv tool install`.
    Uv,
}

impl Ecosystem {
    /// Tool and program name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Npm => "npm",
            Self::Uv => "uv",
        }
    }

    const fn default_priority(self) -> i32 {
        match self {
            Self::Npm => 50,
            Self::Uv => 60,
        }
    }

    const fn label(self) -> &'static str {
        match self {
            Self::Npm => "npm global package",
            Self::Uv => "uv tool",
        }
    }

    /// Runtimes of which at least one must be on PATH.
    const fn runtimes(self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["node"],
            Self::Uv => &["python3", "python"],
        }
    }

    fn verb_args(self, op: Operation, package: &str) -> Vec<&str> {
        match (self, op) {
            (Self::Npm, Operation::Update) => vec!["update", "-g", package],
            (Self::Npm, Operation::Remove) => vec!["uninstall", "-g", package],
            (Self::Npm, _) => vec!["install", "-g", package],
            (Self::Uv, Operation::Update) => vec!["tool", "upgrade", package],
            (Self::Uv, Operation::Remove) => vec!["tool", "uninstall", package],
            (Self::Uv, _) => vec!["tool", "install", package],
        }
    }

    const fn list_json_args(self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["list", "-g", "--depth=0", "--json"],
            Self::Uv => &["tool", "list", "--format", "json"],
        }
    }

    const fn list_text_args(self) -> &'static [&'static str] {
        match self {
            Self::Npm => &["list", "-g", "--depth=0"],
            Self::Uv => &["tool", "list"],
        }
    }

    fn parse_list_json(self, stdout: &str) -> Option<HashMap<String, String>> {
        match self {
            Self::Npm => {
                let list: NpmList = serde_json::from_str(stdout).ok()?;
                Some(
                    list.dependencies
                        .into_iter()
                        .map(|(name, dep)| (name, dep.version))
                        .collect(),
                )
            }
            Self::Uv => {
                let tools: Vec<UvTool> = serde_json::from_str(stdout).ok()?;
                Some(
                    tools
                        .into_iter()
                        .map(|t| (t.name, strip_v(&t.version).to_string()))
                        .collect(),
                )
            }
        }
    }

    fn parse_list_text(self, stdout: &str) -> HashMap<String, String> {
        match self {
            Self::Npm => stdout.lines().filter_map(parse_npm_line).collect(),
            Self::Uv => stdout.lines().filter_map(parse_uv_line).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NpmList {
    #[serde(default)]
    dependencies: BTreeMap<String, NpmDependency>,
}

#[derive(Debug, Deserialize)]
struct NpmDependency {
    #[serde(default)]
    version: String,
}

#[derive(Debug, Deserialize)]
struct UvTool {
    name: String,
    #[serde(default)]
    version: String,
}

fn strip_v(version: &str) -> &str {
    version.strip_prefix('v').unwrap_or(version)
}

/// `├── @scope/name@1.2.3` -> (`@scope/name`, `1.2.3`).
fn parse_npm_line(line: &str) -> Option<(String, String)> {
    let spec = line
        .trim_start_matches(|c: char| "│├└─┬ `|+-\\".contains(c))
        .trim();
    let at = spec.rfind('@').filter(|&i| i > 0)?;
    let (name, version) = (spec.get(..at)?, spec.get(at + 1..)?);
    (!name.is_empty() && !name.contains(char::is_whitespace))
        .then(|| (name.to_string(), version.trim().to_string()))
}

/// `ruff v0.4.1` -> (`ruff`, `0.4.1`); executable lines (`- ruff`) are skipped.
fn parse_uv_line(line: &str) -> Option<(String, String)> {
    let line = line.trim();
    if line.starts_with('-') {
        return None;
    }
    let mut parts = line.split_whitespace();
    let name = parts.next()?;
    let version = parts.next()?;
    Some((name.to_string(), strip_v(version).to_string()))
}

/// `true` if `latest` is newer than `installed`: semver comparison when both
/// parse, plain inequality otherwise.
#[must_use]
pub fn is_newer(installed: &str, latest: &str) -> bool {
    let (installed, latest) = (strip_v(installed.trim()), strip_v(latest.trim()));
    if latest.is_empty() {
        return false;
    }
    match (semver::Version::parse(installed), semver::Version::parse(latest)) {
        (Ok(installed), Ok(latest)) => latest > installed,
        _ => installed != latest,
    }
}

/// Source of the latest published version of a package.
pub trait PackageIndex: Send + Sync + std::fmt::Debug {
    /// Latest version of `package`.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::OperationFailed`] if the index cannot be queried.
    fn latest_version(&self, package: &str, timeout: Duration) -> Result<String, ToolError>;
}

/// The PyPI JSON API.
#[derive(Debug, Default, Clone, Copy)]
pub struct PypiIndex;

#[derive(Debug, Deserialize)]
struct PypiProject {
    info: PypiInfo,
}

#[derive(Debug, Deserialize)]
struct PypiInfo {
    version: String,
}

impl PackageIndex for PypiIndex {
    fn latest_version(&self, package: &str, timeout: Duration) -> Result<String, ToolError> {
        // Extras are not part of the project name.
        let project = package.split('[').next().unwrap_or(package);
        let url = format!("https://pypi.org/pypi/{project}/json");
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        let body = agent
            .get(&url)
            .call()
            .and_then(|mut response| response.body_mut().read_to_string())
            .map_err(|e| ToolError::failed(format!("querying {url}: {e}")))?;
        let project: PypiProject = serde_json::from_str(&body)
            .map_err(|e| ToolError::failed(format!("parsing {url}: {e}")))?;
        Ok(project.info.version)
    }
}

/// Configuration for one [`GlobalPackageTool`].
#[derive(Debug, Clone)]
pub struct GlobalToolConfig {
    /// Declared packages and switches.
    pub packages: GlobalPackagesConfig,
    /// Regular expression every package name must match.
    pub name_pattern: String,
}

/// Global-package tool for one [`Ecosystem`].
#[derive(Debug)]
pub struct GlobalPackageTool {
    ecosystem: Ecosystem,
    settings: Arc<ToolSettings>,
    executor: Arc<dyn Executor>,
    index: Arc<dyn PackageIndex>,
    config: GlobalPackagesConfig,
    pattern: Option<Regex>,
}

impl GlobalPackageTool {
    fn with_ecosystem(
        ecosystem: Ecosystem,
        settings: Arc<ToolSettings>,
        executor: Arc<dyn Executor>,
        pattern: &str,
    ) -> Self {
        Self {
            ecosystem,
            settings,
            executor,
            index: Arc::new(PypiIndex),
            config: GlobalPackagesConfig::default(),
            pattern: Regex::new(pattern).ok(),
        }
    }

    /// npm globals.
    #[must_use]
    pub fn npm(settings: Arc<ToolSettings>, executor: Arc<dyn Executor>) -> Self {
        let pattern = ValidationConfig::default().npm_package_pattern;
        Self::with_ecosystem(Ecosystem::Npm, settings, executor, &pattern)
    }

    /// uv tools.
    #[must_use]
    pub fn uv(settings: Arc<ToolSettings>, executor: Arc<dyn Executor>) -> Self {
        let pattern = ValidationConfig::default().uv_package_pattern;
        Self::with_ecosystem(Ecosystem::Uv, settings, executor, &pattern)
    }

    /// Replace the package index used for uv update checks.
    #[must_use]
    pub fn with_index(mut self, index: Arc<dyn PackageIndex>) -> Self {
        self.index = index;
        self
    }

    fn program(&self) -> &'static str {
        self.ecosystem.name()
    }

    fn check_name(&self, package: &str) -> Result<(), ToolError> {
        if self.pattern.as_ref().is_some_and(|re| re.is_match(package)) {
            Ok(())
        } else {
            Err(ToolError::ValidationFailed(format!(
                "invalid package name: {package}"
            )))
        }
    }

    /// Installed packages and versions, preferring machine-readable output.
    fn installed(&self, ctx: &Context) -> Result<HashMap<String, String>, ToolError> {
        ctx.cancel.check()?;
        let token = self.settings.command_token(ctx, self.program());
        let json = self
            .executor
            .run_unchecked(&token, self.program(), self.ecosystem.list_json_args())?;
        if json.success
            && let Some(packages) = self.ecosystem.parse_list_json(&json.stdout)
        {
            return Ok(packages);
        }
        ctx.log.debug(&format!(
            "{} unavailable, parsing plain list output",
            command_line(self.program(), self.ecosystem.list_json_args())
        ));
        let text = self
            .executor
            .run(&token, self.program(), self.ecosystem.list_text_args())?;
        Ok(self.ecosystem.parse_list_text(&text.stdout))
    }

    fn latest_version(&self, ctx: &Context, package: &str) -> Result<String, ToolError> {
        match self.ecosystem {
            Ecosystem::Npm => {
                let token = ctx.cancel.child_with_timeout(self.settings.registry_timeout());
                let result = self.executor.run(&token, "npm", &["view", package, "version"])?;
                Ok(result.stdout.trim().to_string())
            }
            Ecosystem::Uv => self
                .index
                .latest_version(package, self.settings.registry_timeout()),
        }
    }

    fn item(
        &self,
        ctx: &Context,
        package: &str,
        installed: Option<&HashMap<String, String>>,
    ) -> ToolItem {
        let mut item = ToolItem::new(package, ItemStatus::Unknown);
        item.description = self.ecosystem.label().to_string();
        item.package_type = Some(self.program().to_string());
        let Some(installed) = installed else {
            return item;
        };
        let Some(version) = installed.get(package) else {
            item.status = ItemStatus::NotInstalled;
            return item;
        };
        item.installed = true;
        item.status = ItemStatus::Installed;
        item.version = Some(version.clone());
        item.description = format!("{} (v{version})", self.ecosystem.label());

        if self.config.auto_update {
            match self.latest_version(ctx, package) {
                Ok(latest) if is_newer(version, &latest) => {
                    item.status = ItemStatus::UpdateAvailable;
                    item.description =
                        format!("{} (v{version} -> v{latest})", self.ecosystem.label());
                    item.metadata.insert("latest_version".to_string(), latest.into());
                }
                Ok(_) => {}
                Err(e) => ctx.log.debug(&format!("{package}: update check failed: {e}")),
            }
        }
        item
    }

    fn run_packages(&self, ctx: &Context, op: Operation, items: &[String]) -> OperationResult {
        let mut result = OperationResult::new(self.program(), op);
        let packages: &[String] = if items.is_empty() {
            &self.config.global_packages
        } else {
            items
        };
        for package in packages {
            if let Err(e) = ctx.cancel.check() {
                result.item_failed(package, e);
                break;
            }
            if let Err(e) = self.check_name(package) {
                ctx.log.error(&e.to_string());
                result.item_failed(package, e);
                continue;
            }
            let args = self.ecosystem.verb_args(op, package);
            if self.settings.dry_run {
                ctx.log
                    .dry_run(&format!("would run: {}", command_line(self.program(), &args)));
                continue;
            }
            ctx.log.info(&format!("{} {package}", op.as_str()));
            let token = self.settings.command_token(ctx, self.program());
            match self.executor.run(&token, self.program(), &args) {
                Ok(_) => result.mark_modified(package),
                Err(e) => {
                    let e = ToolError::from(e);
                    ctx.log.error(&format!("{package}: {e}"));
                    result.item_failed(package, e);
                }
            }
        }
        let count = result.modified.len();
        result.finish(format!("{count} package(s) {}", past_tense(op)))
    }
}

const fn past_tense(op: Operation) -> &'static str {
    match op {
        Operation::Update => "updated",
        Operation::Remove => "removed",
        _ => "installed",
    }
}

impl Configurable for GlobalPackageTool {
    type Config = GlobalToolConfig;

    fn configure(&mut self, config: GlobalToolConfig) -> Result<(), ToolError> {
        let pattern = Regex::new(&config.name_pattern).map_err(|e| {
            ToolError::InvalidConfig(format!(
                "{} package name pattern does not compile: {e}",
                self.program()
            ))
        })?;
        if config.packages.global_packages.iter().any(|p| p.trim().is_empty()) {
            return Err(ToolError::InvalidConfig(format!(
                "{} package name must not be empty",
                self.program()
            )));
        }
        self.pattern = Some(pattern);
        self.config = config.packages;
        Ok(())
    }
}

impl Tool for GlobalPackageTool {
    fn name(&self) -> &str {
        self.program()
    }

    fn is_enabled(&self) -> bool {
        self.config.enabled
    }

    fn priority(&self) -> i32 {
        self.settings
            .priority_of(self.program(), self.ecosystem.default_priority())
    }

    fn validate(&self) -> Result<(), ToolError> {
        if !self.executor.which(self.program()) {
            return Err(ToolError::DependencyMissing(self.program().to_string()));
        }
        let runtimes = self.ecosystem.runtimes();
        if !runtimes.iter().any(|r| self.executor.which(r)) {
            return Err(ToolError::DependencyMissing(runtimes.join(" or ")));
        }
        for package in &self.config.global_packages {
            self.check_name(package)?;
        }
        Ok(())
    }

    fn status(&self, ctx: &Context) -> Result<ToolStatus, ToolError> {
        let mut status = ToolStatus::new(self.program(), self.is_enabled());
        let installed = match self.installed(ctx) {
            Ok(installed) => Some(installed),
            Err(ToolError::Cancelled) => return Err(ToolError::Cancelled),
            Err(e) => {
                status.fail(&e);
                None
            }
        };
        for package in &self.config.global_packages {
            ctx.cancel.check()?;
            status.items.push(self.item(ctx, package, installed.as_ref()));
        }
        Ok(status)
    }

    fn install(&self, ctx: &Context, items: &[String]) -> OperationResult {
        self.run_packages(ctx, Operation::Install, items)
    }

    fn update(&self, ctx: &Context, items: &[String]) -> OperationResult {
        self.run_packages(ctx, Operation::Update, items)
    }

    fn remove(&self, ctx: &Context, items: &[String]) -> OperationResult {
        if items.is_empty() {
            return OperationResult::failure(
                self.program(),
                Operation::Remove,
                ToolError::ValidationFailed("remove requires at least one package".to_string()),
            );
        }
        self.run_packages(ctx, Operation::Remove, items)
    }

    fn list<'a>(
        &'a self,
        ctx: &'a Context,
    ) -> Result<Box<dyn Iterator<Item = ToolItem> + 'a>, ToolError> {
        let installed = match self.installed(ctx) {
            Ok(installed) => Some(installed),
            Err(ToolError::Cancelled) => return Err(ToolError::Cancelled),
            Err(e) => {
                ctx.log.warn(&format!("{}: {e}", self.program()));
                None
            }
        };
        Ok(Box::new(
            self.config
                .global_packages
                .iter()
                .map(move |p| self.item(ctx, p, installed.as_ref())),
        ))
    }

    fn sync(&self, ctx: &Context) -> OperationResult {
        if !self.config.auto_install {
            let mut result = OperationResult::new(self.program(), Operation::Sync)
                .with_message("auto_install disabled");
            result.detail("message", "auto_install disabled");
            return result;
        }
        let mut result = self.install(ctx, &[]);
        result.operation = Operation::Sync;
        result
    }
}
