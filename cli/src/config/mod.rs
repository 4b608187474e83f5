//! Declarative configuration model.
//!
//! A single YAML document describes the intended state of every tool. It is
//! parsed once at startup ([`loader`]), checked ([`validation`]) and then
//! treated as read-only for the rest of the process.
pub mod duration;
pub mod loader;
pub mod ordered_map;
pub mod validation;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use duration::HumanDuration;
pub use ordered_map::OrderedMap;

/// Default npm package-name shape.
pub const DEFAULT_NPM_PACKAGE_PATTERN: &str =
    r"^(@[a-z0-9-~][a-z0-9-._~]*/)?[a-z0-9-~][a-z0-9-._~]*$";

/// Default Python package-name shape (PEP 508 name with optional extras).
pub const DEFAULT_UV_PACKAGE_PATTERN: &str =
    r"^[A-Za-z0-9]([A-Za-z0-9._-]*[A-Za-z0-9])?(\[[A-Za-z0-9,._-]+\])?$";

/// Log levels accepted in `global.log_level`.
pub const LOG_LEVELS: &[&str] = &["debug", "info", "warn", "error"];

const fn enabled() -> bool {
    true
}

/// Top-level configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Process-wide settings.
    pub global: GlobalConfig,
    /// Terminal UI preferences; carried but unused by the tools.
    pub tui: TuiConfig,
    /// Cross-cutting tool knobs.
    pub tools: ToolsConfig,
    /// Package-name validation patterns.
    pub validation: ValidationConfig,
    /// Symlink-farm tool.
    pub stow: StowConfig,
    /// Directory-sync tool.
    pub rsync: RsyncConfig,
    /// Bundle-file package tool.
    pub homebrew: HomebrewConfig,
    /// npm global packages.
    pub npm: GlobalPackagesConfig,
    /// uv tool packages.
    pub uv: GlobalPackagesConfig,
    /// Script-runner apps, in declaration order.
    pub apps: OrderedMap<AppConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            global: GlobalConfig::default(),
            tui: TuiConfig::default(),
            tools: ToolsConfig::default(),
            validation: ValidationConfig::default(),
            stow: StowConfig::default(),
            rsync: RsyncConfig::default(),
            homebrew: HomebrewConfig::default(),
            npm: GlobalPackagesConfig {
                global_packages: vec!["@anthropic-ai/claude-code".to_string()],
                ..GlobalPackagesConfig::default()
            },
            uv: GlobalPackagesConfig {
                global_packages: vec!["parllama".to_string()],
                ..GlobalPackagesConfig::default()
            },
            apps: [
                (
                    "vscode_extensions",
                    AppConfig::new(true, &["data/scripts/install_vscode_extensions.sh"]),
                ),
                (
                    "macos_settings",
                    AppConfig::new(false, &["data/scripts/mac_settings.sh"]),
                ),
                (
                    "yazi_packages",
                    AppConfig::new(true, &["data/scripts/setup_yazi_packages.sh"]),
                ),
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// `global` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalConfig {
    /// Root of the dotfiles checkout; `~` and `$VAR` are expanded.
    pub dotfiles_path: String,
    /// Console log level.
    pub log_level: String,
    /// Compute and log plans without mutating anything.
    pub dry_run: bool,
    /// Answer yes to confirmations.
    pub auto_confirm: bool,
    /// Verbose console output.
    pub verbose: bool,
    /// Rename conflicting files instead of failing.
    pub backup_enabled: bool,
    /// Suffix appended to a conflicting path when it is backed up.
    pub backup_suffix: String,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            dotfiles_path: "~/dev/dotfiles".to_string(),
            log_level: "info".to_string(),
            dry_run: false,
            auto_confirm: false,
            verbose: false,
            backup_enabled: true,
            backup_suffix: ".backup".to_string(),
        }
    }
}

impl GlobalConfig {
    /// Suffix to use for backups; empty when backups are disabled.
    #[must_use]
    pub fn effective_backup_suffix(&self) -> &str {
        if self.backup_enabled {
            &self.backup_suffix
        } else {
            ""
        }
    }
}

/// `tui` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
#[allow(clippy::struct_excessive_bools)]
pub struct TuiConfig {
    /// Colour scheme name.
    pub color_scheme: String,
    /// Animate transitions.
    pub animations: bool,
    /// Ask before destructive actions.
    pub confirm_destructive: bool,
    /// Show progress widgets.
    pub show_progress: bool,
}

impl Default for TuiConfig {
    fn default() -> Self {
        Self {
            color_scheme: "default".to_string(),
            animations: true,
            confirm_destructive: true,
            show_progress: true,
        }
    }
}

/// `tools` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    /// Priority override per tool name.
    pub priorities: BTreeMap<String, i32>,
    /// Script interpreter per file extension (`.sh` → `bash`).
    pub interpreters: BTreeMap<String, String>,
    /// Directories (and their descendants) no tool writes into.
    pub system_directories: Vec<String>,
    /// Named timeouts: `command`, `<tool>_command`, `registry_query`.
    pub timeouts: BTreeMap<String, HumanDuration>,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let priorities = [
            ("stow", 1),
            ("rsync", 20),
            ("homebrew", 30),
            ("apps", 40),
            ("npm", 50),
            ("uv", 60),
        ];
        let interpreters = [
            (".sh", "bash"),
            (".bash", "bash"),
            (".py", "python3"),
            (".js", "node"),
        ];
        let system_directories = [
            "/System",
            "/Library",
            "/usr",
            "/bin",
            "/sbin",
            "/Applications",
            "~/Library",
            "~/Applications",
        ];
        let timeouts = [
            ("command", HumanDuration::from_secs(600)),
            ("rsync_command", HumanDuration::from_secs(1800)),
            ("registry_query", HumanDuration::from_secs(30)),
        ];
        Self {
            priorities: priorities
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
            interpreters: interpreters
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            system_directories: system_directories.into_iter().map(String::from).collect(),
            timeouts: timeouts
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        }
    }
}

impl ToolsConfig {
    /// Priority for `tool`, falling back to `default`.
    #[must_use]
    pub fn priority_of(&self, tool: &str, default: i32) -> i32 {
        self.priorities.get(tool).copied().unwrap_or(default)
    }

    /// Timeout for commands run by `tool`: `<tool>_command`, else `command`.
    #[must_use]
    pub fn command_timeout(&self, tool: &str) -> Option<std::time::Duration> {
        self.timeouts
            .get(&format!("{tool}_command"))
            .or_else(|| self.timeouts.get("command"))
            .map(|d| d.0)
    }
}

/// `validation` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Accepted npm package names.
    pub npm_package_pattern: String,
    /// Accepted uv package names.
    pub uv_package_pattern: String,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            npm_package_pattern: DEFAULT_NPM_PACKAGE_PATTERN.to_string(),
            uv_package_pattern: DEFAULT_UV_PACKAGE_PATTERN.to_string(),
        }
    }
}

/// How the symlink farm creates links.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkStrategy {
    /// Walk the package tree and create links in-process.
    #[default]
    Native,
    /// Delegate link creation to GNU stow.
    Stow,
}

/// One entry of `stow.packages` or `rsync.sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetEntry {
    /// Directory name under the tool's root in the dotfiles checkout.
    pub name: String,
    /// Target directory; `~` and `$VAR` are expanded at probe time.
    pub target: String,
    /// Whether the entry is active.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Lower runs first within the tool.
    #[serde(default)]
    pub priority: i32,
}

impl TargetEntry {
    /// Enabled entry with the given name, target and priority.
    #[must_use]
    pub fn new(name: &str, target: &str, priority: i32) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            enabled: true,
            priority,
        }
    }
}

/// `stow` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StowConfig {
    /// Whether the tool is active.
    pub enabled: bool,
    /// Directory under the dotfiles root holding the packages.
    pub packages_root: String,
    /// Link creation mechanism.
    pub strategy: LinkStrategy,
    /// Packages in declaration order.
    pub packages: Vec<TargetEntry>,
}

impl Default for StowConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            packages_root: "packages".to_string(),
            strategy: LinkStrategy::Native,
            packages: vec![
                TargetEntry::new("config", "~/.config", 1),
                TargetEntry::new("shell", "~", 2),
                TargetEntry::new("git", "~", 3),
            ],
        }
    }
}

/// `rsync` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RsyncConfig {
    /// Whether the tool is active.
    pub enabled: bool,
    /// Sources in declaration order.
    pub sources: Vec<TargetEntry>,
}

impl Default for RsyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sources: vec![TargetEntry::new("claude", "~", 1)],
        }
    }
}

/// One bundle-file category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryConfig {
    /// Whether the category is active.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Bundle file, relative to the dotfiles root unless absolute.
    pub brewfile: String,
}

/// `homebrew` section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HomebrewConfig {
    /// Whether the tool is active.
    pub enabled: bool,
    /// Run `brew update` before upgrading.
    pub auto_update: bool,
    /// Categories in declaration order.
    pub categories: OrderedMap<CategoryConfig>,
}

impl Default for HomebrewConfig {
    fn default() -> Self {
        let category = |enabled: bool, brewfile: &str| CategoryConfig {
            enabled,
            brewfile: brewfile.to_string(),
        };
        Self {
            enabled: true,
            auto_update: true,
            categories: [
                ("core", category(true, "homebrew/Brewfile")),
                ("apps", category(false, "homebrew/Brewfile.apps")),
                ("dev", category(false, "homebrew/Brewfile.dev")),
                ("mas", category(false, "homebrew/Brewfile.mas")),
            ]
            .into_iter()
            .collect(),
        }
    }
}

/// `npm` / `uv` sections.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GlobalPackagesConfig {
    /// Whether the tool is active.
    pub enabled: bool,
    /// `sync` installs the declared packages.
    pub auto_install: bool,
    /// `status` checks the registry for newer versions.
    pub auto_update: bool,
    /// Packages in declaration order.
    pub global_packages: Vec<String>,
}

impl Default for GlobalPackagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            auto_install: true,
            auto_update: true,
            global_packages: Vec::new(),
        }
    }
}

/// One script-runner app.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Whether the app is active.
    #[serde(default = "enabled")]
    pub enabled: bool,
    /// Scripts run in order; relative paths resolve against the dotfiles root.
    #[serde(default)]
    pub scripts: Vec<String>,
}

impl AppConfig {
    /// App with the given scripts.
    #[must_use]
    pub fn new(enabled: bool, scripts: &[&str]) -> Self {
        Self {
            enabled,
            scripts: scripts.iter().map(ToString::to_string).collect(),
        }
    }
}
