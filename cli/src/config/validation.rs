//! Semantic checks on a parsed [`Config`].
use std::collections::HashSet;

use regex::Regex;

use super::{Config, LOG_LEVELS};
use crate::error::ConfigError;

/// Inclusive range accepted for `tools.priorities` values.
pub const PRIORITY_RANGE: std::ops::RangeInclusive<i32> = 1..=100;

/// A problem found in one configuration section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigProblem {
    /// Section name (`global`, `stow`, ...).
    pub section: &'static str,
    /// Offending key or item.
    pub item: String,
    /// Human-readable message.
    pub message: String,
}

impl ConfigProblem {
    fn new(section: &'static str, item: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            section,
            item: item.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigProblem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} [{}]: {}", self.section, self.item, self.message)
    }
}

/// Validator for one configuration section.
trait SectionValidator {
    fn check(&self, config: &Config) -> Vec<ConfigProblem>;
}

struct GlobalValidator;
struct ToolsValidator;
struct PatternValidator;
struct StowValidator;
struct RsyncValidator;
struct HomebrewValidator;
struct AppsValidator;

impl SectionValidator for GlobalValidator {
    fn check(&self, config: &Config) -> Vec<ConfigProblem> {
        let mut problems = Vec::new();
        let global = &config.global;
        if global.dotfiles_path.trim().is_empty() {
            problems.push(ConfigProblem::new(
                "global",
                "dotfiles_path",
                "must not be empty",
            ));
        }
        if !LOG_LEVELS.contains(&global.log_level.as_str()) {
            problems.push(ConfigProblem::new(
                "global",
                "log_level",
                format!(
                    "{:?} is not one of {}",
                    global.log_level,
                    LOG_LEVELS.join(", ")
                ),
            ));
        }
        if global.backup_enabled && global.backup_suffix.is_empty() {
            problems.push(ConfigProblem::new(
                "global",
                "backup_suffix",
                "must not be empty when backups are enabled",
            ));
        }
        problems
    }
}

impl SectionValidator for ToolsValidator {
    fn check(&self, config: &Config) -> Vec<ConfigProblem> {
        let tools = &config.tools;
        let priorities = tools
            .priorities
            .iter()
            .filter(|(_, p)| !PRIORITY_RANGE.contains(*p))
            .map(|(name, p)| {
                ConfigProblem::new(
                    "tools",
                    format!("priorities.{name}"),
                    format!(
                        "{p} is outside {}..={}",
                        PRIORITY_RANGE.start(),
                        PRIORITY_RANGE.end()
                    ),
                )
            });
        let interpreters = tools
            .interpreters
            .iter()
            .filter(|(ext, _)| !ext.starts_with('.'))
            .map(|(ext, _)| {
                ConfigProblem::new(
                    "tools",
                    format!("interpreters.{ext}"),
                    "extension must start with '.'",
                )
            });
        let empty_interpreters = tools
            .interpreters
            .iter()
            .filter(|(_, cmd)| cmd.trim().is_empty())
            .map(|(ext, _)| {
                ConfigProblem::new(
                    "tools",
                    format!("interpreters.{ext}"),
                    "interpreter must not be empty",
                )
            });
        let system_dirs = tools
            .system_directories
            .iter()
            .filter(|d| d.trim().is_empty())
            .map(|_| ConfigProblem::new("tools", "system_directories", "empty entry"));
        priorities
            .chain(interpreters)
            .chain(empty_interpreters)
            .chain(system_dirs)
            .collect()
    }
}

impl SectionValidator for PatternValidator {
    fn check(&self, config: &Config) -> Vec<ConfigProblem> {
        [
            ("npm_package_pattern", &config.validation.npm_package_pattern),
            ("uv_package_pattern", &config.validation.uv_package_pattern),
        ]
        .into_iter()
        .filter_map(|(key, pattern)| {
            Regex::new(pattern)
                .err()
                .map(|e| ConfigProblem::new("validation", key, format!("invalid regex: {e}")))
        })
        .collect()
    }
}

impl SectionValidator for StowValidator {
    fn check(&self, config: &Config) -> Vec<ConfigProblem> {
        let mut problems = Vec::new();
        if config.stow.packages_root.trim().is_empty() {
            problems.push(ConfigProblem::new(
                "stow",
                "packages_root",
                "must not be empty",
            ));
        }
        let mut seen = HashSet::new();
        for (index, pkg) in config.stow.packages.iter().enumerate() {
            if pkg.name.trim().is_empty() {
                problems.push(ConfigProblem::new(
                    "stow",
                    format!("packages[{index}]"),
                    "package name must not be empty",
                ));
            } else if !seen.insert(pkg.name.as_str()) {
                problems.push(ConfigProblem::new(
                    "stow",
                    &pkg.name,
                    "package declared more than once",
                ));
            }
            if pkg.target.trim().is_empty() {
                problems.push(ConfigProblem::new(
                    "stow",
                    format!("packages[{index}]"),
                    "package target must not be empty",
                ));
            }
        }
        problems
    }
}

impl SectionValidator for RsyncValidator {
    fn check(&self, config: &Config) -> Vec<ConfigProblem> {
        config
            .rsync
            .sources
            .iter()
            .enumerate()
            .flat_map(|(index, src)| {
                let mut problems = Vec::new();
                if src.name.trim().is_empty() {
                    problems.push(ConfigProblem::new(
                        "rsync",
                        format!("sources[{index}]"),
                        "source name must not be empty",
                    ));
                }
                if src.target.trim().is_empty() {
                    problems.push(ConfigProblem::new(
                        "rsync",
                        format!("sources[{index}]"),
                        "source target must not be empty",
                    ));
                }
                problems
            })
            .collect()
    }
}

impl SectionValidator for HomebrewValidator {
    fn check(&self, config: &Config) -> Vec<ConfigProblem> {
        config
            .homebrew
            .categories
            .iter()
            .filter(|(_, c)| c.enabled && c.brewfile.trim().is_empty())
            .map(|(name, _)| {
                ConfigProblem::new("homebrew", name, "enabled category needs a brewfile")
            })
            .collect()
    }
}

impl SectionValidator for AppsValidator {
    fn check(&self, config: &Config) -> Vec<ConfigProblem> {
        config
            .apps
            .iter()
            .filter(|(_, app)| app.scripts.iter().any(|s| s.trim().is_empty()))
            .map(|(name, _)| ConfigProblem::new("apps", name, "script path must not be empty"))
            .collect()
    }
}

const VALIDATORS: &[&dyn SectionValidator] = &[
    &GlobalValidator,
    &ToolsValidator,
    &PatternValidator,
    &StowValidator,
    &RsyncValidator,
    &HomebrewValidator,
    &AppsValidator,
];

impl Config {
    /// Every problem in the configuration, in section order.
    #[must_use]
    pub fn problems(&self) -> Vec<ConfigProblem> {
        VALIDATORS.iter().flat_map(|v| v.check(self)).collect()
    }

    /// Fail-fast validation: the first problem found, if any.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.problems()
            .into_iter()
            .next()
            .map_or(Ok(()), |p| Err(ConfigError::Invalid(p.to_string())))
    }
}
