//! Commands: `config validate` and `config show`.
use std::io::Write as _;
use std::sync::Arc;

use anyhow::{Context as _, Result};

use super::CommandSetup;
use crate::cancel::CancellationToken;
use crate::config::Config;
use crate::config::loader::ConfigSource;
use crate::logging::{EntryStatus, Logger};

/// Check the configuration, then every enabled tool's preconditions.
///
/// Every problem is reported before failing.
///
/// # Errors
///
/// Returns an error if the configuration or any tool is invalid.
pub fn validate(
    config: Config,
    source: &ConfigSource,
    log: &Arc<Logger>,
    cancel: CancellationToken,
) -> Result<()> {
    log.stage("Configuration");
    log.info(&format!("source: {source}"));
    let problems = config.problems();
    if !problems.is_empty() {
        for problem in &problems {
            log.error(&problem.to_string());
        }
        anyhow::bail!("{} configuration problem(s)", problems.len());
    }
    log.info("configuration is valid");

    let setup = CommandSetup::init(config, Arc::clone(log), cancel)?;
    validate_tools(&setup);
    super::finish(log)
}

/// Run `validate` on every enabled tool in priority order, recording each.
pub fn validate_tools(setup: &CommandSetup) {
    setup.log.stage("Tools");
    for tool in setup.registry.by_priority() {
        let name = format!("{} validate", tool.name());
        match tool.validate() {
            Ok(()) => {
                setup.log.info(&format!("{}: ok", tool.name()));
                setup.log.record(&name, EntryStatus::Ok, None);
            }
            Err(e) => {
                setup
                    .log
                    .error(&format!("{}: [{}] {e}", tool.name(), e.kind()));
                setup
                    .log
                    .record(&name, EntryStatus::Failed, Some(&e.to_string()));
            }
        }
    }
}

/// Effective configuration rendered as YAML.
///
/// # Errors
///
/// Returns an error if serialisation fails.
pub fn render(config: &Config) -> Result<String> {
    serde_yaml::to_string(config).context("serialising configuration")
}

/// Print the effective configuration to stdout.
///
/// # Errors
///
/// Returns an error if serialisation or writing fails.
pub fn show(config: &Config) -> Result<()> {
    let yaml = render(config)?;
    let mut out = std::io::stdout().lock();
    out.write_all(yaml.as_bytes())
        .context("writing configuration")?;
    out.flush().context("writing configuration")
}

#[cfg(test)]
#[allow(clippy::expect_used, clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn rendered_yaml_round_trips() {
        let config = Config::default();
        let yaml = render(&config).unwrap();
        assert!(yaml.contains("dotfiles_path: ~/dev/dotfiles"));
        let back: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn invalid_config_is_reported_before_tools() {
        let mut config = Config::default();
        config.tools.priorities.insert("stow".to_string(), 0);
        let log = Arc::new(Logger::with_log_file(None));
        let err = validate(config, &ConfigSource::Defaults, &log, CancellationToken::new())
            .unwrap_err();
        assert_eq!(err.to_string(), "1 configuration problem(s)");
        assert!(log.entries().is_empty());
    }
}
