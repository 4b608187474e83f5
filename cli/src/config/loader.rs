//! Locating and parsing the YAML configuration file.
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use super::Config;
use crate::error::ConfigError;

/// File name under `<user-config-root>/dotfiles/`.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// Loaded from this file.
    File(PathBuf),
    /// No file found; built-in defaults.
    Defaults,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File(path) => write!(f, "{}", path.display()),
            Self::Defaults => f.write_str("built-in defaults"),
        }
    }
}

/// Parse a YAML file into `T`.
///
/// An empty file yields `T::default()`.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_yaml<T: DeserializeOwned + Default>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Default configuration path: `$XDG_CONFIG_HOME/dotfiles/config.yaml`,
/// else `~/.config/dotfiles/config.yaml` on every platform.
#[must_use]
pub fn default_config_path() -> Option<PathBuf> {
    std::env::var_os("XDG_CONFIG_HOME")
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .map(|root| root.join("dotfiles").join(CONFIG_FILE_NAME))
}

/// Load the configuration following the search order: explicit path (must
/// exist), then the default location, then built-in defaults.
///
/// # Errors
///
/// Returns [`ConfigError::NotFound`] if `explicit` does not exist, or a
/// read/parse error for the file that was found.
pub fn load(explicit: Option<&Path>) -> Result<(Config, ConfigSource), ConfigError> {
    load_from(explicit, default_config_path().as_deref())
}

/// [`load`] with the default location supplied by the caller.
///
/// # Errors
///
/// Same as [`load`].
pub fn load_from(
    explicit: Option<&Path>,
    default_path: Option<&Path>,
) -> Result<(Config, ConfigSource), ConfigError> {
    if let Some(path) = explicit {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        return Ok((load_yaml(path)?, ConfigSource::File(path.to_path_buf())));
    }
    match default_path {
        Some(path) if path.is_file() => {
            Ok((load_yaml(path)?, ConfigSource::File(path.to_path_buf())))
        }
        _ => Ok((Config::default(), ConfigSource::Defaults)),
    }
}
