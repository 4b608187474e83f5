//! Domain-specific error types for the dotfiles manager.
//!
//! Tools report failures with the closed [`ToolError`] taxonomy. Lower layers
//! have their own typed errors ([`ConfigError`] for loading configuration,
//! [`ExecError`] for child processes) which convert into [`ToolError`] via the
//! standard `?` operator. Command handlers at the CLI boundary convert
//! everything to [`anyhow::Error`].
//!
//! # Error hierarchy
//!
//! ```text
//! ToolError                : closed set, reported with its ErrorKind
//! ├── registry             : InvalidToolName, ToolNotFound, ToolDisabled
//! ├── configuration        : InvalidConfig, MissingConfig   ◄── ConfigError
//! ├── preconditions        : ValidationFailed, DependencyMissing
//! ├── symlink farm         : PackageNotFound, TargetNotFound, ConflictDetected, StowNotFound
//! ├── external commands    : OperationFailed (with stderr)  ◄── ExecError
//! └── contract             : Unsupported, Cancelled
//! ```

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Closed set of failures a tool operation can report.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ToolError {
    /// A tool was registered with an empty name.
    #[error("invalid tool name: {0:?}")]
    InvalidToolName(String),

    /// No tool with the requested name is registered.
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    /// The tool (or one of its items) is disabled in configuration.
    #[error("tool disabled: {0}")]
    ToolDisabled(String),

    /// The configuration value has the wrong shape or content.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required configuration file or section is absent.
    #[error("missing configuration: {0}")]
    MissingConfig(String),

    /// A precondition on inputs or on the filesystem does not hold.
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    /// An external binary the tool needs is not on the search path.
    #[error("dependency missing: {0} not found on PATH")]
    DependencyMissing(String),

    /// A symlink-farm package directory does not exist.
    #[error("package not found: {0}")]
    PackageNotFound(String),

    /// A target path that must exist does not.
    #[error("target not found: {}", .0.display())]
    TargetNotFound(PathBuf),

    /// A foreign file occupies a path the tool wants to own.
    #[error("conflict detected at {}: {reason}", .path.display())]
    ConflictDetected {
        /// Conflicting path.
        path: PathBuf,
        /// Why the conflict could not be resolved.
        reason: String,
    },

    /// The `stow` utility is required by the configured strategy but missing.
    #[error("stow not found on PATH")]
    StowNotFound,

    /// Any wrapped failure, typically from an external command.
    #[error("{context}{}", stderr_suffix(.stderr.as_deref()))]
    OperationFailed {
        /// What was being attempted.
        context: String,
        /// Captured standard error of the failing command, when available.
        stderr: Option<String>,
    },

    /// The tool does not support the requested capability.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// The operation was cancelled before it completed.
    #[error("operation cancelled")]
    Cancelled,
}

fn stderr_suffix(stderr: Option<&str>) -> String {
    match stderr.map(str::trim) {
        Some(s) if !s.is_empty() => format!(": {s}"),
        _ => String::new(),
    }
}

#[allow(clippy::ref_option)]
fn exit_label(code: &Option<i32>) -> String {
    code.map_or_else(|| "signal".to_string(), |c| c.to_string())
}

impl ToolError {
    /// Build an [`OperationFailed`](Self::OperationFailed) without stderr.
    pub fn failed(context: impl Into<String>) -> Self {
        Self::OperationFailed {
            context: context.into(),
            stderr: None,
        }
    }

    /// Wrap an I/O failure while doing `context`.
    pub fn io(context: impl fmt::Display, err: &std::io::Error) -> Self {
        Self::failed(format!("{context}: {err}"))
    }

    /// Closed-set kind of this error, used in user-facing reports.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidToolName(_) => ErrorKind::InvalidToolName,
            Self::ToolNotFound(_) => ErrorKind::ToolNotFound,
            Self::ToolDisabled(_) => ErrorKind::ToolDisabled,
            Self::InvalidConfig(_) => ErrorKind::InvalidConfig,
            Self::MissingConfig(_) => ErrorKind::MissingConfig,
            Self::ValidationFailed(_) => ErrorKind::ValidationFailed,
            Self::DependencyMissing(_) => ErrorKind::DependencyMissing,
            Self::PackageNotFound(_) => ErrorKind::PackageNotFound,
            Self::TargetNotFound(_) => ErrorKind::TargetNotFound,
            Self::ConflictDetected { .. } => ErrorKind::ConflictDetected,
            Self::StowNotFound => ErrorKind::StowNotFound,
            Self::OperationFailed { .. } => ErrorKind::OperationFailed,
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Cancelled => ErrorKind::Cancelled,
        }
    }

    /// Captured stderr, if this error wraps a failed command.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::OperationFailed { stderr, .. } => stderr.as_deref(),
            _ => None,
        }
    }
}

/// Discriminant of [`ToolError`] without payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum ErrorKind {
    InvalidToolName,
    ToolNotFound,
    ToolDisabled,
    InvalidConfig,
    MissingConfig,
    ValidationFailed,
    DependencyMissing,
    PackageNotFound,
    TargetNotFound,
    ConflictDetected,
    StowNotFound,
    OperationFailed,
    Unsupported,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Errors that arise while loading or validating configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The explicitly requested configuration file does not exist.
    #[error("configuration file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// An I/O error occurred while reading a config file.
    #[error("IO error reading config file {}: {source}", .path.display())]
    Io {
        /// Path to the file that could not be read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The document is not valid YAML or does not match the model.
    #[error("invalid YAML in {}: {source}", .path.display())]
    Parse {
        /// Path to the offending file.
        path: PathBuf,
        /// Underlying parser error.
        source: serde_yaml::Error,
    },

    /// `~` or `$VAR` expansion failed.
    #[error("path expansion failed: {0}")]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// The configuration parsed but is semantically invalid.
    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for ToolError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::NotFound(path) => Self::MissingConfig(path.display().to_string()),
            other => Self::InvalidConfig(other.to_string()),
        }
    }
}

/// Errors that arise from running external commands.
#[derive(Error, Debug)]
pub enum ExecError {
    /// The program could not be found on the search path.
    #[error("{program}: command not found")]
    NotFound {
        /// Program that was requested.
        program: String,
    },

    /// The child process could not be spawned or waited on.
    #[error("failed to execute {program}: {source}")]
    Io {
        /// Program that was requested.
        program: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The child exited unsuccessfully.
    #[error("{label} failed (exit {}): {}", exit_label(.code), .stderr.trim())]
    Failed {
        /// Command line summary.
        label: String,
        /// Exit code, `None` when terminated by a signal.
        code: Option<i32>,
        /// Captured standard error.
        stderr: String,
    },

    /// The cancellation token fired while the child was running.
    #[error("{program} was cancelled")]
    Cancelled {
        /// Program that was interrupted.
        program: String,
    },

    /// The deadline attached to the token elapsed.
    #[error("{program} timed out")]
    TimedOut {
        /// Program that was interrupted.
        program: String,
    },
}

impl From<ExecError> for ToolError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::NotFound { program } => Self::DependencyMissing(program),
            ExecError::Cancelled { .. } => Self::Cancelled,
            ExecError::Failed {
                ref label,
                code,
                ref stderr,
            } => Self::OperationFailed {
                context: format!("{label} failed (exit {})", exit_label(&code)),
                stderr: Some(stderr.trim().to_string()).filter(|s| !s.is_empty()),
            },
            other @ (ExecError::Io { .. } | ExecError::TimedOut { .. }) => {
                Self::failed(other.to_string())
            }
        }
    }
}
