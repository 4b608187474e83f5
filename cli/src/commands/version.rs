//! Command: print version information.
use std::io::Write as _;

/// Version string: `DOTFILES_VERSION` from the build, else the crate version.
#[must_use]
pub fn version() -> &'static str {
    option_env!("DOTFILES_VERSION").unwrap_or(env!("CARGO_PKG_VERSION"))
}

/// Print the dotfiles version to stdout.
///
/// # Errors
///
/// Returns an error if stdout cannot be written.
pub fn run() -> std::io::Result<()> {
    writeln!(std::io::stdout().lock(), "dotfiles {}", version())
}
