//! Path expansion and system-directory checks.
use std::path::{Component, Path, PathBuf};

use crate::error::ConfigError;

/// Expand `~` (against `home`) and `$VAR` / `${VAR}` references in `raw`.
///
/// # Errors
///
/// Returns [`ConfigError::ShellExpansion`] if a referenced variable is unset.
pub fn expand(raw: &str, home: &Path) -> Result<PathBuf, ConfigError> {
    let home = home.to_string_lossy();
    let expanded = shellexpand::full_with_context(
        raw,
        || Some(home.as_ref()),
        |var| std::env::var(var).map(Some),
    )?;
    Ok(normalize(Path::new(expanded.as_ref())))
}

/// Resolve `raw` against `base` when relative, after expansion.
///
/// # Errors
///
/// Returns [`ConfigError::ShellExpansion`] if a referenced variable is unset.
pub fn resolve(raw: &str, base: &Path, home: &Path) -> Result<PathBuf, ConfigError> {
    let path = expand(raw, home)?;
    Ok(if path.is_absolute() {
        path
    } else {
        normalize(&base.join(path))
    })
}

/// Lexically normalise a path: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem.
#[must_use]
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Return the system directory that contains `target`, if any.
///
/// Both the lexical form and, when the path exists, the canonical form of
/// `target` are checked so that symlinked aliases of a system directory are
/// also refused.
#[must_use]
pub fn system_dir_containing<'a>(target: &Path, system_dirs: &'a [PathBuf]) -> Option<&'a Path> {
    let lexical = normalize(target);
    let canonical = dunce::canonicalize(target).ok();
    system_dirs
        .iter()
        .find(|dir| {
            let dir_canonical = dunce::canonicalize(dir).ok();
            let candidates = [Some(dir.as_path()), dir_canonical.as_deref()];
            candidates.into_iter().flatten().any(|d| {
                lexical.starts_with(d) || canonical.as_deref().is_some_and(|c| c.starts_with(d))
            })
        })
        .map(PathBuf::as_path)
}

/// Display `path` with the home prefix replaced by `~`.
#[must_use]
pub fn tilde(path: &Path, home: &Path) -> String {
    path.strip_prefix(home).map_or_else(
        |_| path.display().to_string(),
        |rest| {
            if rest.as_os_str().is_empty() {
                "~".to_string()
            } else {
                format!("~/{}", rest.display())
            }
        },
    )
}
