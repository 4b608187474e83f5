//! Filesystem primitives shared by the filesystem tools.
use std::io;
use std::path::{Path, PathBuf};

use crate::paths::normalize;

/// `true` if anything (including a dangling symlink) exists at `path`.
pub fn exists_no_follow(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

/// `true` if `path` is a symlink.
pub fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata().is_ok_and(|m| m.file_type().is_symlink())
}

/// `true` if `path` is a real directory (not a symlink to one).
pub fn is_real_dir(path: &Path) -> bool {
    path.symlink_metadata().is_ok_and(|m| m.is_dir())
}

/// Compare two paths for equality, handling UNC prefix normalization on Windows.
fn paths_equal(a: &Path, b: &Path) -> bool {
    let strip = |p: &Path| -> PathBuf {
        #[cfg(windows)]
        {
            let s = p.to_string_lossy();
            if let Some(stripped) = s.strip_prefix(r"\\?\") {
                return normalize(Path::new(stripped));
            }
        }
        normalize(p)
    };
    strip(a) == strip(b)
}

/// `true` if `link` is a symlink resolving to `expected`. Relative link
/// contents are resolved against the link's parent directory.
pub fn points_to(link: &Path, expected: &Path) -> bool {
    let Ok(dest) = std::fs::read_link(link) else {
        return false;
    };
    let dest = if dest.is_absolute() {
        dest
    } else {
        link.parent().unwrap_or_else(|| Path::new(".")).join(dest)
    };
    paths_equal(&dest, expected)
}

/// Create a symlink at `link` pointing to `target`.
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
    }

    #[cfg(windows)]
    {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(target, link)
        } else {
            std::os::windows::fs::symlink_file(target, link)
        }
    }
}

/// Remove a symlink, handling platform differences.
///
/// On Windows, directory symlinks must be removed with `remove_dir` (not
/// `remove_file`); the raw `FILE_ATTRIBUTE_DIRECTORY` flag tells them apart.
pub fn remove_symlink(path: &Path) -> io::Result<()> {
    let meta = std::fs::symlink_metadata(path)?;
    if is_dir_like(&meta) {
        std::fs::remove_dir(path)
    } else {
        std::fs::remove_file(path)
    }
}

fn is_dir_like(meta: &std::fs::Metadata) -> bool {
    #[cfg(windows)]
    {
        use std::os::windows::fs::MetadataExt;
        meta.file_attributes() & 0x10 != 0
    }
    #[cfg(not(windows))]
    {
        meta.is_dir()
    }
}

/// `true` if `path` carries an executable permission bit. Always `true` on
/// platforms without mode bits.
pub fn is_executable(path: &Path) -> bool {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(path).is_ok_and(|m| m.permissions().mode() & 0o111 != 0)
    }
    #[cfg(not(unix))]
    {
        path.is_file()
    }
}

/// Remove `dir` and its ancestors while they are empty, stopping before
/// `stop`. Returns the directories removed, deepest first.
pub fn prune_empty_dirs(dir: &Path, stop: &Path) -> Vec<PathBuf> {
    let mut removed = Vec::new();
    let mut current = dir.to_path_buf();
    while current.starts_with(stop) && current != stop {
        let empty = std::fs::read_dir(&current).is_ok_and(|mut entries| entries.next().is_none());
        if !empty || std::fs::remove_dir(&current).is_err() {
            break;
        }
        removed.push(current.clone());
        if !current.pop() {
            break;
        }
    }
    removed
}

/// `<path><suffix>`, e.g. `~/.gitconfig.backup`.
pub fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_os_string();
    os.push(suffix);
    PathBuf::from(os)
}
