//! File-system collaborator boundary.
//!
//! The document layer never touches `std::fs` directly; everything goes
//! through [`FileHost`] so tests can substitute an in-memory file system and
//! the compiler's dependency reads stay observable.

use std::path::{Component, Path, PathBuf};

/// Access to the backing file system.
///
/// `read_file` returning `None` means "document not found": an unreadable
/// file is an ordinary outcome here, not an error. Callers create no state
/// and fire no events for it.
pub trait FileHost: Send + Sync {
    /// Resolve a possibly-relative path against the process working
    /// directory (or the host's notion of one).
    fn resolve(&self, path: &Path) -> PathBuf;

    /// Reduce a resolved path to its canonical spelling, so that distinct
    /// spellings of the same file map to one registry key.
    fn normalize(&self, path: &Path) -> PathBuf;

    /// Read the full contents of a file, or `None` if it cannot be read.
    fn read_file(&self, path: &Path) -> Option<String>;
}

/// Lexical path cleanup: drops `.` components and folds `..` into the
/// preceding component. Purely textual, no symlink resolution.
pub(crate) fn normalize_lexical(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// The real file system.
pub struct OsFileHost;

impl FileHost for OsFileHost {
    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(path))
                .unwrap_or_else(|_| path.to_path_buf())
        }
    }

    fn normalize(&self, path: &Path) -> PathBuf {
        normalize_lexical(path)
    }

    fn read_file(&self, path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }
}
