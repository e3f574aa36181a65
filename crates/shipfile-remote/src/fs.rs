//! Filesystem capability
//!
//! The cache core only needs existence checks and recursive removal, so those
//! are behind a trait. Inject [`OsFileSystem`] for real use or
//! [`MemoryFileSystem`] for tests.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;

/// Filesystem operations consumed by the cache core
pub trait FileSystem: Send + Sync {
    /// Whether `path` exists and is a regular file
    fn file_exists_at(&self, path: &Path) -> bool;

    /// Whether `path` exists and is a directory
    fn dir_exists_at(&self, path: &Path) -> bool;

    /// Remove `path` and everything beneath it; succeeds if it does not exist
    fn remove_all(&self, path: &Path) -> io::Result<()>;
}

/// The real filesystem
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn file_exists_at(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dir_exists_at(&self, path: &Path) -> bool {
        path.is_dir()
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        // a failed fetch may leave a directory, a plain file, or nothing
        if path.is_dir() {
            std::fs::remove_dir_all(path)
        } else if path.symlink_metadata().is_ok() {
            std::fs::remove_file(path)
        } else {
            Ok(())
        }
    }
}

/// In-memory filesystem for tests
///
/// Tracks file and directory paths only; adding a file implicitly creates its
/// ancestor directories. Clones share the same underlying state.
#[derive(Debug, Default, Clone)]
pub struct MemoryFileSystem {
    inner: Arc<Mutex<MemoryFsState>>,
}

#[derive(Debug, Default)]
struct MemoryFsState {
    files: BTreeSet<PathBuf>,
    dirs: BTreeSet<PathBuf>,
}

impl MemoryFileSystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a file, creating all ancestor directories
    pub fn add_file(&self, path: &Path) {
        let mut state = self.inner.lock();
        state.files.insert(path.to_path_buf());
        let mut ancestors = path.ancestors();
        ancestors.next();
        for dir in ancestors {
            if dir.as_os_str().is_empty() {
                break;
            }
            state.dirs.insert(dir.to_path_buf());
        }
    }

    /// Record a directory, creating all ancestors
    pub fn add_dir(&self, path: &Path) {
        let mut state = self.inner.lock();
        for dir in path.ancestors() {
            if dir.as_os_str().is_empty() {
                break;
            }
            state.dirs.insert(dir.to_path_buf());
        }
    }
}

impl FileSystem for MemoryFileSystem {
    fn file_exists_at(&self, path: &Path) -> bool {
        self.inner.lock().files.contains(path)
    }

    fn dir_exists_at(&self, path: &Path) -> bool {
        self.inner.lock().dirs.contains(path)
    }

    fn remove_all(&self, path: &Path) -> io::Result<()> {
        let mut state = self.inner.lock();
        state.files.retain(|p| !p.starts_with(path));
        state.dirs.retain(|p| !p.starts_with(path));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_file_creates_ancestors() {
        let fs = MemoryFileSystem::new();
        fs.add_file(Path::new("/cache/key/origin/charts/app.yaml"));

        assert!(fs.file_exists_at(Path::new("/cache/key/origin/charts/app.yaml")));
        assert!(fs.dir_exists_at(Path::new("/cache/key/origin/charts")));
        assert!(fs.dir_exists_at(Path::new("/cache/key/origin")));
        assert!(fs.dir_exists_at(Path::new("/cache")));
        assert!(!fs.file_exists_at(Path::new("/cache/key/origin")));
    }

    #[test]
    fn test_remove_all_is_recursive() {
        let fs = MemoryFileSystem::new();
        fs.add_file(Path::new("/cache/key/origin/a.yaml"));
        fs.add_file(Path::new("/cache/key/origin/sub/b.yaml"));
        fs.add_file(Path::new("/cache/other/origin/c.yaml"));

        fs.remove_all(Path::new("/cache/key/origin")).unwrap();

        assert!(!fs.file_exists_at(Path::new("/cache/key/origin/a.yaml")));
        assert!(!fs.dir_exists_at(Path::new("/cache/key/origin")));
        assert!(fs.dir_exists_at(Path::new("/cache/key")));
        assert!(fs.file_exists_at(Path::new("/cache/other/origin/c.yaml")));
    }

    #[test]
    fn test_remove_all_missing_path_is_ok() {
        let fs = MemoryFileSystem::new();
        assert!(fs.remove_all(Path::new("/nope")).is_ok());
    }

    #[test]
    fn test_clones_share_state() {
        let fs = MemoryFileSystem::new();
        let other = fs.clone();
        other.add_file(Path::new("/cache/x"));

        assert!(fs.file_exists_at(Path::new("/cache/x")));
    }
}
