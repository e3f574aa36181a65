//! Remote reference resolution
//!
//! [`Remote`] resolves a composite source reference into a path on local
//! disk, fetching over the network exactly once per cache key and reusing the
//! fetched copy afterwards. The origin marker on disk is the only cache-hit
//! evidence; entries are write-once and removed wholesale when a fetch fails.

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::debug;

use crate::cache::{self, cache_key, probe, CacheState, ORIGIN_MARKER};
use crate::fs::{FileSystem, OsFileSystem};
use crate::getter::{Getter, GetterError, RouterGetter};
use crate::source::{self, ParseError};

/// Errors surfaced while resolving a remote reference
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The reference did not parse; the `InvalidUrl` case is recoverable via
    /// [`Remote::locate`]
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// A plain file occupies the expected cache entry directory. Never
    /// resolved automatically: deleting unknown user data is unacceptable.
    #[error("{path} is not a directory. please remove it so that shipfile can use it for dependency caching")]
    CacheConflict { path: PathBuf },

    /// The fetch backend failed and the partial entry was cleaned up
    #[error(transparent)]
    Fetch(#[from] GetterError),

    /// The fetch backend failed and so did the cleanup of the partial entry
    #[error("{fetch}; cleanup of partial fetch at {path} also failed: {cleanup}")]
    FetchCleanup {
        fetch: GetterError,
        path: PathBuf,
        cleanup: io::Error,
    },

    /// Remote fetching was not enabled at construction
    #[error("remote sources are disabled by configuration")]
    RemoteDisabled,
}

/// Resolver for remote source references backed by an on-disk cache
pub struct Remote {
    /// Cache home directory; all entries live beneath it
    home: PathBuf,
    getter: Arc<dyn Getter>,
    fs: Arc<dyn FileSystem>,
    /// Per-entry locks serializing probe-then-fetch within this process.
    /// Keyed by the full entry directory so equal cache keys under different
    /// cache subdirs do not contend. Entries are retained for the process
    /// lifetime; the set of distinct references per run is small.
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl std::fmt::Debug for Remote {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Remote")
            .field("home", &self.home)
            .finish_non_exhaustive()
    }
}

impl Remote {
    /// Create a resolver with the default backends
    ///
    /// `allow_remote` is the deployment-time kill switch: when false the
    /// component cannot be constructed at all, so no call path can fetch.
    /// `home` falls back to [`cache::cache_home`] when absent.
    pub fn new(home: Option<PathBuf>, allow_remote: bool) -> Result<Self, RemoteError> {
        if !allow_remote {
            return Err(RemoteError::RemoteDisabled);
        }

        Ok(Self::with_parts(
            home.unwrap_or_else(cache::cache_home),
            Arc::new(RouterGetter::with_defaults()),
            Arc::new(OsFileSystem),
        ))
    }

    /// Create a resolver with injected getter and filesystem
    pub fn with_parts(home: PathBuf, getter: Arc<dyn Getter>, fs: Arc<dyn FileSystem>) -> Self {
        Self {
            home,
            getter,
            fs,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn home(&self) -> &Path {
        &self.home
    }

    /// Resolve a reference that may be a local path or a remote source
    ///
    /// A reference that already exists on local disk is returned verbatim and
    /// remote resolution is bypassed entirely. A reference that does not parse
    /// as a remote URL (no scheme) is assumed to be a local path the caller
    /// will validate itself and is also returned verbatim. Everything else
    /// goes through [`Remote::fetch`].
    pub fn locate(
        &self,
        reference: &str,
        cache_subdir: Option<&str>,
    ) -> Result<PathBuf, RemoteError> {
        let as_path = Path::new(reference);
        if self.fs.file_exists_at(as_path) || self.fs.dir_exists_at(as_path) {
            debug!(reference, "reference exists locally, skipping fetch");
            return Ok(PathBuf::from(reference));
        }

        match self.fetch(reference, cache_subdir) {
            Ok(resolved) => Ok(resolved),
            Err(RemoteError::Parse(ParseError::InvalidUrl { .. })) => {
                debug!(reference, "not a remote reference, treating as local path");
                Ok(PathBuf::from(reference))
            }
            Err(e) => Err(e),
        }
    }

    /// Fetch a remote reference into the cache and return the resolved path
    ///
    /// `cache_subdir` partitions the cache home into logical namespaces
    /// sharing one physical root; it does not affect key derivation. Returns
    /// the origin marker directory, or the sub-file beneath it when the
    /// reference carries an `@<file>` selector.
    pub fn fetch(
        &self,
        reference: &str,
        cache_subdir: Option<&str>,
    ) -> Result<PathBuf, RemoteError> {
        let parsed = source::parse(reference)?;

        debug!(
            getter = %parsed.getter,
            scheme = %parsed.scheme,
            user = %parsed.user,
            host = %parsed.host,
            dir = %parsed.dir,
            file = %parsed.file,
            "parsed source reference"
        );

        let key = cache_key(&parsed);

        // e.g. <home>/states/https_github_com_org_repo_git.ref=1_2_3
        let entry_dir = match cache_subdir {
            Some(subdir) => self.home.join(subdir).join(&key),
            None => self.home.join(&key),
        };
        let marker = entry_dir.join(ORIGIN_MARKER);

        debug!(
            home = %self.home.display(),
            entry = %entry_dir.display(),
            "derived cache entry"
        );

        let lock = self.entry_lock(&entry_dir);
        let _guard = lock.lock();

        match probe(self.fs.as_ref(), &entry_dir) {
            CacheState::Conflict => {
                return Err(RemoteError::CacheConflict { path: entry_dir });
            }
            CacheState::Hit => {
                debug!(entry = %entry_dir.display(), "cache hit");
            }
            CacheState::Miss => {
                let live = parsed.live_address();
                debug!(src = %live, dst = %marker.display(), "cache miss, downloading");

                if let Err(fetch_err) = self.getter.get(&self.home, &live, &marker) {
                    // a half-fetched entry must not pass a later hit check
                    return Err(match self.fs.remove_all(&marker) {
                        Ok(()) => RemoteError::Fetch(fetch_err),
                        Err(cleanup) => RemoteError::FetchCleanup {
                            fetch: fetch_err,
                            path: marker,
                            cleanup,
                        },
                    });
                }
            }
        }

        if parsed.file.is_empty() {
            Ok(marker)
        } else {
            Ok(marker.join(&parsed.file))
        }
    }

    fn entry_lock(&self, entry_dir: &Path) -> Arc<Mutex<()>> {
        Arc::clone(self.locks.lock().entry(entry_dir.to_path_buf()).or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemoryFileSystem;

    struct NoopGetter;

    impl Getter for NoopGetter {
        fn get(&self, _wd: &Path, _src: &str, _dst: &Path) -> Result<(), GetterError> {
            Ok(())
        }
    }

    #[test]
    fn test_new_fails_fast_when_remote_disabled() {
        let err = Remote::new(None, false).unwrap_err();
        assert!(matches!(err, RemoteError::RemoteDisabled));
    }

    #[test]
    fn test_new_uses_explicit_home() {
        let remote = Remote::new(Some(PathBuf::from("/var/cache/shipfile")), true).unwrap();
        assert_eq!(remote.home(), Path::new("/var/cache/shipfile"));
    }

    #[test]
    fn test_fetch_propagates_parse_error() {
        let remote = Remote::with_parts(
            PathBuf::from("/cache"),
            Arc::new(NoopGetter),
            Arc::new(MemoryFileSystem::new()),
        );

        let err = remote.fetch("just/a/local/path", None).unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Parse(ParseError::InvalidUrl { .. })
        ));
    }

    #[test]
    fn test_fetch_rejects_malformed_at_grammar() {
        let remote = Remote::with_parts(
            PathBuf::from("/cache"),
            Arc::new(NoopGetter),
            Arc::new(MemoryFileSystem::new()),
        );

        // malformed-but-scheme-bearing references are real errors, and locate
        // must not translate them into a passthrough
        let err = remote.locate("https://example.com/a@b@c", None).unwrap_err();
        assert!(matches!(
            err,
            RemoteError::Parse(ParseError::MalformedPath { .. })
        ));
    }
}
