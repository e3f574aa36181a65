//! Shipfile Remote Resolution Library
//!
//! This crate resolves Shipfile's remote source references (charts, value
//! files, sub-state files addressed by composite URL) into local paths:
//! - Source reference parsing (`[<getter>::]<scheme>://<host>/<dir>[@<file>]?...`)
//! - Cache key derivation with secret redaction
//! - On-disk cache probing (origin marker)
//! - Fetch orchestration with partial-failure cleanup
//! - Local-path passthrough via `locate`
//! - Protocol backends for git, ssh-over-git, and http(s)

pub mod cache;
pub mod fs;
pub mod getter;
pub mod remote;
pub mod source;

pub use cache::{cache_home, cache_key, probe, CacheState, CACHE_HOME_ENV, ORIGIN_MARKER};
pub use fs::{FileSystem, MemoryFileSystem, OsFileSystem};
pub use getter::{Getter, GetterError, GetterRegistry, GitGetter, HttpGetter, RouterGetter};
pub use remote::{Remote, RemoteError};
pub use source::{is_remote, parse, ParseError, Source};
