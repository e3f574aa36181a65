//! Fetch backends
//!
//! [`Getter`] is the single capability the cache core needs from the network
//! layer. Protocol dispatch is a [`GetterRegistry`] resolved once at
//! construction; [`RouterGetter`] routes a live source address to the backend
//! registered for its getter hint or scheme.

mod git;
mod http;

pub use git::GitGetter;
pub use http::{HttpGetter, MAX_CONTENT_SIZE, REQUEST_TIMEOUT};

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use thiserror::Error;

use crate::source;

/// Errors surfaced by fetch backends, wrapped with the `get:` prefix
#[derive(Debug, Error)]
pub enum GetterError {
    /// The live address does not parse as a URL
    #[error("get: invalid source address: {0}")]
    InvalidAddress(String),

    /// No backend registered for the requested protocol
    #[error("get: no getter registered for protocol {protocol}")]
    UnsupportedProtocol { protocol: String },

    /// HTTP transport failure
    #[error("get: {0}")]
    Http(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("get: bad response code: {status}")]
    BadResponseCode { status: u16 },

    /// Downloaded content exceeds the configured size limit
    #[error("get: content too large: {size} bytes (max: {max})")]
    ContentTooLarge { size: u64, max: u64 },

    /// git subprocess failure
    #[error("get: git: {message}")]
    Git { message: String },

    /// Archive extraction failure
    #[error("get: failed to extract archive: {message}")]
    Extraction { message: String },

    /// IO failure while writing the destination
    #[error("get: {0}")]
    Io(#[from] std::io::Error),
}

/// A fetch backend
///
/// `wd` is the cache home, `src` is the full live address (getter hint,
/// userinfo, and query included), `dst` is the origin marker path the backend
/// must populate.
pub trait Getter: Send + Sync {
    fn get(&self, wd: &Path, src: &str, dst: &Path) -> Result<(), GetterError>;
}

/// Protocol identifier to backend table
#[derive(Default)]
pub struct GetterRegistry {
    getters: HashMap<String, Arc<dyn Getter>>,
}

impl GetterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in backends: `git` and `ssh` through the git
    /// subprocess, `http` and `https` through the HTTP client
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let git: Arc<dyn Getter> = Arc::new(GitGetter::new());
        let http: Arc<dyn Getter> = Arc::new(HttpGetter::new());
        registry.register("git", Arc::clone(&git));
        registry.register("ssh", git);
        registry.register("http", Arc::clone(&http));
        registry.register("https", http);
        registry
    }

    pub fn register(&mut self, protocol: &str, getter: Arc<dyn Getter>) {
        self.getters.insert(protocol.to_string(), getter);
    }

    pub fn resolve(&self, protocol: &str) -> Option<Arc<dyn Getter>> {
        self.getters.get(protocol).cloned()
    }
}

/// Dispatching [`Getter`] over a [`GetterRegistry`]
///
/// The getter hint (the part before `::`) selects the backend when present;
/// the URL scheme selects it otherwise.
pub struct RouterGetter {
    registry: GetterRegistry,
}

impl RouterGetter {
    pub fn new(registry: GetterRegistry) -> Self {
        Self { registry }
    }

    pub fn with_defaults() -> Self {
        Self::new(GetterRegistry::with_defaults())
    }
}

impl Getter for RouterGetter {
    fn get(&self, wd: &Path, src: &str, dst: &Path) -> Result<(), GetterError> {
        let parsed =
            source::parse(src).map_err(|e| GetterError::InvalidAddress(e.to_string()))?;

        let protocol = if parsed.getter.is_empty() {
            parsed.scheme.as_str()
        } else {
            parsed.getter.as_str()
        };

        let backend =
            self.registry
                .resolve(protocol)
                .ok_or_else(|| GetterError::UnsupportedProtocol {
                    protocol: protocol.to_string(),
                })?;

        backend.get(wd, src, dst)
    }
}
