//! Module byte cache for wasmfaas workers.
//!
//! A worker caches fetched module binaries so repeated invocations of the
//! same function never go back to the origin. The cache is a flat key→bytes
//! mapping with two interchangeable backends:
//!
//! - [`FsStore`] - one file per module in a dedicated cache directory,
//!   survives worker restarts.
//! - [`MemoryStore`] - an in-process map for sandboxed environments where
//!   durable storage is unavailable or unwanted. Nothing survives the
//!   session.
//!
//! Keys are module URIs as they appear in invoke requests. Both backends
//! reduce a URI to its final path segment before storing, so the same
//! logical key always maps to the same entry regardless of backend.
//!
//! Entries are written once and never evicted. Unbounded growth is an
//! accepted limitation; the coordinator embeds content hashes in module
//! filenames, so stale entries are never served.

use bytes::Bytes;

mod fs;
mod memory;

pub use fs::FsStore;
pub use memory::MemoryStore;

/// Errors from cache backends.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The key reduces to nothing storable (empty, or only traversal
    /// segments).
    #[error("invalid cache key: {key:?}")]
    InvalidKey { key: String },

    /// The cache directory could not be created or is not usable.
    #[error("cache directory {path:?} unusable: {source}")]
    CacheDir {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    /// An I/O failure while reading or writing an entry.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// A key→bytes cache for module binaries.
///
/// `get` on an absent key is `Ok(None)`, never an error. After a successful
/// `put`, a `get` for the same key on the same instance observes the written
/// bytes. Writes are atomic per key: a concurrent `get` sees either the
/// whole entry or nothing.
#[async_trait::async_trait]
pub trait ModuleStore: Send + Sync {
    /// Read the cached bytes for a module URI.
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError>;

    /// Cache the bytes for a module URI.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError>;
}

/// Reduce a module URI to a storage-safe key: its final non-empty path
/// segment.
///
/// Mirrors how the coordinator addresses modules (`assets/<name>_<hash>.wasm`);
/// the basename alone identifies the module. Traversal segments never reach
/// the backend.
pub fn cache_key(key: &str) -> Result<String, StoreError> {
    let segment = key
        .rsplit('/')
        .find(|s| !s.is_empty() && *s != "." && *s != "..");

    match segment {
        Some(s) => Ok(s.to_string()),
        None => Err(StoreError::InvalidKey {
            key: key.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_key_takes_basename() {
        assert_eq!(cache_key("assets/echo.wasm").unwrap(), "echo.wasm");
        assert_eq!(cache_key("echo.wasm").unwrap(), "echo.wasm");
        assert_eq!(cache_key("a/b/c/mod.wasm").unwrap(), "mod.wasm");
    }

    #[test]
    fn cache_key_ignores_trailing_slash() {
        assert_eq!(cache_key("assets/echo.wasm/").unwrap(), "echo.wasm");
    }

    #[test]
    fn cache_key_skips_traversal_segments() {
        assert_eq!(cache_key("../../echo.wasm").unwrap(), "echo.wasm");
        assert_eq!(cache_key("assets/..").unwrap(), "assets");
    }

    #[test]
    fn cache_key_rejects_empty() {
        assert!(matches!(
            cache_key(""),
            Err(StoreError::InvalidKey { .. })
        ));
        assert!(matches!(
            cache_key("/"),
            Err(StoreError::InvalidKey { .. })
        ));
        assert!(matches!(
            cache_key("../.."),
            Err(StoreError::InvalidKey { .. })
        ));
    }
}
