//! Durable cache backend: one file per module in a cache directory.

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::Bytes;

use crate::{cache_key, ModuleStore, StoreError};

/// Distinguishes temp files of concurrent writers within one process.
static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Filesystem-backed module cache.
///
/// Each entry is a file named after the sanitized key, directly inside the
/// cache directory. There is no index; the directory listing is the only
/// source of truth, so a worker restarted against the same directory reuses
/// everything it fetched before.
///
/// Writes land in a temp file first and are renamed into place, so a reader
/// never observes a half-written module.
pub struct FsStore {
    root: PathBuf,
}

impl FsStore {
    /// Open (creating if necessary) the cache directory at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        std::fs::create_dir_all(&root).map_err(|source| StoreError::CacheDir {
            path: root.clone(),
            source,
        })?;

        let attr = std::fs::metadata(&root).map_err(|source| StoreError::CacheDir {
            path: root.clone(),
            source,
        })?;
        if attr.permissions().readonly() {
            return Err(StoreError::CacheDir {
                path: root,
                source: io::Error::other("cache directory must be writable"),
            });
        }

        Ok(Self { root })
    }

    fn entry_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        Ok(self.root.join(cache_key(key)?))
    }
}

#[async_trait::async_trait]
impl ModuleStore for FsStore {
    async fn get(&self, key: &str) -> Result<Option<Bytes>, StoreError> {
        let path = self.entry_path(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => {
                tracing::debug!(key, path = %path.display(), "cache hit");
                Ok(Some(Bytes::from(bytes)))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn put(&self, key: &str, bytes: Bytes) -> Result<(), StoreError> {
        let path = self.entry_path(key)?;
        let tmp = self.root.join(format!(
            ".{}.tmp.{}.{}",
            cache_key(key)?,
            std::process::id(),
            TMP_SEQ.fetch_add(1, Ordering::Relaxed),
        ));

        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        tracing::debug!(key, len = bytes.len(), path = %path.display(), "cached module");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        let payloads: Vec<Bytes> = vec![
            Bytes::new(),
            Bytes::from_static(b"\x00asm\x01\x00\x00\x00"),
            Bytes::from(vec![0xAB; 1 << 20]),
        ];

        for (i, payload) in payloads.into_iter().enumerate() {
            let key = format!("assets/mod{}.wasm", i);
            store.put(&key, payload.clone()).await.unwrap();
            assert_eq!(store.get(&key).await.unwrap(), Some(payload));
        }
    }

    #[tokio::test]
    async fn absent_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        assert_eq!(store.get("assets/missing.wasm").await.unwrap(), None);
    }

    #[tokio::test]
    async fn sanitized_key_is_visible_to_reads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        store
            .put("assets/echo.wasm", Bytes::from_static(b"abc"))
            .await
            .unwrap();

        // Same basename, different prefix: one entry.
        assert_eq!(
            store.get("echo.wasm").await.unwrap(),
            Some(Bytes::from_static(b"abc"))
        );
    }

    #[tokio::test]
    async fn traversal_stays_inside_cache_dir() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path().join("cache")).unwrap();

        store
            .put("../../escape.wasm", Bytes::from_static(b"x"))
            .await
            .unwrap();

        assert!(dir.path().join("cache/escape.wasm").exists());
        assert!(!dir.path().join("escape.wasm").exists());
    }

    #[tokio::test]
    async fn overwrite_replaces_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();

        store.put("m.wasm", Bytes::from_static(b"one")).await.unwrap();
        store.put("m.wasm", Bytes::from_static(b"two")).await.unwrap();
        assert_eq!(
            store.get("m.wasm").await.unwrap(),
            Some(Bytes::from_static(b"two"))
        );
    }

    #[tokio::test]
    async fn creates_directory_on_first_use() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/faas_assets");
        let _store = FsStore::new(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[tokio::test]
    async fn empty_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsStore::new(dir.path()).unwrap();
        assert!(matches!(
            store.put("/", Bytes::new()).await,
            Err(StoreError::InvalidKey { .. })
        ));
    }
}
