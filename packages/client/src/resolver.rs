//! Fetch-on-miss resolution of module URIs to module bytes.

use std::sync::Arc;

use bytes::Bytes;
use url::Url;

use wasmfaas_store::{ModuleStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("invalid module uri {uri:?}: {source}")]
    InvalidUri {
        uri: String,
        source: url::ParseError,
    },

    #[error("module fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("origin returned {status} for {url}")]
    Status { status: u16, url: String },
}

/// Turns a module URI from an invoke request into module bytes.
///
/// The store is consulted first; previously seen modules never touch the
/// origin again. On a miss the bytes are fetched from
/// `<base>/<uri>`, written to the store, then returned. A failed fetch
/// caches nothing.
///
/// Concurrent resolves of the same uncached URI each fetch independently;
/// the store's atomic per-key `put` makes the race benign (a redundant
/// download, nothing more).
#[derive(Clone)]
pub struct ModuleResolver {
    http: reqwest::Client,
    base: Url,
    store: Arc<dyn ModuleStore>,
}

impl ModuleResolver {
    /// `base` is the origin serving module bytes, e.g.
    /// `http://coordinator:8090/`.
    pub fn new(base: Url, store: Arc<dyn ModuleStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base,
            store,
        }
    }

    pub async fn resolve(&self, uri: &str) -> Result<Bytes, ResolveError> {
        if let Some(bytes) = self.store.get(uri).await? {
            tracing::debug!(uri, "module served from cache");
            return Ok(bytes);
        }

        let url = self
            .base
            .join(uri)
            .map_err(|source| ResolveError::InvalidUri {
                uri: uri.to_owned(),
                source,
            })?;

        tracing::info!(uri, url = %url, "fetching module from origin");
        let response = self.http.get(url.clone()).send().await?;
        if !response.status().is_success() {
            return Err(ResolveError::Status {
                status: response.status().as_u16(),
                url: url.to_string(),
            });
        }

        let bytes = response.bytes().await?;
        self.store.put(uri, bytes.clone()).await?;
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmfaas_store::MemoryStore;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const MODULE_BYTES: &[u8] = b"\x00asm\x01\x00\x00\x00";

    fn resolver(base: &str, store: Arc<dyn ModuleStore>) -> ModuleResolver {
        ModuleResolver::new(Url::parse(base).unwrap(), store)
    }

    #[tokio::test]
    async fn cached_module_skips_origin() {
        let server = MockServer::start().await;
        // Any request to the origin fails the test.
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(500))
            .expect(0)
            .mount(&server)
            .await;

        let store: Arc<dyn ModuleStore> = Arc::new(MemoryStore::new());
        store
            .put("assets/echo.wasm", Bytes::from_static(MODULE_BYTES))
            .await
            .unwrap();

        let resolver = resolver(&format!("{}/", server.uri()), store);
        let bytes = resolver.resolve("assets/echo.wasm").await.unwrap();
        assert_eq!(bytes, Bytes::from_static(MODULE_BYTES));
    }

    #[tokio::test]
    async fn miss_fetches_once_then_caches() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/echo.wasm"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(MODULE_BYTES))
            .expect(1)
            .mount(&server)
            .await;

        let store: Arc<dyn ModuleStore> = Arc::new(MemoryStore::new());
        let resolver = resolver(&format!("{}/", server.uri()), store.clone());

        let first = resolver.resolve("assets/echo.wasm").await.unwrap();
        assert_eq!(first, Bytes::from_static(MODULE_BYTES));

        // Second resolve is served from the store; the mock's expect(1)
        // verifies no further origin contact on drop.
        let second = resolver.resolve("assets/echo.wasm").await.unwrap();
        assert_eq!(second, first);

        assert_eq!(
            store.get("assets/echo.wasm").await.unwrap(),
            Some(Bytes::from_static(MODULE_BYTES))
        );
    }

    #[tokio::test]
    async fn non_success_status_caches_nothing() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/assets/gone.wasm"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store: Arc<dyn ModuleStore> = Arc::new(MemoryStore::new());
        let resolver = resolver(&format!("{}/", server.uri()), store.clone());

        let err = resolver.resolve("assets/gone.wasm").await.unwrap_err();
        assert!(matches!(err, ResolveError::Status { status: 404, .. }));
        assert_eq!(store.get("assets/gone.wasm").await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreachable_origin_is_a_fetch_failure() {
        let store: Arc<dyn ModuleStore> = Arc::new(MemoryStore::new());
        // Port 1 refuses connections.
        let resolver = resolver("http://127.0.0.1:1/", store.clone());

        let err = resolver.resolve("assets/echo.wasm").await.unwrap_err();
        assert!(matches!(err, ResolveError::Http(_)));
        assert_eq!(store.get("assets/echo.wasm").await.unwrap(), None);
    }
}
