//! Worker configuration.
//!
//! Everything is a flag with a `WASMFAAS_*` env fallback, so the same
//! binary drops into dev shells, containers, and CI without a config file.
//! The coordinator host plus the TLS switch derive both endpoints the
//! worker talks to: the websocket channel at `/ws` and the module origin
//! at the root.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use url::Url;

#[derive(Parser, Debug)]
#[command(name = "wasmfaas-worker")]
#[command(author, version, about = "wasmfaas worker node", long_about = None)]
pub struct Config {
    /// Coordinator host, as host or host:port.
    #[arg(long, env = "WASMFAAS_HOST", default_value = "localhost:8090")]
    pub host: String,

    /// Use wss/https instead of ws/http.
    #[arg(long, env = "WASMFAAS_TLS")]
    pub tls: bool,

    /// Module cache backend.
    #[arg(long, env = "WASMFAAS_STORAGE", value_enum, default_value_t = StorageBackend::Fs)]
    pub storage: StorageBackend,

    /// Cache directory for the fs backend.
    #[arg(long, env = "WASMFAAS_CACHE_DIR", default_value = "faas_assets")]
    pub cache_dir: PathBuf,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// Durable: one file per module under the cache directory.
    Fs,
    /// Volatile: in-process only, nothing survives a restart.
    Memory,
}

impl Config {
    /// Coordinator websocket endpoint.
    pub fn ws_url(&self) -> String {
        let scheme = if self.tls { "wss" } else { "ws" };
        format!("{}://{}/ws", scheme, self.host)
    }

    /// Base URL module URIs are resolved against.
    pub fn http_base(&self) -> Result<Url, url::ParseError> {
        let scheme = if self.tls { "https" } else { "http" };
        Url::parse(&format!("{}://{}/", scheme, self.host))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_plain_endpoints() {
        let config = Config::try_parse_from(["wasmfaas-worker", "--host", "api:8090"]).unwrap();
        assert_eq!(config.ws_url(), "ws://api:8090/ws");
        assert_eq!(config.http_base().unwrap().as_str(), "http://api:8090/");
    }

    #[test]
    fn tls_switches_both_schemes() {
        let config =
            Config::try_parse_from(["wasmfaas-worker", "--host", "faas.example.com", "--tls"])
                .unwrap();
        assert_eq!(config.ws_url(), "wss://faas.example.com/ws");
        assert_eq!(
            config.http_base().unwrap().as_str(),
            "https://faas.example.com/"
        );
    }

    #[test]
    fn storage_backend_parses() {
        let config =
            Config::try_parse_from(["wasmfaas-worker", "--storage", "memory"]).unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);

        let config = Config::try_parse_from(["wasmfaas-worker"]).unwrap();
        assert_eq!(config.storage, StorageBackend::Fs);
        assert_eq!(config.cache_dir, PathBuf::from("faas_assets"));
    }
}
