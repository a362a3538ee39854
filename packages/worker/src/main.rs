use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use wasmfaas_client::{Engine, ModuleResolver, WsTransport};
use wasmfaas_executor::WasmExecutor;
use wasmfaas_store::{FsStore, MemoryStore, ModuleStore};

mod config;

use config::{Config, StorageBackend};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::parse();
    if let Err(e) = run(config).await {
        tracing::error!(error = %e, "worker failed");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> anyhow::Result<()> {
    let store: Arc<dyn ModuleStore> = match config.storage {
        StorageBackend::Fs => Arc::new(FsStore::new(&config.cache_dir)?),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
    };

    let resolver = ModuleResolver::new(config.http_base()?, store);
    let transport = WsTransport::new(config.ws_url());
    let mut engine = Engine::new(transport, resolver, Arc::new(WasmExecutor::new()));
    engine.on_close(|reason| {
        tracing::info!(
            reason = reason.unwrap_or("none"),
            "coordinator closed the connection"
        );
    });

    tracing::info!(url = %config.ws_url(), storage = ?config.storage, "starting worker");
    // No automatic reconnect: whoever supervises the process decides
    // whether and when to come back.
    engine.run().await?;
    Ok(())
}
