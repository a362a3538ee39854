//! Coordinator connection for wasmfaas workers.
//!
//! A worker is a remote-execution node: it holds one persistent connection
//! to the wasmfaas coordinator, accepts requests to invoke named functions
//! packaged as wasm modules, resolves the module bytes through a
//! fetch-on-miss cache, dispatches execution to a pluggable backend, and
//! replies over the same connection.
//!
//! This crate is the protocol-and-cache engine. The pieces:
//!
//! - [`proto`] - the JSON frame protocol (`invoke` in, `result` out).
//! - [`transport`] - the socket abstraction with WebSocket and in-memory
//!   implementations.
//! - [`resolver`] - module URI → bytes, store first, origin on a miss.
//! - [`executor`] - the trait boundary to the execution backend.
//! - [`engine`] - the connection state machine tying it all together.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use wasmfaas_client::{Engine, ModuleResolver, WsTransport};
//! use wasmfaas_store::FsStore;
//!
//! let store = Arc::new(FsStore::new("faas_assets")?);
//! let resolver = ModuleResolver::new("http://coordinator:8090/".parse()?, store);
//! let transport = WsTransport::new("ws://coordinator:8090/ws");
//! let mut engine = Engine::new(transport, resolver, my_executor);
//! engine.on_close(|reason| eprintln!("closed: {:?}", reason));
//! engine.run().await?;
//! ```

pub mod engine;
pub mod error;
pub mod executor;
pub mod proto;
pub mod resolver;
pub mod transport;

pub use engine::{ConnState, Engine, EngineHandle};
pub use error::{ClientError, InvokeError};
pub use executor::{ExecutionError, Executor};
pub use proto::{CallSignature, TypeDesc, WireMessage};
pub use resolver::{ModuleResolver, ResolveError};
pub use transport::{PairPeer, PairTransport, Transport, TransportError, TransportEvent, WsTransport};
