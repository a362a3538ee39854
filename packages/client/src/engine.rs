//! Connection lifecycle and request dispatch.
//!
//! One [`Engine`] owns one transport binding for its whole life:
//! `Idle → Connecting → Open → Closed`, no restarts. Inside the Open state
//! the engine decodes each inbound frame, spawns an independent task per
//! invoke (resolve → execute → reply), and writes replies back out through
//! a single outbound queue. Per-request failures become failed result
//! frames; only transport-level failures end the connection.
//!
//! Replies are not ordered across requests: a slow module does not hold up
//! results for fast ones. FIFO holds only at frame delivery.

use std::sync::Arc;

use serde_json::{json, Value as JsValue};
use tokio::sync::mpsc;

use crate::error::{ClientError, InvokeError};
use crate::executor::Executor;
use crate::proto::{CallSignature, WireMessage};
use crate::resolver::ModuleResolver;
use crate::transport::{Transport, TransportEvent};

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnState {
    Idle,
    Connecting,
    Open,
    Closed,
}

/// Handle for closing an engine from outside its event loop.
///
/// `close` is idempotent; once the engine has terminated (for any reason)
/// further calls are no-ops.
#[derive(Clone)]
pub struct EngineHandle {
    close: mpsc::UnboundedSender<()>,
}

impl EngineHandle {
    pub fn close(&self) {
        let _ = self.close.send(());
    }
}

type OpenObserver = Box<dyn Fn() + Send>;
type FrameObserver = Box<dyn Fn(&str) + Send>;
type CloseObserver = Box<dyn Fn(Option<&str>) + Send>;

/// The protocol engine: owns the transport, routes requests, sends replies.
pub struct Engine<T: Transport> {
    transport: T,
    resolver: ModuleResolver,
    executor: Arc<dyn Executor>,
    state: ConnState,
    open_observers: Vec<OpenObserver>,
    frame_observers: Vec<FrameObserver>,
    close_observers: Vec<CloseObserver>,
    close_tx: mpsc::UnboundedSender<()>,
    close_rx: mpsc::UnboundedReceiver<()>,
}

enum Step {
    Event(TransportEvent),
    Reply(String),
    LocalClose,
}

impl<T: Transport> Engine<T> {
    pub fn new(transport: T, resolver: ModuleResolver, executor: Arc<dyn Executor>) -> Self {
        let (close_tx, close_rx) = mpsc::unbounded_channel();
        Self {
            transport,
            resolver,
            executor,
            state: ConnState::Idle,
            open_observers: Vec::new(),
            frame_observers: Vec::new(),
            close_observers: Vec::new(),
            close_tx,
            close_rx,
        }
    }

    pub fn state(&self) -> ConnState {
        self.state
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            close: self.close_tx.clone(),
        }
    }

    /// Called once the connection is open.
    pub fn on_open(&mut self, observer: impl Fn() + Send + 'static) {
        self.open_observers.push(Box::new(observer));
    }

    /// Called with every raw inbound frame, before decoding. Diagnostics
    /// only; fire-and-forget.
    pub fn on_frame(&mut self, observer: impl Fn(&str) + Send + 'static) {
        self.frame_observers.push(Box::new(observer));
    }

    /// Called exactly once when the connection terminates, with the close
    /// reason if the peer supplied one.
    pub fn on_close(&mut self, observer: impl Fn(Option<&str>) + Send + 'static) {
        self.close_observers.push(Box::new(observer));
    }

    /// Connect and process the connection to completion.
    ///
    /// Returns when the peer closes, [`EngineHandle::close`] is called, or
    /// the transport fails. Calling `run` on anything but an idle engine is
    /// a usage error.
    pub async fn run(&mut self) -> Result<(), ClientError> {
        if self.state != ConnState::Idle {
            return Err(ClientError::AlreadyStarted);
        }
        self.state = ConnState::Connecting;
        self.transport.connect().await?;

        // Invoke tasks reply through this queue; dropping the receiver on
        // close is what abandons their late results.
        let (reply_tx, mut reply_rx) = mpsc::unbounded_channel::<String>();

        loop {
            let step = tokio::select! {
                event = self.transport.recv() => Step::Event(event?),
                Some(frame) = reply_rx.recv() => Step::Reply(frame),
                Some(()) = self.close_rx.recv() => Step::LocalClose,
            };

            match step {
                Step::Event(TransportEvent::Opened) => {
                    self.state = ConnState::Open;
                    tracing::info!("connected to coordinator");
                    for observer in &self.open_observers {
                        observer();
                    }
                }
                Step::Event(TransportEvent::Frame(frame)) => {
                    self.dispatch(frame, &reply_tx);
                }
                Step::Event(TransportEvent::Closed(reason)) => {
                    self.finish(reason.as_deref());
                    break;
                }
                Step::Reply(frame) => {
                    if let Err(e) = self.transport.send(&frame).await {
                        tracing::warn!(error = %e, "send failed, closing connection");
                        self.finish(Some(&e.to_string()));
                        break;
                    }
                }
                Step::LocalClose => {
                    self.transport.close().await?;
                    self.finish(None);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Decode one inbound frame and route it.
    ///
    /// Invokes run concurrently; a malformed or unrecognized frame is
    /// dropped after a best-effort peer notification and the connection
    /// stays open either way.
    fn dispatch(&mut self, frame: String, reply_tx: &mpsc::UnboundedSender<String>) {
        for observer in &self.frame_observers {
            observer(&frame);
        }

        match WireMessage::from_json(&frame) {
            Ok(WireMessage::Invoke {
                request_id,
                name,
                uri,
                signature,
                args,
            }) => {
                tracing::info!(%request_id, function = %name, "invoke request received");
                let resolver = self.resolver.clone();
                let executor = Arc::clone(&self.executor);
                let tx = reply_tx.clone();
                tokio::spawn(async move {
                    let content =
                        match invoke(&resolver, &*executor, &name, &uri, &signature, &args).await {
                            Ok(value) => value,
                            Err(e) => {
                                tracing::warn!(%request_id, error = %e, "invoke failed");
                                json!({ "error": e.to_string() })
                            }
                        };

                    tracing::debug!(%request_id, "replying");
                    match WireMessage::result(request_id.clone(), content).to_json() {
                        Ok(reply) => {
                            if tx.send(reply).is_err() {
                                tracing::debug!(
                                    %request_id,
                                    "connection closed before reply, result discarded"
                                );
                            }
                        }
                        Err(e) => {
                            tracing::error!(%request_id, error = %e, "result frame encoding failed")
                        }
                    }
                });
            }
            Ok(WireMessage::Result { request_id, .. }) => {
                // Workers only send results; receiving one is a peer bug.
                tracing::warn!(%request_id, "unexpected result frame from coordinator");
                let _ = reply_tx.send("Unrecognized request type: result".to_owned());
            }
            Err(e) => {
                tracing::warn!(error = %e, "dropping undecodable frame");
                let _ = reply_tx.send(format!("Unrecognized request: {}", e));
            }
        }
    }

    fn finish(&mut self, reason: Option<&str>) {
        if self.state == ConnState::Closed {
            return;
        }
        self.state = ConnState::Closed;
        tracing::info!(reason = reason.unwrap_or("none"), "connection closed");
        for observer in &self.close_observers {
            observer(reason);
        }
    }
}

async fn invoke(
    resolver: &ModuleResolver,
    executor: &dyn Executor,
    name: &str,
    uri: &str,
    signature: &CallSignature,
    args: &[JsValue],
) -> Result<JsValue, InvokeError> {
    let module = resolver.resolve(uri).await?;
    let value = executor.execute(module, name, signature, args).await?;
    Ok(value)
}
