//! Message-oriented socket abstraction.
//!
//! The engine never touches a socket API directly; it drives a [`Transport`],
//! which hides the hosting environment's substrate behind one capability
//! interface. Two implementations ship here:
//!
//! - [`WsTransport`] - a WebSocket over TCP (optionally TLS), for workers
//!   running as ordinary processes.
//! - [`PairTransport`] - an in-memory duplex over channels, for sandboxed
//!   embeddings and for tests that need a scriptable peer.
//!
//! Which one a worker uses is an explicit construction-time choice; nothing
//! sniffs the environment.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

/// Events surfaced by a transport, in order: exactly one `Opened` per
/// successful connect, then any number of `Frame`s, then one `Closed`.
#[derive(Debug)]
pub enum TransportEvent {
    Opened,
    Frame(String),
    Closed(Option<String>),
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// `send` or `recv` before `connect` succeeded, or `connect` twice.
    #[error("transport not connected")]
    NotConnected,

    /// `connect` on a transport that already ran a connection. Transports
    /// are single-shot.
    #[error("transport already connected")]
    AlreadyConnected,

    /// `send` after the connection closed.
    #[error("transport closed")]
    Closed,

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// A bidirectional, message-oriented connection.
///
/// `send` is only valid between the `Opened` and `Closed` events; outside
/// that window it is a usage error, never a silent drop. `close` is
/// idempotent.
#[async_trait]
pub trait Transport: Send {
    async fn connect(&mut self) -> Result<(), TransportError>;
    async fn send(&mut self, frame: &str) -> Result<(), TransportError>;
    async fn recv(&mut self) -> Result<TransportEvent, TransportError>;
    async fn close(&mut self) -> Result<(), TransportError>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// WebSocket transport for process-hosted workers.
pub struct WsTransport {
    url: String,
    socket: Option<WsStream>,
    opened_delivered: bool,
    done: bool,
}

impl WsTransport {
    /// `url` is the full endpoint, e.g. `ws://coordinator:8090/ws`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            socket: None,
            opened_delivered: false,
            done: false,
        }
    }
}

#[async_trait]
impl Transport for WsTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.socket.is_some() || self.done {
            return Err(TransportError::AlreadyConnected);
        }
        let (socket, _response) = connect_async(self.url.as_str()).await?;
        tracing::debug!(url = %self.url, "websocket handshake complete");
        self.socket = Some(socket);
        Ok(())
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if self.done {
            return Err(TransportError::Closed);
        }
        let socket = self.socket.as_mut().ok_or(TransportError::NotConnected)?;
        socket.send(Message::text(frame)).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<TransportEvent, TransportError> {
        if !self.opened_delivered {
            if self.socket.is_none() {
                return Err(TransportError::NotConnected);
            }
            self.opened_delivered = true;
            return Ok(TransportEvent::Opened);
        }

        loop {
            let next = match self.socket.as_mut() {
                Some(socket) => socket.next().await,
                None => return Ok(TransportEvent::Closed(None)),
            };
            match next {
                Some(Ok(Message::Text(text))) => {
                    return Ok(TransportEvent::Frame(text.as_str().to_owned()));
                }
                Some(Ok(Message::Binary(bytes))) => {
                    // The protocol is text; tolerate peers that flag frames
                    // as binary.
                    return Ok(TransportEvent::Frame(
                        String::from_utf8_lossy(&bytes).into_owned(),
                    ));
                }
                Some(Ok(Message::Close(frame))) => {
                    self.done = true;
                    self.socket = None;
                    return Ok(TransportEvent::Closed(
                        frame.map(|f| f.reason.as_str().to_owned()),
                    ));
                }
                Some(Ok(_)) => continue, // ping/pong, handled by the stack
                Some(Err(e)) => {
                    self.done = true;
                    self.socket = None;
                    return Ok(TransportEvent::Closed(Some(e.to_string())));
                }
                None => {
                    self.done = true;
                    self.socket = None;
                    return Ok(TransportEvent::Closed(None));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.done = true;
        if let Some(mut socket) = self.socket.take() {
            // Best effort; the peer may already be gone.
            let _ = socket.close(None).await;
        }
        Ok(())
    }
}

enum PeerEvent {
    Frame(String),
    Close(Option<String>),
}

/// In-memory transport half; the other half is a [`PairPeer`].
///
/// Frames injected by the peer before `connect` are buffered and delivered
/// after `Opened`, so peers never race the connection handshake.
pub struct PairTransport {
    events: mpsc::UnboundedReceiver<PeerEvent>,
    out: mpsc::UnboundedSender<String>,
    connected: bool,
    opened_delivered: bool,
    done: bool,
}

/// Scriptable peer for a [`PairTransport`].
pub struct PairPeer {
    events: mpsc::UnboundedSender<PeerEvent>,
    out: mpsc::UnboundedReceiver<String>,
}

impl PairTransport {
    pub fn pair() -> (PairTransport, PairPeer) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        (
            PairTransport {
                events: event_rx,
                out: out_tx,
                connected: false,
                opened_delivered: false,
                done: false,
            },
            PairPeer {
                events: event_tx,
                out: out_rx,
            },
        )
    }
}

impl PairPeer {
    /// Deliver a frame to the transport.
    pub fn send_frame(&self, frame: impl Into<String>) {
        let _ = self.events.send(PeerEvent::Frame(frame.into()));
    }

    /// Close the connection from the peer side.
    pub fn close(&self, reason: Option<&str>) {
        let _ = self
            .events
            .send(PeerEvent::Close(reason.map(str::to_owned)));
    }

    /// Next frame the transport sent, or `None` once the transport is gone.
    pub async fn next_sent(&mut self) -> Option<String> {
        self.out.recv().await
    }
}

#[async_trait]
impl Transport for PairTransport {
    async fn connect(&mut self) -> Result<(), TransportError> {
        if self.connected || self.done {
            return Err(TransportError::AlreadyConnected);
        }
        self.connected = true;
        Ok(())
    }

    async fn send(&mut self, frame: &str) -> Result<(), TransportError> {
        if self.done {
            return Err(TransportError::Closed);
        }
        if !self.opened_delivered {
            return Err(TransportError::NotConnected);
        }
        self.out
            .send(frame.to_owned())
            .map_err(|_| TransportError::Closed)
    }

    async fn recv(&mut self) -> Result<TransportEvent, TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if !self.opened_delivered {
            self.opened_delivered = true;
            return Ok(TransportEvent::Opened);
        }
        if self.done {
            return Ok(TransportEvent::Closed(None));
        }
        match self.events.recv().await {
            Some(PeerEvent::Frame(frame)) => Ok(TransportEvent::Frame(frame)),
            Some(PeerEvent::Close(reason)) => {
                self.done = true;
                Ok(TransportEvent::Closed(reason))
            }
            None => {
                self.done = true;
                Ok(TransportEvent::Closed(None))
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.done = true;
        Ok(())
    }
}
