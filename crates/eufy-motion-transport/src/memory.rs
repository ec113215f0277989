//! In-memory transport.
//!
//! Useful for tests and for hosts that want to drive a session without a
//! network. Every `connect` hands a [`MemoryPeer`] to the paired
//! [`MemoryListener`], which plays the server side of that connection.

use std::sync::{
    Arc, Mutex, PoisonError,
    atomic::{AtomicBool, AtomicUsize, Ordering},
};

use async_trait::async_trait;
use eufy_motion_core::{Connection, Connector, FrameSink, InboundFrame, TransportError};
use futures::StreamExt;
use serde_json::Value;
use tokio::{sync::mpsc, time::Instant};
use tokio_stream::wrappers::UnboundedReceiverStream;

/// One recorded call to [`Connector::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectAttempt {
    pub endpoint: String,
    pub at: Instant,
}

#[derive(Default)]
struct Shared {
    refuse: AtomicBool,
    attempts: Mutex<Vec<ConnectAttempt>>,
}

/// Create a connected connector/listener pair.
#[must_use]
pub fn channel() -> (MemoryConnector, MemoryListener) {
    let shared = Arc::new(Shared::default());
    let (tx, rx) = mpsc::unbounded_channel();
    (
        MemoryConnector {
            shared: Arc::clone(&shared),
            accepted: tx,
        },
        MemoryListener {
            shared,
            accepted: rx,
        },
    )
}

/// Client side: opens connections to the paired listener.
#[derive(Clone)]
pub struct MemoryConnector {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedSender<MemoryPeer>,
}

#[async_trait]
impl Connector for MemoryConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection, TransportError> {
        self.shared
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(ConnectAttempt {
                endpoint: endpoint.to_string(),
                at: Instant::now(),
            });

        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(TransportError::ConnectFailed(format!(
                "connection refused: {endpoint}"
            )));
        }

        let (to_client, client_rx) = mpsc::unbounded_channel();
        let (client_tx, from_client) = mpsc::unbounded_channel();
        let pings = Arc::new(AtomicUsize::new(0));

        let peer = MemoryPeer {
            endpoint: endpoint.to_string(),
            to_client,
            from_client,
            pings: Arc::clone(&pings),
        };
        self.accepted
            .send(peer)
            .map_err(|_| TransportError::ConnectFailed("listener closed".to_string()))?;

        let sink = MemorySink {
            sender: client_tx,
            pings,
        };
        let frames = UnboundedReceiverStream::new(client_rx).boxed();
        Ok(Connection::new(Box::new(sink), frames))
    }
}

struct MemorySink {
    sender: mpsc::UnboundedSender<String>,
    pings: Arc<AtomicUsize>,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sender
            .send(text)
            .map_err(|_| TransportError::SendFailed("peer gone".to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        if self.sender.is_closed() {
            return Err(TransportError::SendFailed("peer gone".to_string()));
        }
        self.pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Server side: receives the peers of new connections.
pub struct MemoryListener {
    shared: Arc<Shared>,
    accepted: mpsc::UnboundedReceiver<MemoryPeer>,
}

impl MemoryListener {
    /// Wait for the next connection.
    pub async fn accept(&mut self) -> Option<MemoryPeer> {
        self.accepted.recv().await
    }

    /// Make subsequent connects fail (or succeed again).
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Every connect call so far, refused ones included.
    #[must_use]
    pub fn attempts(&self) -> Vec<ConnectAttempt> {
        self.shared
            .attempts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// Server end of one in-memory connection. Dropping it closes the
/// connection without a close frame.
pub struct MemoryPeer {
    endpoint: String,
    to_client: mpsc::UnboundedSender<Result<InboundFrame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<String>,
    pings: Arc<AtomicUsize>,
}

impl MemoryPeer {
    /// Endpoint the client connected to.
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Deliver a text frame to the client.
    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.to_client.send(Ok(InboundFrame::Text(text.into())));
    }

    /// Deliver a JSON value as a text frame.
    pub fn send_json(&self, value: &Value) {
        self.send_text(value.to_string());
    }

    /// Deliver a close frame.
    pub fn close(&self, code: u16, reason: &str) {
        let _ = self.to_client.send(Ok(InboundFrame::Closed {
            code: Some(code),
            reason: reason.to_string(),
        }));
    }

    /// Deliver a transport error.
    pub fn fail(&self, message: &str) {
        let _ = self
            .to_client
            .send(Err(TransportError::Protocol(message.to_string())));
    }

    /// Next text frame sent by the client.
    pub async fn recv_text(&mut self) -> Option<String> {
        self.from_client.recv().await
    }

    /// Next text frame sent by the client, parsed as JSON.
    pub async fn recv_json(&mut self) -> Option<Value> {
        let text = self.recv_text().await?;
        serde_json::from_str(&text).ok()
    }

    /// Text frame already sent by the client, if any.
    pub fn try_recv_text(&mut self) -> Option<String> {
        self.from_client.try_recv().ok()
    }

    /// Number of pings received on this connection.
    #[must_use]
    pub fn pings(&self) -> usize {
        self.pings.load(Ordering::SeqCst)
    }
}
