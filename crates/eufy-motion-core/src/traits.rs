//! Transport seam between the session supervisor and the network.

use async_trait::async_trait;
use futures::stream::BoxStream;
use thiserror::Error;

/// Transport error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
    #[error("Send failed: {0}")]
    SendFailed(String),
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Frame delivered by a live connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Text payload (binary payloads are converted by the transport).
    Text(String),
    /// Close frame from the peer.
    Closed { code: Option<u16>, reason: String },
}

/// Stream of inbound frames. Ending without a close frame means the
/// underlying connection went away.
pub type FrameStream = BoxStream<'static, Result<InboundFrame, TransportError>>;

/// Write half of a connection.
#[async_trait]
pub trait FrameSink: Send {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), TransportError>;

    /// Send a transport-level ping with an empty payload.
    async fn ping(&mut self) -> Result<(), TransportError>;
}

/// One open connection, split into its write and read halves.
pub struct Connection {
    pub sink: Box<dyn FrameSink>,
    pub frames: FrameStream,
}

impl Connection {
    /// Assemble a connection from its halves.
    #[must_use]
    pub fn new(sink: Box<dyn FrameSink>, frames: FrameStream) -> Self {
        Self { sink, frames }
    }
}

/// Trait for opening connections to a server endpoint.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a connection to `endpoint`.
    async fn connect(&self, endpoint: &str) -> Result<Connection, TransportError>;
}
