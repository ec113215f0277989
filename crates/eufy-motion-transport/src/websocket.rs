//! WebSocket client transport.

use async_trait::async_trait;
use bytes::Bytes;
use eufy_motion_core::{Connection, Connector, FrameSink, InboundFrame, TransportError};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Message, protocol::CloseFrame},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connector that opens `ws://` / `wss://` connections.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl WsConnector {
    /// Create a new connector.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, endpoint: &str) -> Result<Connection, TransportError> {
        let (ws_stream, _response) = connect_async(endpoint)
            .await
            .map_err(|e| TransportError::ConnectFailed(e.to_string()))?;
        tracing::debug!(%endpoint, "WebSocket connected");

        let (sender, receiver) = ws_stream.split();

        let frames = receiver
            .filter_map(|msg| async move {
                match msg {
                    Ok(Message::Text(text)) => {
                        Some(Ok(InboundFrame::Text(text.as_str().to_owned())))
                    }
                    Ok(Message::Binary(data)) => Some(
                        String::from_utf8(data.to_vec())
                            .map(InboundFrame::Text)
                            .map_err(|e| {
                                TransportError::Protocol(format!("binary frame is not UTF-8: {e}"))
                            }),
                    ),
                    Ok(Message::Close(frame)) => Some(Ok(closed(frame))),
                    Ok(_) => None,
                    Err(e) => Some(Err(TransportError::Protocol(e.to_string()))),
                }
            })
            .boxed();

        Ok(Connection::new(Box::new(WsSink { sender }), frames))
    }
}

fn closed(frame: Option<CloseFrame>) -> InboundFrame {
    match frame {
        Some(frame) => InboundFrame::Closed {
            code: Some(u16::from(frame.code)),
            reason: frame.reason.as_str().to_owned(),
        },
        None => InboundFrame::Closed {
            code: None,
            reason: String::new(),
        },
    }
}

struct WsSink {
    sender: SplitSink<WsStream, Message>,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send_text(&mut self, text: String) -> Result<(), TransportError> {
        self.sender
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    async fn ping(&mut self) -> Result<(), TransportError> {
        self.sender
            .send(Message::Ping(Bytes::new()))
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))
    }
}
