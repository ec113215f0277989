//! Transport layer for eufy-security-ws.
//!
//! Provides:
//! - Wire protocol (JSON commands and inbound envelopes)
//! - WebSocket client connector (feature: websocket)
//! - In-memory connector for tests (feature: memory)

pub mod protocol;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "websocket")]
pub mod websocket;

pub use protocol::{
    API_SCHEMA_VERSION, Command, DecodeError, EncodeError, Envelope, EventNotification, Inbound,
    OutgoingMessage, decode, encode,
};

#[cfg(feature = "websocket")]
pub use websocket::WsConnector;
