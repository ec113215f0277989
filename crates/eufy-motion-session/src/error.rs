//! Session error.

use eufy_motion_core::{ConfigError, TransportError};
use eufy_motion_transport::{DecodeError, EncodeError};
use thiserror::Error;

/// Reason a connection attempt ended.
///
/// Every variant is handled the same way by the supervisor: the attempt's
/// resources are released and a new attempt starts after the retry delay.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
    #[error("Connection closed (code: {code:?}, reason: {reason:?})")]
    Closed { code: Option<u16>, reason: String },
}
