//! Supervised eufy-security-ws session for one watched device.
//!
//! Provides:
//! - `MotionSession` - Connect, handshake, stream and reconnect forever
//! - `Handshake` - Schema negotiation then event subscription
//! - `EventDispatcher` - Motion events to `MotionState`
//! - `LivenessProber` - Periodic pings on a live connection

pub mod dispatcher;
pub mod error;
pub mod handshake;
pub mod prober;
pub mod supervisor;

pub use dispatcher::EventDispatcher;
pub use error::SessionError;
pub use handshake::{Handshake, HandshakeState};
pub use prober::LivenessProber;
pub use supervisor::{MotionSession, SupervisorOptions, SupervisorState};

#[cfg(feature = "websocket")]
pub use eufy_motion_transport::WsConnector;
