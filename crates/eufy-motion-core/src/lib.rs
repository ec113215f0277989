//! Core types for eufy motion sessions.
//!
//! This crate provides the building blocks shared by the codec and the
//! session supervisor:
//! - `SessionConfig` / `ConfigHandle` - Endpoint and watched serial number
//! - `MotionState` - Observable motion flag with change notifications
//! - `Connector` / `FrameSink` - Transport seam used by the supervisor

pub mod config;
pub mod motion;
pub mod traits;

pub use config::{ConfigError, ConfigHandle, SessionConfig, SettingDescriptor, SettingKey};
pub use motion::MotionState;
pub use traits::{Connection, Connector, FrameSink, FrameStream, InboundFrame, TransportError};
