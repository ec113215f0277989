//! Routes decoded messages to the handshake and the motion flag.

use eufy_motion_core::MotionState;
use eufy_motion_transport::{Envelope, EventNotification, Inbound, OutgoingMessage};

use crate::handshake::Handshake;

/// Per-connection message dispatcher.
///
/// Does not touch the transport: replies the handshake wants sent are
/// returned to the caller.
#[derive(Debug)]
pub struct EventDispatcher {
    watched_entity_id: String,
    motion: MotionState,
    handshake: Handshake,
}

impl EventDispatcher {
    /// Create a dispatcher for one connection.
    #[must_use]
    pub fn new(watched_entity_id: impl Into<String>, motion: MotionState) -> Self {
        Self {
            watched_entity_id: watched_entity_id.into(),
            motion,
            handshake: Handshake::new(),
        }
    }

    /// Handshake for this connection.
    #[must_use]
    pub const fn handshake(&self) -> &Handshake {
        &self.handshake
    }

    /// Mutable handshake for this connection.
    pub fn handshake_mut(&mut self) -> &mut Handshake {
        &mut self.handshake
    }

    /// Handle one decoded message.
    ///
    /// Returns a message to send if the handshake advanced.
    pub fn handle(&mut self, envelope: &Envelope) -> Option<OutgoingMessage> {
        let reply = self.handshake.on_message(envelope);

        if let Inbound::Event(event) = &envelope.body {
            self.apply_event(event);
        }

        reply
    }

    fn apply_event(&self, event: &EventNotification) {
        if !event.is_motion_change() {
            return;
        }
        if event.serial_number.as_deref() != Some(self.watched_entity_id.as_str()) {
            return;
        }

        let detected = event.value_as_bool();
        let previous = self.motion.set(detected);
        if previous == detected {
            tracing::debug!(entity = %self.watched_entity_id, detected, "motion state unchanged");
        } else {
            tracing::info!(
                entity = %self.watched_entity_id,
                from = previous,
                to = detected,
                "motion state changed"
            );
        }
    }
}
