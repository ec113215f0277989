//! Two-step connection setup: schema negotiation, then event subscription.

use eufy_motion_transport::{Envelope, Inbound, OutgoingMessage};

/// Id of the first message sent on every connection.
pub const FIRST_MESSAGE_ID: u64 = 1;

/// Handshake progress for one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Transport not open yet.
    Idle,
    /// `set_api_schema` sent, waiting for its result.
    AwaitingSchemaAck,
    /// `start_listening` is being sent.
    Subscribing,
    /// Subscribed; events flow.
    Streaming,
}

/// Handshake sequencer.
///
/// Owns the outgoing message-id counter for its connection. A fresh
/// sequencer is created per attempt, so ids restart at
/// [`FIRST_MESSAGE_ID`] on every reconnect.
#[derive(Debug)]
pub struct Handshake {
    state: HandshakeState,
    next_message_id: u64,
    negotiation_id: Option<u64>,
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new()
    }
}

impl Handshake {
    /// Create a sequencer in the `Idle` state.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            state: HandshakeState::Idle,
            next_message_id: FIRST_MESSAGE_ID,
            negotiation_id: None,
        }
    }

    /// Current state.
    #[must_use]
    pub const fn state(&self) -> HandshakeState {
        self.state
    }

    /// Whether the subscription has been sent.
    #[must_use]
    pub fn is_streaming(&self) -> bool {
        self.state == HandshakeState::Streaming
    }

    fn take_message_id(&mut self) -> u64 {
        let id = self.next_message_id;
        self.next_message_id += 1;
        id
    }

    /// Transport opened: returns the schema negotiation to send.
    ///
    /// Returns `None` if the handshake already started.
    pub fn on_open(&mut self) -> Option<OutgoingMessage> {
        if self.state != HandshakeState::Idle {
            return None;
        }
        let id = self.take_message_id();
        self.negotiation_id = Some(id);
        self.state = HandshakeState::AwaitingSchemaAck;
        tracing::debug!(message_id = id, "handshake: negotiating api schema");
        Some(OutgoingMessage::set_api_schema(id))
    }

    /// Inbound message: returns the subscription to send once the
    /// negotiation is acknowledged.
    pub fn on_message(&mut self, envelope: &Envelope) -> Option<OutgoingMessage> {
        match self.state {
            HandshakeState::Idle => {
                tracing::debug!("handshake: message before transport open, ignoring");
                None
            }
            HandshakeState::AwaitingSchemaAck
                if envelope.message_id.is_some() && envelope.message_id == self.negotiation_id =>
            {
                if let Inbound::Result {
                    success: Some(false),
                } = envelope.body
                {
                    tracing::warn!("handshake: server rejected api schema, subscribing anyway");
                }
                let id = self.take_message_id();
                self.state = HandshakeState::Subscribing;
                tracing::debug!(message_id = id, "handshake: starting to listen");
                Some(OutgoingMessage::start_listening(id))
            }
            _ => None,
        }
    }

    /// The subscription was written to the transport.
    pub fn on_subscribe_sent(&mut self) {
        if self.state == HandshakeState::Subscribing {
            self.state = HandshakeState::Streaming;
            tracing::debug!("handshake: streaming");
        }
    }
}
