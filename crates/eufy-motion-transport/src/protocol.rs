//! Wire protocol for the eufy-security-ws server.
//!
//! Outgoing commands are flat JSON objects carrying a string `messageId`
//! and a `command` discriminator. Inbound frames are JSON objects that are
//! either command results (correlated by `messageId`) or event
//! notifications (`type: "event"`).

use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use thiserror::Error;

/// API schema version negotiated with `set_api_schema`.
pub const API_SCHEMA_VERSION: u32 = 7;

/// `event` value of a device property change.
pub const EVENT_PROPERTY_CHANGED: &str = "property changed";

/// Property name carrying the motion flag.
pub const PROPERTY_MOTION_DETECTED: &str = "motionDetected";

/// Command sent to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    /// Negotiate the API schema version.
    SetApiSchema {
        #[serde(rename = "schemaVersion")]
        schema_version: u32,
    },
    /// Subscribe to the event stream.
    StartListening,
}

/// Command with its correlation id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutgoingMessage {
    #[serde(rename = "messageId", serialize_with = "serialize_message_id")]
    pub message_id: u64,
    #[serde(flatten)]
    pub command: Command,
}

impl OutgoingMessage {
    /// Schema negotiation at the current [`API_SCHEMA_VERSION`].
    #[must_use]
    pub const fn set_api_schema(message_id: u64) -> Self {
        Self {
            message_id,
            command: Command::SetApiSchema {
                schema_version: API_SCHEMA_VERSION,
            },
        }
    }

    /// Event stream subscription.
    #[must_use]
    pub const fn start_listening(message_id: u64) -> Self {
        Self {
            message_id,
            command: Command::StartListening,
        }
    }
}

fn serialize_message_id<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(id)
}

/// Encode error.
#[derive(Debug, Error)]
#[error("Failed to encode message: {0}")]
pub struct EncodeError(#[from] serde_json::Error);

/// Decode error. Fatal for the connection that produced the frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
    #[error("Frame is not a JSON object")]
    NotAnObject,
    #[error("Event frame has no event object")]
    MissingEventBody,
}

/// Device event carried by an inbound `type: "event"` frame.
///
/// Fields are read leniently: a field that is missing or not a string is
/// `None`, so unrelated events with unexpected shapes never fail decoding.
#[derive(Debug, Clone, PartialEq)]
pub struct EventNotification {
    /// Emitter kind (`device`, `station`, `driver`).
    pub source: Option<String>,
    /// Event name, e.g. `property changed`.
    pub event: Option<String>,
    pub serial_number: Option<String>,
    /// Property name for property events.
    pub name: Option<String>,
    pub value: Value,
}

impl EventNotification {
    fn from_object(event: &Map<String, Value>) -> Self {
        let text = |key: &str| event.get(key).and_then(Value::as_str).map(str::to_owned);
        Self {
            source: text("source"),
            event: text("event"),
            serial_number: text("serialNumber"),
            name: text("name"),
            value: event.get("value").cloned().unwrap_or(Value::Null),
        }
    }

    /// Whether this is a change of the `motionDetected` property.
    #[must_use]
    pub fn is_motion_change(&self) -> bool {
        self.event.as_deref() == Some(EVENT_PROPERTY_CHANGED)
            && self.name.as_deref() == Some(PROPERTY_MOTION_DETECTED)
    }

    /// The event value coerced to a boolean.
    #[must_use]
    pub fn value_as_bool(&self) -> bool {
        coerce_bool(&self.value)
    }
}

/// Decoded message body.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Event notification.
    Event(EventNotification),
    /// Result of a previously sent command.
    Result { success: Option<bool> },
    /// Anything else (version banner, unknown types).
    Other,
}

/// Decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope {
    /// Correlation id, if the frame carries a numeric one.
    pub message_id: Option<u64>,
    pub body: Inbound,
}

#[derive(Deserialize)]
struct RawFrame {
    #[serde(rename = "messageId")]
    message_id: Option<Value>,
    #[serde(rename = "type")]
    kind: Option<String>,
    success: Option<Value>,
    event: Option<Value>,
}

/// Encode an outgoing message to JSON text.
///
/// # Errors
/// Returns error if serialization fails.
pub fn encode(message: &OutgoingMessage) -> Result<String, EncodeError> {
    Ok(serde_json::to_string(message)?)
}

/// Decode an inbound JSON frame.
///
/// # Errors
/// Returns error if the frame is not a JSON object, or if it is an event
/// frame without an event object.
pub fn decode(text: &str) -> Result<Envelope, DecodeError> {
    let value: Value = serde_json::from_str(text)?;
    if !value.is_object() {
        return Err(DecodeError::NotAnObject);
    }
    let raw: RawFrame = serde_json::from_value(value)?;

    let message_id = raw.message_id.as_ref().and_then(parse_message_id);
    let body = match raw.kind.as_deref() {
        Some("event") => {
            let event = raw
                .event
                .as_ref()
                .and_then(Value::as_object)
                .ok_or(DecodeError::MissingEventBody)?;
            Inbound::Event(EventNotification::from_object(event))
        }
        Some("result") => Inbound::Result {
            success: raw.success.as_ref().and_then(Value::as_bool),
        },
        _ => Inbound::Other,
    };

    Ok(Envelope { message_id, body })
}

/// Message ids are sent as strings but servers may echo either form.
fn parse_message_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose truthiness for property values.
#[must_use]
pub fn coerce_bool(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}
