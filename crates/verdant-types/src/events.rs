use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::MessageResponse;
use crate::models::ContentType;

/// Events sent over the realtime gateway, server to client.
///
/// Wire shape is flat: `{"type": "<snake_case name>", ...fields}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GatewayEvent {
    /// Channel registered for this identity
    ConnectionEstablished { user_id: Uuid },

    /// A message addressed to the receiving user
    NewMessage { message: MessageResponse },

    /// Echo to the sender once the message is persisted
    MessageSent { message: MessageResponse },

    /// A friend started or stopped typing to the receiving user
    TypingIndicator { user_id: Uuid, is_typing: bool },

    /// Read receipt for a message the receiving user sent
    MessageRead { message_id: Uuid, read_by: Uuid },

    /// The sender deleted a message addressed to the receiving user
    MessageDeleted { message_id: Uuid },

    Pong { timestamp: DateTime<Utc> },

    /// In-band failure report. The channel stays open.
    Error { message: String },

    /// Server notice sent to every live channel
    SystemMessage {
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl GatewayEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    /// Wire discriminator, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ConnectionEstablished { .. } => "connection_established",
            Self::NewMessage { .. } => "new_message",
            Self::MessageSent { .. } => "message_sent",
            Self::TypingIndicator { .. } => "typing_indicator",
            Self::MessageRead { .. } => "message_read",
            Self::MessageDeleted { .. } => "message_deleted",
            Self::Pong { .. } => "pong",
            Self::Error { .. } => "error",
            Self::SystemMessage { .. } => "system_message",
        }
    }
}

/// Fields of an inbound `send_message`. Everything is optional at the wire
/// level so that missing fields produce an in-band error, not a decode error.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SendMessagePayload {
    pub recipient_id: Option<Uuid>,
    pub content: Option<String>,
    pub message_type: Option<ContentType>,
    pub media_url: Option<String>,
    pub media_size: Option<i64>,
    pub media_duration: Option<f64>,
    pub disappear_after: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TypingPayload {
    pub recipient_id: Option<Uuid>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct MessageReadPayload {
    pub message_id: Option<Uuid>,
    /// Accepted for compatibility. The stored sender is authoritative.
    pub sender_id: Option<Uuid>,
}

/// Commands sent from client to server.
///
/// Decoding is closed: a frame with an unrecognised `type` becomes
/// [`GatewayCommand::Unknown`], never a silent default.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayCommand {
    SendMessage(SendMessagePayload),
    TypingStart(TypingPayload),
    TypingStop(TypingPayload),
    MessageRead(MessageReadPayload),
    Ping,
    Unknown { kind: String },
}

#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid JSON: {0}")]
    Json(#[source] serde_json::Error),
    #[error("frame must be a JSON object")]
    NotAnObject,
    #[error("missing message type")]
    MissingType,
    #[error("invalid {kind} payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

impl GatewayCommand {
    /// Decode one text frame.
    pub fn decode(text: &str) -> Result<Self, DecodeError> {
        let value: Value = serde_json::from_str(text).map_err(DecodeError::Json)?;
        let Value::Object(mut fields) = value else {
            return Err(DecodeError::NotAnObject);
        };
        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(DecodeError::MissingType),
        };
        let payload = Value::Object(fields);

        let command = match kind.as_str() {
            "send_message" => Self::SendMessage(payload_of("send_message", payload)?),
            "typing_start" => Self::TypingStart(payload_of("typing_start", payload)?),
            "typing_stop" => Self::TypingStop(payload_of("typing_stop", payload)?),
            "message_read" => Self::MessageRead(payload_of("message_read", payload)?),
            "ping" => Self::Ping,
            _ => Self::Unknown { kind },
        };
        Ok(command)
    }
}

fn payload_of<T: DeserializeOwned>(kind: &'static str, payload: Value) -> Result<T, DecodeError> {
    serde_json::from_value(payload).map_err(|source| DecodeError::Payload { kind, source })
}
