//! Gateway frame format
//!
//! Server frames carry a `type` tag. Client frames are either a heartbeat
//! acknowledgment or a message envelope.

use chrono::Utc;
use relay_core::{EnvelopeError, MessageEnvelope};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Frames originated by the gateway itself
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// Welcome frame, always the first frame of an accepted connection
    System {
        connection_id: String,
        message: String,
    },
    /// Recoverable or fatal error report
    Error { message: String },
    /// Liveness probe; clients answer with `heartbeat_ack`
    Heartbeat { timestamp: String },
}

impl ServerFrame {
    #[must_use]
    pub fn welcome(connection_id: impl Into<String>) -> Self {
        Self::System {
            connection_id: connection_id.into(),
            message: "Connected".to_string(),
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn heartbeat() -> Self {
        Self::Heartbeat {
            timestamp: Utc::now().to_rfc3339(),
        }
    }

    /// Serialize to JSON text
    #[must_use]
    pub fn to_json(&self) -> String {
        // Only string fields; serialization cannot fail
        serde_json::to_string(self).unwrap_or_default()
    }
}

/// Frames accepted from clients
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    HeartbeatAck,
    Envelope(MessageEnvelope),
}

impl ClientFrame {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, EnvelopeError> {
        let value: Value = serde_json::from_str(text)?;

        if value.get("type").and_then(Value::as_str) == Some("heartbeat_ack") {
            return Ok(Self::HeartbeatAck);
        }

        MessageEnvelope::from_value(value).map(Self::Envelope)
    }
}

/// Body services publish on a channel's fan-out topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BroadcastMessage {
    pub channel: String,
    pub message: Value,
}

/// Body the gateway publishes on a channel's service topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub connection_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    pub envelope: MessageEnvelope,
}
