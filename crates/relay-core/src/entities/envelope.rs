//! Message envelope exchanged over the client socket

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Inbound wire unit. The payload is opaque to the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    pub channel: String,
    pub intent: String,
    #[serde(default = "empty_payload")]
    pub payload: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

fn empty_payload() -> Value {
    Value::Object(serde_json::Map::new())
}

/// Reasons an inbound frame is not a usable envelope
#[derive(Debug, Error)]
pub enum EnvelopeError {
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Payload must be a JSON object")]
    PayloadNotObject,
}

impl MessageEnvelope {
    #[must_use]
    pub fn new(channel: impl Into<String>, intent: impl Into<String>, payload: Value) -> Self {
        Self {
            channel: channel.into(),
            intent: intent.into(),
            payload,
            conversation_id: None,
            correlation_id: None,
        }
    }

    /// Decode and validate an envelope from a JSON value
    pub fn from_value(value: Value) -> Result<Self, EnvelopeError> {
        let envelope: Self = serde_json::from_value(value)?;
        envelope.validate()?;
        Ok(envelope)
    }

    /// Decode and validate an envelope from raw text
    pub fn from_json(text: &str) -> Result<Self, EnvelopeError> {
        Self::from_value(serde_json::from_str(text)?)
    }

    fn validate(&self) -> Result<(), EnvelopeError> {
        if self.channel.trim().is_empty() {
            return Err(EnvelopeError::MissingField("channel"));
        }
        if self.intent.trim().is_empty() {
            return Err(EnvelopeError::MissingField("intent"));
        }
        if !self.payload.is_object() {
            return Err(EnvelopeError::PayloadNotObject);
        }
        Ok(())
    }
}
