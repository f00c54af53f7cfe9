//! Test fixtures and data generators

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique suffix for tokens, users, and channels
pub fn unique_suffix() -> u64 {
    COUNTER.fetch_add(1, Ordering::SeqCst)
}

/// A session the fake session service has issued
#[derive(Debug, Clone)]
pub struct TestSession {
    pub token: String,
    pub user_id: String,
}

impl TestSession {
    pub fn unique() -> Self {
        let suffix = unique_suffix();
        Self {
            token: format!("tok-{suffix}-{}", uuid::Uuid::new_v4()),
            user_id: format!("user{suffix}"),
        }
    }

    pub fn named(token: &str, user_id: &str) -> Self {
        Self {
            token: token.to_string(),
            user_id: user_id.to_string(),
        }
    }
}

/// Client envelope frame
pub fn envelope(channel: &str, intent: &str, payload: Value) -> Value {
    json!({
        "channel": channel,
        "intent": intent,
        "payload": payload,
    })
}

/// POST /soa/publish_to_channel body
#[derive(Debug, Serialize)]
pub struct PublishRequest {
    pub channel: String,
    pub message: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub realm: Option<String>,
}

impl PublishRequest {
    pub fn new(channel: &str, message: Value) -> Self {
        Self {
            channel: channel.to_string(),
            message,
            realm: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    pub status: String,
    pub channel: String,
}

/// POST /soa/get_endpoint body
#[derive(Debug, Serialize)]
pub struct GetEndpointRequest {
    pub session_token: String,
    pub realm: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GetEndpointResponse {
    pub websocket_url: String,
    pub channels: Vec<String>,
    pub message_format: Value,
}

#[derive(Debug, Deserialize)]
pub struct ConnectionCountResponse {
    pub total: usize,
    pub by_channel: std::collections::BTreeMap<String, usize>,
}
