//! Connection record entity
//!
//! One record per live client connection, stored as a flat hash in the
//! connection store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};

use super::SessionIdentity;
use crate::error::DomainError;

/// Hash field names used when a record is written to the store
pub mod fields {
    pub const CONNECTION_ID: &str = "connection_id";
    pub const SESSION_TOKEN: &str = "session_token";
    pub const USER_ID: &str = "user_id";
    pub const TENANT_ID: &str = "tenant_id";
    pub const CHANNEL: &str = "channel";
    pub const CONNECTED_AT: &str = "connected_at";
    pub const LAST_ACTIVITY: &str = "last_activity";
    pub const LAST_HEARTBEAT: &str = "last_heartbeat";
    pub const GATEWAY_INSTANCE_ID: &str = "gateway_instance_id";
    pub const METADATA: &str = "metadata";
}

/// A live client connection as seen by every gateway instance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionRecord {
    pub connection_id: String,
    pub session_token: String,
    pub user_id: String,
    pub tenant_id: Option<String>,
    /// Last channel the connection explicitly subscribed to
    pub channel: String,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    pub last_heartbeat: DateTime<Utc>,
    /// Instance holding the socket
    pub gateway_instance_id: String,
    /// Opaque application metadata, never interpreted by the gateway
    pub metadata: Map<String, Value>,
}

impl ConnectionRecord {
    /// Create a fresh record for a connection that just authenticated
    #[must_use]
    pub fn new(
        connection_id: impl Into<String>,
        session_token: impl Into<String>,
        identity: &SessionIdentity,
        channel: impl Into<String>,
        gateway_instance_id: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            connection_id: connection_id.into(),
            session_token: session_token.into(),
            user_id: identity.user_id.clone(),
            tenant_id: identity.tenant_id.clone(),
            channel: channel.into(),
            connected_at: now,
            last_activity: now,
            last_heartbeat: now,
            gateway_instance_id: gateway_instance_id.into(),
            metadata: Map::new(),
        }
    }

    /// Attach opaque metadata
    #[must_use]
    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    /// Flatten into hash fields
    #[must_use]
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        vec![
            (fields::CONNECTION_ID, self.connection_id.clone()),
            (fields::SESSION_TOKEN, self.session_token.clone()),
            (fields::USER_ID, self.user_id.clone()),
            (
                fields::TENANT_ID,
                self.tenant_id.clone().unwrap_or_default(),
            ),
            (fields::CHANNEL, self.channel.clone()),
            (fields::CONNECTED_AT, self.connected_at.to_rfc3339()),
            (fields::LAST_ACTIVITY, self.last_activity.to_rfc3339()),
            (fields::LAST_HEARTBEAT, self.last_heartbeat.to_rfc3339()),
            (
                fields::GATEWAY_INSTANCE_ID,
                self.gateway_instance_id.clone(),
            ),
            (
                fields::METADATA,
                Value::Object(self.metadata.clone()).to_string(),
            ),
        ]
    }

    /// Rebuild a record from the hash fields read back from the store
    pub fn from_fields(mut map: HashMap<String, String>) -> Result<Self, DomainError> {
        let mut take = |name: &'static str| {
            map.remove(name)
                .ok_or_else(|| DomainError::CorruptRecord(format!("missing field `{name}`")))
        };

        let connection_id = take(fields::CONNECTION_ID)?;
        let session_token = take(fields::SESSION_TOKEN)?;
        let user_id = take(fields::USER_ID)?;
        let tenant_id = take(fields::TENANT_ID).ok().filter(|t| !t.is_empty());
        let channel = take(fields::CHANNEL)?;
        let connected_at = parse_timestamp(fields::CONNECTED_AT, &take(fields::CONNECTED_AT)?)?;
        let last_activity = parse_timestamp(fields::LAST_ACTIVITY, &take(fields::LAST_ACTIVITY)?)?;
        let last_heartbeat =
            parse_timestamp(fields::LAST_HEARTBEAT, &take(fields::LAST_HEARTBEAT)?)?;
        let gateway_instance_id = take(fields::GATEWAY_INSTANCE_ID)?;
        let metadata = match take(fields::METADATA) {
            Ok(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(Value::Object(map)) => map,
                _ => Map::new(),
            },
            Err(_) => Map::new(),
        };

        Ok(Self {
            connection_id,
            session_token,
            user_id,
            tenant_id,
            channel,
            connected_at,
            last_activity,
            last_heartbeat,
            gateway_instance_id,
            metadata,
        })
    }
}

fn parse_timestamp(field: &str, raw: &str) -> Result<DateTime<Utc>, DomainError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| DomainError::CorruptRecord(format!("bad `{field}`: {e}")))
}

/// Diagnostic snapshot of registered connections
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionCount {
    pub total: usize,
    pub by_channel: BTreeMap<String, usize>,
}
