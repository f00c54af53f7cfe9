//! Key layout of the connection registry

/// Prefix of connection record hashes
pub const CONNECTION_PREFIX: &str = "conn:";
/// Pattern matching every connection record
pub const CONNECTION_PATTERN: &str = "conn:*";

#[must_use]
pub fn connection_key(connection_id: &str) -> String {
    format!("{CONNECTION_PREFIX}{connection_id}")
}

/// Set of connection ids currently subscribed to a channel
#[must_use]
pub fn channel_index_key(channel: &str) -> String {
    format!("channel:{channel}:conns")
}

/// Set of connection ids owned by a user
#[must_use]
pub fn user_index_key(user_id: &str) -> String {
    format!("user:{user_id}:conns")
}

/// Set of connection ids held by a gateway instance
#[must_use]
pub fn gateway_index_key(instance_id: &str) -> String {
    format!("gateway:{instance_id}:conns")
}
