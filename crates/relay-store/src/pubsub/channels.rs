//! Pub/Sub topic definitions.
//!
//! Defines the topic naming conventions shared by every gateway instance
//! and the application services behind them.

/// Topic prefix for channel broadcasts delivered to clients
pub const FANOUT_TOPIC_PREFIX: &str = "fanout:";
/// Topic prefix for inbound client messages dispatched to services
pub const SERVICE_TOPIC_PREFIX: &str = "service:";

/// Pub/Sub topic types
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PubSubChannel {
    /// Broadcasts addressed to every connection subscribed to a channel
    Fanout(String),
    /// Client messages for the services handling a channel
    Service(String),
    /// Custom topic name
    Custom(String),
}

impl PubSubChannel {
    /// Create a fan-out topic for a channel
    #[must_use]
    pub fn fanout(channel: impl Into<String>) -> Self {
        Self::Fanout(channel.into())
    }

    /// Create a service dispatch topic for a channel
    #[must_use]
    pub fn service(channel: impl Into<String>) -> Self {
        Self::Service(channel.into())
    }

    /// Create a custom topic
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self::Custom(name.into())
    }

    /// Get the bus topic name
    #[must_use]
    pub fn name(&self) -> String {
        match self {
            Self::Fanout(channel) => format!("{FANOUT_TOPIC_PREFIX}{channel}"),
            Self::Service(channel) => format!("{SERVICE_TOPIC_PREFIX}{channel}"),
            Self::Custom(name) => name.clone(),
        }
    }

    /// Parse a topic name back to a `PubSubChannel`
    #[must_use]
    pub fn parse(name: &str) -> Self {
        if let Some(channel) = name.strip_prefix(FANOUT_TOPIC_PREFIX) {
            if !channel.is_empty() {
                return Self::Fanout(channel.to_string());
            }
        }

        if let Some(channel) = name.strip_prefix(SERVICE_TOPIC_PREFIX) {
            if !channel.is_empty() {
                return Self::Service(channel.to_string());
            }
        }

        Self::Custom(name.to_string())
    }
}

impl std::fmt::Display for PubSubChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}
