//! Gateway error types

use relay_core::{DomainError, EnvelopeError};
use thiserror::Error;

/// Failure modes of a single connection or channel
///
/// None of these terminate the process.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Session token rejected; no state was created
    #[error("Authentication failed: {0}")]
    AuthenticationFailure(String),

    /// Per-user connection limit reached
    #[error("Connection limit reached: {0}")]
    ConnectionLimit(String),

    /// Frame could not be decoded; the connection stays open
    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    /// Connection store or fan-out bus unreachable
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// Oldest queued message dropped to make room
    #[error("Queue overflow on channel {0}")]
    QueueOverflow(String),

    /// Channel breaker is open; message rejected
    #[error("Circuit open on channel {0}")]
    CircuitOpen(String),

    /// Client stopped answering heartbeats
    #[error("Heartbeat timeout")]
    HeartbeatTimeout,

    /// Target connection is already closing
    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Whether the connection must be closed after reporting this error
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::AuthenticationFailure(_)
                | Self::ConnectionLimit(_)
                | Self::HeartbeatTimeout
                | Self::ConnectionClosed
        )
    }

    /// Dropped-message outcomes; counted, never reported to the client
    pub fn is_drop(&self) -> bool {
        matches!(self, Self::QueueOverflow(_) | Self::CircuitOpen(_))
    }

    /// Metric label for this error
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthenticationFailure(_) => "authentication_failure",
            Self::ConnectionLimit(_) => "connection_limit",
            Self::MalformedMessage(_) => "malformed_message",
            Self::StoreUnavailable(_) => "store_unavailable",
            Self::QueueOverflow(_) => "queue_overflow",
            Self::CircuitOpen(_) => "circuit_open",
            Self::HeartbeatTimeout => "heartbeat_timeout",
            Self::ConnectionClosed => "connection_closed",
            Self::Internal(_) => "internal",
        }
    }

    /// Text sent to the client in an error frame
    pub fn client_message(&self) -> String {
        match self {
            Self::StoreUnavailable(_) => "Service temporarily unavailable".to_string(),
            Self::Internal(_) => "Internal error".to_string(),
            other => other.to_string(),
        }
    }
}

impl From<DomainError> for GatewayError {
    fn from(err: DomainError) -> Self {
        match err {
            e if e.is_authentication() => Self::AuthenticationFailure(e.to_string()),
            e if e.is_unavailable() => Self::StoreUnavailable(e.to_string()),
            DomainError::ConnectionLimit(msg) => Self::ConnectionLimit(msg),
            DomainError::ValidationError(msg) => Self::MalformedMessage(msg),
            other => Self::Internal(other.to_string()),
        }
    }
}

impl From<EnvelopeError> for GatewayError {
    fn from(err: EnvelopeError) -> Self {
        Self::MalformedMessage(err.to_string())
    }
}

/// Gateway result type
pub type GatewayResult<T> = Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_mapping() {
        assert!(matches!(
            GatewayError::from(DomainError::SessionExpired),
            GatewayError::AuthenticationFailure(_)
        ));
        assert!(matches!(
            GatewayError::from(DomainError::StoreUnavailable("down".to_string())),
            GatewayError::StoreUnavailable(_)
        ));
        assert!(matches!(
            GatewayError::from(DomainError::ConnectionLimit("5".to_string())),
            GatewayError::ConnectionLimit(_)
        ));
    }

    #[test]
    fn test_malformed_message_is_recoverable() {
        let err = GatewayError::from(EnvelopeError::MissingField("channel"));
        assert!(!err.is_fatal());
        assert_eq!(err.kind(), "malformed_message");
        assert!(err.client_message().contains("channel"));
    }

    #[test]
    fn test_store_details_hidden_from_client() {
        let err = GatewayError::StoreUnavailable("redis://secret@host refused".to_string());
        assert!(!err.client_message().contains("secret"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_drops_are_not_fatal() {
        assert!(GatewayError::QueueOverflow("guide".to_string()).is_drop());
        assert!(!GatewayError::CircuitOpen("guide".to_string()).is_fatal());
        assert!(GatewayError::HeartbeatTimeout.is_fatal());
    }
}
