//! Domain errors - error types for the domain layer

use thiserror::Error;

/// Domain layer errors
#[derive(Debug, Error)]
pub enum DomainError {
    // =========================================================================
    // Session Errors
    // =========================================================================
    #[error("Invalid session token: {0}")]
    InvalidSession(String),

    #[error("Session token expired")]
    SessionExpired,

    // =========================================================================
    // Validation Errors
    // =========================================================================
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Connection limit reached: {0}")]
    ConnectionLimit(String),

    // =========================================================================
    // Store Errors
    // =========================================================================
    #[error("Connection store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Corrupt connection record: {0}")]
    CorruptRecord(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl DomainError {
    /// Get an error code string for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidSession(_) => "INVALID_SESSION",
            Self::SessionExpired => "SESSION_EXPIRED",
            Self::ValidationError(_) => "VALIDATION_ERROR",
            Self::ConnectionLimit(_) => "CONNECTION_LIMIT",
            Self::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            Self::CorruptRecord(_) => "CORRUPT_RECORD",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }

    /// Rejections of the presented session token
    pub fn is_authentication(&self) -> bool {
        matches!(self, Self::InvalidSession(_) | Self::SessionExpired)
    }

    /// Failures that go away once the backing store is reachable again
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::ValidationError(_) | Self::ConnectionLimit(_))
    }
}
