//! JWT session tokens
//!
//! Validates session tokens issued as HS256 JWTs by the session service,
//! using the `jsonwebtoken` crate.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use relay_core::{DomainError, SessionIdentity, SessionValidator};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// Default lifetime of tokens produced by [`JwtSessionValidator::issue`]
const DEFAULT_TOKEN_EXPIRY_SECS: i64 = 3600;

/// JWT claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Tenant the user acts for
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

impl Claims {
    /// Identity carried by these claims
    #[must_use]
    pub fn identity(&self) -> SessionIdentity {
        SessionIdentity {
            user_id: self.sub.clone(),
            tenant_id: self.tenant_id.clone(),
        }
    }

    /// Check if the token is expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now().timestamp() > self.exp
    }
}

/// Session validator for signed JWT session tokens
#[derive(Clone)]
pub struct JwtSessionValidator {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    token_expiry: i64,
}

impl JwtSessionValidator {
    /// Create a validator sharing `secret` with the session service
    #[must_use]
    pub fn new(secret: &str) -> Self {
        Self::with_expiry(secret, DEFAULT_TOKEN_EXPIRY_SECS)
    }

    /// Create a validator whose issued tokens live `token_expiry` seconds
    #[must_use]
    pub fn with_expiry(secret: &str, token_expiry: i64) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            token_expiry,
        }
    }

    /// Issue a session token for an identity
    ///
    /// The gateway never issues tokens itself; this exists for tooling and tests.
    ///
    /// # Errors
    /// Returns an error if token encoding fails
    pub fn issue(&self, identity: &SessionIdentity) -> Result<String, AppError> {
        let now = Utc::now();
        let claims = Claims {
            sub: identity.user_id.clone(),
            tenant_id: identity.tenant_id.clone(),
            iat: now.timestamp(),
            exp: (now + Duration::seconds(self.token_expiry)).timestamp(),
        };

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to encode JWT")))
    }

    /// Decode and validate a JWT token
    ///
    /// # Errors
    /// Returns an error if the token is invalid or expired
    pub fn decode_token(&self, token: &str) -> Result<Claims, DomainError> {
        let validation = Validation::default();

        let token_data = decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
            match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => DomainError::SessionExpired,
                _ => DomainError::InvalidSession(e.to_string()),
            }
        })?;

        Ok(token_data.claims)
    }
}

#[async_trait]
impl SessionValidator for JwtSessionValidator {
    async fn validate(&self, session_token: &str) -> Result<SessionIdentity, DomainError> {
        let token = session_token.strip_prefix("Bearer ").unwrap_or(session_token);
        let claims = self.decode_token(token)?;

        if claims.sub.is_empty() {
            return Err(DomainError::InvalidSession("empty subject".to_string()));
        }

        Ok(claims.identity())
    }
}

impl std::fmt::Debug for JwtSessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSessionValidator")
            .field("token_expiry", &self.token_expiry)
            .finish()
    }
}
