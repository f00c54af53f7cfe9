//! Session tokens looked up in the shared store
//!
//! The session service writes one `session:{token}` hash per issued token
//! with at least a `user_id` field.

use async_trait::async_trait;
use relay_core::{ConnectionStore, DomainError, SessionIdentity, SessionValidator};
use std::sync::Arc;
use std::time::Duration;

pub const SESSION_PREFIX: &str = "session:";

#[must_use]
pub fn session_key(token: &str) -> String {
    format!("{SESSION_PREFIX}{token}")
}

/// Validates tokens against session hashes in the connection store
#[derive(Clone)]
pub struct StoreSessionValidator {
    store: Arc<dyn ConnectionStore>,
}

impl std::fmt::Debug for StoreSessionValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreSessionValidator").finish()
    }
}

impl StoreSessionValidator {
    #[must_use]
    pub fn new(store: Arc<dyn ConnectionStore>) -> Self {
        Self { store }
    }

    /// Write a session hash the way the session service does
    ///
    /// Used by tooling and tests; the gateway only ever reads sessions.
    pub async fn issue(
        &self,
        token: &str,
        identity: &SessionIdentity,
        ttl: Duration,
    ) -> Result<(), DomainError> {
        let key = session_key(token);
        let mut fields = vec![("user_id", identity.user_id.clone())];
        if let Some(tenant) = &identity.tenant_id {
            fields.push(("tenant_id", tenant.clone()));
        }
        self.store.hash_set(&key, &fields).await?;
        self.store.expire(&key, ttl).await?;
        Ok(())
    }
}

#[async_trait]
impl SessionValidator for StoreSessionValidator {
    async fn validate(&self, session_token: &str) -> Result<SessionIdentity, DomainError> {
        if session_token.is_empty() {
            return Err(DomainError::InvalidSession("empty token".to_string()));
        }

        let mut session = self.store.hash_get_all(&session_key(session_token)).await?;
        let user_id = session
            .remove("user_id")
            .filter(|u| !u.is_empty())
            .ok_or_else(|| DomainError::InvalidSession("unknown session".to_string()))?;
        let tenant_id = session.remove("tenant_id").filter(|t| !t.is_empty());

        Ok(SessionIdentity { user_id, tenant_id })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryConnectionStore;

    #[tokio::test]
    async fn test_issued_session_validates() {
        let store = Arc::new(MemoryConnectionStore::new());
        let validator = StoreSessionValidator::new(store);
        let identity = SessionIdentity::new("u1").with_tenant("acme");

        validator
            .issue("tok1", &identity, Duration::from_secs(60))
            .await
            .unwrap();

        assert_eq!(validator.validate("tok1").await.unwrap(), identity);
    }

    #[tokio::test]
    async fn test_unknown_token_rejected() {
        let validator = StoreSessionValidator::new(Arc::new(MemoryConnectionStore::new()));
        let err = validator.validate("nope").await.unwrap_err();
        assert!(err.is_authentication());
        assert!(validator.validate("").await.unwrap_err().is_authentication());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_rejected() {
        let store = Arc::new(MemoryConnectionStore::new());
        let validator = StoreSessionValidator::new(store);
        validator
            .issue("tok1", &SessionIdentity::new("u1"), Duration::from_secs(5))
            .await
            .unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        assert!(validator.validate("tok1").await.is_err());
    }

    #[tokio::test]
    async fn test_store_outage_is_not_an_auth_failure() {
        let store = Arc::new(MemoryConnectionStore::new());
        store.set_available(false);
        let validator = StoreSessionValidator::new(store);

        let err = validator.validate("tok1").await.unwrap_err();
        assert!(err.is_unavailable());
        assert!(!err.is_authentication());
    }
}
