//! Store, bus, and session ports
//!
//! Every gateway component receives these as `Arc<dyn Trait>` at construction.
//! Each store method maps to a single atomic primitive on the backing store;
//! callers never rely on multi-key transactions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::broadcast;

use crate::entities::SessionIdentity;
use crate::error::DomainError;

/// Result type for store and bus operations
pub type StoreResult<T> = Result<T, DomainError>;

// ============================================================================
// Connection Store
// ============================================================================

/// Shared key/value store with hash, set, and TTL primitives
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// Set several fields of a hash, creating it if needed
    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()>;

    /// Read every field of a hash (empty when the key is absent)
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;

    /// Read one field of a hash
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;

    /// Delete a key of any type, returning whether it existed
    async fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Add a member to a set
    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Remove a member from a set
    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()>;

    /// List the members of a set (empty when the key is absent)
    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>>;

    /// Set a key's TTL; returns false when the key does not exist
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// List keys matching a `prefix*` glob pattern
    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>>;

    /// Round-trip check used by readiness probes
    async fn ping(&self) -> StoreResult<()>;
}

// ============================================================================
// Fan-Out Bus
// ============================================================================

/// Process-external publish/subscribe transport
#[async_trait]
pub trait FanOutBus: Send + Sync {
    /// Publish a payload to a topic, returning the number of receivers reached
    async fn publish(&self, topic: &str, payload: &str) -> StoreResult<usize>;

    /// Start receiving payloads published to a topic
    async fn subscribe(&self, topic: &str) -> StoreResult<broadcast::Receiver<String>>;

    /// Stop receiving a topic once no local receiver remains
    async fn unsubscribe(&self, topic: &str) -> StoreResult<()>;
}

// ============================================================================
// Session Validator
// ============================================================================

/// Boundary with the external session-issuing service
#[async_trait]
pub trait SessionValidator: Send + Sync {
    /// Resolve a session token to an identity, or reject it
    async fn validate(&self, session_token: &str) -> Result<SessionIdentity, DomainError>;
}
