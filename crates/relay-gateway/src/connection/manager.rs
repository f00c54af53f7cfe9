//! Local connection table
//!
//! Connections whose sockets live on this instance, keyed by connection id.

use dashmap::DashMap;
use std::sync::Arc;

use super::LocalConnection;

/// Thread-safe table of this instance's connections
#[derive(Debug, Default)]
pub struct ConnectionManager {
    connections: DashMap<String, Arc<LocalConnection>>,
}

impl ConnectionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn insert(&self, connection: Arc<LocalConnection>) {
        tracing::debug!(connection_id = %connection.id(), "Local connection added");
        self.connections
            .insert(connection.id().to_string(), connection);
    }

    pub fn remove(&self, connection_id: &str) -> Option<Arc<LocalConnection>> {
        let removed = self.connections.remove(connection_id).map(|(_, c)| c);
        if removed.is_some() {
            tracing::debug!(connection_id = %connection_id, "Local connection removed");
        }
        removed
    }

    pub fn get(&self, connection_id: &str) -> Option<Arc<LocalConnection>> {
        self.connections.get(connection_id).map(|c| c.clone())
    }

    pub fn contains(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Snapshot of active connections
    pub fn active(&self) -> Vec<Arc<LocalConnection>> {
        self.connections
            .iter()
            .filter(|c| c.is_active())
            .map(|c| c.clone())
            .collect()
    }

    /// Active connections whose current channel is `channel`
    pub fn subscribed_to(&self, channel: &str) -> Vec<Arc<LocalConnection>> {
        self.connections
            .iter()
            .filter(|c| c.is_active() && c.channel() == channel)
            .map(|c| c.clone())
            .collect()
    }

    pub fn count_for_user(&self, user_id: &str) -> usize {
        self.connections
            .iter()
            .filter(|c| c.user_id() == user_id)
            .count()
    }

    /// Close every connection; used on shutdown
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for connection in self.connections.iter() {
            connection.close();
            closed += 1;
        }
        closed
    }
}
