//! Connection registry
//!
//! Typed facade over a [`ConnectionStore`]. Every mutating call is a short
//! sequence of independent single-key operations; the indices may go stale
//! but the connection records are authoritative and carry a TTL lease.

use chrono::Utc;
use relay_core::{
    entities::fields, ConnectionCount, ConnectionRecord, ConnectionStore, StoreResult,
};
use std::sync::Arc;
use std::time::Duration;

use super::keys::{
    channel_index_key, connection_key, gateway_index_key, user_index_key, CONNECTION_PATTERN,
};

/// Default lease of a connection record
pub const DEFAULT_CONNECTION_TTL: Duration = Duration::from_secs(3600);

/// Registry of live connections shared by every gateway instance
#[derive(Clone)]
pub struct ConnectionRegistry {
    store: Arc<dyn ConnectionStore>,
    ttl: Duration,
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ConnectionRegistry {
    #[must_use]
    pub fn new(store: Arc<dyn ConnectionStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    #[must_use]
    pub fn with_default_ttl(store: Arc<dyn ConnectionStore>) -> Self {
        Self::new(store, DEFAULT_CONNECTION_TTL)
    }

    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Underlying store, for readiness probes
    #[must_use]
    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.store
    }

    /// Write a connection record and add it to its three indices
    ///
    /// Re-registering an id overwrites the record. If the previous record
    /// pointed at other index keys, the id is removed from those first.
    pub async fn register(&self, record: &ConnectionRecord) -> StoreResult<bool> {
        let key = connection_key(&record.connection_id);

        if let Some(previous) = self.get(&record.connection_id).await? {
            self.remove_from_stale_indices(&previous, record).await?;
        }

        self.store.hash_set(&key, &record.to_fields()).await?;
        self.store.expire(&key, self.ttl).await?;

        for index in index_keys(record) {
            self.store.set_add(&index, &record.connection_id).await?;
            self.store.expire(&index, self.ttl).await?;
        }

        tracing::debug!(
            connection_id = %record.connection_id,
            channel = %record.channel,
            user_id = %record.user_id,
            "Connection registered"
        );

        Ok(true)
    }

    async fn remove_from_stale_indices(
        &self,
        previous: &ConnectionRecord,
        next: &ConnectionRecord,
    ) -> StoreResult<()> {
        let keep = index_keys(next);
        for index in index_keys(previous) {
            if !keep.contains(&index) {
                self.store
                    .set_remove(&index, &previous.connection_id)
                    .await?;
            }
        }
        Ok(())
    }

    /// Look up a connection record
    ///
    /// A hash that no longer parses (for example one field rewritten after
    /// the lease ran out) is treated as absent and deleted.
    pub async fn get(&self, connection_id: &str) -> StoreResult<Option<ConnectionRecord>> {
        let key = connection_key(connection_id);
        let map = self.store.hash_get_all(&key).await?;
        if map.is_empty() {
            return Ok(None);
        }

        match ConnectionRecord::from_fields(map) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Dropping corrupt connection record");
                self.store.delete(&key).await?;
                Ok(None)
            }
        }
    }

    /// Remove a connection record and its index entries
    ///
    /// Returns `false` when no record existed; that is not an error.
    pub async fn unregister(&self, connection_id: &str) -> StoreResult<bool> {
        match self.get(connection_id).await? {
            Some(record) => self.unregister_record(&record).await,
            None => Ok(false),
        }
    }

    /// Remove a connection the caller already holds a snapshot of
    ///
    /// Skips the read, so it also cleans up indices after the record's own
    /// lease has already run out.
    pub async fn unregister_record(&self, record: &ConnectionRecord) -> StoreResult<bool> {
        let removed = self
            .store
            .delete(&connection_key(&record.connection_id))
            .await?;

        for index in index_keys(record) {
            self.store.set_remove(&index, &record.connection_id).await?;
        }

        tracing::debug!(connection_id = %record.connection_id, removed, "Connection unregistered");
        Ok(removed)
    }

    /// Record client activity
    ///
    /// Inbound traffic keeps a connection alive just like a heartbeat, so
    /// the record and its index entries are all re-leased.
    pub async fn update_activity(&self, connection_id: &str) -> StoreResult<bool> {
        let now = Utc::now().to_rfc3339();
        if !self
            .write_fields(connection_id, &[(fields::LAST_ACTIVITY, now)])
            .await?
        {
            return Ok(false);
        }
        self.refresh_indices(connection_id).await?;
        Ok(true)
    }

    /// Record a heartbeat acknowledgment
    pub async fn update_heartbeat(&self, connection_id: &str) -> StoreResult<bool> {
        let now = Utc::now().to_rfc3339();
        if !self
            .write_fields(
                connection_id,
                &[(fields::LAST_HEARTBEAT, now.clone()), (fields::LAST_ACTIVITY, now)],
            )
            .await?
        {
            return Ok(false);
        }
        self.refresh_indices(connection_id).await?;
        Ok(true)
    }

    /// Re-add a live record to every index holding it and extend their lease
    async fn refresh_indices(&self, connection_id: &str) -> StoreResult<()> {
        let map = self.store.hash_get_all(&connection_key(connection_id)).await?;
        let indices = [
            map.get(fields::CHANNEL)
                .filter(|c| !c.is_empty())
                .map(|c| channel_index_key(c)),
            map.get(fields::USER_ID).map(|u| user_index_key(u)),
            map.get(fields::GATEWAY_INSTANCE_ID)
                .map(|g| gateway_index_key(g)),
        ];
        for index in indices.into_iter().flatten() {
            self.store.set_add(&index, connection_id).await?;
            self.store.expire(&index, self.ttl).await?;
        }
        Ok(())
    }

    /// Update fields of an existing record, extending its lease
    ///
    /// Returns `false` without writing when the record is gone.
    async fn write_fields(
        &self,
        connection_id: &str,
        values: &[(&str, String)],
    ) -> StoreResult<bool> {
        let key = connection_key(connection_id);
        if !self.store.expire(&key, self.ttl).await? {
            return Ok(false);
        }
        self.store.hash_set(&key, values).await?;
        // Guards against the lease running out between the two calls
        self.store.expire(&key, self.ttl).await?;
        Ok(true)
    }

    pub async fn connections_by_channel(&self, channel: &str) -> StoreResult<Vec<String>> {
        self.store.set_members(&channel_index_key(channel)).await
    }

    pub async fn connections_by_user(&self, user_id: &str) -> StoreResult<Vec<String>> {
        self.store.set_members(&user_index_key(user_id)).await
    }

    pub async fn connections_by_gateway(&self, instance_id: &str) -> StoreResult<Vec<String>> {
        self.store.set_members(&gateway_index_key(instance_id)).await
    }

    /// Connections of a user whose record still exists
    ///
    /// Index entries without a record are removed on the way.
    pub async fn live_connections_by_user(&self, user_id: &str) -> StoreResult<Vec<String>> {
        let index = user_index_key(user_id);
        let mut live = Vec::new();

        for id in self.store.set_members(&index).await? {
            let exists = self
                .store
                .hash_get(&connection_key(&id), fields::CONNECTION_ID)
                .await?
                .is_some();
            if exists {
                live.push(id);
            } else {
                tracing::debug!(connection_id = %id, user_id = %user_id, "Pruning stale index entry");
                self.store.set_remove(&index, &id).await?;
            }
        }

        Ok(live)
    }

    /// Subscribe a connection to a channel
    pub async fn add_channel_subscription(
        &self,
        connection_id: &str,
        channel: &str,
    ) -> StoreResult<bool> {
        if !self
            .write_fields(connection_id, &[(fields::CHANNEL, channel.to_string())])
            .await?
        {
            return Ok(false);
        }

        let index = channel_index_key(channel);
        self.store.set_add(&index, connection_id).await?;
        self.store.expire(&index, self.ttl).await?;
        Ok(true)
    }

    /// Unsubscribe a connection from a channel
    ///
    /// Clears the record's current channel only if it still names `channel`.
    pub async fn remove_channel_subscription(
        &self,
        connection_id: &str,
        channel: &str,
    ) -> StoreResult<bool> {
        self.store
            .set_remove(&channel_index_key(channel), connection_id)
            .await?;

        let key = connection_key(connection_id);
        let current = self.store.hash_get(&key, fields::CHANNEL).await?;
        if current.as_deref() == Some(channel) {
            return self
                .write_fields(connection_id, &[(fields::CHANNEL, String::new())])
                .await;
        }

        Ok(current.is_some())
    }

    /// Remove every connection owned by a gateway instance
    ///
    /// Best effort: individual failures are logged and skipped. Fails only if
    /// the instance's index cannot be read at all.
    pub async fn unregister_gateway(&self, instance_id: &str) -> StoreResult<usize> {
        let index = gateway_index_key(instance_id);
        let ids = self.store.set_members(&index).await?;
        let mut removed = 0;

        for id in &ids {
            match self.unregister(id).await {
                Ok(true) => removed += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(connection_id = %id, error = %e, "Bulk unregister failed for connection");
                }
            }
        }

        self.store.delete(&index).await?;
        tracing::info!(instance_id = %instance_id, removed, "Gateway connections unregistered");
        Ok(removed)
    }

    /// Count registered connections, in total and per channel
    ///
    /// Scans every record; for diagnostics only.
    pub async fn connection_count(&self) -> StoreResult<ConnectionCount> {
        let mut count = ConnectionCount::default();

        for key in self.store.scan(CONNECTION_PATTERN).await? {
            let Some(channel) = self.store.hash_get(&key, fields::CHANNEL).await? else {
                continue;
            };
            count.total += 1;
            if !channel.is_empty() {
                *count.by_channel.entry(channel).or_insert(0) += 1;
            }
        }

        Ok(count)
    }
}

fn index_keys(record: &ConnectionRecord) -> Vec<String> {
    let mut keys = Vec::with_capacity(3);
    if !record.channel.is_empty() {
        keys.push(channel_index_key(&record.channel));
    }
    keys.push(user_index_key(&record.user_id));
    keys.push(gateway_index_key(&record.gateway_instance_id));
    keys
}
