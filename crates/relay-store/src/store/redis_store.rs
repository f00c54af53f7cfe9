//! Redis-backed connection store
//!
//! Each trait method is a single Redis command run on a pooled connection.

use async_trait::async_trait;
use redis::AsyncCommands;
use relay_core::{ConnectionStore, StoreResult};
use std::collections::HashMap;
use std::time::Duration;

use crate::pool::{RedisPool, RedisPoolError, SharedRedisPool};

/// `COUNT` hint passed to `SCAN`
const SCAN_BATCH: usize = 200;

/// Connection store backed by a shared Redis deployment
#[derive(Debug, Clone)]
pub struct RedisConnectionStore {
    pool: SharedRedisPool,
}

impl RedisConnectionStore {
    #[must_use]
    pub fn new(pool: SharedRedisPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub fn pool(&self) -> &RedisPool {
        &self.pool
    }
}

fn ttl_seconds(ttl: Duration) -> Result<i64, RedisPoolError> {
    // EXPIRE 0 deletes the key; round sub-second TTLs up
    let secs = ttl.as_secs().max(1);
    i64::try_from(secs)
        .map_err(|_| RedisPoolError::InvalidArgument("TTL value too large".to_string()))
}

#[async_trait]
impl ConnectionStore for RedisConnectionStore {
    async fn hash_set(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }
        let mut conn = self.pool.get().await?;
        conn.hset_multiple::<_, _, _, ()>(key, fields)
            .await
            .map_err(RedisPoolError::from)?;
        Ok(())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.pool.get().await?;
        let map: HashMap<String, String> =
            conn.hgetall(key).await.map_err(RedisPoolError::from)?;
        Ok(map)
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = conn.hget(key, field).await.map_err(RedisPoolError::from)?;
        Ok(value)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.pool.get().await?;
        let deleted: i32 = conn.del(key).await.map_err(RedisPoolError::from)?;
        Ok(deleted > 0)
    }

    async fn set_add(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.sadd::<_, _, ()>(key, member)
            .await
            .map_err(RedisPoolError::from)?;
        Ok(())
    }

    async fn set_remove(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.pool.get().await?;
        conn.srem::<_, _, ()>(key, member)
            .await
            .map_err(RedisPoolError::from)?;
        Ok(())
    }

    async fn set_members(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.pool.get().await?;
        let members: Vec<String> = conn.smembers(key).await.map_err(RedisPoolError::from)?;
        Ok(members)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let secs = ttl_seconds(ttl)?;
        let mut conn = self.pool.get().await?;
        let applied: bool = conn.expire(key, secs).await.map_err(RedisPoolError::from)?;
        Ok(applied)
    }

    async fn scan(&self, pattern: &str) -> StoreResult<Vec<String>> {
        Ok(self.pool.scan_keys(pattern, SCAN_BATCH).await?)
    }

    async fn ping(&self) -> StoreResult<()> {
        Ok(self.pool.health_check().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::RedisPoolConfig;
    use std::sync::Arc;

    #[test]
    fn test_ttl_seconds() {
        assert_eq!(ttl_seconds(Duration::from_secs(3600)).unwrap(), 3600);
        assert_eq!(ttl_seconds(Duration::from_millis(10)).unwrap(), 1);
        assert!(ttl_seconds(Duration::from_secs(u64::MAX)).is_err());
    }

    /// Runs against a real Redis when `REDIS_URL` is set
    #[tokio::test]
    async fn test_redis_roundtrip() {
        let Ok(url) = std::env::var("REDIS_URL") else {
            return;
        };
        let pool = Arc::new(
            RedisPool::new(RedisPoolConfig {
                url,
                max_connections: 4,
                ..RedisPoolConfig::default()
            })
            .unwrap(),
        );
        let store = RedisConnectionStore::new(pool);
        let key = format!("test:{}:hash", std::process::id());
        let set_key = format!("test:{}:set", std::process::id());

        store
            .hash_set(&key, &[("a", "1".to_string()), ("b", "2".to_string())])
            .await
            .unwrap();
        assert_eq!(store.hash_get(&key, "b").await.unwrap().as_deref(), Some("2"));
        assert!(store.expire(&key, Duration::from_secs(30)).await.unwrap());

        store.set_add(&set_key, "m1").await.unwrap();
        assert_eq!(store.set_members(&set_key).await.unwrap(), vec!["m1"]);
        store.set_remove(&set_key, "m1").await.unwrap();
        assert!(store.set_members(&set_key).await.unwrap().is_empty());

        assert!(store.delete(&key).await.unwrap());
        assert!(!store.expire(&key, Duration::from_secs(30)).await.unwrap());
        store.ping().await.unwrap();
    }
}
