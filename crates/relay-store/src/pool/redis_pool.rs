//! Pooled Redis connections behind the Redis store and bus
//!
//! Connection checkout and creation are bounded by `acquire_timeout`, so an
//! unreachable Redis surfaces as `StoreUnavailable` instead of stalling the
//! caller.

use deadpool_redis::{Config, Pool, Runtime};
use relay_core::DomainError;
use std::sync::Arc;
use std::time::Duration;

/// Redis pool configuration
#[derive(Debug, Clone)]
pub struct RedisPoolConfig {
    /// Redis connection URL (e.g., `redis://localhost:6379`)
    pub url: String,
    /// Maximum number of connections in the pool
    pub max_connections: usize,
    /// Bound on waiting for (or opening) a pooled connection
    pub acquire_timeout: Option<Duration>,
}

impl Default for RedisPoolConfig {
    fn default() -> Self {
        Self {
            url: "redis://127.0.0.1:6379".to_string(),
            max_connections: 16,
            acquire_timeout: Some(Duration::from_secs(2)),
        }
    }
}

impl From<&relay_common::StoreConfig> for RedisPoolConfig {
    fn from(config: &relay_common::StoreConfig) -> Self {
        Self {
            url: config.redis_url.clone(),
            max_connections: config.max_connections as usize,
            ..Self::default()
        }
    }
}

/// Error type for Redis pool operations
#[derive(Debug, thiserror::Error)]
pub enum RedisPoolError {
    #[error("Failed to create Redis pool: {0}")]
    CreatePool(String),

    #[error("Failed to get connection from pool: {0}")]
    GetConnection(#[from] deadpool_redis::PoolError),

    #[error("Redis command error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

/// Result type for Redis pool operations
pub type RedisResult<T> = Result<T, RedisPoolError>;

impl From<RedisPoolError> for DomainError {
    fn from(err: RedisPoolError) -> Self {
        match err {
            RedisPoolError::InvalidArgument(msg) => DomainError::InternalError(msg),
            // Redis answering with a type error is a data problem, not an outage
            RedisPoolError::Redis(e) if e.kind() == redis::ErrorKind::TypeError => {
                DomainError::InternalError(e.to_string())
            }
            other => DomainError::StoreUnavailable(other.to_string()),
        }
    }
}

/// Managed Redis connection pool
#[derive(Clone)]
pub struct RedisPool {
    pool: Pool,
    url: String,
}

impl std::fmt::Debug for RedisPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisPool")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl RedisPool {
    /// Create a new Redis pool with the given configuration
    ///
    /// No connection is opened until the first command.
    pub fn new(config: RedisPoolConfig) -> RedisResult<Self> {
        let cfg = Config::from_url(&config.url);
        let pool = cfg
            .builder()
            .map_err(|e| RedisPoolError::CreatePool(e.to_string()))?
            .max_size(config.max_connections)
            .wait_timeout(config.acquire_timeout)
            .create_timeout(config.acquire_timeout)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(|e| RedisPoolError::CreatePool(e.to_string()))?;

        tracing::info!(
            url = %redact_url(&config.url),
            max_connections = config.max_connections,
            acquire_timeout_ms = config.acquire_timeout.map(|t| t.as_millis() as u64),
            "Redis pool created"
        );

        Ok(Self {
            pool,
            url: config.url,
        })
    }

    /// Create a new Redis pool from the store section of the app config
    pub fn from_config(config: &relay_common::StoreConfig) -> RedisResult<Self> {
        Self::new(RedisPoolConfig::from(config))
    }

    /// Get a connection from the pool
    pub async fn get(&self) -> RedisResult<deadpool_redis::Connection> {
        self.pool.get().await.map_err(RedisPoolError::GetConnection)
    }

    /// URL the pool connects to; pub/sub opens its own connection from it
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Get the current pool status
    #[must_use]
    pub fn status(&self) -> deadpool_redis::Status {
        self.pool.status()
    }

    /// Check if the pool is healthy by pinging Redis
    pub async fn health_check(&self) -> RedisResult<()> {
        let mut conn = self.get().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    /// Keys matching `pattern`, collected with cursor-based `SCAN`
    pub async fn scan_keys(&self, pattern: &str, count: usize) -> RedisResult<Vec<String>> {
        let mut conn = self.get().await?;
        let mut cursor: u64 = 0;
        let mut all_keys = Vec::new();

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .arg(cursor)
                .arg("MATCH")
                .arg(pattern)
                .arg("COUNT")
                .arg(count)
                .query_async(&mut conn)
                .await?;

            all_keys.extend(keys);
            cursor = next_cursor;

            if cursor == 0 {
                break;
            }
        }

        // SCAN may return a key more than once across iterations
        all_keys.sort_unstable();
        all_keys.dedup();

        Ok(all_keys)
    }
}

/// Strip credentials from a Redis URL before logging it
pub(crate) fn redact_url(url: &str) -> &str {
    url.split('@').next_back().unwrap_or(url)
}

/// Shared Redis pool wrapped in Arc for easy cloning
pub type SharedRedisPool = Arc<RedisPool>;

/// Create a shared Redis pool
pub fn create_shared_pool(config: RedisPoolConfig) -> RedisResult<SharedRedisPool> {
    Ok(Arc::new(RedisPool::new(config)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_common::{StoreBackend, StoreConfig};

    #[test]
    fn test_default_config() {
        let config = RedisPoolConfig::default();
        assert_eq!(config.url, "redis://127.0.0.1:6379");
        assert_eq!(config.max_connections, 16);
        assert_eq!(config.acquire_timeout, Some(Duration::from_secs(2)));
    }

    #[test]
    fn test_config_from_store_config() {
        let store_config = StoreConfig {
            backend: StoreBackend::Redis,
            redis_url: "redis://localhost:6380".to_string(),
            max_connections: 32,
        };
        let pool_config = RedisPoolConfig::from(&store_config);
        assert_eq!(pool_config.url, "redis://localhost:6380");
        assert_eq!(pool_config.max_connections, 32);
    }

    #[test]
    fn test_redact_url() {
        assert_eq!(redact_url("redis://:secret@cache:6379"), "cache:6379");
        assert_eq!(redact_url("redis://cache:6379"), "redis://cache:6379");
    }

    #[test]
    fn test_pool_error_maps_to_unavailable() {
        let err: DomainError = RedisPoolError::CreatePool("refused".to_string()).into();
        assert!(err.is_unavailable());

        let err: DomainError = RedisPoolError::InvalidArgument("ttl".to_string()).into();
        assert!(!err.is_unavailable());
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() {
        // Nothing listens here; building the pool must still succeed
        let pool = RedisPool::new(RedisPoolConfig {
            url: "redis://127.0.0.1:1".to_string(),
            max_connections: 2,
            acquire_timeout: Some(Duration::from_millis(200)),
        })
        .unwrap();
        assert_eq!(pool.url(), "redis://127.0.0.1:1");
        assert!(pool.health_check().await.is_err());
    }
}
