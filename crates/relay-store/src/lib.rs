//! # relay-store
//!
//! Shared state layer for the realtime connection gateway.
//!
//! ## Features
//!
//! - **Connection Pool**: Managed Redis connection pool with deadpool
//! - **Connection Store**: Redis and in-memory backends with TTL leases
//! - **Fan-Out Bus**: Redis Pub/Sub and in-memory broadcast transports
//! - **Registry**: Connection records plus channel, user, and gateway indices
//! - **Sessions**: Token validation against session hashes in the store
//!
//! ## Example
//!
//! ```ignore
//! use relay_store::{create_shared_pool, ConnectionRegistry, RedisConnectionStore, RedisPoolConfig};
//!
//! let pool = create_shared_pool(RedisPoolConfig::default())?;
//! let store = Arc::new(RedisConnectionStore::new(pool.clone()));
//! let registry = ConnectionRegistry::with_default_ttl(store);
//!
//! registry.register(&record).await?;
//! let local = registry.connections_by_gateway("gw-1").await?;
//! ```

pub mod pool;
pub mod pubsub;
pub mod registry;
pub mod session;
pub mod store;

// Re-export pool types
pub use pool::{
    create_shared_pool, RedisPool, RedisPoolConfig, RedisPoolError, RedisResult, SharedRedisPool,
};

// Re-export store backends
pub use store::{MemoryConnectionStore, RedisConnectionStore};

// Re-export pubsub types
pub use pubsub::{
    MemoryFanOutBus, PubSubChannel, RedisFanOutBus, Subscriber, SubscriberConfig,
    SubscriberError, SubscriberResult, FANOUT_TOPIC_PREFIX, SERVICE_TOPIC_PREFIX,
};

// Re-export registry
pub use registry::{ConnectionRegistry, DEFAULT_CONNECTION_TTL};

// Re-export session validation
pub use session::StoreSessionValidator;
