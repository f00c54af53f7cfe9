//! Fan-out bus over Redis Pub/Sub

use async_trait::async_trait;
use redis::AsyncCommands;
use relay_core::{FanOutBus, StoreResult};
use tokio::sync::broadcast;

use super::subscriber::{Subscriber, SubscriberConfig, SubscriberResult};
use crate::pool::{RedisPoolError, SharedRedisPool};

/// Publishes through the shared pool and receives on a dedicated connection
#[derive(Debug)]
pub struct RedisFanOutBus {
    pool: SharedRedisPool,
    subscriber: Subscriber,
}

impl RedisFanOutBus {
    /// Create the bus and start its background listener
    pub async fn new(pool: SharedRedisPool) -> SubscriberResult<Self> {
        let subscriber = Subscriber::new(SubscriberConfig {
            redis_url: pool.url().to_string(),
            ..SubscriberConfig::default()
        })
        .await?;

        Ok(Self { pool, subscriber })
    }

    /// Stop the background listener
    pub async fn shutdown(&self) -> SubscriberResult<()> {
        self.subscriber.shutdown().await
    }
}

#[async_trait]
impl FanOutBus for RedisFanOutBus {
    async fn publish(&self, topic: &str, payload: &str) -> StoreResult<usize> {
        let mut conn = self.pool.get().await?;
        let receivers: usize = conn
            .publish(topic, payload)
            .await
            .map_err(RedisPoolError::from)?;

        tracing::trace!(topic = %topic, receivers, "Published message");
        Ok(receivers)
    }

    async fn subscribe(&self, topic: &str) -> StoreResult<broadcast::Receiver<String>> {
        Ok(self.subscriber.subscribe(topic).await?)
    }

    async fn unsubscribe(&self, topic: &str) -> StoreResult<()> {
        Ok(self.subscriber.unsubscribe(topic).await?)
    }
}
