//! Redis Pub/Sub subscriber.
//!
//! Holds one dedicated pub/sub connection per process and demultiplexes
//! incoming messages to a broadcast sender per topic.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::StreamExt;
use redis::Client;
use relay_core::DomainError;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

use crate::pool::redact_url;

/// Error type for subscriber operations
#[derive(Debug, thiserror::Error)]
pub enum SubscriberError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Channel closed")]
    ChannelClosed,
}

impl From<SubscriberError> for DomainError {
    fn from(err: SubscriberError) -> Self {
        DomainError::StoreUnavailable(err.to_string())
    }
}

/// Result type for subscriber operations
pub type SubscriberResult<T> = Result<T, SubscriberError>;

/// Subscriber configuration
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    /// Redis connection URL
    pub redis_url: String,
    /// Per-topic broadcast buffer size
    pub broadcast_buffer: usize,
    /// Reconnection delay in milliseconds
    pub reconnect_delay_ms: u64,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            broadcast_buffer: 1024,
            reconnect_delay_ms: 1000,
        }
    }
}

type TopicSenders = Arc<DashMap<String, broadcast::Sender<String>>>;

/// Redis Pub/Sub subscriber
pub struct Subscriber {
    /// Topics with at least one local receiver
    topics: TopicSenders,
    broadcast_buffer: usize,
    /// Control channel for subscription management
    control_tx: mpsc::Sender<SubscriberCommand>,
}

/// Commands for subscription management
#[derive(Debug)]
enum SubscriberCommand {
    Subscribe(String),
    Unsubscribe(String),
    Shutdown,
}

impl Subscriber {
    /// Create a new subscriber and start the background listener
    pub async fn new(config: SubscriberConfig) -> SubscriberResult<Self> {
        // Reject malformed URLs up front; connection errors are retried later
        let client = Client::open(config.redis_url.as_str())?;
        let (control_tx, control_rx) = mpsc::channel(256);
        let topics: TopicSenders = Arc::new(DashMap::new());

        tokio::spawn(Self::listener_loop(
            client,
            config.clone(),
            topics.clone(),
            control_rx,
        ));

        Ok(Self {
            topics,
            broadcast_buffer: config.broadcast_buffer,
            control_tx,
        })
    }

    /// Background listener loop
    async fn listener_loop(
        client: Client,
        config: SubscriberConfig,
        topics: TopicSenders,
        mut control_rx: mpsc::Receiver<SubscriberCommand>,
    ) {
        loop {
            match Self::run_listener(&client, &topics, &mut control_rx).await {
                Ok(true) => {
                    tracing::info!("Subscriber shutting down");
                    break;
                }
                Ok(false) => {
                    tracing::warn!("Pub/Sub stream ended, reconnecting");
                }
                Err(e) => {
                    tracing::error!(
                        url = %redact_url(&config.redis_url),
                        error = %e,
                        "Subscriber error, reconnecting..."
                    );
                    tokio::time::sleep(tokio::time::Duration::from_millis(
                        config.reconnect_delay_ms,
                    ))
                    .await;
                }
            }
        }
    }

    /// Run the listener until error or shutdown; `Ok(true)` means stop
    async fn run_listener(
        client: &Client,
        topics: &TopicSenders,
        control_rx: &mut mpsc::Receiver<SubscriberCommand>,
    ) -> SubscriberResult<bool> {
        let mut pubsub = client.get_async_pubsub().await?;

        // Resubscribe to every topic that still has receivers
        let existing: Vec<String> = topics.iter().map(|e| e.key().clone()).collect();
        for topic in &existing {
            pubsub.subscribe(topic).await?;
        }

        tracing::info!(topics = existing.len(), "Subscriber connected to Redis");

        let mut stream = pubsub.on_message();

        loop {
            tokio::select! {
                msg = stream.next() => {
                    let Some(msg) = msg else {
                        return Ok(false);
                    };
                    let topic = msg.get_channel_name().to_string();
                    let payload: String = msg.get_payload().unwrap_or_default();

                    if let Some(tx) = topics.get(&topic) {
                        // No receivers left is fine; unsubscribe is on its way
                        let _ = tx.send(payload);
                    }

                    tracing::trace!(topic = %topic, "Received Pub/Sub message");
                }

                cmd = control_rx.recv() => {
                    match cmd {
                        Some(SubscriberCommand::Subscribe(topic)) => {
                            // Need to drop stream to access pubsub
                            drop(stream);
                            pubsub.subscribe(&topic).await?;
                            tracing::debug!(topic = %topic, "Subscribed to topic");
                            stream = pubsub.on_message();
                        }
                        Some(SubscriberCommand::Unsubscribe(topic)) => {
                            drop(stream);
                            // A new local receiver may have arrived since the request
                            if !topics.contains_key(&topic) {
                                pubsub.unsubscribe(&topic).await?;
                                tracing::debug!(topic = %topic, "Unsubscribed from topic");
                            }
                            stream = pubsub.on_message();
                        }
                        Some(SubscriberCommand::Shutdown) | None => {
                            return Ok(true);
                        }
                    }
                }
            }
        }
    }

    /// Start receiving a topic
    ///
    /// The first local receiver of a topic issues the Redis `SUBSCRIBE`.
    pub async fn subscribe(&self, topic: &str) -> SubscriberResult<broadcast::Receiver<String>> {
        let (rx, fresh) = match self.topics.entry(topic.to_string()) {
            Entry::Occupied(entry) => (entry.get().subscribe(), false),
            Entry::Vacant(entry) => {
                let (tx, rx) = broadcast::channel(self.broadcast_buffer);
                entry.insert(tx);
                (rx, true)
            }
        };

        if fresh {
            self.control_tx
                .send(SubscriberCommand::Subscribe(topic.to_string()))
                .await
                .map_err(|_| SubscriberError::ChannelClosed)?;
        }

        Ok(rx)
    }

    /// Stop receiving a topic if no local receiver remains
    pub async fn unsubscribe(&self, topic: &str) -> SubscriberResult<()> {
        let removed = self
            .topics
            .remove_if(topic, |_, tx| tx.receiver_count() == 0)
            .is_some();

        if removed {
            self.control_tx
                .send(SubscriberCommand::Unsubscribe(topic.to_string()))
                .await
                .map_err(|_| SubscriberError::ChannelClosed)?;
        }

        Ok(())
    }

    /// Get currently subscribed topics
    #[must_use]
    pub fn subscribed_topics(&self) -> Vec<String> {
        self.topics.iter().map(|e| e.key().clone()).collect()
    }

    /// Shutdown the subscriber
    pub async fn shutdown(&self) -> SubscriberResult<()> {
        self.control_tx
            .send(SubscriberCommand::Shutdown)
            .await
            .map_err(|_| SubscriberError::ChannelClosed)
    }
}

impl std::fmt::Debug for Subscriber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscriber")
            .field("topics", &self.topics.len())
            .field("broadcast_buffer", &self.broadcast_buffer)
            .finish()
    }
}
