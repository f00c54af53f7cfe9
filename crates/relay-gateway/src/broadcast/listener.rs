//! Per-channel broadcast listeners
//!
//! Each channel with at least one local subscriber gets one task reading
//! the channel's fan-out topic. The first local subscriber starts it, the
//! last one to leave stops it.

use relay_core::FanOutBus;
use relay_store::{ConnectionRegistry, PubSubChannel};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::backpressure::BackpressureManager;
use crate::connection::{ConnectionManager, LocalConnection};
use crate::handlers::GatewayResult;
use crate::metrics;
use crate::protocol::BroadcastMessage;

/// Everything a listener task needs to deliver one broadcast
struct FanOutContext {
    bus: Arc<dyn FanOutBus>,
    registry: ConnectionRegistry,
    connections: Arc<ConnectionManager>,
    backpressure: Arc<BackpressureManager>,
    instance_id: String,
}

struct Listener {
    subscribers: usize,
    task: JoinHandle<()>,
}

/// Reference-counted listener tasks, one per channel
pub struct ChannelListeners {
    context: Arc<FanOutContext>,
    listeners: Mutex<HashMap<String, Listener>>,
}

impl ChannelListeners {
    #[must_use]
    pub fn new(
        bus: Arc<dyn FanOutBus>,
        registry: ConnectionRegistry,
        connections: Arc<ConnectionManager>,
        backpressure: Arc<BackpressureManager>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            context: Arc::new(FanOutContext {
                bus,
                registry,
                connections,
                backpressure,
                instance_id: instance_id.into(),
            }),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Register a local subscriber, starting the listener if it is the first
    pub async fn acquire(&self, channel: &str) -> GatewayResult<()> {
        let mut listeners = self.listeners.lock().await;
        if let Some(listener) = listeners.get_mut(channel) {
            listener.subscribers += 1;
            return Ok(());
        }

        let topic = PubSubChannel::fanout(channel).name();
        let receiver = self.context.bus.subscribe(&topic).await?;
        let task = tokio::spawn(listen(
            Arc::clone(&self.context),
            channel.to_string(),
            receiver,
        ));
        listeners.insert(
            channel.to_string(),
            Listener {
                subscribers: 1,
                task,
            },
        );

        tracing::info!(channel = %channel, "Broadcast listener started");
        Ok(())
    }

    /// Drop a local subscriber, stopping the listener if it was the last
    pub async fn release(&self, channel: &str) {
        let mut listeners = self.listeners.lock().await;
        let Some(listener) = listeners.get_mut(channel) else {
            return;
        };

        listener.subscribers = listener.subscribers.saturating_sub(1);
        if listener.subscribers > 0 {
            return;
        }

        if let Some(listener) = listeners.remove(channel) {
            self.stop(channel, listener).await;
        }
    }

    async fn stop(&self, channel: &str, listener: Listener) {
        listener.task.abort();
        let _ = listener.task.await;

        let topic = PubSubChannel::fanout(channel).name();
        if let Err(e) = self.context.bus.unsubscribe(&topic).await {
            tracing::warn!(channel = %channel, error = %e, "Failed to unsubscribe fan-out topic");
        }
        tracing::info!(channel = %channel, "Broadcast listener stopped");
    }

    /// Channels with a running listener
    pub async fn active_channels(&self) -> Vec<String> {
        let mut channels: Vec<String> = self.listeners.lock().await.keys().cloned().collect();
        channels.sort();
        channels
    }

    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.listeners
            .lock()
            .await
            .get(channel)
            .map_or(0, |l| l.subscribers)
    }

    /// Stop every listener
    pub async fn shutdown(&self) {
        let drained: Vec<(String, Listener)> = self.listeners.lock().await.drain().collect();
        for (channel, listener) in drained {
            self.stop(&channel, listener).await;
        }
    }
}

impl std::fmt::Debug for ChannelListeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelListeners")
            .field("instance_id", &self.context.instance_id)
            .finish_non_exhaustive()
    }
}

async fn listen(
    context: Arc<FanOutContext>,
    channel: String,
    mut receiver: broadcast::Receiver<String>,
) {
    loop {
        match receiver.recv().await {
            Ok(payload) => context.deliver(&channel, &payload).await,
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!(channel = %channel, lagged = n, "Broadcast listener lagged behind");
                metrics::error("listener_lagged");
            }
            Err(broadcast::error::RecvError::Closed) => {
                tracing::debug!(channel = %channel, "Fan-out topic closed");
                break;
            }
        }
    }
}

impl FanOutContext {
    async fn deliver(&self, channel: &str, payload: &str) {
        let started = Instant::now();

        let broadcast: BroadcastMessage = match serde_json::from_str(payload) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(channel = %channel, error = %e, "Discarding malformed broadcast");
                metrics::error("malformed_broadcast");
                return;
            }
        };
        let frame = broadcast.message.to_string();

        let targets = self.targets(channel).await;
        let mut delivered = 0usize;
        for connection in &targets {
            match self.backpressure.offer(connection.queues(), channel, frame.clone()) {
                Ok(()) => delivered += 1,
                Err(e) => tracing::trace!(
                    connection_id = %connection.id(),
                    channel = %channel,
                    reason = e.kind(),
                    "Broadcast not queued cleanly"
                ),
            }
        }

        tracing::trace!(
            channel = %channel,
            targets = targets.len(),
            delivered,
            "Broadcast delivered"
        );
        metrics::fanout_latency(channel, started.elapsed());
    }

    /// Local sockets subscribed to `channel`
    ///
    /// Membership comes from the registry. If the store is unreachable the
    /// local table is used instead so existing connections keep receiving.
    async fn targets(&self, channel: &str) -> Vec<Arc<LocalConnection>> {
        let lookup = futures::future::try_join(
            self.registry.connections_by_channel(channel),
            self.registry.connections_by_gateway(&self.instance_id),
        );

        match lookup.await {
            Ok((by_channel, by_gateway)) => {
                let local: HashSet<String> = by_gateway.into_iter().collect();
                by_channel
                    .iter()
                    .filter(|id| local.contains(*id))
                    .filter_map(|id| self.connections.get(id))
                    // Index entries can lag a channel switch
                    .filter(|c| c.is_active() && c.channel() == channel)
                    .collect()
            }
            Err(e) => {
                tracing::warn!(
                    channel = %channel,
                    error = %e,
                    "Connection store unavailable, delivering from local table (degraded mode)"
                );
                self.backpressure.record_failure(channel, "store unavailable");
                self.connections.subscribed_to(channel)
            }
        }
    }
}
