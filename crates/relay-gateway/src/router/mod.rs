//! Channel router
//!
//! Applies channel switches to the registry and the listener table, then
//! forwards the envelope to the channel's business-service topic.

use relay_core::{FanOutBus, MessageEnvelope};
use relay_store::{ConnectionRegistry, PubSubChannel};
use std::sync::Arc;
use tokio::time::Instant;
use tracing::Instrument;

use crate::broadcast::ChannelListeners;
use crate::connection::LocalConnection;
use crate::handlers::{GatewayError, GatewayResult};
use crate::metrics;
use crate::protocol::ServiceRequest;

/// Routes inbound envelopes of every local connection
#[derive(Clone)]
pub struct ChannelRouter {
    registry: ConnectionRegistry,
    bus: Arc<dyn FanOutBus>,
    listeners: Arc<ChannelListeners>,
}

impl ChannelRouter {
    #[must_use]
    pub fn new(
        registry: ConnectionRegistry,
        bus: Arc<dyn FanOutBus>,
        listeners: Arc<ChannelListeners>,
    ) -> Self {
        Self {
            registry,
            bus,
            listeners,
        }
    }

    /// Route one envelope from `connection`
    pub async fn route(
        &self,
        connection: &LocalConnection,
        envelope: MessageEnvelope,
    ) -> GatewayResult<()> {
        let span = tracing::info_span!(
            "gateway.message",
            connection_id = %connection.id(),
            channel = %envelope.channel,
            intent = %envelope.intent,
        );
        self.route_inner(connection, envelope).instrument(span).await
    }

    async fn route_inner(
        &self,
        connection: &LocalConnection,
        envelope: MessageEnvelope,
    ) -> GatewayResult<()> {
        let started = Instant::now();
        let channel = envelope.channel.clone();
        metrics::message_in(&channel);

        if connection.channel() != channel {
            self.switch_channel(connection, &channel).await?;
        }

        if let Err(e) = self.registry.update_activity(connection.id()).await {
            tracing::warn!(error = %e, "Failed to record activity (degraded mode)");
        }

        let request = ServiceRequest {
            connection_id: connection.id().to_string(),
            user_id: connection.user_id().to_string(),
            tenant_id: connection.identity().tenant_id.clone(),
            envelope,
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        let topic = PubSubChannel::service(&channel).name();
        let receivers = self.bus.publish(&topic, &body).await.map_err(|e| {
            tracing::warn!(error = %e, "Failed to dispatch envelope to service topic");
            GatewayError::from(e)
        })?;

        tracing::debug!(receivers, "Envelope dispatched");
        metrics::dispatch_latency(&channel, started.elapsed());
        Ok(())
    }

    /// Move `connection` from its current channel to `channel`
    ///
    /// Store failures are tolerated: the local switch still happens and the
    /// registry indices heal on the next heartbeat or TTL expiry.
    async fn switch_channel(&self, connection: &LocalConnection, channel: &str) -> GatewayResult<()> {
        // Subscribe first so a failed bus subscription leaves the old channel intact
        self.listeners.acquire(channel).await?;

        let previous = connection.set_channel(channel);

        if let Err(e) = self
            .registry
            .remove_channel_subscription(connection.id(), &previous)
            .await
        {
            tracing::warn!(channel = %previous, error = %e, "Failed to remove channel subscription (degraded mode)");
        }
        if let Err(e) = self
            .registry
            .add_channel_subscription(connection.id(), channel)
            .await
        {
            tracing::warn!(error = %e, "Failed to add channel subscription (degraded mode)");
        }

        self.listeners.release(&previous).await;

        tracing::debug!(from = %previous, to = %channel, "Connection switched channel");
        Ok(())
    }
}

impl std::fmt::Debug for ChannelRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRouter").finish_non_exhaustive()
    }
}
