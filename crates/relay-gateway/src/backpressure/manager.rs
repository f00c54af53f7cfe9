//! Backpressure manager
//!
//! Owns one circuit breaker per channel and routes every outbound channel
//! message through it into the target connection's bounded queues. Never
//! blocks the caller.

use dashmap::DashMap;
use relay_common::BackpressureConfig;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use super::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
use super::queue::{OutboundQueues, PushOutcome};
use crate::handlers::{GatewayError, GatewayResult};
use crate::metrics;

/// Per-channel breakers plus the queue depth applied to new connections
#[derive(Debug)]
pub struct BackpressureManager {
    queue_depth: usize,
    breaker_config: CircuitBreakerConfig,
    breakers: DashMap<String, Arc<CircuitBreaker>>,
}

impl BackpressureManager {
    #[must_use]
    pub fn new(config: &BackpressureConfig) -> Self {
        Self {
            queue_depth: config.queue_depth.max(1),
            breaker_config: CircuitBreakerConfig::from(config),
            breakers: DashMap::new(),
        }
    }

    /// Fresh queues for a connection
    #[must_use]
    pub fn new_queues(&self) -> OutboundQueues {
        OutboundQueues::new(self.queue_depth)
    }

    fn breaker(&self, channel: &str) -> Arc<CircuitBreaker> {
        if let Some(breaker) = self.breakers.get(channel) {
            return breaker.clone();
        }
        self.breakers
            .entry(channel.to_string())
            .or_insert_with(|| Arc::new(CircuitBreaker::new(channel, self.breaker_config)))
            .clone()
    }

    /// Offer a channel message to a connection's queues
    ///
    /// `Ok` means queued cleanly. `QueueOverflow` means it was queued after
    /// evicting the oldest message; `CircuitOpen` means it was rejected.
    pub fn offer(&self, queues: &OutboundQueues, channel: &str, frame: String) -> GatewayResult<()> {
        // A closing connection must not consume the half-open probe
        if queues.is_closed() {
            return Err(GatewayError::ConnectionClosed);
        }

        let breaker = self.breaker(channel);
        if !breaker.allow() {
            metrics::message_dropped(channel, "circuit_open");
            return Err(GatewayError::CircuitOpen(channel.to_string()));
        }

        match queues.push(channel, frame) {
            PushOutcome::Queued => {
                breaker.record_success();
                Ok(())
            }
            PushOutcome::DroppedOldest => {
                breaker.record_failure("queue full");
                metrics::message_dropped(channel, "queue_overflow");
                Err(GatewayError::QueueOverflow(channel.to_string()))
            }
            // Closed after the check above; not the channel's fault
            PushOutcome::Closed => {
                breaker.release_probe();
                Err(GatewayError::ConnectionClosed)
            }
        }
    }

    /// Count a store or bus failure against a channel
    pub fn record_failure(&self, channel: &str, reason: &str) {
        self.breaker(channel).record_failure(reason);
    }

    #[must_use]
    pub fn state(&self, channel: &str) -> CircuitState {
        self.breakers
            .get(channel)
            .map_or(CircuitState::Closed, |b| b.state())
    }

    /// Apply due cooldown transitions; returns the channels still open
    pub fn sweep(&self) -> Vec<String> {
        self.breakers
            .iter()
            .filter(|entry| entry.value().poll() == CircuitState::Open)
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Run `sweep` periodically
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval.max(Duration::from_millis(100)));
            loop {
                ticker.tick().await;
                let open = manager.sweep();
                if !open.is_empty() {
                    tracing::debug!(channels = ?open, "Channels with open circuit breakers");
                }
            }
        })
    }
}
