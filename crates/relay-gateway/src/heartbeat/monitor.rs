//! Heartbeat monitor
//!
//! Sends a heartbeat frame to every active local connection on a fixed
//! interval and closes connections that stayed silent past the client
//! timeout. Records of connections that vanish without a close are removed
//! by their store lease.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::connection::ConnectionManager;
use crate::handlers::GatewayError;
use crate::metrics;
use crate::protocol::ServerFrame;

/// Outcome of one heartbeat round
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeartbeatRound {
    pub pinged: usize,
    pub evicted: usize,
}

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    connections: Arc<ConnectionManager>,
    interval: Duration,
    client_timeout: Duration,
}

impl HeartbeatMonitor {
    #[must_use]
    pub fn new(connections: Arc<ConnectionManager>, interval: Duration, client_timeout: Duration) -> Self {
        Self {
            connections,
            interval,
            client_timeout,
        }
    }

    /// Run one round over the local table
    pub fn tick(&self) -> HeartbeatRound {
        let mut round = HeartbeatRound::default();

        for connection in self.connections.active() {
            if connection.idle_for() > self.client_timeout {
                tracing::debug!(
                    connection_id = %connection.id(),
                    idle_secs = connection.idle_for().as_secs(),
                    reason = %GatewayError::HeartbeatTimeout,
                    "Evicting silent connection"
                );
                metrics::heartbeat_eviction();
                connection.close();
                round.evicted += 1;
                continue;
            }

            connection.queues().push_control(ServerFrame::heartbeat().to_json());
            round.pinged += 1;
        }

        round
    }

    /// Spawn the periodic task
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval.max(Duration::from_millis(100)));
            // The first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let round = self.tick();
                tracing::trace!(pinged = round.pinged, evicted = round.evicted, "Heartbeat round");
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backpressure::OutboundQueues;
    use crate::connection::{ConnectionState, LocalConnection};
    use relay_core::{ConnectionRecord, SessionIdentity};

    fn setup() -> (Arc<ConnectionManager>, Arc<LocalConnection>, HeartbeatMonitor) {
        let connections = ConnectionManager::new_shared();
        let record = ConnectionRecord::new("c1", "tok", &SessionIdentity::new("u1"), "general", "gw");
        let conn = LocalConnection::new(record, OutboundQueues::new(4));
        connections.insert(conn.clone());
        let monitor = HeartbeatMonitor::new(
            connections.clone(),
            Duration::from_secs(30),
            Duration::from_secs(90),
        );
        (connections, conn, monitor)
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_connection_gets_heartbeat() {
        let (_connections, conn, monitor) = setup();

        assert_eq!(monitor.tick(), HeartbeatRound { pinged: 1, evicted: 0 });
        let frame: serde_json::Value = serde_json::from_str(&conn.queues().recv().await.unwrap()).unwrap();
        assert_eq!(frame["type"], "heartbeat");
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_connection_is_evicted() {
        let (_connections, conn, monitor) = setup();

        tokio::time::advance(Duration::from_secs(91)).await;
        assert_eq!(monitor.tick(), HeartbeatRound { pinged: 0, evicted: 1 });
        assert_eq!(conn.state(), ConnectionState::Closing);

        // Already closing; not pinged again
        assert_eq!(monitor.tick(), HeartbeatRound::default());
    }

    #[tokio::test(start_paused = true)]
    async fn test_acknowledging_connection_is_never_evicted() {
        let (_connections, conn, monitor) = setup();

        for _ in 0..10 {
            tokio::time::advance(Duration::from_secs(30)).await;
            conn.touch();
            assert_eq!(monitor.tick().evicted, 0);
        }
        assert!(conn.is_active());
    }
}
