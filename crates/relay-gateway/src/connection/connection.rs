//! A single client connection held by this instance

use parking_lot::RwLock;
use relay_core::{ConnectionRecord, SessionIdentity};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::backpressure::OutboundQueues;

/// Lifecycle of a connection
///
/// `Connecting -> Authenticating -> Active -> Closing -> Closed`, with
/// `Error` reachable from any state before `Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Connecting,
    Authenticating,
    Active,
    Closing,
    Closed,
    Error,
}

impl ConnectionState {
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        use ConnectionState::{Active, Authenticating, Closed, Closing, Connecting, Error};
        match (self, next) {
            (Closed, _) => false,
            (_, Error) => true,
            (Connecting, Authenticating)
            | (Authenticating, Active)
            | (Connecting | Authenticating | Active | Error, Closing)
            | (Closing | Error, Closed) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Connecting => "connecting",
            Self::Authenticating => "authenticating",
            Self::Active => "active",
            Self::Closing => "closing",
            Self::Closed => "closed",
            Self::Error => "error",
        };
        f.write_str(s)
    }
}

/// Socket-side state of an authenticated connection
///
/// The registry holds the shared view; this holds what only the owning
/// instance needs: the outbound queues, the liveness clock and the close
/// signal.
pub struct LocalConnection {
    id: String,
    identity: SessionIdentity,
    session_token: String,
    channel: RwLock<String>,
    state: RwLock<ConnectionState>,
    last_seen: RwLock<Instant>,
    queues: OutboundQueues,
    close_signal: Notify,
    record: ConnectionRecord,
}

impl LocalConnection {
    #[must_use]
    pub fn new(record: ConnectionRecord, queues: OutboundQueues) -> Arc<Self> {
        let identity = SessionIdentity {
            user_id: record.user_id.clone(),
            tenant_id: record.tenant_id.clone(),
        };
        Arc::new(Self {
            id: record.connection_id.clone(),
            identity,
            session_token: record.session_token.clone(),
            channel: RwLock::new(record.channel.clone()),
            state: RwLock::new(ConnectionState::Active),
            last_seen: RwLock::new(Instant::now()),
            queues,
            close_signal: Notify::new(),
            record,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn identity(&self) -> &SessionIdentity {
        &self.identity
    }

    pub fn user_id(&self) -> &str {
        &self.identity.user_id
    }

    pub fn session_token(&self) -> &str {
        &self.session_token
    }

    /// Channel the connection currently receives broadcasts from
    pub fn channel(&self) -> String {
        self.channel.read().clone()
    }

    /// Switch channels, returning the previous one
    pub fn set_channel(&self, channel: &str) -> String {
        std::mem::replace(&mut *self.channel.write(), channel.to_string())
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    /// Apply a state transition; invalid transitions are ignored
    pub fn transition(&self, next: ConnectionState) -> bool {
        let mut state = self.state.write();
        if state.can_transition_to(next) {
            *state = next;
            true
        } else {
            tracing::debug!(
                connection_id = %self.id,
                from = %*state,
                to = %next,
                "Ignored invalid connection state transition"
            );
            false
        }
    }

    pub fn is_active(&self) -> bool {
        self.state() == ConnectionState::Active
    }

    /// Record client liveness
    pub fn touch(&self) {
        *self.last_seen.write() = Instant::now();
    }

    pub fn idle_for(&self) -> Duration {
        self.last_seen.read().elapsed()
    }

    pub fn queues(&self) -> &OutboundQueues {
        &self.queues
    }

    /// Ask the socket tasks to shut down
    pub fn close(&self) {
        self.transition(ConnectionState::Closing);
        self.close_signal.notify_one();
    }

    /// Mark the socket as broken
    ///
    /// Moves to `Error` and wakes the socket tasks the same way `close` does.
    pub fn fail(&self, reason: &str) {
        if self.transition(ConnectionState::Error) {
            tracing::debug!(connection_id = %self.id, reason = %reason, "Connection failed");
        }
        self.close_signal.notify_one();
    }

    /// Resolves once `close` or `fail` has been called
    pub async fn closed(&self) {
        self.close_signal.notified().await;
    }

    /// Record as registered at connect time
    ///
    /// The channel field may be stale; the registry keeps the current one.
    pub fn record(&self) -> &ConnectionRecord {
        &self.record
    }
}

impl std::fmt::Debug for LocalConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalConnection")
            .field("id", &self.id)
            .field("user_id", &self.identity.user_id)
            .field("channel", &*self.channel.read())
            .field("state", &*self.state.read())
            .finish_non_exhaustive()
    }
}

/// Generate a new connection id
#[must_use]
pub fn generate_connection_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
