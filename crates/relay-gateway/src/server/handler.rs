//! WebSocket handler
//!
//! Runs one connection from upgrade to cleanup: authenticate, register,
//! welcome, then the receive loop alongside a writer task draining the
//! connection's outbound queues.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{stream::SplitSink, SinkExt, StreamExt};
use rand::Rng;
use relay_core::{ConnectionRecord, SessionValidator};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

use crate::connection::{generate_connection_id, ConnectionState, LocalConnection};
use crate::handlers::{GatewayError, GatewayResult};
use crate::metrics;
use crate::protocol::{ClientFrame, ServerFrame};
use crate::server::GatewayState;

/// Query parameters of the upgrade request
#[derive(Debug, Default)]
pub struct ConnectParams {
    pub session_token: Option<String>,
    pub channel: Option<String>,
    /// Every other parameter, stored opaquely on the record
    pub metadata: Map<String, Value>,
}

impl ConnectParams {
    #[must_use]
    pub fn from_query(mut query: HashMap<String, String>) -> Self {
        let session_token = query.remove("session_token").filter(|t| !t.is_empty());
        let channel = query.remove("channel").filter(|c| !c.trim().is_empty());
        let metadata = query
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect();
        Self {
            session_token,
            channel,
            metadata,
        }
    }
}

/// GET /ws
pub async fn ws_handler(
    State(state): State<GatewayState>,
    Query(query): Query<HashMap<String, String>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let params = ConnectParams::from_query(query);
    ws.on_upgrade(move |socket| handle_socket(state, socket, params))
}

type WsSink = SplitSink<WebSocket, Message>;

async fn handle_socket(state: GatewayState, socket: WebSocket, params: ConnectParams) {
    let connection_id = generate_connection_id();
    let (mut sink, mut stream) = socket.split();

    let span = tracing::info_span!("gateway.connect", connection_id = %connection_id);
    let connection = match accept(&state, &connection_id, params).instrument(span).await {
        Ok(connection) => connection,
        Err(e) => {
            reject(&mut sink, &e).await;
            return;
        }
    };

    tracing::info!(
        connection_id = %connection_id,
        user_id = %connection.user_id(),
        channel = %connection.channel(),
        "Connection active"
    );

    let mut writer = tokio::spawn(write_loop(connection.clone(), sink));
    let mut writer_done = false;

    loop {
        tokio::select! {
            () = connection.closed() => {
                tracing::debug!(connection_id = %connection_id, "Close requested by gateway");
                break;
            }
            _ = &mut writer => {
                writer_done = true;
                tracing::debug!(connection_id = %connection_id, "Socket write side ended");
                break;
            }
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => handle_text(&state, &connection, &text).await,
                Some(Ok(Message::Pong(_))) => acknowledge_heartbeat(&state, &connection).await,
                Some(Ok(Message::Ping(_))) => connection.touch(),
                Some(Ok(Message::Binary(_))) => {
                    report(&connection, &GatewayError::MalformedMessage(
                        "binary frames are not supported".to_string(),
                    ));
                }
                Some(Ok(Message::Close(_))) | None => {
                    tracing::debug!(connection_id = %connection_id, "Client closed connection");
                    break;
                }
                Some(Err(e)) => {
                    tracing::debug!(connection_id = %connection_id, error = %e, "WebSocket transport error");
                    metrics::error("transport");
                    connection.fail("transport error");
                    break;
                }
            }
        }
    }

    if connection.is_active() {
        connection.transition(ConnectionState::Closing);
    }
    connection.queues().close();
    if !writer_done {
        let _ = writer.await;
    }

    cleanup(&state, &connection).await;
}

/// Authenticate, register, and publish the connection locally
///
/// No registry write happens before the token is accepted.
async fn accept(
    state: &GatewayState,
    connection_id: &str,
    params: ConnectParams,
) -> GatewayResult<Arc<LocalConnection>> {
    let mut phase = ConnectionState::Connecting;
    tracing::trace!(state = %phase, "Upgrade accepted");

    let token = params.session_token.ok_or_else(|| {
        metrics::auth_failure();
        GatewayError::AuthenticationFailure("missing session token".to_string())
    })?;

    phase = ConnectionState::Authenticating;
    tracing::trace!(state = %phase, "Validating session token");

    let identity = state.validator().validate(&token).await.map_err(|e| {
        let err = GatewayError::from(e);
        if matches!(err, GatewayError::AuthenticationFailure(_)) {
            metrics::auth_failure();
        }
        tracing::info!(error = %err, "Connection rejected");
        err
    })?;

    enforce_user_limit(state, &identity.user_id).await?;

    let gateway = &state.config().gateway;
    let channel = params
        .channel
        .unwrap_or_else(|| gateway.default_channel.clone());
    let record = ConnectionRecord::new(
        connection_id,
        token,
        &identity,
        channel.clone(),
        gateway.instance_id.clone(),
    )
    .with_metadata(params.metadata);

    register_with_retry(state, &record).await?;

    if let Err(e) = state.listeners().acquire(&channel).await {
        tracing::warn!(channel = %channel, error = %e, "Failed to start broadcast listener");
        if let Err(e) = state.registry().unregister_record(&record).await {
            tracing::warn!(error = %e, "Rollback of registration failed; left to lease expiry");
        }
        return Err(e);
    }

    let connection = LocalConnection::new(record, state.backpressure().new_queues());
    state.connections().insert(connection.clone());
    connection
        .queues()
        .push_control(ServerFrame::welcome(connection_id).to_json());

    metrics::connection_opened();
    tracing::debug!(state = %connection.state(), "Connection registered");
    Ok(connection)
}

async fn enforce_user_limit(state: &GatewayState, user_id: &str) -> GatewayResult<()> {
    let limit = state.config().gateway.max_connections_per_user;
    if limit == 0 {
        return Ok(());
    }

    match state.registry().live_connections_by_user(user_id).await {
        Ok(live) if live.len() >= limit => Err(GatewayError::ConnectionLimit(format!(
            "user already has {} of {limit} connections",
            live.len()
        ))),
        Ok(_) => Ok(()),
        Err(e) => {
            // Registration retries will surface a lasting outage
            tracing::warn!(error = %e, "Skipping connection limit check (degraded mode)");
            Ok(())
        }
    }
}

/// Register with exponential backoff while the store is unavailable
async fn register_with_retry(state: &GatewayState, record: &ConnectionRecord) -> GatewayResult<()> {
    let config = &state.config().registry;
    let attempts = config.register_attempts.max(1);
    let base = config.register_backoff();

    let mut attempt = 1;
    loop {
        match state.registry().register(record).await {
            Ok(_) => return Ok(()),
            Err(e) if e.is_unavailable() && attempt < attempts => {
                let delay = backoff_delay(base, attempt);
                tracing::warn!(
                    attempt,
                    attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Registration failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "Registration failed");
                return Err(e.into());
            }
        }
    }
}

/// `base * 2^(attempt - 1)` plus up to half of `base` of jitter
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let exponential = base.saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)));
    let max_jitter = (base.as_millis() / 2) as u64;
    let jitter = if max_jitter == 0 {
        0
    } else {
        rand::thread_rng().gen_range(0..=max_jitter)
    };
    exponential + Duration::from_millis(jitter)
}

/// Tell the client why it was refused, then close
async fn reject(sink: &mut WsSink, err: &GatewayError) {
    metrics::error(err.kind());
    let frame = ServerFrame::error(err.client_message()).to_json();
    if sink.send(Message::Text(frame.into())).await.is_ok() {
        let _ = sink.send(Message::Close(None)).await;
    }
    let _ = sink.close().await;
}

async fn write_loop(connection: Arc<LocalConnection>, mut sink: WsSink) {
    while let Some(frame) = connection.queues().recv().await {
        if let Err(e) = sink.send(Message::Text(frame.into())).await {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Failed to write frame");
            metrics::error("transport");
            connection.fail("write failed");
            break;
        }
        metrics::message_out();
    }
    let _ = sink.close().await;
}

async fn handle_text(state: &GatewayState, connection: &LocalConnection, text: &str) {
    connection.touch();

    match ClientFrame::parse(text) {
        Ok(ClientFrame::HeartbeatAck) => acknowledge_heartbeat(state, connection).await,
        Ok(ClientFrame::Envelope(envelope)) => {
            if let Err(e) = state.router().route(connection, envelope).await {
                report(connection, &e);
            }
        }
        Err(e) => {
            let err = GatewayError::from(e);
            tracing::debug!(connection_id = %connection.id(), error = %err, "Malformed frame");
            report(connection, &err);
        }
    }
}

async fn acknowledge_heartbeat(state: &GatewayState, connection: &LocalConnection) {
    connection.touch();
    match state.registry().update_heartbeat(connection.id()).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::debug!(connection_id = %connection.id(), "Heartbeat for expired record");
        }
        Err(e) => {
            tracing::warn!(connection_id = %connection.id(), error = %e, "Failed to record heartbeat (degraded mode)");
        }
    }
}

/// Send a recoverable error frame; dropped-message outcomes stay silent
fn report(connection: &LocalConnection, err: &GatewayError) {
    metrics::error(err.kind());
    if err.is_drop() {
        return;
    }
    connection
        .queues()
        .push_control(ServerFrame::error(err.client_message()).to_json());
}

async fn cleanup(state: &GatewayState, connection: &LocalConnection) {
    let mut record = connection.record().clone();
    record.channel = connection.channel();

    if let Err(e) = state.registry().unregister_record(&record).await {
        tracing::warn!(
            connection_id = %record.connection_id,
            error = %e,
            "Unregister failed; record left to lease expiry"
        );
    }

    state.listeners().release(&record.channel).await;
    state.connections().remove(&record.connection_id);
    connection.transition(ConnectionState::Closed);
    metrics::connection_closed();

    tracing::info!(connection_id = %record.connection_id, "Connection closed");
}
