//! Administrative SOA endpoints
//!
//! Called by business services, not by end clients.

use axum::{extract::State, Json};
use relay_common::AppError;
use relay_core::{ConnectionCount, FanOutBus, SessionValidator};
use relay_store::PubSubChannel;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::response::ApiResult;
use crate::protocol::BroadcastMessage;
use crate::server::GatewayState;

#[derive(Debug, Deserialize)]
pub struct GetEndpointRequest {
    pub session_token: String,
    /// Accepted for compatibility; every realm is served by the same gateway
    #[serde(default)]
    pub realm: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GetEndpointResponse {
    pub websocket_url: String,
    pub channels: Vec<String>,
    pub message_format: Value,
}

#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    pub channel: String,
    pub message: Value,
    #[serde(default)]
    pub realm: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    pub success: bool,
    pub status: String,
    pub channel: String,
}

/// Describes the inbound envelope for client implementers
fn message_format() -> Value {
    json!({
        "channel": "string",
        "intent": "string",
        "payload": "object",
        "conversation_id": "string (optional)"
    })
}

/// POST /soa/get_endpoint
///
/// Validates the token and tells the caller where its client should connect.
pub async fn get_endpoint(
    State(state): State<GatewayState>,
    Json(request): Json<GetEndpointRequest>,
) -> ApiResult<Json<GetEndpointResponse>> {
    if request.session_token.trim().is_empty() {
        return Err(AppError::MissingAuth.into());
    }

    let identity = state.validator().validate(&request.session_token).await?;
    tracing::debug!(
        user_id = %identity.user_id,
        realm = ?request.realm,
        "Issued gateway endpoint"
    );

    let gateway = &state.config().gateway;
    Ok(Json(GetEndpointResponse {
        websocket_url: format!("{}?session_token={}", gateway.public_url, request.session_token),
        channels: gateway.channels.clone(),
        message_format: message_format(),
    }))
}

/// POST /soa/publish_to_channel
///
/// Publishes on the channel's fan-out topic so every instance delivers it.
pub async fn publish_to_channel(
    State(state): State<GatewayState>,
    Json(request): Json<PublishRequest>,
) -> ApiResult<Json<PublishResponse>> {
    if request.channel.trim().is_empty() {
        return Err(AppError::validation("channel is required").into());
    }

    let body = serde_json::to_string(&BroadcastMessage {
        channel: request.channel.clone(),
        message: request.message,
    })
    .map_err(AppError::internal)?;

    let topic = PubSubChannel::fanout(&request.channel).name();
    let instances = state.bus().publish(&topic, &body).await?;

    tracing::info!(
        channel = %request.channel,
        realm = ?request.realm,
        instances,
        "Published to channel"
    );

    Ok(Json(PublishResponse {
        success: true,
        status: "published".to_string(),
        channel: request.channel,
    }))
}

/// GET /soa/connections/count
pub async fn connections_count(
    State(state): State<GatewayState>,
) -> ApiResult<Json<ConnectionCount>> {
    Ok(Json(state.registry().connection_count().await?))
}
