//! Gateway Integration Tests
//!
//! Most tests run hermetically on the in-memory store and bus. Tests at the
//! bottom need a running Redis and skip themselves unless `REDIS_URL` is set.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use integration_tests::{
    assert_json, assert_status, envelope, eventually, redis_url, ConnectionCountResponse,
    GetEndpointRequest, GetEndpointResponse, PublishRequest, PublishResponse, TestCluster,
    TestGateway, TestSession, WsClient,
};
use reqwest::StatusCode;
use serde_json::json;
use std::time::Duration;

async fn publish(gateway: &TestGateway, channel: &str, message: serde_json::Value) -> PublishResponse {
    let response = gateway
        .post("/soa/publish_to_channel", &PublishRequest::new(channel, message))
        .await
        .unwrap();
    assert_json(response, StatusCode::OK).await.unwrap()
}

async fn session(cluster: &TestCluster) -> TestSession {
    let session = TestSession::unique();
    cluster.issue_session(&session).await.unwrap();
    session
}

// ============================================================================
// Health
// ============================================================================

#[tokio::test]
async fn test_health_check() {
    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-health").await.unwrap();

    let response = gateway.get("/health").await.unwrap();
    let body: serde_json::Value = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(body["instance_id"], "gw-health");

    let response = gateway.get("/health/ready").await.unwrap();
    assert_status(response, StatusCode::OK).await.unwrap();
}

// ============================================================================
// Connection lifecycle
// ============================================================================

#[tokio::test]
async fn test_connect_route_publish_close() {
    let cluster = TestCluster::memory();
    let session = TestSession::named("tok1", "user-tok1");
    cluster.issue_session(&session).await.unwrap();
    let gateway = cluster.start_gateway("gw-1").await.unwrap();

    let mut client = gateway.connect(&session).await.unwrap();
    assert!(!client.connection_id.is_empty());

    client
        .send_json(&envelope("guide", "chat", json!({"message": "Hi"})))
        .await
        .unwrap();
    let reply = client
        .recv_json_within(Duration::from_millis(300))
        .await
        .unwrap();
    assert!(reply.is_none(), "unexpected frame: {reply:?}");

    let published = publish(&gateway, "guide", json!({"type": "test"})).await;
    assert!(published.success);
    assert_eq!(published.channel, "guide");

    let frame = client.recv_json().await.unwrap();
    assert_eq!(frame, json!({"type": "test"}));

    let registry = cluster.registry();
    let id = client.connection_id.clone();
    assert!(registry
        .connections_by_channel("guide")
        .await
        .unwrap()
        .contains(&id));

    client.close().await.unwrap();

    let (registry, id) = (&registry, &id);
    let cleaned = eventually(Duration::from_secs(3), move || async move {
        let in_channel = registry.connections_by_channel("guide").await.unwrap();
        let record = registry.get(id).await.unwrap();
        !in_channel.contains(id) && record.is_none()
    })
    .await;
    assert!(cleaned, "connection {id} still registered after close");
}

#[tokio::test]
async fn test_invalid_token_rejected_without_state() {
    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-reject").await.unwrap();

    let mut client = WsClient::connect(&gateway.ws_url("not-a-session")).await.unwrap();
    let frame = client.recv_json().await.unwrap();
    assert_eq!(frame["type"], "error");
    assert!(client.closed_within(Duration::from_secs(2)).await);

    let registry = cluster.registry();
    assert!(registry
        .connections_by_gateway("gw-reject")
        .await
        .unwrap()
        .is_empty());
    assert_eq!(registry.connection_count().await.unwrap().total, 0);
}

#[tokio::test]
async fn test_missing_token_rejected() {
    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-missing").await.unwrap();

    let url = format!("ws://{}/ws", gateway.addr);
    let mut client = WsClient::connect(&url).await.unwrap();
    let frame = client.recv_json().await.unwrap();
    assert_eq!(frame["type"], "error");
    assert!(client.closed_within(Duration::from_secs(2)).await);
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let cluster = TestCluster::memory();
    let session = session(&cluster).await;
    let gateway = cluster.start_gateway("gw-malformed").await.unwrap();

    let mut client = gateway.connect_to_channel(&session, Some("guide")).await.unwrap();

    client.send_text("not json").await.unwrap();
    let frame = client.recv_json().await.unwrap();
    assert_eq!(frame["type"], "error");

    client
        .send_json(&json!({"channel": "guide", "payload": {}}))
        .await
        .unwrap();
    let frame = client.recv_json().await.unwrap();
    assert_eq!(frame["type"], "error");
    assert!(frame["message"].as_str().unwrap().contains("intent"));

    // Still served after both errors
    publish(&gateway, "guide", json!({"n": 1})).await;
    assert_eq!(client.recv_json().await.unwrap(), json!({"n": 1}));
}

#[tokio::test]
async fn test_heartbeat_ack_refreshes_record() {
    let cluster = TestCluster::memory();
    let session = session(&cluster).await;
    let gateway = cluster.start_gateway("gw-hb").await.unwrap();

    let mut client = gateway.connect(&session).await.unwrap();
    let registry = cluster.registry();
    let before = registry.get(&client.connection_id).await.unwrap().unwrap();

    tokio::time::sleep(Duration::from_millis(20)).await;
    client.send_json(&json!({"type": "heartbeat_ack"})).await.unwrap();

    let (registry, id) = (&registry, client.connection_id.as_str());
    let previous = before.last_heartbeat;
    let refreshed = eventually(Duration::from_secs(2), move || async move {
        registry
            .get(id)
            .await
            .unwrap()
            .is_some_and(|r| r.last_heartbeat > previous)
    })
    .await;
    assert!(refreshed);
}

#[tokio::test]
async fn test_connection_limit_per_user() {
    let cluster = TestCluster::memory();
    let session = session(&cluster).await;
    let gateway = cluster
        .start_gateway_with("gw-limit", |config| {
            config.gateway.max_connections_per_user = 1;
        })
        .await
        .unwrap();

    let _first = gateway.connect(&session).await.unwrap();

    let mut second = WsClient::connect(&gateway.ws_url(&session.token)).await.unwrap();
    let frame = second.recv_json().await.unwrap();
    assert_eq!(frame["type"], "error");
    assert!(second.closed_within(Duration::from_secs(2)).await);
}

// ============================================================================
// Fan-out
// ============================================================================

#[tokio::test]
async fn test_fanout_reaches_every_instance_and_only_the_channel() {
    let cluster = TestCluster::memory();
    let gw_a = cluster.start_gateway("gw-a").await.unwrap();
    let gw_b = cluster.start_gateway("gw-b").await.unwrap();

    let mut guide_a = gw_a
        .connect_to_channel(&session(&cluster).await, Some("guide"))
        .await
        .unwrap();
    let mut guide_b = gw_b
        .connect_to_channel(&session(&cluster).await, Some("guide"))
        .await
        .unwrap();
    let mut general_b = gw_b
        .connect_to_channel(&session(&cluster).await, Some("general"))
        .await
        .unwrap();

    publish(&gw_a, "guide", json!({"type": "test", "seq": 1})).await;

    assert_eq!(guide_a.recv_json().await.unwrap()["seq"], 1);
    assert_eq!(guide_b.recv_json().await.unwrap()["seq"], 1);
    assert!(general_b
        .recv_json_within(Duration::from_millis(300))
        .await
        .unwrap()
        .is_none());
}

#[tokio::test]
async fn test_channel_switch_moves_subscription() {
    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-switch").await.unwrap();
    let mut client = gateway
        .connect_to_channel(&session(&cluster).await, Some("general"))
        .await
        .unwrap();

    client
        .send_json(&envelope("guide", "chat", json!({})))
        .await
        .unwrap();

    let registry = cluster.registry();
    let id = client.connection_id.clone();
    let moved = {
        let (registry, id) = (&registry, &id);
        eventually(Duration::from_secs(2), move || async move {
            registry.connections_by_channel("guide").await.unwrap().contains(id)
        })
        .await
    };
    assert!(moved);
    assert!(!registry
        .connections_by_channel("general")
        .await
        .unwrap()
        .contains(&id));

    publish(&gateway, "general", json!({"from": "general"})).await;
    publish(&gateway, "guide", json!({"from": "guide"})).await;
    assert_eq!(client.recv_json().await.unwrap(), json!({"from": "guide"}));
}

#[tokio::test]
async fn test_envelope_forwarded_to_service_topic() {
    use relay_core::FanOutBus;

    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-service").await.unwrap();
    let mut service = gateway.state.bus().subscribe("service:guide").await.unwrap();

    let session = session(&cluster).await;
    let mut client = gateway.connect(&session).await.unwrap();
    client
        .send_json(&envelope("guide", "chat", json!({"message": "hello"})))
        .await
        .unwrap();

    let request: serde_json::Value = serde_json::from_str(
        &tokio::time::timeout(Duration::from_secs(2), service.recv())
            .await
            .unwrap()
            .unwrap(),
    )
    .unwrap();
    assert_eq!(request["connection_id"], client.connection_id.as_str());
    assert_eq!(request["user_id"], session.user_id.as_str());
    assert_eq!(request["envelope"]["payload"]["message"], "hello");
}

// ============================================================================
// Administrative endpoints
// ============================================================================

#[tokio::test]
async fn test_get_endpoint() {
    let cluster = TestCluster::memory();
    let session = session(&cluster).await;
    let gateway = cluster.start_gateway("gw-endpoint").await.unwrap();

    let response = gateway
        .post(
            "/soa/get_endpoint",
            &GetEndpointRequest {
                session_token: session.token.clone(),
                realm: Some("default".to_string()),
            },
        )
        .await
        .unwrap();
    let endpoint: GetEndpointResponse = assert_json(response, StatusCode::OK).await.unwrap();

    assert!(endpoint.websocket_url.starts_with("ws://"));
    assert!(endpoint.websocket_url.ends_with(&format!("session_token={}", session.token)));
    assert!(endpoint.channels.contains(&"general".to_string()));
    assert!(endpoint.message_format.get("channel").is_some());

    // The advertised URL works
    let mut client = WsClient::connect(&endpoint.websocket_url).await.unwrap();
    assert_eq!(client.recv_json().await.unwrap()["type"], "system");
}

#[tokio::test]
async fn test_get_endpoint_rejects_unknown_session() {
    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-endpoint-401").await.unwrap();

    let response = gateway
        .post(
            "/soa/get_endpoint",
            &GetEndpointRequest {
                session_token: "unknown".to_string(),
                realm: None,
            },
        )
        .await
        .unwrap();
    assert_status(response, StatusCode::UNAUTHORIZED).await.unwrap();
}

#[tokio::test]
async fn test_publish_requires_channel() {
    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-publish-400").await.unwrap();

    let response = gateway
        .post("/soa/publish_to_channel", &PublishRequest::new("", json!({})))
        .await
        .unwrap();
    assert_status(response, StatusCode::BAD_REQUEST).await.unwrap();
}

#[tokio::test]
async fn test_connections_count() {
    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-count").await.unwrap();

    let _a = gateway
        .connect_to_channel(&session(&cluster).await, Some("guide"))
        .await
        .unwrap();
    let _b = gateway
        .connect_to_channel(&session(&cluster).await, Some("guide"))
        .await
        .unwrap();
    let _c = gateway.connect(&session(&cluster).await).await.unwrap();

    let response = gateway.get("/soa/connections/count").await.unwrap();
    let count: ConnectionCountResponse = assert_json(response, StatusCode::OK).await.unwrap();
    assert_eq!(count.total, 3);
    assert_eq!(count.by_channel.get("guide"), Some(&2));
    assert_eq!(count.by_channel.get("general"), Some(&1));
}

// ============================================================================
// Shutdown
// ============================================================================

#[tokio::test]
async fn test_shutdown_unregisters_instance_connections() {
    let cluster = TestCluster::memory();
    let gateway = cluster.start_gateway("gw-shutdown").await.unwrap();
    let survivor = cluster.start_gateway("gw-survivor").await.unwrap();

    let _a = gateway.connect(&session(&cluster).await).await.unwrap();
    let _b = gateway.connect(&session(&cluster).await).await.unwrap();
    let kept = survivor.connect(&session(&cluster).await).await.unwrap();

    gateway.shutdown().await.unwrap();

    let registry = cluster.registry();
    assert!(registry
        .connections_by_gateway("gw-shutdown")
        .await
        .unwrap()
        .is_empty());
    let count = registry.connection_count().await.unwrap();
    assert_eq!(count.total, 1);
    assert!(registry.get(&kept.connection_id).await.unwrap().is_some());
}

// ============================================================================
// Redis-backed
// ============================================================================

#[tokio::test]
async fn test_redis_cross_instance_fanout() {
    let Some(url) = redis_url() else {
        return;
    };

    let cluster = TestCluster::redis(&url).unwrap();
    let gw_a = cluster.start_gateway("it-redis-a").await.unwrap();
    let gw_b = cluster.start_gateway("it-redis-b").await.unwrap();

    let channel = format!("guide-{}", uuid::Uuid::new_v4());
    let mut on_b = gw_b
        .connect_to_channel(&session(&cluster).await, Some(&channel))
        .await
        .unwrap();

    // The subscriber task confirms SUBSCRIBE asynchronously
    tokio::time::sleep(Duration::from_millis(300)).await;
    publish(&gw_a, &channel, json!({"type": "test"})).await;

    assert_eq!(on_b.recv_json().await.unwrap(), json!({"type": "test"}));

    let id = on_b.connection_id.clone();
    on_b.close().await.unwrap();

    let registry = cluster.registry();
    let (registry, channel, id) = (&registry, channel.as_str(), &id);
    let cleaned = eventually(Duration::from_secs(3), move || async move {
        !registry.connections_by_channel(channel).await.unwrap().contains(id)
    })
    .await;
    assert!(cleaned);
}

#[tokio::test]
async fn test_redis_readiness() {
    let Some(url) = redis_url() else {
        return;
    };

    let cluster = TestCluster::redis(&url).unwrap();
    let gateway = cluster.start_gateway("it-redis-ready").await.unwrap();

    let response = gateway.get("/health/ready").await.unwrap();
    assert_status(response, StatusCode::OK).await.unwrap();
}
