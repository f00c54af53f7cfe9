//! Test helpers for integration tests
//!
//! A `TestCluster` owns the shared backends; each `TestGateway` is one
//! gateway instance serving on its own ephemeral port.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use relay_common::{AppConfig, StoreBackend};
use relay_core::{ConnectionStore, FanOutBus, SessionIdentity, SessionValidator};
use relay_gateway::GatewayState;
use relay_store::{
    create_shared_pool, ConnectionRegistry, MemoryConnectionStore, MemoryFanOutBus,
    RedisConnectionStore, RedisFanOutBus, RedisPoolConfig, SharedRedisPool, StoreSessionValidator,
};
use reqwest::{Client, Response, StatusCode};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::fixtures::TestSession;

/// How long a test waits for a frame before giving up
pub const FRAME_TIMEOUT: Duration = Duration::from_secs(3);

enum Backend {
    Memory(Arc<MemoryFanOutBus>),
    /// Every gateway gets its own subscriber connection, like separate processes
    Redis(SharedRedisPool),
}

/// Shared store and bus for any number of gateway instances
pub struct TestCluster {
    store: Arc<dyn ConnectionStore>,
    backend: Backend,
    sessions: StoreSessionValidator,
}

impl TestCluster {
    /// Hermetic cluster on the in-memory backends
    pub fn memory() -> Self {
        let store: Arc<dyn ConnectionStore> = Arc::new(MemoryConnectionStore::new());
        Self {
            sessions: StoreSessionValidator::new(store.clone()),
            store,
            backend: Backend::Memory(Arc::new(MemoryFanOutBus::default())),
        }
    }

    /// Cluster on a real Redis
    pub fn redis(url: &str) -> Result<Self> {
        let pool = create_shared_pool(RedisPoolConfig {
            url: url.to_string(),
            ..RedisPoolConfig::default()
        })?;
        let store: Arc<dyn ConnectionStore> = Arc::new(RedisConnectionStore::new(pool.clone()));
        Ok(Self {
            sessions: StoreSessionValidator::new(store.clone()),
            store,
            backend: Backend::Redis(pool),
        })
    }

    pub fn store(&self) -> &Arc<dyn ConnectionStore> {
        &self.store
    }

    /// Registry view with the default lease
    pub fn registry(&self) -> ConnectionRegistry {
        ConnectionRegistry::new(self.store.clone(), AppConfig::default().registry.connection_ttl())
    }

    /// Write a session the way the session service would
    pub async fn issue_session(&self, session: &TestSession) -> Result<()> {
        self.sessions
            .issue(
                &session.token,
                &SessionIdentity::new(&session.user_id),
                Duration::from_secs(600),
            )
            .await?;
        Ok(())
    }

    async fn bus(&self) -> Result<Arc<dyn FanOutBus>> {
        Ok(match &self.backend {
            Backend::Memory(bus) => bus.clone(),
            Backend::Redis(pool) => Arc::new(RedisFanOutBus::new(pool.clone()).await?),
        })
    }

    /// Start a gateway instance with default settings
    pub async fn start_gateway(&self, instance_id: &str) -> Result<TestGateway> {
        self.start_gateway_with(instance_id, |_| {}).await
    }

    /// Start a gateway instance, adjusting its configuration first
    pub async fn start_gateway_with(
        &self,
        instance_id: &str,
        configure: impl FnOnce(&mut AppConfig),
    ) -> Result<TestGateway> {
        let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await?;
        let addr = listener.local_addr()?;

        let mut config = AppConfig::default();
        config.gateway.instance_id = instance_id.to_string();
        config.gateway.port = addr.port();
        config.gateway.public_url = format!("ws://{addr}/ws");
        config.store.backend = match self.backend {
            Backend::Memory(_) => StoreBackend::Memory,
            Backend::Redis(_) => StoreBackend::Redis,
        };
        configure(&mut config);

        let registry = ConnectionRegistry::new(self.store.clone(), config.registry.connection_ttl());
        let validator: Arc<dyn SessionValidator> =
            Arc::new(StoreSessionValidator::new(self.store.clone()));
        let state = GatewayState::new(config, registry, self.bus().await?, validator);

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server_state = state.clone();
        let handle = tokio::spawn(async move {
            let shutdown = async {
                let _ = shutdown_rx.await;
            };
            if let Err(e) = relay_gateway::serve(listener, server_state, shutdown).await {
                eprintln!("gateway stopped with error: {e}");
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(10)).build()?;

        Ok(TestGateway {
            addr,
            client,
            state,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }
}

/// One running gateway instance
pub struct TestGateway {
    pub addr: SocketAddr,
    pub client: Client,
    pub state: GatewayState,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl TestGateway {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?session_token={token}", self.addr)
    }

    pub fn instance_id(&self) -> &str {
        self.state.instance_id()
    }

    pub async fn get(&self, path: &str) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }

    pub async fn post<T: Serialize>(&self, path: &str, body: &T) -> Result<Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.post(&url).json(body).send().await?)
    }

    /// Open a socket for `session` and consume the welcome frame
    pub async fn connect(&self, session: &TestSession) -> Result<WsClient> {
        self.connect_to_channel(session, None).await
    }

    pub async fn connect_to_channel(
        &self,
        session: &TestSession,
        channel: Option<&str>,
    ) -> Result<WsClient> {
        let mut url = self.ws_url(&session.token);
        if let Some(channel) = channel {
            url.push_str(&format!("&channel={channel}"));
        }

        let mut client = WsClient::connect(&url).await?;
        let welcome = client.recv_json().await?;
        anyhow::ensure!(welcome["type"] == "system", "expected welcome, got {welcome}");
        client.connection_id = welcome["connection_id"]
            .as_str()
            .context("welcome without connection_id")?
            .to_string();
        Ok(client)
    }

    /// Trigger graceful shutdown and wait for it to finish
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            tokio::time::timeout(Duration::from_secs(10), handle)
                .await
                .context("gateway did not shut down")??;
        }
        Ok(())
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// WebSocket client speaking the gateway frame format
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    pub connection_id: String,
}

impl WsClient {
    /// Open a socket without reading anything
    pub async fn connect(url: &str) -> Result<Self> {
        let (stream, _) = connect_async(url).await?;
        Ok(Self {
            stream,
            connection_id: String::new(),
        })
    }

    pub async fn send_json(&mut self, value: &Value) -> Result<()> {
        self.send_text(&value.to_string()).await
    }

    pub async fn send_text(&mut self, text: &str) -> Result<()> {
        self.stream.send(Message::text(text)).await?;
        Ok(())
    }

    /// Next JSON frame that is not a heartbeat
    pub async fn recv_json(&mut self) -> Result<Value> {
        self.recv_json_within(FRAME_TIMEOUT)
            .await?
            .context("timed out waiting for a frame")
    }

    /// Next non-heartbeat frame, or `None` if nothing arrives in time
    pub async fn recv_json_within(&mut self, wait: Duration) -> Result<Option<Value>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            let next = match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Ok(next) => next,
                Err(_) => return Ok(None),
            };
            match next {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text)?;
                    if value["type"] == "heartbeat" {
                        continue;
                    }
                    return Ok(Some(value));
                }
                Some(Ok(Message::Close(_))) | None => anyhow::bail!("socket closed"),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Whether the server closes the socket within `wait`
    pub async fn closed_within(&mut self, wait: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            match tokio::time::timeout_at(deadline, self.stream.next()).await {
                Err(_) => return false,
                Ok(None | Some(Err(_) | Ok(Message::Close(_)))) => return true,
                Ok(Some(Ok(_))) => {}
            }
        }
    }

    pub async fn close(mut self) -> Result<()> {
        self.stream.close(None).await?;
        // Drain until the server acknowledges
        while let Some(Ok(_)) = self.stream.next().await {}
        Ok(())
    }
}

/// Poll `check` until it holds or `wait` runs out
pub async fn eventually<F, Fut>(wait: Duration, mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + wait;
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    check().await
}

/// `REDIS_URL` if set; Redis-backed tests skip themselves otherwise
pub fn redis_url() -> Option<String> {
    dotenvy::dotenv().ok();
    match std::env::var("REDIS_URL") {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: REDIS_URL not set");
            None
        }
    }
}

/// Assert response status and parse JSON body
pub async fn assert_json<T: DeserializeOwned>(response: Response, expected_status: StatusCode) -> Result<T> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!("Expected status {expected_status}, got {status}. Body: {body}");
    }
    Ok(response.json().await?)
}

/// Assert response status only
pub async fn assert_status(response: Response, expected_status: StatusCode) -> Result<()> {
    let status = response.status();
    if status != expected_status {
        let body = response.text().await?;
        anyhow::bail!("Expected status {expected_status}, got {status}. Body: {body}");
    }
    Ok(())
}
