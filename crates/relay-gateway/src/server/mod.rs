//! Gateway server setup
//!
//! Backend construction, routes, background tasks, and graceful shutdown.

mod handler;
mod state;

pub use handler::{ws_handler, ConnectParams};
pub use state::GatewayState;

use axum::{
    routing::{get, post},
    Router,
};
use relay_common::{AppConfig, AppError, SessionBackend, StoreBackend};
use relay_core::{ConnectionStore, FanOutBus, SessionValidator};
use relay_store::{
    ConnectionRegistry, MemoryConnectionStore, MemoryFanOutBus, RedisConnectionStore,
    RedisFanOutBus, RedisPool, StoreSessionValidator,
};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;

use crate::handlers::{
    connections_count, get_endpoint, health_check, metrics_handler, publish_to_channel,
    readiness_check,
};
use crate::heartbeat::HeartbeatMonitor;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/soa/get_endpoint", post(get_endpoint))
        .route("/soa/publish_to_channel", post(publish_to_channel))
        .route("/soa/connections/count", get(connections_count))
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Connect the configured store, bus, and session backends
pub async fn create_gateway_state(config: AppConfig) -> Result<GatewayState, AppError> {
    let (store, bus): (Arc<dyn ConnectionStore>, Arc<dyn FanOutBus>) = match config.store.backend
    {
        StoreBackend::Redis => {
            tracing::info!("Connecting to Redis...");
            let pool = Arc::new(
                RedisPool::from_config(&config.store)
                    .map_err(|e| AppError::StoreUnavailable(e.to_string()))?,
            );
            if let Err(e) = pool.health_check().await {
                // Existing records self-heal; registrations retry
                tracing::warn!(error = %e, "Redis not reachable at startup (degraded mode)");
            }
            let bus = RedisFanOutBus::new(pool.clone())
                .await
                .map_err(|e| AppError::StoreUnavailable(format!("Failed to start subscriber: {e}")))?;
            tracing::info!(url = %pool.url(), "Redis backend ready");
            (Arc::new(RedisConnectionStore::new(pool)), Arc::new(bus))
        }
        StoreBackend::Memory => {
            tracing::info!("Using in-memory store and bus (single node)");
            (
                Arc::new(MemoryConnectionStore::new()),
                Arc::new(MemoryFanOutBus::default()),
            )
        }
    };

    let validator: Arc<dyn SessionValidator> = match config.session.backend {
        SessionBackend::Store => Arc::new(StoreSessionValidator::new(store.clone())),
        SessionBackend::Jwt => {
            let secret = config
                .session
                .jwt_secret
                .as_deref()
                .ok_or_else(|| AppError::Config("SESSION_JWT_SECRET is required".to_string()))?;
            Arc::new(relay_common::JwtSessionValidator::new(secret))
        }
    };

    let registry = ConnectionRegistry::new(store, config.registry.connection_ttl());
    Ok(GatewayState::new(config, registry, bus, validator))
}

/// Start the heartbeat monitor and the breaker cooldown sweeper
pub fn spawn_background_tasks(state: &GatewayState) -> Vec<JoinHandle<()>> {
    let heartbeat = &state.config().heartbeat;
    let monitor = HeartbeatMonitor::new(
        state.connections().clone(),
        heartbeat.interval(),
        heartbeat.client_timeout(),
    );

    vec![
        monitor.spawn(),
        state
            .backpressure()
            .spawn_sweeper(state.config().backpressure.sweep_interval()),
    ]
}

/// Serve on `listener` until `shutdown` resolves, then release this
/// instance's connections
pub async fn serve<F>(listener: TcpListener, state: GatewayState, shutdown: F) -> Result<(), AppError>
where
    F: Future<Output = ()> + Send + 'static,
{
    let tasks = spawn_background_tasks(&state);
    let app = create_app(state.clone());

    let connections = state.connections().clone();
    let signal = async move {
        shutdown.await;
        tracing::info!("Shutdown signal received, closing connections");
        // Upgraded sockets are not tracked by graceful shutdown
        connections.close_all();
    };

    let result = axum::serve(listener, app)
        .with_graceful_shutdown(signal)
        .await
        .map_err(|e| AppError::Server(e.to_string()));

    for task in &tasks {
        task.abort();
    }
    shutdown_instance(&state).await;
    result
}

/// Stop listeners and bulk-unregister this instance's connections
///
/// Best effort: records left behind expire with their lease.
pub async fn shutdown_instance(state: &GatewayState) {
    state.connections().close_all();
    state.listeners().shutdown().await;

    match state.registry().unregister_gateway(state.instance_id()).await {
        Ok(removed) => tracing::info!(removed, "Instance connections unregistered"),
        Err(e) => tracing::warn!(
            error = %e,
            "Bulk unregister failed; records left to lease expiry"
        ),
    }
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> Result<(), AppError> {
    let addr = config.gateway.address();
    let state = create_gateway_state(config).await?;

    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Server(format!("failed to bind to {addr}: {e}")))?;

    tracing::info!(
        instance_id = %state.instance_id(),
        "Gateway listening on ws://{}/ws",
        addr
    );

    serve(listener, state, shutdown_signal()).await
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
