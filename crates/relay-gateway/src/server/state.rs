//! Gateway state
//!
//! Shared dependencies of every HTTP handler and socket task.

use relay_common::AppConfig;
use relay_core::{FanOutBus, SessionValidator};
use relay_store::ConnectionRegistry;
use std::sync::Arc;

use crate::backpressure::BackpressureManager;
use crate::broadcast::ChannelListeners;
use crate::connection::ConnectionManager;
use crate::router::ChannelRouter;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    config: Arc<AppConfig>,
    registry: ConnectionRegistry,
    bus: Arc<dyn FanOutBus>,
    validator: Arc<dyn SessionValidator>,
    connections: Arc<ConnectionManager>,
    listeners: Arc<ChannelListeners>,
    backpressure: Arc<BackpressureManager>,
    router: ChannelRouter,
}

impl GatewayState {
    /// Wire the per-instance components around the shared backends
    #[must_use]
    pub fn new(
        config: AppConfig,
        registry: ConnectionRegistry,
        bus: Arc<dyn FanOutBus>,
        validator: Arc<dyn SessionValidator>,
    ) -> Self {
        let connections = ConnectionManager::new_shared();
        let backpressure = Arc::new(BackpressureManager::new(&config.backpressure));
        let listeners = Arc::new(ChannelListeners::new(
            bus.clone(),
            registry.clone(),
            connections.clone(),
            backpressure.clone(),
            config.gateway.instance_id.clone(),
        ));
        let router = ChannelRouter::new(registry.clone(), bus.clone(), listeners.clone());

        Self {
            config: Arc::new(config),
            registry,
            bus,
            validator,
            connections,
            listeners,
            backpressure,
            router,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn instance_id(&self) -> &str {
        &self.config.gateway.instance_id
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<dyn FanOutBus> {
        &self.bus
    }

    pub fn validator(&self) -> &Arc<dyn SessionValidator> {
        &self.validator
    }

    pub fn connections(&self) -> &Arc<ConnectionManager> {
        &self.connections
    }

    pub fn listeners(&self) -> &Arc<ChannelListeners> {
        &self.listeners
    }

    pub fn backpressure(&self) -> &Arc<BackpressureManager> {
        &self.backpressure
    }

    pub fn router(&self) -> &ChannelRouter {
        &self.router
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("instance_id", &self.config.gateway.instance_id)
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}
