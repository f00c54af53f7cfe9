//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, AppSettings, BackpressureConfig, ConfigError, Environment, GatewayConfig,
    HeartbeatConfig, RegistryConfig, SessionBackend, SessionConfig, StoreBackend, StoreConfig,
};
