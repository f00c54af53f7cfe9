//! # relay-common
//!
//! Shared utilities including configuration, error handling, session tokens, and telemetry.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{Claims, JwtSessionValidator};
pub use config::{
    AppConfig, AppSettings, BackpressureConfig, ConfigError, Environment, GatewayConfig,
    HeartbeatConfig, RegistryConfig, SessionBackend, SessionConfig, StoreBackend, StoreConfig,
};
pub use error::{AppError, AppResult, ErrorResponse};
pub use telemetry::{
    try_init_tracing, try_init_tracing_with_config, LogFormat, TracingConfig, TracingError,
};
