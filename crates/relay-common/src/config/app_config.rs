//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file when present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: GatewayConfig,
    pub store: StoreConfig,
    pub registry: RegistryConfig,
    pub heartbeat: HeartbeatConfig,
    pub backpressure: BackpressureConfig,
    pub session: SessionConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            env: default_env(),
        }
    }
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }
}

/// Gateway instance settings
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Identifies this process in the shared store
    pub instance_id: String,
    /// Externally reachable WebSocket URL handed out by `get_endpoint`
    pub public_url: String,
    /// Channel a connection is subscribed to before its first message
    pub default_channel: String,
    /// Channels advertised to clients by `get_endpoint`
    pub channels: Vec<String>,
    /// Live connections allowed per user (0 = unlimited)
    pub max_connections_per_user: usize,
}

impl GatewayConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_gateway_port(),
            instance_id: default_instance_id(),
            public_url: format!("ws://{}:{}/ws", default_host(), default_gateway_port()),
            default_channel: default_channel(),
            channels: default_channels(),
            max_connections_per_user: 0,
        }
    }
}

/// Backing store selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Redis,
    /// Process-local store, for single-node development and tests
    Memory,
}

/// Connection store and fan-out bus configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub redis_url: String,
    #[serde(default = "default_redis_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: default_redis_url(),
            max_connections: default_redis_max_connections(),
        }
    }
}

/// Connection registry settings
#[derive(Debug, Clone, Deserialize)]
pub struct RegistryConfig {
    pub connection_ttl_secs: u64,
    pub register_attempts: u32,
    pub register_backoff_ms: u64,
}

impl RegistryConfig {
    #[must_use]
    pub fn connection_ttl(&self) -> Duration {
        Duration::from_secs(self.connection_ttl_secs)
    }

    #[must_use]
    pub fn register_backoff(&self) -> Duration {
        Duration::from_millis(self.register_backoff_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            connection_ttl_secs: default_connection_ttl(),
            register_attempts: 3,
            register_backoff_ms: 100,
        }
    }
}

/// Heartbeat monitor settings
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    pub interval_secs: u64,
    /// Silence after which the owning instance closes the socket itself
    pub client_timeout_secs: u64,
}

impl HeartbeatConfig {
    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[must_use]
    pub fn client_timeout(&self) -> Duration {
        Duration::from_secs(self.client_timeout_secs)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            client_timeout_secs: 90,
        }
    }
}

/// Backpressure manager settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackpressureConfig {
    /// Bound of each per-channel outbound queue
    pub queue_depth: usize,
    /// Consecutive failures that trip a channel breaker
    pub failure_threshold: u32,
    pub failure_window_secs: u64,
    pub cooldown_secs: u64,
    /// Period of the breaker cooldown sweep
    pub sweep_interval_secs: u64,
}

impl BackpressureConfig {
    #[must_use]
    pub fn failure_window(&self) -> Duration {
        Duration::from_secs(self.failure_window_secs)
    }

    #[must_use]
    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_secs)
    }

    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Default for BackpressureConfig {
    fn default() -> Self {
        Self {
            queue_depth: 256,
            failure_threshold: 10,
            failure_window_secs: 10,
            cooldown_secs: 30,
            sweep_interval_secs: 5,
        }
    }
}

/// Session token validation backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SessionBackend {
    /// Session hashes written into the shared store by the session service
    #[default]
    Store,
    /// Signed JWT session tokens
    Jwt,
}

/// Session validation configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionConfig {
    pub backend: SessionBackend,
    pub jwt_secret: Option<String>,
}

// Default value functions
fn default_app_name() -> String {
    "relay-gateway".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8081
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

fn default_channel() -> String {
    "general".to_string()
}

fn default_channels() -> Vec<String> {
    vec!["general".to_string(), "guide".to_string()]
}

fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}

fn default_redis_max_connections() -> u32 {
    16
}

fn default_connection_ttl() -> u64 {
    3600 // 1 hour
}

/// Read and parse an optional variable; unparsable values are an error
fn parse_var<T: FromStr>(name: &'static str) -> Result<Option<T>, ConfigError> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(name, raw)),
        Err(_) => Ok(None),
    }
}

fn list_var(name: &'static str) -> Option<Vec<String>> {
    env::var(name).ok().map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(String::from)
            .collect()
    })
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if required environment variables are missing or malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let host = env::var("GATEWAY_HOST").unwrap_or_else(|_| default_host());
        let port = parse_var("GATEWAY_PORT")?.ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?;

        let store_backend = match env::var("STORE_BACKEND") {
            Ok(s) => match s.to_lowercase().as_str() {
                "redis" => StoreBackend::Redis,
                "memory" => StoreBackend::Memory,
                _ => return Err(ConfigError::InvalidValue("STORE_BACKEND", s)),
            },
            Err(_) => StoreBackend::default(),
        };
        let redis_url = match (store_backend, env::var("REDIS_URL")) {
            (_, Ok(url)) => url,
            (StoreBackend::Redis, Err(_)) => return Err(ConfigError::MissingVar("REDIS_URL")),
            (StoreBackend::Memory, Err(_)) => default_redis_url(),
        };

        let session_backend = match env::var("SESSION_BACKEND") {
            Ok(s) => match s.to_lowercase().as_str() {
                "store" => SessionBackend::Store,
                "jwt" => SessionBackend::Jwt,
                _ => return Err(ConfigError::InvalidValue("SESSION_BACKEND", s)),
            },
            Err(_) => SessionBackend::default(),
        };
        let jwt_secret = env::var("JWT_SECRET").ok();
        if session_backend == SessionBackend::Jwt && jwt_secret.is_none() {
            return Err(ConfigError::MissingVar("JWT_SECRET"));
        }

        let registry_defaults = RegistryConfig::default();
        let heartbeat_defaults = HeartbeatConfig::default();
        let backpressure_defaults = BackpressureConfig::default();

        Ok(Self {
            app: AppSettings {
                name: env::var("APP_NAME").unwrap_or_else(|_| default_app_name()),
                env: env::var("APP_ENV")
                    .ok()
                    .and_then(|s| match s.to_lowercase().as_str() {
                        "production" => Some(Environment::Production),
                        "staging" => Some(Environment::Staging),
                        "development" => Some(Environment::Development),
                        _ => None,
                    })
                    .unwrap_or_default(),
            },
            gateway: GatewayConfig {
                public_url: env::var("GATEWAY_PUBLIC_URL")
                    .unwrap_or_else(|_| format!("ws://{host}:{port}/ws")),
                host,
                port,
                instance_id: env::var("GATEWAY_INSTANCE_ID")
                    .unwrap_or_else(|_| default_instance_id()),
                default_channel: env::var("GATEWAY_DEFAULT_CHANNEL")
                    .unwrap_or_else(|_| default_channel()),
                channels: list_var("GATEWAY_CHANNELS").unwrap_or_else(default_channels),
                max_connections_per_user: parse_var("GATEWAY_MAX_CONNECTIONS_PER_USER")?
                    .unwrap_or(0),
            },
            store: StoreConfig {
                backend: store_backend,
                redis_url,
                max_connections: parse_var("REDIS_MAX_CONNECTIONS")?
                    .unwrap_or_else(default_redis_max_connections),
            },
            registry: RegistryConfig {
                connection_ttl_secs: parse_var("CONNECTION_TTL_SECS")?
                    .unwrap_or(registry_defaults.connection_ttl_secs),
                register_attempts: parse_var("REGISTER_ATTEMPTS")?
                    .unwrap_or(registry_defaults.register_attempts),
                register_backoff_ms: parse_var("REGISTER_BACKOFF_MS")?
                    .unwrap_or(registry_defaults.register_backoff_ms),
            },
            heartbeat: HeartbeatConfig {
                interval_secs: parse_var("HEARTBEAT_INTERVAL_SECS")?
                    .unwrap_or(heartbeat_defaults.interval_secs),
                client_timeout_secs: parse_var("HEARTBEAT_CLIENT_TIMEOUT_SECS")?
                    .unwrap_or(heartbeat_defaults.client_timeout_secs),
            },
            backpressure: BackpressureConfig {
                queue_depth: parse_var("BACKPRESSURE_QUEUE_DEPTH")?
                    .unwrap_or(backpressure_defaults.queue_depth),
                failure_threshold: parse_var("BACKPRESSURE_FAILURE_THRESHOLD")?
                    .unwrap_or(backpressure_defaults.failure_threshold),
                failure_window_secs: parse_var("BACKPRESSURE_FAILURE_WINDOW_SECS")?
                    .unwrap_or(backpressure_defaults.failure_window_secs),
                cooldown_secs: parse_var("BACKPRESSURE_COOLDOWN_SECS")?
                    .unwrap_or(backpressure_defaults.cooldown_secs),
                sweep_interval_secs: parse_var("BACKPRESSURE_SWEEP_INTERVAL_SECS")?
                    .unwrap_or(backpressure_defaults.sweep_interval_secs),
            },
            session: SessionConfig {
                backend: session_backend,
                jwt_secret,
            },
        })
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_environment_is_production() {
        assert!(!Environment::Development.is_production());
        assert!(!Environment::Staging.is_production());
        assert!(Environment::Production.is_production());
    }

    #[test]
    fn test_gateway_address() {
        let config = GatewayConfig {
            host: "0.0.0.0".to_string(),
            port: 8080,
            ..GatewayConfig::default()
        };
        assert_eq!(config.address(), "0.0.0.0:8080");
    }

    #[test]
    fn test_default_values() {
        let config = AppConfig::default();
        assert_eq!(config.app.name, "relay-gateway");
        assert_eq!(config.gateway.default_channel, "general");
        assert_eq!(config.gateway.max_connections_per_user, 0);
        assert_eq!(config.registry.connection_ttl(), Duration::from_secs(3600));
        assert_eq!(config.heartbeat.interval(), Duration::from_secs(30));
        assert_eq!(config.backpressure.queue_depth, 256);
        assert_eq!(config.session.backend, SessionBackend::Store);
    }

    #[test]
    fn test_instance_ids_are_unique() {
        assert_ne!(
            GatewayConfig::default().instance_id,
            GatewayConfig::default().instance_id
        );
    }

    #[test]
    fn test_parse_var_rejects_garbage() {
        env::set_var("RELAY_TEST_PARSE_VAR", "not-a-number");
        let result: Result<Option<u64>, _> = parse_var("RELAY_TEST_PARSE_VAR");
        assert!(matches!(result, Err(ConfigError::InvalidValue(_, _))));
        env::remove_var("RELAY_TEST_PARSE_VAR");

        let missing: Option<u64> = parse_var("RELAY_TEST_PARSE_VAR").unwrap();
        assert!(missing.is_none());
    }
}
