//! Outbound backpressure: bounded per-channel queues and circuit breakers

mod circuit_breaker;
mod manager;
mod queue;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use manager::BackpressureManager;
pub use queue::{OutboundQueues, PushOutcome};
