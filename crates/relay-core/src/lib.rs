//! # relay-core
//!
//! Domain layer for the realtime connection gateway: connection records,
//! message envelopes, session identities, and the ports (traits) through which
//! gateway instances reach the shared connection store, the fan-out bus, and
//! the external session service.
//!
//! This crate has no dependency on Redis, axum, or any concrete backend.

pub mod entities;
pub mod error;
pub mod traits;

// Re-export commonly used types at crate root
pub use entities::{
    ConnectionCount, ConnectionRecord, EnvelopeError, MessageEnvelope, SessionIdentity,
};
pub use error::DomainError;
pub use traits::{ConnectionStore, FanOutBus, SessionValidator, StoreResult};
