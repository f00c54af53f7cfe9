//! Connection registry and its key layout

mod connection_registry;
pub mod keys;

pub use connection_registry::{ConnectionRegistry, DEFAULT_CONNECTION_TTL};
