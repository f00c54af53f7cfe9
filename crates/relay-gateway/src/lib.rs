//! # relay-gateway
//!
//! WebSocket gateway for distributed realtime connections. Any number of
//! instances share one connection store and one fan-out bus; a message
//! published to a channel reaches subscribers on every instance.

pub mod backpressure;
pub mod broadcast;
pub mod connection;
pub mod handlers;
pub mod heartbeat;
pub mod metrics;
pub mod protocol;
pub mod router;
pub mod server;

pub use server::{create_app, create_gateway_state, run, serve, GatewayState};
