//! Integration test utilities for the relay gateway
//!
//! Spawns real gateway instances on ephemeral ports that share one
//! connection store and fan-out bus, and drives them over WebSocket and HTTP.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
