//! Channel broadcasting
//!
//! Delivers fan-out bus messages to the local connections subscribed to
//! each channel.

mod listener;

pub use listener::ChannelListeners;
