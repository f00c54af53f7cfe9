//! Pub/Sub module.
//!
//! Fan-out bus implementations and the topic naming shared across instances.

mod channels;
mod memory_bus;
mod redis_bus;
mod subscriber;

pub use channels::{PubSubChannel, FANOUT_TOPIC_PREFIX, SERVICE_TOPIC_PREFIX};
pub use memory_bus::MemoryFanOutBus;
pub use redis_bus::RedisFanOutBus;
pub use subscriber::{Subscriber, SubscriberConfig, SubscriberError, SubscriberResult};
