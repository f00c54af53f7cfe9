//! Connection store backends

mod memory_store;
mod redis_store;

pub use memory_store::MemoryConnectionStore;
pub use redis_store::RedisConnectionStore;
