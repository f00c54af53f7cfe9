//! In-memory fan-out bus for single-node deployments and tests.

use async_trait::async_trait;
use parking_lot::Mutex;
use relay_core::{FanOutBus, StoreResult};
use std::collections::HashMap;
use tokio::sync::broadcast;

/// Topic -> broadcast sender, shared by every gateway built on it
#[derive(Debug)]
pub struct MemoryFanOutBus {
    topics: Mutex<HashMap<String, broadcast::Sender<String>>>,
    buffer_size: usize,
}

impl Default for MemoryFanOutBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl MemoryFanOutBus {
    #[must_use]
    pub fn new(buffer_size: usize) -> Self {
        Self {
            topics: Mutex::new(HashMap::new()),
            buffer_size,
        }
    }

    /// Topics that currently have a sender
    #[must_use]
    pub fn topics(&self) -> Vec<String> {
        self.topics.lock().keys().cloned().collect()
    }
}

#[async_trait]
impl FanOutBus for MemoryFanOutBus {
    async fn publish(&self, topic: &str, payload: &str) -> StoreResult<usize> {
        let topics = self.topics.lock();
        let receivers = match topics.get(topic) {
            Some(tx) => tx.send(payload.to_string()).unwrap_or(0),
            None => 0,
        };
        Ok(receivers)
    }

    async fn subscribe(&self, topic: &str) -> StoreResult<broadcast::Receiver<String>> {
        let mut topics = self.topics.lock();
        let tx = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.buffer_size).0);
        Ok(tx.subscribe())
    }

    async fn unsubscribe(&self, topic: &str) -> StoreResult<()> {
        let mut topics = self.topics.lock();
        if topics.get(topic).is_some_and(|tx| tx.receiver_count() == 0) {
            topics.remove(topic);
        }
        Ok(())
    }
}
