//! Per-connection outbound queues
//!
//! One bounded queue per channel plus a control lane for gateway frames.
//! When a queue is full the oldest message is evicted, so the writer always
//! sees the latest state. Channels are drained round-robin so a backlog on
//! one channel never delays another.

use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use tokio::sync::Notify;

/// Result of pushing a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Queued,
    /// Queued after evicting the oldest message of the same lane
    DroppedOldest,
    /// Queue closed; the frame was discarded
    Closed,
}

#[derive(Debug)]
struct Lanes {
    control: VecDeque<String>,
    channels: HashMap<String, VecDeque<String>>,
    /// Channels with pending messages, in service order
    ready: VecDeque<String>,
    closed: bool,
    dropped: u64,
}

/// Bounded outbound queues of one connection
#[derive(Debug)]
pub struct OutboundQueues {
    lanes: Mutex<Lanes>,
    notify: Notify,
    depth: usize,
}

impl OutboundQueues {
    #[must_use]
    pub fn new(depth: usize) -> Self {
        Self {
            lanes: Mutex::new(Lanes {
                control: VecDeque::new(),
                channels: HashMap::new(),
                ready: VecDeque::new(),
                closed: false,
                dropped: 0,
            }),
            notify: Notify::new(),
            depth: depth.max(1),
        }
    }

    /// Queue a gateway-originated frame (welcome, error, heartbeat)
    pub fn push_control(&self, frame: String) -> PushOutcome {
        let mut lanes = self.lanes.lock();
        if lanes.closed {
            return PushOutcome::Closed;
        }

        let mut outcome = PushOutcome::Queued;
        if lanes.control.len() >= self.depth {
            lanes.control.pop_front();
            lanes.dropped += 1;
            outcome = PushOutcome::DroppedOldest;
        }
        lanes.control.push_back(frame);
        drop(lanes);

        self.notify.notify_one();
        outcome
    }

    /// Queue a channel message; never blocks
    pub fn push(&self, channel: &str, frame: String) -> PushOutcome {
        let mut lanes = self.lanes.lock();
        if lanes.closed {
            return PushOutcome::Closed;
        }

        let Lanes {
            channels,
            ready,
            dropped,
            ..
        } = &mut *lanes;

        let queue = channels.entry(channel.to_string()).or_default();
        if queue.is_empty() {
            ready.push_back(channel.to_string());
        }

        let mut outcome = PushOutcome::Queued;
        if queue.len() >= self.depth {
            queue.pop_front();
            *dropped += 1;
            outcome = PushOutcome::DroppedOldest;
        }
        queue.push_back(frame);
        drop(lanes);

        self.notify.notify_one();
        outcome
    }

    /// Wait for the next frame; `None` once closed
    ///
    /// Control frames go first, then one message per ready channel in turn.
    pub async fn recv(&self) -> Option<String> {
        loop {
            {
                let mut lanes = self.lanes.lock();
                if lanes.closed {
                    return None;
                }
                if let Some(frame) = lanes.control.pop_front() {
                    return Some(frame);
                }
                if let Some(frame) = Self::pop_channel(&mut lanes) {
                    return Some(frame);
                }
            }
            self.notify.notified().await;
        }
    }

    fn pop_channel(lanes: &mut Lanes) -> Option<String> {
        let channel = lanes.ready.pop_front()?;
        let queue = lanes.channels.get_mut(&channel)?;
        let frame = queue.pop_front();
        if queue.is_empty() {
            lanes.channels.remove(&channel);
        } else {
            lanes.ready.push_back(channel);
        }
        frame
    }

    /// Close the queues; pending frames are discarded
    pub fn close(&self) {
        let mut lanes = self.lanes.lock();
        lanes.closed = true;
        lanes.control.clear();
        lanes.channels.clear();
        lanes.ready.clear();
        drop(lanes);
        // Single consumer; a stored permit wakes it even if not yet waiting
        self.notify.notify_one();
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lanes.lock().closed
    }

    /// Pending messages for one channel
    #[must_use]
    pub fn len(&self, channel: &str) -> usize {
        self.lanes
            .lock()
            .channels
            .get(channel)
            .map_or(0, VecDeque::len)
    }

    /// Messages evicted since creation
    #[must_use]
    pub fn dropped(&self) -> u64 {
        self.lanes.lock().dropped
    }
}
