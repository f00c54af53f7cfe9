//! Liveness detection for local connections

mod monitor;

pub use monitor::{HeartbeatMonitor, HeartbeatRound};
