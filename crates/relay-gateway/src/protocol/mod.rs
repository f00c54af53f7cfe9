//! Gateway protocol definitions

mod frames;

pub use frames::{BroadcastMessage, ClientFrame, ServerFrame, ServiceRequest};
