//! Ports implemented by the infrastructure layer

mod ports;

pub use ports::{ConnectionStore, FanOutBus, SessionValidator, StoreResult};
