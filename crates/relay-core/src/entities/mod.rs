//! Domain entities

mod connection;
mod envelope;
mod session;

pub use connection::{fields, ConnectionCount, ConnectionRecord};
pub use envelope::{EnvelopeError, MessageEnvelope};
pub use session::SessionIdentity;
