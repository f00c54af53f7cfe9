//! Connections held by this instance

mod connection;
mod manager;

pub use connection::{generate_connection_id, ConnectionState, LocalConnection};
pub use manager::ConnectionManager;
