//! Session validation against the shared store

mod store_session;

pub use store_session::{session_key, StoreSessionValidator, SESSION_PREFIX};
