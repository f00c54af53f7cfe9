//! Session token utilities

mod jwt;

pub use jwt::{Claims, JwtSessionValidator};
