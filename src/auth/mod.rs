//! Bearer token verification for socket connections.

mod jwt;

pub use jwt::{Claims, JwtSecret};
