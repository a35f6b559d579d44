//! # notifyhub-auth
//!
//! Verifies the bearer credential presented during the connection handshake.
//! Tokens are HS256 JWTs whose subject is the connecting user's id.

pub mod jwt;

pub use jwt::{Claims, JwtDecoder, JwtEncoder};
