//! # auth-adapters
//!
//! Credential hashing and bearer tokens for askboard.
//!
//! - [`Argon2Hasher`] is always compiled.
//! - [`JwtTokenService`] (HS256) sits behind the `auth-jwt` feature.

mod password;

#[cfg(feature = "auth-jwt")]
mod jwt;

pub use password::Argon2Hasher;

#[cfg(feature = "auth-jwt")]
pub use jwt::JwtTokenService;
