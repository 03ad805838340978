//! # api-adapters
//!
//! The HTTP and WebSocket surface of askboard, built on axum behind the
//! `web-axum` feature. Handlers translate requests into service calls and
//! `AppError`s into JSON error bodies; they hold no business rules.
//!
//! [`dto`] (request bodies and image decoding) is always compiled so other
//! front ends can reuse it.

pub mod dto;

#[cfg(feature = "web-axum")]
pub mod auth;
#[cfg(feature = "web-axum")]
pub mod error;
#[cfg(feature = "web-axum")]
pub mod extract;
#[cfg(feature = "web-axum")]
pub mod routes;
#[cfg(feature = "web-axum")]
pub mod server;
#[cfg(feature = "web-axum")]
pub mod ws;

#[cfg(feature = "web-axum")]
pub use error::{ApiError, ApiResult};
#[cfg(feature = "web-axum")]
pub use server::{build_router, AppState, MediaMount, RouterSettings};
