//! # storage-adapters
//!
//! Implementations of the `domains` ports that touch the outside world:
//! document persistence, the read cache, the realtime hub, media and mail.
//!
//! The in-memory adapters are always compiled and back tests and single-node
//! development. Postgres, Redis and HTTP mail sit behind cargo features.

pub mod mail;
pub mod media;
pub mod memory;
pub mod realtime;

#[cfg(feature = "db-postgres")]
pub mod postgres;

#[cfg(feature = "redis")]
pub mod redis_cache;

pub use mail::LogMailer;
pub use media::LocalMediaStorage;
pub use memory::{MemoryCache, MemoryDocumentStore};
pub use realtime::{ConnectionId, RoomHub, ServerMessage};
