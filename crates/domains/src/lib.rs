//! askboard/crates/domains/src/lib.rs
//!
//! Entities, the document-store vocabulary, port traits and the error
//! taxonomy shared by every askboard crate. No I/O happens here.

pub mod error;
pub mod models;
pub mod ports;
pub mod store;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use ports::*;
pub use store::*;
