//! In-process adapters.

mod cache;
mod documents;

pub use cache::MemoryCache;
pub use documents::MemoryDocumentStore;

use serde_json::Value;
use uuid::Uuid;

use domains::{AppError, Result};

/// Reads the `id` field every stored document carries.
pub(crate) fn document_id(doc: &Value) -> Result<Uuid> {
    doc.get("id")
        .and_then(Value::as_str)
        .and_then(|raw| raw.parse().ok())
        .ok_or_else(|| AppError::Internal("document has no valid id".into()))
}
