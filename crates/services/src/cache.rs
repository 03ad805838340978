//! Read-through caching for list-style reads and the key scheme the fanout
//! invalidates on writes.
//!
//! A cold, unreachable or corrupt cache always degrades to a store read.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use domains::{Cache, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

/// Cache key scheme. Every question key shares the `questions:` prefix so a
/// single prefix invalidation covers list pages and detail entries.
pub mod keys {
    use uuid::Uuid;

    pub const QUESTIONS_PREFIX: &str = "questions:";

    pub fn question(id: Uuid) -> String {
        format!("questions:{id}")
    }

    pub fn question_list(
        status: &str,
        tag: Option<&str>,
        search: Option<&str>,
        author: Option<Uuid>,
        page: usize,
        limit: usize,
    ) -> String {
        format!(
            "questions:list:{status}:{}:{}:{}:{page}:{limit}",
            tag.unwrap_or("*"),
            search.unwrap_or("*"),
            author.map(|id| id.to_string()).unwrap_or_else(|| "*".into()),
        )
    }

    pub fn answers_prefix(question_id: Uuid) -> String {
        format!("answers:{question_id}:")
    }

    pub fn answers(question_id: Uuid, page: usize, limit: usize) -> String {
        format!("answers:{question_id}:{page}:{limit}")
    }

    pub fn comments_prefix(answer_id: Uuid) -> String {
        format!("comments:{answer_id}:")
    }

    pub fn comments(answer_id: Uuid, page: usize, limit: usize) -> String {
        format!("comments:{answer_id}:{page}:{limit}")
    }
}

#[derive(Clone)]
pub struct ReadThrough {
    cache: Arc<dyn Cache>,
    ttl: Duration,
}

impl ReadThrough {
    pub fn new(cache: Arc<dyn Cache>, ttl: Duration) -> Self {
        Self { cache, ttl }
    }

    /// Returns the cached value for `key`, or computes it with `load` and
    /// stores it for the configured TTL. Only `load` errors are returned.
    pub async fn get_or_load<T, F, Fut>(&self, key: &str, load: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        match self.cache.get(key).await {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(value) => {
                    debug!(key, "cache hit");
                    return Ok(value);
                }
                Err(err) => debug!(key, error = %err, "discarding undecodable cache entry"),
            },
            Ok(None) => debug!(key, "cache miss"),
            Err(err) => warn!(key, error = %err, "cache read failed; reading from store"),
        }

        let value = load().await?;
        match serde_json::to_string(&value) {
            Ok(raw) => {
                if let Err(err) = self.cache.set_with_ttl(key, raw, self.ttl).await {
                    warn!(key, error = %err, "cache write failed");
                }
            }
            Err(err) => warn!(key, error = %err, "value not cacheable"),
        }
        Ok(value)
    }
}
