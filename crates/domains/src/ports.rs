//! # Ports
//!
//! Contracts the services depend on. Adapters in `storage-adapters` and
//! `auth-adapters` implement them; tests use the mockall mocks exported under
//! the `testing` feature.

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::time::Duration;
use uuid::Uuid;

use crate::error::Result;
use crate::models::Identity;
use crate::store::{Collection, Filter, FindOptions, Patch};

/// Key-addressed document persistence.
///
/// Every id-based operation fails with `AppError::NotFound` when the id does
/// not resolve. `find` never fails on an empty result. No operation spans more
/// than one document atomically, except that `update_by_id` applies its whole
/// patch as one unit.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_by_id(&self, collection: Collection, id: Uuid) -> Result<Value>;
    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>>;
    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64>;
    async fn insert(&self, collection: Collection, doc: Value) -> Result<Value>;
    async fn update_by_id(&self, collection: Collection, id: Uuid, patch: &Patch) -> Result<Value>;
    /// Applies the patch to every matching document, one document at a time.
    async fn update_many(&self, collection: Collection, filter: &Filter, patch: &Patch)
        -> Result<u64>;
    async fn delete_by_id(&self, collection: Collection, id: Uuid) -> Result<Value>;
    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64>;
}

/// Read-through cache for list-style reads. A miss is always a valid state.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Cache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;
    async fn set_with_ttl(&self, key: &str, value: String, ttl: Duration) -> Result<()>;
    async fn delete(&self, key: &str) -> Result<()>;
    /// Removes every key starting with `prefix`; returns how many were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<u64>;
}

/// Best-effort, at-most-once push to named rooms.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait Broadcaster: Send + Sync {
    async fn publish(&self, room: &str, event: &str, payload: Value) -> Result<()>;

    /// Publishes to the room named after the user id.
    async fn publish_to_user(&self, user_id: Uuid, event: &str, payload: Value) -> Result<()> {
        self.publish(&user_id.to_string(), event, payload).await
    }
}

/// Outbound mail. Failures are the caller's to swallow.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()>;
}

/// Raw upload handed to the media store.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaUpload {
    pub bytes: Bytes,
    pub content_type: mime::Mime,
}

/// Durable image storage returning a public URL.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait MediaStorage: Send + Sync {
    async fn store(&self, upload: MediaUpload) -> Result<String>;
}

#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait PasswordHasher: Send + Sync {
    fn hash(&self, password: &str) -> Result<String>;
    fn verify(&self, password: &str, hash: &str) -> bool;
}

/// Issues and verifies bearer credentials carrying an `Identity`.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait TokenService: Send + Sync {
    fn issue(&self, identity: &Identity) -> Result<String>;
    /// Fails with `AppError::Unauthenticated` for malformed, forged or expired tokens.
    fn verify(&self, token: &str) -> Result<Identity>;
}
