//! Shared fixtures for the scenario tests: the services wired to the real
//! in-memory adapters, plus a few recording doubles.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedReceiver;
use uuid::Uuid;

use auth_adapters::JwtTokenService;
use domains::{
    AppError, Collection, DocumentStore, EmailTransport, Filter, FindOptions, Identity,
    MediaStorage, MediaUpload, Notification, NotificationKind, PasswordHasher, Patch, Result, Role,
};
use services::{AppServices, FanoutMetrics, Ports, Registration, ServiceConfig};
use storage_adapters::{MemoryCache, MemoryDocumentStore, RoomHub, ServerMessage};

pub const PASSWORD: &str = "password123";

/// Stores `plain:<password>`. Argon2 has its own unit tests and is too slow
/// to run for every fixture account.
#[derive(Debug, Default)]
pub struct PlainHasher;

impl PasswordHasher for PlainHasher {
    fn hash(&self, password: &str) -> Result<String> {
        Ok(format!("plain:{password}"))
    }

    fn verify(&self, password: &str, hash: &str) -> bool {
        hash.strip_prefix("plain:") == Some(password)
    }
}

/// Keeps every message it is asked to send.
#[derive(Debug, Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    /// `(to, subject)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    pub fn sent_to(&self, address: &str) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(to, _)| to == address)
            .map(|(_, subject)| subject)
            .collect()
    }
}

#[async_trait]
impl EmailTransport for RecordingMailer {
    async fn send(&self, to: &str, subject: &str, _html_body: &str) -> Result<()> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push((to.to_string(), subject.to_string()));
        }
        Ok(())
    }
}

/// Hands out `/media/<n>` URLs without touching the filesystem.
#[derive(Debug, Default)]
pub struct CountingMedia {
    stored: Mutex<usize>,
}

#[async_trait]
impl MediaStorage for CountingMedia {
    async fn store(&self, _upload: MediaUpload) -> Result<String> {
        let mut stored = self
            .stored
            .lock()
            .map_err(|_| AppError::internal("media lock poisoned"))?;
        *stored += 1;
        Ok(format!("/media/{stored}"))
    }
}

/// A scripted store failure.
#[derive(Debug, Clone, Copy)]
pub enum Fault {
    /// Once a document is written to `written`, reads by id from `read` fail.
    ReadsAfterWrite { written: Collection, read: Collection },
    /// Patches by id to the collection fail.
    Updates(Collection),
}

/// The in-memory store with one scripted fault. Nothing fails until the test
/// flips the switch returned by [`FaultyStore::install`], so fixtures can be
/// built first.
pub struct FaultyStore {
    inner: Arc<dyn DocumentStore>,
    fault: Fault,
    armed: Arc<AtomicBool>,
    tripped: AtomicBool,
}

impl FaultyStore {
    /// Swaps the store port for a faulty view of the same data.
    pub fn install(ports: &mut Ports, fault: Fault) -> Arc<AtomicBool> {
        let armed = Arc::new(AtomicBool::new(false));
        ports.store = Arc::new(Self {
            inner: ports.store.clone(),
            fault,
            armed: armed.clone(),
            tripped: AtomicBool::new(false),
        });
        armed
    }

    fn armed(&self) -> bool {
        self.armed.load(Ordering::SeqCst)
    }

    fn wrote(&self, collection: Collection) {
        if let Fault::ReadsAfterWrite { written, .. } = self.fault {
            if written == collection && self.armed() {
                self.tripped.store(true, Ordering::SeqCst);
            }
        }
    }

    fn blip() -> AppError {
        AppError::Internal("store blip".into())
    }
}

#[async_trait]
impl DocumentStore for FaultyStore {
    async fn get_by_id(&self, collection: Collection, id: Uuid) -> Result<Value> {
        if let Fault::ReadsAfterWrite { read, .. } = self.fault {
            if read == collection && self.tripped.load(Ordering::SeqCst) {
                return Err(Self::blip());
            }
        }
        self.inner.get_by_id(collection, id).await
    }

    async fn find(
        &self,
        collection: Collection,
        filter: &Filter,
        options: &FindOptions,
    ) -> Result<Vec<Value>> {
        self.inner.find(collection, filter, options).await
    }

    async fn count(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        self.inner.count(collection, filter).await
    }

    async fn insert(&self, collection: Collection, doc: Value) -> Result<Value> {
        let inserted = self.inner.insert(collection, doc).await?;
        self.wrote(collection);
        Ok(inserted)
    }

    async fn update_by_id(&self, collection: Collection, id: Uuid, patch: &Patch) -> Result<Value> {
        if let Fault::Updates(failing) = self.fault {
            if failing == collection && self.armed() {
                return Err(Self::blip());
            }
        }
        let updated = self.inner.update_by_id(collection, id, patch).await?;
        self.wrote(collection);
        Ok(updated)
    }

    async fn update_many(
        &self,
        collection: Collection,
        filter: &Filter,
        patch: &Patch,
    ) -> Result<u64> {
        self.inner.update_many(collection, filter, patch).await
    }

    async fn delete_by_id(&self, collection: Collection, id: Uuid) -> Result<Value> {
        let deleted = self.inner.delete_by_id(collection, id).await?;
        self.wrote(collection);
        Ok(deleted)
    }

    async fn delete_many(&self, collection: Collection, filter: &Filter) -> Result<u64> {
        self.inner.delete_many(collection, filter).await
    }
}

/// Flips a [`FaultyStore`] switch.
pub fn arm(switch: &AtomicBool) {
    switch.store(true, Ordering::SeqCst);
}

/// A running askboard core over in-memory adapters.
pub struct World {
    pub services: AppServices,
    pub store: Arc<MemoryDocumentStore>,
    pub cache: Arc<MemoryCache>,
    pub hub: Arc<RoomHub>,
    pub mailer: Arc<RecordingMailer>,
    pub metrics: FanoutMetrics,
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl World {
    pub fn new() -> Self {
        Self::with_ports(|_| {})
    }

    /// Builds the world after letting the caller swap individual ports.
    pub fn with_ports(customize: impl FnOnce(&mut Ports)) -> Self {
        let store = Arc::new(MemoryDocumentStore::new());
        let cache = Arc::new(MemoryCache::new());
        let hub = Arc::new(RoomHub::new());
        let mailer = Arc::new(RecordingMailer::default());
        let mut ports = Ports {
            store: store.clone(),
            cache: cache.clone(),
            broadcaster: hub.clone(),
            mailer: mailer.clone(),
            media: Arc::new(CountingMedia::default()),
            hasher: Arc::new(PlainHasher),
            tokens: Arc::new(JwtTokenService::new(
                b"integration-test-secret-integration",
                chrono::Duration::hours(1),
            )),
        };
        customize(&mut ports);
        let metrics = FanoutMetrics::default();
        let services = AppServices::new(ports, ServiceConfig::default(), metrics.clone());
        Self {
            services,
            store,
            cache,
            hub,
            mailer,
            metrics,
        }
    }

    /// A world whose store port carries `fault`, plus the switch arming it.
    pub fn with_fault(fault: Fault) -> (Self, Arc<AtomicBool>) {
        let mut switch = None;
        let world = Self::with_ports(|ports| switch = Some(FaultyStore::install(ports, fault)));
        let switch = switch.unwrap_or_default();
        (world, switch)
    }

    /// Registers `username` (also used for the display name and email) and
    /// returns the identity its token carries.
    pub async fn user(&self, username: &str) -> Identity {
        let session = self
            .services
            .users
            .register(Registration {
                name: username.to_string(),
                email: email_of(username),
                username: Some(username.to_string()),
                password: PASSWORD.to_string(),
            })
            .await
            .expect("registration succeeds");
        self.services
            .users
            .authenticate(&session.token)
            .await
            .expect("fresh token verifies")
    }

    pub async fn admin(&self, username: &str) -> Identity {
        let identity = self.user(username).await;
        self.store
            .update_by_id(
                Collection::Users,
                identity.user_id,
                &Patch::new().set("role", "admin"),
            )
            .await
            .expect("role update");
        Identity {
            role: Role::Admin,
            ..identity
        }
    }

    /// A realtime connection that has joined `room`.
    pub fn listen(&self, room: &str) -> UnboundedReceiver<ServerMessage> {
        let (connection, receiver) = self.hub.connect();
        self.hub.join_room(connection, room);
        receiver
    }

    /// Every stored notification addressed to `user_id`, oldest first.
    pub async fn notifications_of(&self, user_id: Uuid) -> Vec<Notification> {
        let docs = self
            .store
            .find(
                Collection::Notifications,
                &Filter::new().eq("userId", user_id.to_string()),
                &FindOptions::default(),
            )
            .await
            .expect("notification query");
        let mut notifications: Vec<Notification> = docs
            .into_iter()
            .map(|doc| serde_json::from_value(doc).expect("notification document"))
            .collect();
        notifications.sort_by_key(|n| n.created_at);
        notifications
    }

    pub async fn notifications_of_kind(&self, user_id: Uuid, kind: NotificationKind) -> Vec<Notification> {
        self.notifications_of(user_id)
            .await
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect()
    }
}

pub fn email_of(username: &str) -> String {
    format!("{username}@example.com")
}

/// Everything already queued on a realtime receiver.
pub fn drain(receiver: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = receiver.try_recv() {
        messages.push(message);
    }
    messages
}

/// Messages of one event type, in arrival order.
pub fn events_named(messages: &[ServerMessage], event: &str) -> Vec<ServerMessage> {
    messages.iter().filter(|m| m.event == event).cloned().collect()
}
