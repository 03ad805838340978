//! # Notification Ledger
//!
//! Durable notification records plus an immediate push to the recipient's
//! room. The record is the source of truth: a recipient who is offline reads
//! it later, so a failed push never fails the record.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use domains::{
    id_value, AppError, Broadcaster, Filter, FindOptions, Notification, NotificationKind, Patch,
    Result, Sort,
};

use crate::documents::Documents;
use crate::events;

#[derive(Clone)]
pub struct NotificationLedger {
    docs: Documents,
    broadcaster: Arc<dyn Broadcaster>,
}

impl NotificationLedger {
    pub fn new(docs: Documents, broadcaster: Arc<dyn Broadcaster>) -> Self {
        Self { docs, broadcaster }
    }

    /// Inserts a notification and pushes it. `None` targets every client via
    /// the shared questions room.
    pub async fn record(
        &self,
        user_id: Option<Uuid>,
        kind: NotificationKind,
        content: impl Into<String>,
        related_id: Option<Uuid>,
    ) -> Result<Notification> {
        let notification = Notification {
            id: Uuid::now_v7(),
            user_id,
            kind,
            content: content.into(),
            related_id,
            is_read: false,
            created_at: Utc::now(),
        };
        let notification = self.docs.insert(&notification).await?;
        self.push(&notification).await;
        Ok(notification)
    }

    /// Pushes an already-stored notification to its room.
    pub async fn push(&self, notification: &Notification) {
        let event = match notification.kind {
            NotificationKind::Auth => events::AUTH,
            _ => events::NOTIFICATION,
        };
        let payload = events::document(notification);
        let pushed = match notification.user_id {
            Some(user_id) => {
                self.broadcaster
                    .publish_to_user(user_id, event, payload)
                    .await
            }
            None => {
                self.broadcaster
                    .publish(events::QUESTIONS_ROOM, event, payload)
                    .await
            }
        };
        match pushed {
            Ok(()) => debug!(notification_id = %notification.id, event, "notification pushed"),
            Err(err) => warn!(
                notification_id = %notification.id,
                error = %err,
                "notification stored but push failed"
            ),
        }
    }

    /// A user's notifications, newest first.
    pub async fn list_for(
        &self,
        user_id: Uuid,
        skip: usize,
        limit: usize,
    ) -> Result<(Vec<Notification>, u64)> {
        let filter = Filter::new().eq("userId", id_value(user_id));
        let options = FindOptions::sorted(Sort::desc("createdAt")).page(skip, limit);
        let items = self.docs.find(&filter, &options).await?;
        let total = self.docs.count::<Notification>(&filter).await?;
        Ok((items, total))
    }

    pub async fn unread_count(&self, user_id: Uuid) -> Result<u64> {
        let filter = Filter::new()
            .eq("userId", id_value(user_id))
            .eq("isRead", false);
        self.docs.count::<Notification>(&filter).await
    }

    /// Marks one notification read; only its recipient may do so.
    pub async fn mark_read(&self, user_id: Uuid, id: Uuid) -> Result<Notification> {
        let notification: Notification = self.docs.get(id).await?;
        if notification.user_id != Some(user_id) {
            return Err(AppError::Forbidden(
                "You can only mark your own notifications as read".into(),
            ));
        }
        self.docs.update(id, &Patch::new().set("isRead", true)).await
    }

    /// Bulk-sets the read flag on every unread notification of the user.
    pub async fn mark_all_read(&self, user_id: Uuid) -> Result<u64> {
        let filter = Filter::new()
            .eq("userId", id_value(user_id))
            .eq("isRead", false);
        self.docs
            .update_many::<Notification>(&filter, &Patch::new().set("isRead", true))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domains::{MockBroadcaster, MockDocumentStore};

    fn echo_store() -> MockDocumentStore {
        let mut store = MockDocumentStore::new();
        store.expect_insert().returning(|_, doc| Ok(doc));
        store
    }

    #[tokio::test]
    async fn auth_notifications_use_the_auth_event() {
        let user = Uuid::now_v7();
        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_publish_to_user()
            .withf(move |id, event, payload| {
                *id == user && event == "auth" && payload["type"] == "auth"
            })
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ledger = NotificationLedger::new(
            Documents::new(Arc::new(echo_store())),
            Arc::new(broadcaster),
        );

        let n = ledger
            .record(Some(user), NotificationKind::Auth, "welcome", None)
            .await
            .unwrap();
        assert!(!n.is_read);
    }

    #[tokio::test]
    async fn push_failure_keeps_the_record() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_publish_to_user()
            .returning(|_, _, _| Err(AppError::Internal("hub gone".into())));
        let ledger = NotificationLedger::new(
            Documents::new(Arc::new(echo_store())),
            Arc::new(broadcaster),
        );

        let result = ledger
            .record(Some(Uuid::now_v7()), NotificationKind::Answer, "hi", None)
            .await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn broadcast_notifications_go_to_the_shared_room() {
        let mut broadcaster = MockBroadcaster::new();
        broadcaster
            .expect_publish()
            .withf(|room, event, _| room == "questions" && event == "notification")
            .times(1)
            .returning(|_, _, _| Ok(()));
        let ledger = NotificationLedger::new(
            Documents::new(Arc::new(echo_store())),
            Arc::new(broadcaster),
        );

        let n = ledger
            .record(None, NotificationKind::Admin, "maintenance tonight", None)
            .await
            .unwrap();
        assert!(n.user_id.is_none());
    }
}
