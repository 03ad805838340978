//! The signed-in user's notification inbox.

use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use domains::{Identity, Notification, Result};

use crate::context::{PageRequest, Paged, ServiceContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnreadCount {
    pub unread: u64,
}

#[derive(Clone)]
pub struct NotificationService {
    ctx: Arc<ServiceContext>,
}

impl NotificationService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn list(&self, actor: &Identity, page: PageRequest) -> Result<Paged<Notification>> {
        let page = self.ctx.page(page);
        let (items, total) = self
            .ctx
            .ledger()
            .list_for(actor.user_id, page.skip(), page.limit)
            .await?;
        Ok(Paged {
            items,
            total,
            page: page.page,
            limit: page.limit,
        })
    }

    pub async fn unread_count(&self, actor: &Identity) -> Result<UnreadCount> {
        let unread = self.ctx.ledger().unread_count(actor.user_id).await?;
        Ok(UnreadCount { unread })
    }

    pub async fn mark_read(&self, actor: &Identity, id: Uuid) -> Result<Notification> {
        self.ctx.ledger().mark_read(actor.user_id, id).await
    }

    /// Returns how many notifications changed.
    pub async fn mark_all_read(&self, actor: &Identity) -> Result<u64> {
        self.ctx.ledger().mark_all_read(actor.user_id).await
    }
}
