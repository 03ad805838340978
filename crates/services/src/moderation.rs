//! Admin-only moderation: question status, content removal, roles and
//! site-wide announcements.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use domains::{
    AppError, Answer, Comment, Filter, FindOptions, Identity, Notification, NotificationKind,
    Patch, Question, QuestionStatus, Result, Role, Sort, User, UserProfile,
};

use crate::context::{ensure, required_text, PageRequest, Paged, ServiceContext};
use crate::email::EmailSpec;
use crate::events;
use crate::fanout::{FanoutPlan, Notice};
use crate::{answers, comments, questions};

pub const ANNOUNCEMENT_MAX: usize = 1_000;

#[derive(Clone)]
pub struct ModerationService {
    ctx: Arc<ServiceContext>,
}

impl ModerationService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn set_question_status(
        &self,
        actor: &Identity,
        question_id: Uuid,
        status: QuestionStatus,
    ) -> Result<Question> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Admin, async {
                require_admin(actor)?;
                let current: Question = ctx.docs.get(question_id).await?;
                questions::set_status(ctx, actor, current, status).await
            })
            .await
    }

    /// Hard delete of any answer, cascading its comments and votes.
    pub async fn delete_answer(&self, actor: &Identity, answer_id: Uuid) -> Result<Answer> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Admin, async {
                require_admin(actor)?;
                let answer: Answer = ctx.docs.get(answer_id).await?;
                answers::remove(ctx, actor, answer).await
            })
            .await
    }

    pub async fn delete_comment(&self, actor: &Identity, comment_id: Uuid) -> Result<Comment> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Admin, async {
                require_admin(actor)?;
                let comment: Comment = ctx.docs.get(comment_id).await?;
                comments::remove(ctx, actor, comment).await
            })
            .await
    }

    pub async fn set_role(&self, actor: &Identity, user_id: Uuid, role: Role) -> Result<UserProfile> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Admin, async {
                require_admin(actor)?;
                ensure(user_id != actor.user_id, || {
                    AppError::Forbidden("You cannot change your own role".into())
                })?;
                let current: User = ctx.docs.get(user_id).await?;
                ensure(current.role != role, || {
                    AppError::Conflict("User already has this role".into())
                })?;
                let patch = Patch::new()
                    .set("role", serde_json::to_value(role)?)
                    .touch(Utc::now());
                let user: User = ctx.docs.update(user_id, &patch).await?;
                info!(%user_id, actor = %actor.user_id, ?role, "role changed");

                let content = match role {
                    Role::Admin => "You have been granted administrator rights.",
                    Role::User => "Your administrator rights have been revoked.",
                };
                let plan = FanoutPlan::new().notify(
                    Notice::new(user_id, NotificationKind::Admin, content).with_email(
                        EmailSpec::notice("Your askboard role changed", "Role update", content, None),
                    ),
                );
                Ok((user.profile(), plan))
            })
            .await
    }

    /// Stores a notification addressed to nobody in particular and pushes it
    /// to every connected client.
    pub async fn announce(&self, actor: &Identity, content: String) -> Result<Notification> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Admin, async {
                require_admin(actor)?;
                let content = required_text("Announcement", &content, ANNOUNCEMENT_MAX)?;
                let notification = Notification {
                    id: Uuid::now_v7(),
                    user_id: None,
                    kind: NotificationKind::Admin,
                    content,
                    related_id: None,
                    is_read: false,
                    created_at: Utc::now(),
                };
                let notification = ctx.docs.insert(&notification).await?;
                info!(notification_id = %notification.id, actor = %actor.user_id, "announcement posted");

                let plan = FanoutPlan::new().broadcast(
                    events::QUESTIONS_ROOM,
                    events::NOTIFICATION,
                    events::document(&notification),
                );
                Ok((notification, plan))
            })
            .await
    }

    pub async fn list_users(&self, actor: &Identity, page: PageRequest) -> Result<Paged<UserProfile>> {
        require_admin(actor)?;
        let page = self.ctx.page(page);
        let filter = Filter::new();
        let options = FindOptions::sorted(Sort::asc("createdAt")).page(page.skip(), page.limit);
        let users = self.ctx.docs.find::<User>(&filter, &options).await?;
        let total = self.ctx.docs.count::<User>(&filter).await?;
        Ok(Paged {
            items: users.iter().map(User::profile).collect(),
            total,
            page: page.page,
            limit: page.limit,
        })
    }
}

fn require_admin(actor: &Identity) -> Result<()> {
    ensure(actor.is_admin(), || {
        AppError::Forbidden("Administrator rights required".into())
    })
}
