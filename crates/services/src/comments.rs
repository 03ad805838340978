//! Comment use cases: post, update, delete, list.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use domains::{
    id_value, AppError, Comment, Filter, FindOptions, Identity, NotificationKind, Patch, Question,
    Result, Sort,
};

use crate::answers::live_answer;
use crate::cache::keys;
use crate::context::{ensure, required_text, PageRequest, Paged, ServiceContext};
use crate::email::EmailSpec;
use crate::events;
use crate::fanout::{FanoutPlan, Notice};
use crate::mentions::newly_mentioned;

pub const COMMENT_MAX: usize = 5_000;

#[derive(Clone)]
pub struct CommentService {
    ctx: Arc<ServiceContext>,
}

impl CommentService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn post(&self, actor: &Identity, answer_id: Uuid, content: String) -> Result<Comment> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Comment, async {
                let answer = live_answer(ctx, answer_id).await?;
                let question: Question = ctx.docs.get(answer.question_id).await?;
                let content = required_text("Comment", &content, COMMENT_MAX)?;
                let mentions = ctx.mentions.resolve(&content).await?;

                let now = Utc::now();
                let comment = Comment {
                    id: Uuid::now_v7(),
                    content,
                    answer_id,
                    user_id: actor.user_id,
                    mentions,
                    is_deleted: false,
                    created_at: now,
                    updated_at: now,
                };
                let comment = ctx.docs.insert(&comment).await?;
                info!(comment_id = %comment.id, %answer_id, actor = %actor.user_id, "comment posted");

                let link = ctx.question_link(question.id);
                let mut plan = FanoutPlan::new()
                    .invalidate_prefix(keys::comments_prefix(answer_id))
                    .broadcast(
                        events::QUESTIONS_ROOM,
                        events::NEW_COMMENT,
                        events::comment_changed(question.id, &comment),
                    );
                if answer.user_id != actor.user_id {
                    let content = format!(
                        "{} commented on your answer to \"{}\".",
                        actor.username, question.title
                    );
                    plan = plan.notify(
                        Notice::new(answer.user_id, NotificationKind::Comment, content.clone())
                            .about(answer_id)
                            .with_email(EmailSpec::notice(
                                "New comment on your answer",
                                "Your answer has a new comment",
                                content,
                                Some(link.clone()),
                            )),
                    );
                }
                let plan = plan.notify_each(&comment.mentions, actor.user_id, |user| {
                    mention_notice(user, actor, &question, &link)
                });
                Ok((comment, plan))
            })
            .await
    }

    pub async fn update(&self, actor: &Identity, comment_id: Uuid, content: String) -> Result<Comment> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Comment, async {
                let current = live_comment(ctx, comment_id).await?;
                ensure(current.user_id == actor.user_id, || {
                    AppError::Forbidden("You can only edit your own comment".into())
                })?;
                let content = required_text("Comment", &content, COMMENT_MAX)?;
                let mentions = ctx.mentions.resolve(&content).await?;
                let added = newly_mentioned(&current.mentions, &mentions);
                let question = question_of(ctx, current.answer_id).await?;

                let patch = Patch::new()
                    .set("content", content)
                    .set("mentions", serde_json::to_value(&mentions)?)
                    .touch(Utc::now());
                let comment: Comment = ctx.docs.update(comment_id, &patch).await?;
                info!(%comment_id, actor = %actor.user_id, "comment updated");

                let link = ctx.question_link(question.id);
                let plan = FanoutPlan::new()
                    .invalidate_prefix(keys::comments_prefix(comment.answer_id))
                    .broadcast(
                        events::QUESTIONS_ROOM,
                        events::COMMENT_UPDATED,
                        events::comment_changed(question.id, &comment),
                    )
                    .notify_each(&added, actor.user_id, |user| {
                        mention_notice(user, actor, &question, &link)
                    });
                Ok((comment, plan))
            })
            .await
    }

    /// Owners soft-delete their own comments; an admin acting on someone
    /// else's comment removes it outright.
    pub async fn delete(&self, actor: &Identity, comment_id: Uuid) -> Result<Comment> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Comment, async {
                let current = live_comment(ctx, comment_id).await?;
                if current.user_id != actor.user_id {
                    ensure(actor.is_admin(), || {
                        AppError::Forbidden("You can only delete your own comment".into())
                    })?;
                    return remove(ctx, actor, current).await;
                }
                let question = question_of(ctx, current.answer_id).await?;
                let patch = Patch::new().set("isDeleted", true).touch(Utc::now());
                let comment: Comment = ctx.docs.update(comment_id, &patch).await?;
                info!(%comment_id, actor = %actor.user_id, "comment withdrawn by owner");

                let plan = FanoutPlan::new()
                    .invalidate_prefix(keys::comments_prefix(comment.answer_id))
                    .broadcast(
                        events::QUESTIONS_ROOM,
                        events::COMMENT_DELETED,
                        events::comment_deleted(question.id, comment.id),
                    );
                Ok((comment, plan))
            })
            .await
    }

    /// Non-deleted comments of an answer, oldest first.
    pub async fn list(&self, answer_id: Uuid, page: PageRequest) -> Result<Paged<Comment>> {
        let ctx = &self.ctx;
        let page = ctx.page(page);
        let key = keys::comments(answer_id, page.page, page.limit);
        ctx.reads
            .get_or_load(&key, || async move {
                live_answer(ctx, answer_id).await?;
                let filter = Filter::new()
                    .eq("answerId", id_value(answer_id))
                    .eq("isDeleted", false);
                let options =
                    FindOptions::sorted(Sort::asc("createdAt")).page(page.skip(), page.limit);
                let items = ctx.docs.find::<Comment>(&filter, &options).await?;
                let total = ctx.docs.count::<Comment>(&filter).await?;
                Ok(Paged {
                    items,
                    total,
                    page: page.page,
                    limit: page.limit,
                })
            })
            .await
    }
}

async fn live_comment(ctx: &ServiceContext, comment_id: Uuid) -> Result<Comment> {
    let comment: Comment = ctx.docs.get(comment_id).await?;
    if comment.is_deleted {
        return Err(AppError::not_found("comment", comment_id));
    }
    Ok(comment)
}

async fn question_of(ctx: &ServiceContext, answer_id: Uuid) -> Result<Question> {
    let answer = ctx.docs.get::<domains::Answer>(answer_id).await?;
    ctx.docs.get(answer.question_id).await
}

/// Hard delete: the record is gone and no longer retrievable by id.
pub(crate) async fn remove(
    ctx: &ServiceContext,
    actor: &Identity,
    comment: Comment,
) -> Result<(Comment, FanoutPlan)> {
    let question = question_of(ctx, comment.answer_id).await?;
    let comment: Comment = ctx.docs.delete(comment.id).await?;
    info!(comment_id = %comment.id, actor = %actor.user_id, "comment removed by moderator");

    let mut plan = FanoutPlan::new()
        .invalidate_prefix(keys::comments_prefix(comment.answer_id))
        .broadcast(
            events::QUESTIONS_ROOM,
            events::COMMENT_DELETED,
            events::comment_deleted(question.id, comment.id),
        );
    if comment.user_id != actor.user_id {
        let content = format!(
            "An administrator removed your comment on \"{}\".",
            question.title
        );
        plan = plan.notify(
            Notice::new(comment.user_id, NotificationKind::Admin, content.clone())
                .about(question.id)
                .with_email(EmailSpec::notice(
                    "Your comment was removed",
                    "A moderator removed your comment",
                    content,
                    Some(ctx.question_link(question.id)),
                )),
        );
    }
    Ok((comment, plan))
}

fn mention_notice(user: Uuid, actor: &Identity, question: &Question, link: &str) -> Notice {
    let content = format!(
        "{} mentioned you in a comment on \"{}\".",
        actor.username, question.title
    );
    Notice::new(user, NotificationKind::Mention, content.clone())
        .about(question.id)
        .with_email(EmailSpec::notice(
            "You were mentioned on askboard",
            "You were mentioned in a comment",
            content,
            Some(link.to_string()),
        ))
}
