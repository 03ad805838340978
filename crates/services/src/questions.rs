//! Question use cases: ask, update, delete, get, list.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use domains::{
    id_value, normalize_tags, AppError, Filter, FindOptions, Identity, MediaUpload,
    NotificationKind, Patch, Question, QuestionStatus, Result, Sort,
};

use crate::cache::keys;
use crate::context::{embed_images, ensure, required_text, PageRequest, Paged, ServiceContext};
use crate::email::EmailSpec;
use crate::events;
use crate::fanout::{FanoutPlan, Notice};
use crate::mentions::newly_mentioned;

pub const TITLE_MAX: usize = 200;
pub const DESCRIPTION_MAX: usize = 50_000;
pub const TAGS_MAX: usize = 10;

#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub images: Vec<MediaUpload>,
}

/// Owner edits. Status may move between `active` and `closed` only;
/// deletion goes through [`QuestionService::delete`].
#[derive(Debug, Clone, Default)]
pub struct QuestionChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub tags: Option<Vec<String>>,
    pub status: Option<QuestionStatus>,
}

#[derive(Debug, Clone, Default)]
pub struct QuestionQuery {
    /// Defaults to `active`
    pub status: Option<QuestionStatus>,
    pub tag: Option<String>,
    /// Case-insensitive title substring
    pub search: Option<String>,
    pub author: Option<Uuid>,
    pub page: PageRequest,
}

#[derive(Clone)]
pub struct QuestionService {
    ctx: Arc<ServiceContext>,
}

impl QuestionService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn ask(&self, actor: &Identity, input: NewQuestion) -> Result<Question> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Question, async {
                let title = required_text("Title", &input.title, TITLE_MAX)?;
                let description = required_text("Description", &input.description, DESCRIPTION_MAX)?;
                let tags = checked_tags(&input.tags)?;

                let mentions = ctx.mentions.resolve(&description).await?;
                let images = ctx.upload_images(input.images).await;

                let now = Utc::now();
                let question = Question {
                    id: Uuid::now_v7(),
                    title,
                    description: embed_images(&description, &images),
                    tags,
                    user_id: actor.user_id,
                    images,
                    status: QuestionStatus::Active,
                    mentions,
                    created_at: now,
                    updated_at: now,
                };
                let question = ctx.docs.insert(&question).await?;
                info!(question_id = %question.id, actor = %actor.user_id, "question posted");

                let link = ctx.question_link(question.id);
                let plan = FanoutPlan::new()
                    .invalidate_prefix(keys::QUESTIONS_PREFIX)
                    .broadcast(
                        events::QUESTIONS_ROOM,
                        events::NEW_QUESTION,
                        events::document(&question),
                    )
                    .notify_each(&question.mentions, actor.user_id, |user| {
                        mention_notice(user, actor, &question, &link)
                    })
                    .notify(
                        Notice::new(
                            actor.user_id,
                            NotificationKind::Question,
                            "Your question was posted successfully.",
                        )
                        .about(question.id),
                    );
                Ok((question, plan))
            })
            .await
    }

    pub async fn update(
        &self,
        actor: &Identity,
        question_id: Uuid,
        changes: QuestionChanges,
    ) -> Result<Question> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Question, async {
                let current: Question = ctx.docs.get(question_id).await?;
                ensure(current.user_id == actor.user_id, || {
                    AppError::Forbidden("You can only edit your own question".into())
                })?;
                ensure(current.status != QuestionStatus::Deleted, || {
                    AppError::Forbidden("This question has been deleted".into())
                })?;

                let mut patch = Patch::new();
                if let Some(title) = &changes.title {
                    patch = patch.set("title", required_text("Title", title, TITLE_MAX)?);
                }
                let mut added_mentions = Vec::new();
                if let Some(description) = &changes.description {
                    let description = required_text("Description", description, DESCRIPTION_MAX)?;
                    let mentions = ctx.mentions.resolve(&description).await?;
                    added_mentions = newly_mentioned(&current.mentions, &mentions);
                    patch = patch
                        .set("description", description)
                        .set("mentions", serde_json::to_value(&mentions)?);
                }
                if let Some(tags) = &changes.tags {
                    patch = patch.set("tags", serde_json::to_value(checked_tags(tags)?)?);
                }
                if let Some(status) = changes.status {
                    ensure(status != QuestionStatus::Deleted, || {
                        AppError::Validation("Use delete to remove a question".into())
                    })?;
                    patch = patch.set("status", status.as_str());
                }
                ensure(!patch.is_empty(), || {
                    AppError::Validation("Nothing to update".into())
                })?;

                let question: Question = ctx.docs.update(question_id, &patch.touch(Utc::now())).await?;
                info!(%question_id, actor = %actor.user_id, "question updated");

                let link = ctx.question_link(question.id);
                let plan = FanoutPlan::new()
                    .invalidate_prefix(keys::QUESTIONS_PREFIX)
                    .broadcast(
                        events::QUESTIONS_ROOM,
                        events::QUESTION_UPDATED,
                        events::document(&question),
                    )
                    .notify_each(&added_mentions, actor.user_id, |user| {
                        mention_notice(user, actor, &question, &link)
                    });
                Ok((question, plan))
            })
            .await
    }

    /// Soft delete: the record stays retrievable by id with status `deleted`.
    /// Owners delete their own questions; admins may delete any.
    pub async fn delete(&self, actor: &Identity, question_id: Uuid) -> Result<Question> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Question, async {
                let current: Question = ctx.docs.get(question_id).await?;
                ensure(actor.may_modify(current.user_id, true), || {
                    AppError::Forbidden("You can only delete your own question".into())
                })?;
                set_status(ctx, actor, current, QuestionStatus::Deleted).await
            })
            .await
    }

    pub async fn get(&self, question_id: Uuid) -> Result<Question> {
        let ctx = &self.ctx;
        ctx.reads
            .get_or_load(&keys::question(question_id), || ctx.docs.get(question_id))
            .await
    }

    pub async fn list(&self, query: QuestionQuery) -> Result<Paged<Question>> {
        let ctx = &self.ctx;
        let page = ctx.page(query.page);
        let status = query.status.unwrap_or(QuestionStatus::Active);
        let tag = query
            .tag
            .as_deref()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty());
        let search = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());
        let author = query.author;
        let key = keys::question_list(
            status.as_str(),
            tag.as_deref(),
            search,
            author,
            page.page,
            page.limit,
        );

        ctx.reads
            .get_or_load(&key, || async move {
                let mut filter = Filter::new().eq("status", status.as_str());
                if let Some(tag) = &tag {
                    filter = filter.contains("tags", tag.as_str());
                }
                if let Some(search) = search {
                    filter = filter.text("title", search);
                }
                if let Some(author) = author {
                    filter = filter.eq("userId", id_value(author));
                }
                let options =
                    FindOptions::sorted(Sort::desc("createdAt")).page(page.skip(), page.limit);
                let items = ctx.docs.find::<Question>(&filter, &options).await?;
                let total = ctx.docs.count::<Question>(&filter).await?;
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

/// Shared by owner deletion and admin moderation. Returns the mutation and
/// its plan; the caller drives it.
pub(crate) async fn set_status(
    ctx: &ServiceContext,
    actor: &Identity,
    current: Question,
    status: QuestionStatus,
) -> Result<(Question, FanoutPlan)> {
    ensure(current.status != status, || {
        AppError::Conflict(format!("Question is already {}", status.as_str()))
    })?;
    let patch = Patch::new().set("status", status.as_str()).touch(Utc::now());
    let question: Question = ctx.docs.update(current.id, &patch).await?;
    info!(
        question_id = %question.id,
        actor = %actor.user_id,
        status = status.as_str(),
        "question status changed"
    );

    let mut plan = FanoutPlan::new()
        .invalidate_prefix(keys::QUESTIONS_PREFIX)
        .broadcast(
            events::QUESTIONS_ROOM,
            events::QUESTION_MODERATED,
            events::question_moderated(question.id, status),
        );
    if question.user_id != actor.user_id {
        let content = format!(
            "An administrator changed the status of your question \"{}\" to {}.",
            question.title,
            status.as_str()
        );
        plan = plan.notify(
            Notice::new(question.user_id, NotificationKind::Admin, content.clone())
                .about(question.id)
                .with_email(EmailSpec::notice(
                    "Your question was moderated",
                    "A moderator reviewed your question",
                    content,
                    Some(ctx.question_link(question.id)),
                )),
        );
    }
    Ok((question, plan))
}

fn checked_tags(raw: &[String]) -> Result<Vec<String>> {
    let tags = normalize_tags(raw);
    ensure(tags.len() <= TAGS_MAX, || {
        AppError::Validation(format!("At most {TAGS_MAX} tags are allowed"))
    })?;
    ensure(tags.iter().all(|t| t.chars().count() <= 35), || {
        AppError::Validation("Tags must be at most 35 characters".into())
    })?;
    Ok(tags)
}

fn mention_notice(user: Uuid, actor: &Identity, question: &Question, link: &str) -> Notice {
    let content = format!(
        "{} mentioned you in the question \"{}\".",
        actor.username, question.title
    );
    Notice::new(user, NotificationKind::Mention, content.clone())
        .about(question.id)
        .with_email(EmailSpec::notice(
            "You were mentioned on askboard",
            "You were mentioned in a question",
            content,
            Some(link.to_string()),
        ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_normalized_and_bounded() {
        let tags = checked_tags(&["Rust ".into(), "rust".into(), "Tokio".into()]).unwrap();
        assert_eq!(tags, vec!["rust", "tokio"]);

        let many: Vec<String> = (0..11).map(|i| format!("t{i}")).collect();
        assert!(matches!(checked_tags(&many), Err(AppError::Validation(_))));
        assert!(checked_tags(&["x".repeat(36)]).is_err());
    }
}
