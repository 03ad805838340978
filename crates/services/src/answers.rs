//! Answer use cases: post, update, accept, delete, list.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use domains::{
    id_value, Answer, AppError, Comment, Filter, FindOptions, Identity, MediaUpload,
    NotificationKind, Patch, Question, QuestionStatus, Result, Sort, Vote,
};

use crate::cache::keys;
use crate::context::{embed_images, ensure, required_text, PageRequest, Paged, ServiceContext};
use crate::email::EmailSpec;
use crate::events;
use crate::fanout::{FanoutPlan, Notice};
use crate::mentions::newly_mentioned;

pub const CONTENT_MAX: usize = 50_000;

#[derive(Debug, Clone, Default)]
pub struct NewAnswer {
    pub content: String,
    pub images: Vec<MediaUpload>,
}

#[derive(Clone)]
pub struct AnswerService {
    ctx: Arc<ServiceContext>,
}

impl AnswerService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn post(&self, actor: &Identity, question_id: Uuid, input: NewAnswer) -> Result<Answer> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Answer, async {
                let question: Question = ctx.docs.get(question_id).await?;
                ensure(question.status == QuestionStatus::Active, || {
                    AppError::Forbidden("This question is not accepting answers".into())
                })?;
                let content = required_text("Answer", &input.content, CONTENT_MAX)?;
                let mentions = ctx.mentions.resolve(&content).await?;
                let images = ctx.upload_images(input.images).await;

                let now = Utc::now();
                let answer = Answer {
                    id: Uuid::now_v7(),
                    content: embed_images(&content, &images),
                    question_id,
                    user_id: actor.user_id,
                    upvotes: Vec::new(),
                    downvotes: Vec::new(),
                    is_accepted: false,
                    is_deleted: false,
                    images,
                    mentions,
                    created_at: now,
                    updated_at: now,
                };
                let answer = ctx.docs.insert(&answer).await?;
                info!(answer_id = %answer.id, %question_id, actor = %actor.user_id, "answer posted");

                let link = ctx.question_link(question_id);
                let mut plan = answer_invalidation(question_id).broadcast(
                    events::QUESTIONS_ROOM,
                    events::NEW_ANSWER,
                    events::answer_changed(&answer),
                );
                if question.user_id != actor.user_id {
                    let content = format!(
                        "{} answered your question \"{}\".",
                        actor.username, question.title
                    );
                    plan = plan.notify(
                        Notice::new(question.user_id, NotificationKind::Answer, content.clone())
                            .about(question_id)
                            .with_email(EmailSpec::notice(
                                "New answer to your question",
                                "Your question has a new answer",
                                content,
                                Some(link.clone()),
                            )),
                    );
                }
                let plan = plan
                    .notify_each(&answer.mentions, actor.user_id, |user| {
                        mention_notice(user, actor, &question, &link)
                    })
                    .notify(
                        Notice::new(
                            actor.user_id,
                            NotificationKind::Answer,
                            "Your answer was posted successfully.",
                        )
                        .about(answer.id),
                    );
                Ok((answer, plan))
            })
            .await
    }

    pub async fn update(&self, actor: &Identity, answer_id: Uuid, content: String) -> Result<Answer> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Answer, async {
                let current = live_answer(ctx, answer_id).await?;
                ensure(current.user_id == actor.user_id, || {
                    AppError::Forbidden("You can only edit your own answer".into())
                })?;
                let content = required_text("Answer", &content, CONTENT_MAX)?;
                let mentions = ctx.mentions.resolve(&content).await?;
                let added = newly_mentioned(&current.mentions, &mentions);
                let question: Question = ctx.docs.get(current.question_id).await?;

                let patch = Patch::new()
                    .set("content", content)
                    .set("mentions", serde_json::to_value(&mentions)?)
                    .touch(Utc::now());
                let answer: Answer = ctx.docs.update(answer_id, &patch).await?;
                info!(%answer_id, actor = %actor.user_id, "answer updated");

                let link = ctx.question_link(question.id);
                let plan = answer_invalidation(answer.question_id)
                    .broadcast(
                        events::QUESTIONS_ROOM,
                        events::ANSWER_UPDATED,
                        events::answer_changed(&answer),
                    )
                    .notify_each(&added, actor.user_id, |user| {
                        mention_notice(user, actor, &question, &link)
                    });
                Ok((answer, plan))
            })
            .await
    }

    /// Marks the answer accepted after clearing the flag on every sibling of
    /// the same question. The store holds the accepted flag as a unique key
    /// per question, so of two accepts racing between clear and set only one
    /// lands and the other fails with `Conflict`.
    pub async fn accept(&self, actor: &Identity, answer_id: Uuid) -> Result<Answer> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Answer, async {
                let current = live_answer(ctx, answer_id).await?;
                let question: Question = ctx.docs.get(current.question_id).await?;
                ensure(question.user_id == actor.user_id, || {
                    AppError::Forbidden("Only the question owner can accept an answer".into())
                })?;
                ensure(!current.is_accepted, || {
                    AppError::Conflict("This answer is already accepted".into())
                })?;

                let now = Utc::now();
                let siblings = Filter::new()
                    .eq("questionId", id_value(question.id))
                    .eq("isAccepted", true);
                let cleared = ctx
                    .docs
                    .update_many::<Answer>(&siblings, &Patch::new().set("isAccepted", false).touch(now))
                    .await?;
                let answer: Answer = match ctx
                    .docs
                    .update(answer_id, &Patch::new().set("isAccepted", true).touch(now))
                    .await
                {
                    Err(AppError::Conflict(_)) => {
                        return Err(AppError::Conflict(
                            "Another answer was accepted at the same time".into(),
                        ))
                    }
                    updated => updated?,
                };
                info!(%answer_id, question_id = %question.id, cleared, "answer accepted");

                let mut plan = answer_invalidation(question.id).broadcast(
                    events::QUESTIONS_ROOM,
                    events::ANSWER_ACCEPTED,
                    events::answer_ref(question.id, answer.id),
                );
                if answer.user_id != actor.user_id {
                    let content = format!(
                        "Your answer to \"{}\" was accepted.",
                        question.title
                    );
                    plan = plan.notify(
                        Notice::new(answer.user_id, NotificationKind::Answer, content.clone())
                            .about(answer.id)
                            .with_email(EmailSpec::notice(
                                "Your answer was accepted",
                                "Congratulations, your answer was accepted",
                                content,
                                Some(ctx.question_link(question.id)),
                            )),
                    );
                }
                Ok((answer, plan))
            })
            .await
    }

    /// Owners soft-delete their own answers; an admin acting on someone
    /// else's answer removes it outright.
    pub async fn delete(&self, actor: &Identity, answer_id: Uuid) -> Result<Answer> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Answer, async {
                let current = live_answer(ctx, answer_id).await?;
                if current.user_id == actor.user_id {
                    let patch = Patch::new()
                        .set("isDeleted", true)
                        .set("isAccepted", false)
                        .touch(Utc::now());
                    let answer: Answer = ctx.docs.update(answer_id, &patch).await?;
                    info!(%answer_id, actor = %actor.user_id, "answer withdrawn by owner");
                    let plan = answer_invalidation(answer.question_id).broadcast(
                        events::QUESTIONS_ROOM,
                        events::ANSWER_DELETED,
                        events::answer_ref(answer.question_id, answer.id),
                    );
                    return Ok((answer, plan));
                }
                ensure(actor.is_admin(), || {
                    AppError::Forbidden("You can only delete your own answer".into())
                })?;
                remove(ctx, actor, current).await
            })
            .await
    }

    /// Non-deleted answers of a question: accepted first, then oldest first.
    pub async fn list(&self, question_id: Uuid, page: PageRequest) -> Result<Paged<Answer>> {
        let ctx = &self.ctx;
        let page = ctx.page(page);
        let key = keys::answers(question_id, page.page, page.limit);
        ctx.reads
            .get_or_load(&key, || async move {
                // 404 for unknown questions rather than an empty page
                ctx.docs.get::<Question>(question_id).await?;
                let filter = Filter::new()
                    .eq("questionId", id_value(question_id))
                    .eq("isDeleted", false);
                let options = FindOptions::sorted(Sort::desc("isAccepted"))
                    .then(Sort::asc("createdAt"))
                    .page(page.skip(), page.limit);
                let items = ctx.docs.find::<Answer>(&filter, &options).await?;
                let total = ctx.docs.count::<Answer>(&filter).await?;
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

/// Fetches an answer that has not been soft-deleted.
pub(crate) async fn live_answer(ctx: &ServiceContext, answer_id: Uuid) -> Result<Answer> {
    let answer: Answer = ctx.docs.get(answer_id).await?;
    if answer.is_deleted {
        return Err(AppError::not_found("answer", answer_id));
    }
    Ok(answer)
}

/// Hard delete: comments and votes of the answer go first, then the answer.
pub(crate) async fn remove(
    ctx: &ServiceContext,
    actor: &Identity,
    answer: Answer,
) -> Result<(Answer, FanoutPlan)> {
    let by_answer = Filter::new().eq("answerId", id_value(answer.id));
    let comments = ctx.docs.delete_many::<Comment>(&by_answer).await?;
    let votes = ctx.docs.delete_many::<Vote>(&by_answer).await?;
    let answer: Answer = ctx.docs.delete(answer.id).await?;
    info!(
        answer_id = %answer.id,
        actor = %actor.user_id,
        comments,
        votes,
        "answer removed by moderator"
    );

    let mut plan = answer_invalidation(answer.question_id)
        .invalidate_prefix(keys::comments_prefix(answer.id))
        .broadcast(
            events::QUESTIONS_ROOM,
            events::ANSWER_DELETED,
            events::answer_ref(answer.question_id, answer.id),
        );
    if answer.user_id != actor.user_id {
        let content = "An administrator removed one of your answers.".to_string();
        plan = plan.notify(
            Notice::new(answer.user_id, NotificationKind::Admin, content.clone())
                .about(answer.question_id)
                .with_email(EmailSpec::notice(
                    "Your answer was removed",
                    "A moderator removed your answer",
                    content,
                    Some(ctx.question_link(answer.question_id)),
                )),
        );
    }
    Ok((answer, plan))
}

fn answer_invalidation(question_id: Uuid) -> FanoutPlan {
    FanoutPlan::new()
        .invalidate_prefix(keys::answers_prefix(question_id))
        .invalidate_prefix(keys::QUESTIONS_PREFIX)
}

fn mention_notice(user: Uuid, actor: &Identity, question: &Question, link: &str) -> Notice {
    let content = format!(
        "{} mentioned you in an answer to \"{}\".",
        actor.username, question.title
    );
    Notice::new(user, NotificationKind::Mention, content.clone())
        .about(question.id)
        .with_email(EmailSpec::notice(
            "You were mentioned on askboard",
            "You were mentioned in an answer",
            content,
            Some(link.to_string()),
        ))
}
