//! Voting on answers.
//!
//! Per (user, answer) the state is one of: no vote, upvoted, downvoted.
//! The Vote record id is derived from the pair, so the store itself rejects a
//! second record for the same pair. Voter-set edits are single atomic patches,
//! so concurrent votes by different users on one answer commute. When the
//! voter-set patch fails, the record change made just before it is undone.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use domains::{
    Answer, AppError, Identity, NotificationKind, Patch, Result, Vote, VoteChoice, VoteType,
};

use crate::answers::live_answer;
use crate::cache::keys;
use crate::context::{ensure, ServiceContext};
use crate::events;
use crate::fanout::{FanoutPlan, Notice};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteTransition {
    /// Requested the vote already held
    Redundant,
    /// `noVote` with no vote held
    Unchanged,
    Cast(VoteType),
    Remove(VoteType),
    Replace { from: VoteType, to: VoteType },
}

pub fn transition(current: Option<VoteType>, requested: VoteChoice) -> VoteTransition {
    match (current, requested.vote_type()) {
        (None, None) => VoteTransition::Unchanged,
        (None, Some(to)) => VoteTransition::Cast(to),
        (Some(from), None) => VoteTransition::Remove(from),
        (Some(from), Some(to)) if from == to => VoteTransition::Redundant,
        (Some(from), Some(to)) => VoteTransition::Replace { from, to },
    }
}

/// The stable Vote id for a (user, answer) pair.
pub fn vote_id(user_id: Uuid, answer_id: Uuid) -> Uuid {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("vote:{user_id}:{answer_id}").as_bytes(),
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteTally {
    pub answer_id: Uuid,
    pub upvotes: usize,
    pub downvotes: usize,
    pub my_vote: Option<VoteType>,
}

impl VoteTally {
    fn of(answer: &Answer, voter: Uuid) -> Self {
        let my_vote = if answer.upvotes.contains(&voter) {
            Some(VoteType::Upvote)
        } else if answer.downvotes.contains(&voter) {
            Some(VoteType::Downvote)
        } else {
            None
        };
        Self {
            answer_id: answer.id,
            upvotes: answer.upvotes.len(),
            downvotes: answer.downvotes.len(),
            my_vote,
        }
    }
}

#[derive(Clone)]
pub struct VoteService {
    ctx: Arc<ServiceContext>,
}

impl VoteService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn vote(&self, actor: &Identity, answer_id: Uuid, choice: VoteChoice) -> Result<VoteTally> {
        let ctx = &self.ctx;
        ctx.fanout
            .drive(actor, NotificationKind::Vote, async {
                let answer = live_answer(ctx, answer_id).await?;
                ensure(answer.user_id != actor.user_id, || {
                    AppError::Forbidden("You cannot vote on your own answer".into())
                })?;

                let id = vote_id(actor.user_id, answer_id);
                let existing: Option<Vote> = match ctx.docs.get::<Vote>(id).await {
                    Ok(vote) => Some(vote),
                    Err(AppError::NotFound { .. }) => None,
                    Err(err) => return Err(err),
                };
                let voter = actor.user_id.to_string();

                let answer = match transition(existing.as_ref().map(|v| v.vote_type), choice) {
                    VoteTransition::Redundant => {
                        return Err(AppError::Conflict("You have already voted this way".into()))
                    }
                    VoteTransition::Unchanged => {
                        return Ok((VoteTally::of(&answer, actor.user_id), FanoutPlan::new()))
                    }
                    VoteTransition::Cast(to) => {
                        // the record goes first: a racing duplicate fails here, before any set edit
                        ctx.docs.insert(&new_vote(id, actor.user_id, answer_id, to)).await?;
                        let patch = Patch::new().add_to_set(to.voter_field(), voter.as_str());
                        match ctx.docs.update::<Answer>(answer_id, &patch).await {
                            Ok(answer) => answer,
                            Err(err) => {
                                let undo = ctx.docs.delete::<Vote>(id).await;
                                return Err(rolled_back(err, undo));
                            }
                        }
                    }
                    VoteTransition::Remove(from) => {
                        let removed: Vote = ctx.docs.delete(id).await?;
                        let patch = Patch::new().pull(from.voter_field(), voter.as_str());
                        match ctx.docs.update::<Answer>(answer_id, &patch).await {
                            Ok(answer) => answer,
                            Err(err) => {
                                let undo = ctx.docs.insert(&removed).await;
                                return Err(rolled_back(err, undo));
                            }
                        }
                    }
                    VoteTransition::Replace { from, to } => {
                        let (forward, back) = (vote_type_patch(to)?, vote_type_patch(from)?);
                        ctx.docs.update::<Vote>(id, &forward).await?;
                        let patch = Patch::new()
                            .pull(from.voter_field(), voter.as_str())
                            .add_to_set(to.voter_field(), voter.as_str());
                        match ctx.docs.update::<Answer>(answer_id, &patch).await {
                            Ok(answer) => answer,
                            Err(err) => {
                                let undo = ctx.docs.update::<Vote>(id, &back).await;
                                return Err(rolled_back(err, undo));
                            }
                        }
                    }
                };
                info!(%answer_id, actor = %actor.user_id, ?choice, "vote recorded");

                let mut plan = FanoutPlan::new()
                    .invalidate_prefix(keys::answers_prefix(answer.question_id))
                    .broadcast(
                        events::QUESTIONS_ROOM,
                        events::VOTE_UPDATE,
                        events::vote_update(&answer),
                    );
                if let Some(to) = choice.vote_type() {
                    let verb = match to {
                        VoteType::Upvote => "upvoted",
                        VoteType::Downvote => "downvoted",
                    };
                    plan = plan.notify(
                        Notice::new(
                            answer.user_id,
                            NotificationKind::Vote,
                            format!("{} {verb} your answer.", actor.username),
                        )
                        .about(answer.id),
                    );
                }
                Ok((VoteTally::of(&answer, actor.user_id), plan))
            })
            .await
    }
}

fn vote_type_patch(vote_type: VoteType) -> Result<Patch> {
    Ok(Patch::new().set("type", serde_json::to_value(vote_type)?))
}

/// A voter-set patch failed after the vote record changed; `undo` restored
/// the record so the two stay in step.
fn rolled_back<T>(err: AppError, undo: Result<T>) -> AppError {
    if let Err(undo_err) = undo {
        warn!(error = %undo_err, "vote record could not be restored");
    }
    err
}

fn new_vote(id: Uuid, user_id: Uuid, answer_id: Uuid, vote_type: VoteType) -> Vote {
    Vote {
        id,
        user_id,
        answer_id,
        vote_type,
        created_at: Utc::now(),
    }
}
