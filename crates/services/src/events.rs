//! Realtime wire contract: room names, event names and payload shapes.
//!
//! Clients depend on these exact strings; treat changes as breaking.

use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use domains::{Answer, Comment, QuestionStatus};

/// Shared room every connected client joins.
pub const QUESTIONS_ROOM: &str = "questions";

pub const NEW_QUESTION: &str = "newQuestion";
pub const QUESTION_UPDATED: &str = "questionUpdated";
pub const QUESTION_MODERATED: &str = "questionModerated";
pub const NEW_ANSWER: &str = "newAnswer";
pub const ANSWER_UPDATED: &str = "answerUpdated";
pub const ANSWER_DELETED: &str = "answerDeleted";
pub const ANSWER_ACCEPTED: &str = "answerAccepted";
pub const VOTE_UPDATE: &str = "voteUpdate";
pub const NEW_COMMENT: &str = "newComment";
pub const COMMENT_UPDATED: &str = "commentUpdated";
pub const COMMENT_DELETED: &str = "commentDeleted";
/// User-room event carrying a Notification document.
pub const NOTIFICATION: &str = "notification";
/// User-room event for `auth` notifications.
pub const AUTH: &str = "auth";

/// Full-document payloads (`newQuestion`, `questionUpdated`, `notification`).
pub fn document<T: Serialize>(doc: &T) -> Value {
    serde_json::to_value(doc).unwrap_or(Value::Null)
}

pub fn question_moderated(question_id: Uuid, status: QuestionStatus) -> Value {
    json!({ "questionId": question_id, "status": status })
}

pub fn answer_changed(answer: &Answer) -> Value {
    json!({ "questionId": answer.question_id, "answer": document(answer) })
}

pub fn answer_ref(question_id: Uuid, answer_id: Uuid) -> Value {
    json!({ "questionId": question_id, "answerId": answer_id })
}

/// Counts, not id lists.
pub fn vote_update(answer: &Answer) -> Value {
    json!({
        "answerId": answer.id,
        "upvotes": answer.upvotes.len(),
        "downvotes": answer.downvotes.len(),
    })
}

pub fn comment_changed(question_id: Uuid, comment: &Comment) -> Value {
    json!({ "questionId": question_id, "comment": document(comment) })
}

pub fn comment_deleted(question_id: Uuid, comment_id: Uuid) -> Value {
    json!({ "questionId": question_id, "commentId": comment_id })
}
