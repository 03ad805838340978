//! # Domain Models
//!
//! These structs represent the core entities of askboard.
//! We use UUID v7 for time-ordered, globally unique identification.
//! Serialized field names are camelCase: the same JSON travels to the store,
//! the HTTP API and the realtime channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Collection, Document};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Admin,
}

/// A registered account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    /// Unique, lowercase, 3–30 chars of `[a-z0-9_]`
    pub username: String,
    /// Absent for federated-identity accounts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// The outward-facing view: never carries the credential hash.
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
            username: self.username.clone(),
            role: self.role,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub username: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuestionStatus {
    Active,
    Closed,
    Deleted,
}

impl QuestionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Closed => "closed",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: Uuid,
    pub title: String,
    /// Rich text (HTML)
    pub description: String,
    /// Lowercase, trimmed, deduplicated; first-occurrence order
    pub tags: Vec<String>,
    pub user_id: Uuid,
    pub images: Vec<String>,
    pub status: QuestionStatus,
    pub mentions: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub id: Uuid,
    pub content: String,
    pub question_id: Uuid,
    pub user_id: Uuid,
    /// Disjoint from `downvotes`; mirrors the Vote records for this answer
    pub upvotes: Vec<Uuid>,
    pub downvotes: Vec<Uuid>,
    pub is_accepted: bool,
    pub is_deleted: bool,
    pub images: Vec<String>,
    pub mentions: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: Uuid,
    pub content: String,
    pub answer_id: Uuid,
    pub user_id: Uuid,
    pub mentions: Vec<Uuid>,
    pub is_deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoteType {
    Upvote,
    Downvote,
}

impl VoteType {
    /// The answer field holding this vote type's voter ids.
    pub fn voter_field(self) -> &'static str {
        match self {
            Self::Upvote => "upvotes",
            Self::Downvote => "downvotes",
        }
    }
}

/// A voter's requested state for an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VoteChoice {
    Upvote,
    Downvote,
    NoVote,
}

impl VoteChoice {
    pub fn vote_type(self) -> Option<VoteType> {
        match self {
            Self::Upvote => Some(VoteType::Upvote),
            Self::Downvote => Some(VoteType::Downvote),
            Self::NoVote => None,
        }
    }
}

/// At most one per (user, answer) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub id: Uuid,
    pub user_id: Uuid,
    pub answer_id: Uuid,
    #[serde(rename = "type")]
    pub vote_type: VoteType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    Answer,
    Comment,
    Mention,
    Vote,
    Auth,
    Question,
    Admin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: Uuid,
    /// `None` marks a broadcast notification
    pub user_id: Option<Uuid>,
    #[serde(rename = "type")]
    pub kind: NotificationKind,
    pub content: String,
    pub related_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// The identity context produced by the authorizer for a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: Uuid,
    pub role: Role,
    pub username: String,
}

impl Identity {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Owners may always act; admins may act when `admin_override` is set.
    pub fn may_modify(&self, owner: Uuid, admin_override: bool) -> bool {
        self.user_id == owner || (admin_override && self.is_admin())
    }
}

impl Document for User {
    const COLLECTION: Collection = Collection::Users;
    const ENTITY: &'static str = "user";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Question {
    const COLLECTION: Collection = Collection::Questions;
    const ENTITY: &'static str = "question";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Answer {
    const COLLECTION: Collection = Collection::Answers;
    const ENTITY: &'static str = "answer";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Comment {
    const COLLECTION: Collection = Collection::Comments;
    const ENTITY: &'static str = "comment";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Vote {
    const COLLECTION: Collection = Collection::Votes;
    const ENTITY: &'static str = "vote";
    fn id(&self) -> Uuid {
        self.id
    }
}

impl Document for Notification {
    const COLLECTION: Collection = Collection::Notifications;
    const ENTITY: &'static str = "notification";
    fn id(&self) -> Uuid {
        self.id
    }
}

/// Normalizes free-text tags: trimmed, lowercased, empties dropped,
/// deduplicated in first-occurrence order.
pub fn normalize_tags<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut tags: Vec<String> = Vec::new();
    for tag in raw {
        let tag = tag.as_ref().trim().to_lowercase();
        if !tag.is_empty() && !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}

pub const USERNAME_MIN: usize = 3;
pub const USERNAME_MAX: usize = 30;

/// Checks the username shape: 3–30 chars of lowercase alphanumerics or underscore.
pub fn is_valid_username(username: &str) -> bool {
    (USERNAME_MIN..=USERNAME_MAX).contains(&username.len())
        && username
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Derives a username stem from a display name. The result is valid on its
/// own and leaves room for a numeric disambiguation suffix.
pub fn username_stem(name: &str) -> String {
    let mut stem: String = name
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || *c == '_')
        .take(USERNAME_MAX - 6)
        .collect();
    if stem.len() < USERNAME_MIN {
        stem.push_str("user");
    }
    stem
}
