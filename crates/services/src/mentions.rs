//! `@username` extraction and resolution.

use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use domains::{Filter, Result, User};

use crate::documents::Documents;

static MENTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"@(\w+)").expect("mention pattern is a valid regex"));

/// Distinct mention tokens in first-occurrence order, without the `@`.
pub fn mention_tokens(content: &str) -> Vec<&str> {
    let mut tokens: Vec<&str> = Vec::new();
    for capture in MENTION.captures_iter(content) {
        if let Some(token) = capture.get(1).map(|m| m.as_str()) {
            if !tokens.contains(&token) {
                tokens.push(token);
            }
        }
    }
    tokens
}

/// Resolves mention tokens against the `username` field for every entity type.
#[derive(Clone)]
pub struct MentionResolver {
    docs: Documents,
}

impl MentionResolver {
    pub fn new(docs: Documents) -> Self {
        Self { docs }
    }

    /// Resolved user ids, deduplicated by id, in order of first mention.
    /// Tokens naming no user are dropped.
    pub async fn resolve(&self, content: &str) -> Result<Vec<Uuid>> {
        let mut resolved: Vec<Uuid> = Vec::new();
        for token in mention_tokens(content) {
            let username = token.to_lowercase();
            let filter = Filter::new().eq("username", username.as_str());
            if let Some(user) = self.docs.find_one::<User>(&filter).await? {
                if !resolved.contains(&user.id) {
                    resolved.push(user.id);
                }
            }
        }
        Ok(resolved)
    }
}

/// Ids present in `current` but not in `previous`, order preserved.
pub fn newly_mentioned(previous: &[Uuid], current: &[Uuid]) -> Vec<Uuid> {
    current
        .iter()
        .filter(|id| !previous.contains(id))
        .copied()
        .collect()
}
