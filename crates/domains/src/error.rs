//! # AppError
//!
//! Centralized error taxonomy for askboard.
//! Every use case terminates in one of these variants; adapters translate
//! their own failures into `Internal` (or `NotFound` where the id did not resolve).

use thiserror::Error;
use uuid::Uuid;

/// The primary error type for all domain and service operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    /// No credential, or a credential that does not verify.
    #[error("unauthenticated: {0}")]
    Unauthenticated(String),

    /// Authenticated but not permitted (not the owner, not an admin).
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Malformed input (field presence, length, enum membership).
    #[error("validation error: {0}")]
    Validation(String),

    /// Target entity absent (e.g. question, answer, comment)
    #[error("{entity} not found with ID {id}")]
    NotFound { entity: &'static str, id: String },

    /// Redundant state transition or uniqueness violation (e.g. re-voting, duplicate email)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (store, cache, broadcast, mail)
    #[error("internal service error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn internal(err: impl std::fmt::Display) -> Self {
        Self::Internal(err.to_string())
    }

    /// Stable machine-readable code used in API payloads and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Unauthenticated(_) => "UNAUTHENTICATED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::Validation(_) => "VALIDATION_FAILED",
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Conflict(_) => "CONFLICT",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Human wording used for the requester's failure notification.
    pub fn user_message(&self) -> String {
        match self {
            Self::Unauthenticated(msg)
            | Self::Forbidden(msg)
            | Self::Validation(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::NotFound { entity, .. } => {
                let mut chars = entity.chars();
                let capitalized: String = match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => String::new(),
                };
                format!("{capitalized} not found.")
            }
            Self::Internal(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("document encoding: {err}"))
    }
}

/// A specialized Result type for askboard logic.
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_reads_as_a_sentence() {
        let err = AppError::not_found("question", Uuid::nil());
        assert_eq!(err.user_message(), "Question not found.");
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn internal_details_stay_out_of_user_message() {
        let err = AppError::internal("connection refused");
        assert!(!err.user_message().contains("refused"));
        assert!(err.to_string().contains("refused"));
    }
}
