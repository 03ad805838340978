//! # askboard services
//!
//! Use cases of the Q&A board. Every mutation is driven through
//! [`fanout::Fanout`]: the store write decides the outcome, cache
//! invalidation, realtime broadcast and notifications follow as best-effort
//! side effects.

pub mod answers;
pub mod cache;
pub mod comments;
pub mod context;
pub mod documents;
pub mod email;
pub mod events;
pub mod fanout;
pub mod ledger;
pub mod mentions;
pub mod metrics;
pub mod moderation;
pub mod notifications;
pub mod questions;
pub mod users;
pub mod votes;

use std::sync::Arc;

pub use answers::{AnswerService, NewAnswer};
pub use comments::CommentService;
pub use context::{PageRequest, Paged, Ports, ServiceConfig, ServiceContext};
pub use fanout::{Fanout, FanoutPlan, FanoutReport, Notice};
pub use metrics::FanoutMetrics;
pub use moderation::ModerationService;
pub use notifications::{NotificationService, UnreadCount};
pub use questions::{NewQuestion, QuestionChanges, QuestionQuery, QuestionService};
pub use users::{AuthSession, Registration, UserService};
pub use votes::{VoteService, VoteTally};

/// Every use-case service, sharing one context.
#[derive(Clone)]
pub struct AppServices {
    pub questions: QuestionService,
    pub answers: AnswerService,
    pub comments: CommentService,
    pub votes: VoteService,
    pub moderation: ModerationService,
    pub users: UserService,
    pub notifications: NotificationService,
}

impl AppServices {
    pub fn new(ports: Ports, config: ServiceConfig, metrics: FanoutMetrics) -> Self {
        let ctx = Arc::new(ServiceContext::new(ports, config, metrics));
        Self {
            questions: QuestionService::new(ctx.clone()),
            answers: AnswerService::new(ctx.clone()),
            comments: CommentService::new(ctx.clone()),
            votes: VoteService::new(ctx.clone()),
            moderation: ModerationService::new(ctx.clone()),
            users: UserService::new(ctx.clone()),
            notifications: NotificationService::new(ctx),
        }
    }
}
