//! # Write-Fanout Orchestrator
//!
//! Every mutating use case has the same shape: authorize, resolve targets,
//! mutate the store, then invalidate cache keys, broadcast a domain event and
//! notify affected users. Use cases express the first three steps as a future
//! returning `(value, FanoutPlan)`; [`Fanout::drive`] owns the policy:
//!
//! - an `Err` from the mutation future is terminal: a best-effort failure
//!   notice goes to the requester and the error is returned unchanged;
//! - after `Ok`, invalidation, broadcast and notification run in that order.
//!   Each side effect yields a `Result` that is logged and counted, never
//!   returned. Notices fan out per recipient and are awaited all-settled, so
//!   one recipient's failed email cannot block another's notification.
//!
//! Each side effect is bounded by the configured timeout.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::join_all;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use domains::{
    AppError, Broadcaster, Cache, EmailTransport, Identity, NotificationKind, Result, User,
};

use crate::documents::Documents;
use crate::email::EmailSpec;
use crate::ledger::NotificationLedger;
use crate::metrics::{FanoutMetrics, Outcome, Step};

/// Why a bounded side effect did not complete.
#[derive(Debug, thiserror::Error)]
pub(crate) enum EffectError {
    #[error(transparent)]
    Failed(#[from] AppError),
    #[error("side effect exceeded {0:?}")]
    TimedOut(Duration),
}

impl EffectError {
    fn outcome(&self) -> Outcome {
        match self {
            Self::Failed(_) => Outcome::Failed,
            Self::TimedOut(_) => Outcome::TimedOut,
        }
    }
}

type Effect<T> = std::result::Result<T, EffectError>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    Key(String),
    Prefix(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastEvent {
    pub room: String,
    pub event: &'static str,
    pub payload: Value,
}

/// One notification for one recipient, optionally mirrored by email.
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub recipient: Uuid,
    pub kind: NotificationKind,
    pub content: String,
    pub related_id: Option<Uuid>,
    pub email: Option<EmailSpec>,
}

impl Notice {
    pub fn new(recipient: Uuid, kind: NotificationKind, content: impl Into<String>) -> Self {
        Self {
            recipient,
            kind,
            content: content.into(),
            related_id: None,
            email: None,
        }
    }

    pub fn about(mut self, related_id: Uuid) -> Self {
        self.related_id = Some(related_id);
        self
    }

    pub fn with_email(mut self, email: EmailSpec) -> Self {
        self.email = Some(email);
        self
    }
}

/// Side effects a successful mutation asks for.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanoutPlan {
    pub invalidations: Vec<Invalidation>,
    pub broadcasts: Vec<BroadcastEvent>,
    pub notices: Vec<Notice>,
}

impl FanoutPlan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn invalidate_key(mut self, key: impl Into<String>) -> Self {
        self.invalidations.push(Invalidation::Key(key.into()));
        self
    }

    pub fn invalidate_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.invalidations.push(Invalidation::Prefix(prefix.into()));
        self
    }

    pub fn broadcast(mut self, room: impl Into<String>, event: &'static str, payload: Value) -> Self {
        self.broadcasts.push(BroadcastEvent {
            room: room.into(),
            event,
            payload,
        });
        self
    }

    pub fn notify(mut self, notice: Notice) -> Self {
        self.notices.push(notice);
        self
    }

    /// Adds one notice per recipient, skipping the actor.
    pub fn notify_each<F>(mut self, recipients: &[Uuid], actor: Uuid, mut make: F) -> Self
    where
        F: FnMut(Uuid) -> Notice,
    {
        for recipient in recipients.iter().copied().filter(|id| *id != actor) {
            self.notices.push(make(recipient));
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        self.invalidations.is_empty() && self.broadcasts.is_empty() && self.notices.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SideEffectFailure {
    pub step: Step,
    pub detail: String,
}

/// What happened after the mutation. Never surfaced to HTTP callers; used by
/// logs, metrics and tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FanoutReport {
    pub invalidated: usize,
    pub broadcast: usize,
    pub notified: Vec<Uuid>,
    pub emailed: Vec<Uuid>,
    pub failures: Vec<SideEffectFailure>,
}

#[derive(Clone)]
pub struct Fanout {
    docs: Documents,
    cache: Arc<dyn Cache>,
    broadcaster: Arc<dyn Broadcaster>,
    ledger: NotificationLedger,
    mailer: Arc<dyn EmailTransport>,
    metrics: FanoutMetrics,
    timeout: Duration,
}

impl Fanout {
    pub fn new(
        docs: Documents,
        cache: Arc<dyn Cache>,
        broadcaster: Arc<dyn Broadcaster>,
        mailer: Arc<dyn EmailTransport>,
        metrics: FanoutMetrics,
        timeout: Duration,
    ) -> Self {
        let ledger = NotificationLedger::new(docs.clone(), broadcaster.clone());
        Self {
            docs,
            cache,
            broadcaster,
            ledger,
            mailer,
            metrics,
            timeout,
        }
    }

    pub fn ledger(&self) -> &NotificationLedger {
        &self.ledger
    }

    /// Runs a use case through the pipeline. `failure_kind` types the
    /// requester's failure notice.
    pub async fn drive<T, Fut>(
        &self,
        actor: &Identity,
        failure_kind: NotificationKind,
        work: Fut,
    ) -> Result<T>
    where
        Fut: Future<Output = Result<(T, FanoutPlan)>>,
    {
        match work.await {
            Ok((value, plan)) => {
                self.apply(plan).await;
                Ok(value)
            }
            Err(err) => {
                self.report_failure(actor.user_id, failure_kind, &err).await;
                Err(err)
            }
        }
    }

    /// Steps 4–6 for a mutation that already succeeded.
    pub async fn apply(&self, plan: FanoutPlan) -> FanoutReport {
        let mut report = FanoutReport::default();

        for invalidation in &plan.invalidations {
            let result = match invalidation {
                Invalidation::Key(key) => self.bounded(self.cache.delete(key)).await.map(|()| 1),
                Invalidation::Prefix(prefix) => {
                    self.bounded(self.cache.delete_prefix(prefix)).await
                }
            };
            match self.settle(Step::Invalidate, result, &mut report) {
                Some(removed) => {
                    debug!(?invalidation, removed, "cache invalidated");
                    report.invalidated += 1;
                }
                None => warn!(?invalidation, "cache invalidation failed; entries expire by TTL"),
            }
        }

        for broadcast in plan.broadcasts {
            let result = self
                .bounded(self.broadcaster.publish(
                    &broadcast.room,
                    broadcast.event,
                    broadcast.payload,
                ))
                .await;
            if self.settle(Step::Broadcast, result, &mut report).is_some() {
                report.broadcast += 1;
            } else {
                warn!(room = %broadcast.room, event = broadcast.event, "broadcast failed");
            }
        }

        let deliveries = plan.notices.into_iter().map(|notice| self.deliver(notice));
        for delivery in join_all(deliveries).await {
            let recipient = delivery.recipient;
            if self.settle(Step::Notify, delivery.notified, &mut report).is_some() {
                report.notified.push(recipient);
            } else {
                warn!(%recipient, "notification not recorded");
            }
            if let Some(emailed) = delivery.emailed {
                if self.settle(Step::Email, emailed, &mut report).is_some() {
                    report.emailed.push(recipient);
                } else {
                    warn!(%recipient, "notification email not sent");
                }
            }
        }

        report
    }

    /// Records the requester's failure notice. Never fails.
    pub async fn report_failure(&self, user_id: Uuid, kind: NotificationKind, err: &AppError) {
        let recorded = self
            .bounded(
                self.ledger
                    .record(Some(user_id), kind, err.user_message(), None),
            )
            .await;
        match recorded {
            Ok(_) => self.metrics.record(Step::FailureNotice, Outcome::Ok),
            Err(failure) => {
                self.metrics.record(Step::FailureNotice, failure.outcome());
                debug!(%user_id, error = %failure, "failure notice dropped");
            }
        }
    }

    async fn deliver(&self, notice: Notice) -> Delivery {
        let notified = self
            .bounded(self.ledger.record(
                Some(notice.recipient),
                notice.kind,
                notice.content,
                notice.related_id,
            ))
            .await
            .map(|_| ());

        let emailed = match notice.email {
            Some(spec) => Some(self.bounded(self.send_email(notice.recipient, spec)).await),
            None => None,
        };

        Delivery {
            recipient: notice.recipient,
            notified,
            emailed,
        }
    }

    async fn send_email(&self, recipient: Uuid, spec: EmailSpec) -> Result<()> {
        let user: User = self.docs.get(recipient).await?;
        let html = spec.render(&user)?;
        self.mailer.send(&user.email, &spec.subject, &html).await
    }

    async fn bounded<T>(&self, work: impl Future<Output = Result<T>>) -> Effect<T> {
        match tokio::time::timeout(self.timeout, work).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(EffectError::TimedOut(self.timeout)),
        }
    }

    fn settle<T>(&self, step: Step, result: Effect<T>, report: &mut FanoutReport) -> Option<T> {
        match result {
            Ok(value) => {
                self.metrics.record(step, Outcome::Ok);
                Some(value)
            }
            Err(err) => {
                self.metrics.record(step, err.outcome());
                report.failures.push(SideEffectFailure {
                    step,
                    detail: err.to_string(),
                });
                None
            }
        }
    }
}

struct Delivery {
    recipient: Uuid,
    notified: Effect<()>,
    emailed: Option<Effect<()>>,
}
