//! Wiring shared by every use-case service.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use domains::{
    AppError, Broadcaster, Cache, DocumentStore, EmailTransport, MediaStorage, MediaUpload,
    PasswordHasher, Result, TokenService,
};

use crate::cache::ReadThrough;
use crate::documents::Documents;
use crate::fanout::Fanout;
use crate::ledger::NotificationLedger;
use crate::mentions::MentionResolver;
use crate::metrics::FanoutMetrics;

/// Adapters the services are built from. Constructed once at startup and
/// injected; nothing in the services reaches for a global.
#[derive(Clone)]
pub struct Ports {
    pub store: Arc<dyn DocumentStore>,
    pub cache: Arc<dyn Cache>,
    pub broadcaster: Arc<dyn Broadcaster>,
    pub mailer: Arc<dyn EmailTransport>,
    pub media: Arc<dyn MediaStorage>,
    pub hasher: Arc<dyn PasswordHasher>,
    pub tokens: Arc<dyn TokenService>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub cache_ttl: Duration,
    pub side_effect_timeout: Duration,
    /// Base URL of the web client, used for links in emails
    pub public_url: String,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(60),
            side_effect_timeout: Duration::from_secs(10),
            public_url: "http://localhost:3000".into(),
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct PageRequest {
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: usize,
    pub limit: usize,
}

impl Page {
    /// Saturates for pages far past the end, which then simply come back empty.
    pub fn skip(&self) -> usize {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
    pub page: usize,
    pub limit: usize,
}

pub struct ServiceContext {
    pub(crate) docs: Documents,
    pub(crate) reads: ReadThrough,
    pub(crate) fanout: Fanout,
    pub(crate) mentions: MentionResolver,
    pub(crate) media: Arc<dyn MediaStorage>,
    pub(crate) hasher: Arc<dyn PasswordHasher>,
    pub(crate) tokens: Arc<dyn TokenService>,
    pub(crate) config: ServiceConfig,
}

impl ServiceContext {
    pub fn new(ports: Ports, config: ServiceConfig, metrics: FanoutMetrics) -> Self {
        let docs = Documents::new(ports.store);
        let fanout = Fanout::new(
            docs.clone(),
            ports.cache.clone(),
            ports.broadcaster,
            ports.mailer,
            metrics,
            config.side_effect_timeout,
        );
        Self {
            reads: ReadThrough::new(ports.cache, config.cache_ttl),
            mentions: MentionResolver::new(docs.clone()),
            docs,
            fanout,
            media: ports.media,
            hasher: ports.hasher,
            tokens: ports.tokens,
            config,
        }
    }

    pub(crate) fn ledger(&self) -> &NotificationLedger {
        self.fanout.ledger()
    }

    /// Clamps a page request to `1..` and `1..=max_page_size`.
    pub(crate) fn page(&self, request: PageRequest) -> Page {
        Page {
            page: request.page.unwrap_or(1).max(1),
            limit: request
                .limit
                .unwrap_or(self.config.default_page_size)
                .clamp(1, self.config.max_page_size),
        }
    }

    pub(crate) fn question_link(&self, question_id: Uuid) -> String {
        format!(
            "{}/questions/{question_id}",
            self.config.public_url.trim_end_matches('/')
        )
    }

    /// Uploads images one by one; a failed upload drops only that image.
    pub(crate) async fn upload_images(&self, uploads: Vec<MediaUpload>) -> Vec<String> {
        let mut urls = Vec::with_capacity(uploads.len());
        for upload in uploads {
            match self.media.store(upload).await {
                Ok(url) => urls.push(url),
                Err(err) => warn!(error = %err, "image upload failed; continuing without it"),
            }
        }
        urls
    }
}

/// Appends uploaded image URLs to rich-text content.
pub(crate) fn embed_images(content: &str, urls: &[String]) -> String {
    let mut html = content.to_string();
    for url in urls {
        html.push_str(&format!("<p><img src=\"{url}\" alt=\"\"></p>"));
    }
    html
}

pub(crate) fn ensure(condition: bool, err: impl FnOnce() -> AppError) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(err())
    }
}

/// Trimmed, non-empty text no longer than `max` chars.
pub(crate) fn required_text(field: &str, value: &str, max: usize) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(format!("{field} is required")));
    }
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "{field} must be at most {max} characters"
        )));
    }
    Ok(value.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn required_text_trims_and_bounds() {
        assert_eq!(required_text("title", "  hi  ", 10).unwrap(), "hi");
        assert!(matches!(
            required_text("title", "   ", 10),
            Err(AppError::Validation(_))
        ));
        assert!(required_text("title", "abcdef", 5).is_err());
    }

    #[test]
    fn images_are_appended_in_order() {
        let html = embed_images("<p>body</p>", &["/a.png".into(), "/b.png".into()]);
        assert!(html.starts_with("<p>body</p>"));
        assert!(html.find("/a.png").unwrap() < html.find("/b.png").unwrap());
    }

    #[test]
    fn page_skip_is_zero_based() {
        assert_eq!(Page { page: 1, limit: 20 }.skip(), 0);
        assert_eq!(Page { page: 3, limit: 10 }.skip(), 20);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let page = Page {
            page: usize::MAX,
            limit: 100,
        };
        assert_eq!(page.skip(), usize::MAX);
    }
}
