//! Outbound mail transports.

#[cfg(feature = "mail-http")]
mod http;

#[cfg(feature = "mail-http")]
pub use http::HttpMailer;

use async_trait::async_trait;
use tracing::info;

use domains::{EmailTransport, Result};

/// Writes each message to the log instead of sending it. Used in
/// development and whenever no mail provider is configured.
#[derive(Debug, Clone, Default)]
pub struct LogMailer {
    from: String,
}

impl LogMailer {
    pub fn new(from: impl Into<String>) -> Self {
        Self { from: from.into() }
    }
}

#[async_trait]
impl EmailTransport for LogMailer {
    async fn send(&self, to: &str, subject: &str, html_body: &str) -> Result<()> {
        info!(
            from = %self.from,
            to,
            subject,
            bytes = html_body.len(),
            "email (log transport)"
        );
        Ok(())
    }
}
