//! # configs
//!
//! Layered runtime settings for the askboard server, lowest precedence first:
//!
//! 1. built-in defaults (`Default` impls below);
//! 2. `config/default.toml`, then `config/local.toml` (both optional);
//! 3. environment variables prefixed `ASKBOARD__`, nested with `__`
//!    (`ASKBOARD__DATABASE__URL`, `ASKBOARD__AUTH__JWT_SECRET`, ...).
//!
//! A `.env` file in the working directory is loaded into the environment
//! first. Secrets are held as [`SecretString`] and never printed by `Debug`.

use std::time::Duration;

use config::{Config, Environment, File};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

pub const ENV_PREFIX: &str = "ASKBOARD";
pub const JWT_SECRET_MIN: usize = 32;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid setting `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

fn invalid(key: &'static str, reason: impl Into<String>) -> SettingsError {
    SettingsError::Invalid {
        key,
        reason: reason.into(),
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub database: DatabaseSettings,
    pub cache: CacheSettings,
    pub auth: AuthSettings,
    pub mail: MailSettings,
    pub media: MediaSettings,
    pub fanout: FanoutSettings,
    pub log: LogSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub request_timeout_secs: u64,
    pub concurrency_limit: usize,
    /// Base URL of the web client, used for links in emails
    pub public_url: String,
    /// Allowed CORS origin; any origin when unset
    pub cors_origin: Option<String>,
    pub default_page_size: usize,
    pub max_page_size: usize,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".into(),
            port: 8080,
            request_timeout_secs: 30,
            concurrency_limit: 1024,
            public_url: "http://localhost:3000".into(),
            cors_origin: None,
            default_page_size: 20,
            max_page_size: 100,
        }
    }
}

impl ServerSettings {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    pub backend: DatabaseBackend,
    pub url: Option<SecretString>,
    pub max_connections: u32,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            backend: DatabaseBackend::Memory,
            url: None,
            max_connections: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    pub backend: CacheBackend,
    pub url: Option<SecretString>,
    pub ttl_secs: u64,
    /// Prefix applied to every Redis key
    pub namespace: String,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            backend: CacheBackend::Memory,
            url: None,
            ttl_secs: 60,
            namespace: "askboard:".into(),
        }
    }
}

impl CacheSettings {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthSettings {
    pub jwt_secret: Option<SecretString>,
    pub token_ttl_hours: i64,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            jwt_secret: None,
            token_ttl_hours: 24 * 7,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailBackend {
    #[default]
    Log,
    Http,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MailSettings {
    pub backend: MailBackend,
    pub endpoint: Option<String>,
    pub api_key: Option<SecretString>,
    pub from: String,
}

impl Default for MailSettings {
    fn default() -> Self {
        Self {
            backend: MailBackend::Log,
            endpoint: None,
            api_key: None,
            from: "askboard <no-reply@askboard.local>".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaSettings {
    pub root: String,
    pub url_prefix: String,
    pub max_bytes: usize,
}

impl Default for MediaSettings {
    fn default() -> Self {
        Self {
            root: "./data/uploads".into(),
            url_prefix: "/media".into(),
            max_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FanoutSettings {
    pub side_effect_timeout_ms: u64,
}

impl Default for FanoutSettings {
    fn default() -> Self {
        Self {
            side_effect_timeout_ms: 5_000,
        }
    }
}

impl FanoutSettings {
    pub fn side_effect_timeout(&self) -> Duration {
        Duration::from_millis(self.side_effect_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    /// `tracing_subscriber::EnvFilter` directive; `RUST_LOG` wins when set
    pub filter: String,
    pub json: bool,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            filter: "info,tower_http=info".into(),
            json: false,
        }
    }
}

impl Settings {
    /// Loads `.env`, the optional config files and the environment, then
    /// validates the result.
    pub fn load() -> Result<Self, SettingsError> {
        match dotenvy::dotenv() {
            Ok(path) => debug!(path = %path.display(), ".env loaded"),
            Err(err) if err.not_found() => {}
            Err(err) => debug!(error = %err, ".env ignored"),
        }
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        let settings: Settings = config.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects combinations the server cannot start with.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.server.port == 0 {
            return Err(invalid("server.port", "must be non-zero"));
        }
        if self.server.default_page_size == 0
            || self.server.default_page_size > self.server.max_page_size
        {
            return Err(invalid(
                "server.default_page_size",
                "must be between 1 and server.max_page_size",
            ));
        }
        match &self.auth.jwt_secret {
            None => return Err(invalid("auth.jwt_secret", "is required")),
            Some(secret) if secret.expose_secret().len() < JWT_SECRET_MIN => {
                return Err(invalid(
                    "auth.jwt_secret",
                    format!("must be at least {JWT_SECRET_MIN} bytes"),
                ))
            }
            Some(_) => {}
        }
        if self.auth.token_ttl_hours <= 0 {
            return Err(invalid("auth.token_ttl_hours", "must be positive"));
        }
        if self.database.backend == DatabaseBackend::Postgres && self.database.url.is_none() {
            return Err(invalid("database.url", "is required for the postgres backend"));
        }
        if self.cache.backend == CacheBackend::Redis && self.cache.url.is_none() {
            return Err(invalid("cache.url", "is required for the redis backend"));
        }
        if self.mail.backend == MailBackend::Http {
            if self.mail.endpoint.is_none() {
                return Err(invalid("mail.endpoint", "is required for the http backend"));
            }
            if self.mail.api_key.is_none() {
                return Err(invalid("mail.api_key", "is required for the http backend"));
            }
        }
        if self.fanout.side_effect_timeout_ms == 0 {
            return Err(invalid("fanout.side_effect_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> Settings {
        let mut settings = Settings::default();
        settings.auth.jwt_secret = Some(SecretString::from("x".repeat(JWT_SECRET_MIN)));
        settings
    }

    #[test]
    fn defaults_need_only_a_secret() {
        assert!(matches!(
            Settings::default().validate(),
            Err(SettingsError::Invalid { key: "auth.jwt_secret", .. })
        ));
        valid().validate().unwrap();
    }

    #[test]
    fn short_secrets_are_rejected() {
        let mut settings = valid();
        settings.auth.jwt_secret = Some(SecretString::from("short"));
        assert!(settings.validate().is_err());
    }

    #[test]
    fn selected_backends_need_their_urls() {
        let mut settings = valid();
        settings.database.backend = DatabaseBackend::Postgres;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { key: "database.url", .. })
        ));
        settings.database.url = Some(SecretString::from("postgres://localhost/askboard"));
        settings.cache.backend = CacheBackend::Redis;
        assert!(matches!(
            settings.validate(),
            Err(SettingsError::Invalid { key: "cache.url", .. })
        ));
    }

    #[test]
    fn sections_deserialize_from_layered_sources() {
        let config = Config::builder()
            .add_source(config::File::from_str(
                r#"
                [server]
                port = 9000
                [database]
                backend = "postgres"
                url = "postgres://db/askboard"
                [fanout]
                side_effect_timeout_ms = 250
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        let settings: Settings = config.try_deserialize().unwrap();
        assert_eq!(settings.server.port, 9000);
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.database.backend, DatabaseBackend::Postgres);
        assert_eq!(
            settings.database.url.as_ref().map(|u| u.expose_secret().to_string()),
            Some("postgres://db/askboard".to_string())
        );
        assert_eq!(settings.fanout.side_effect_timeout(), Duration::from_millis(250));
        assert_eq!(settings.cache.backend, CacheBackend::Memory);
    }
}
