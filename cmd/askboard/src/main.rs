//! # askboard
//!
//! The server binary. Adapters are chosen by configuration among those
//! compiled in by cargo features, then injected into the services.

#[cfg(not(all(feature = "web-axum", feature = "auth-jwt")))]
compile_error!("askboard needs the `web-axum` and `auth-jwt` features");

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use prometheus_client::registry::Registry;
use secrecy::ExposeSecret;
use tracing::info;
use tracing_subscriber::EnvFilter;

use api_adapters::{build_router, AppState, MediaMount, RouterSettings};
use auth_adapters::{Argon2Hasher, JwtTokenService};
use configs::{CacheBackend, DatabaseBackend, LogSettings, MailBackend, Settings};
use domains::{Cache, DocumentStore, EmailTransport};
use services::{AppServices, FanoutMetrics, Ports, ServiceConfig};
use storage_adapters::{LocalMediaStorage, LogMailer, MemoryCache, MemoryDocumentStore, RoomHub};

#[cfg(feature = "db-postgres")]
use storage_adapters::postgres::PgDocumentStore;

#[cfg(feature = "redis")]
use storage_adapters::redis_cache::RedisCache;

#[cfg(feature = "mail-http")]
use storage_adapters::mail::HttpMailer;

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load().context("loading settings")?;
    init_tracing(&settings.log);

    let hub = Arc::new(RoomHub::new());
    let jwt_secret = settings
        .auth
        .jwt_secret
        .as_ref()
        .ok_or_else(|| anyhow!("auth.jwt_secret is required"))?;
    let ports = Ports {
        store: document_store(&settings).await?,
        cache: cache(&settings)?,
        broadcaster: hub.clone(),
        mailer: mailer(&settings)?,
        media: Arc::new(
            LocalMediaStorage::new(&settings.media.root, &settings.media.url_prefix)
                .with_max_bytes(settings.media.max_bytes),
        ),
        hasher: Arc::new(Argon2Hasher::new()),
        tokens: Arc::new(JwtTokenService::new(
            jwt_secret.expose_secret().as_bytes(),
            chrono::Duration::hours(settings.auth.token_ttl_hours),
        )),
    };

    let mut registry = Registry::default();
    let metrics = FanoutMetrics::register(&mut registry);
    let services = AppServices::new(ports, service_config(&settings), metrics);

    let router = build_router(
        AppState::new(services, hub, registry),
        &RouterSettings {
            request_timeout: settings.server.request_timeout(),
            concurrency_limit: settings.server.concurrency_limit,
            cors_origin: settings.server.cors_origin.clone(),
            media: Some(MediaMount {
                url_prefix: settings.media.url_prefix.clone(),
                root: settings.media.root.clone().into(),
            }),
        },
    );

    let address = settings.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&address)
        .await
        .with_context(|| format!("binding {address}"))?;
    info!(%address, "askboard listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("askboard stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    if log.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn service_config(settings: &Settings) -> ServiceConfig {
    ServiceConfig {
        cache_ttl: settings.cache.ttl(),
        side_effect_timeout: settings.fanout.side_effect_timeout(),
        public_url: settings.server.public_url.clone(),
        default_page_size: settings.server.default_page_size,
        max_page_size: settings.server.max_page_size,
    }
}

async fn document_store(settings: &Settings) -> Result<Arc<dyn DocumentStore>> {
    match settings.database.backend {
        DatabaseBackend::Memory => {
            info!("using the in-memory document store; data is lost on restart");
            Ok(Arc::new(MemoryDocumentStore::new()))
        }
        #[cfg(feature = "db-postgres")]
        DatabaseBackend::Postgres => {
            let url = settings
                .database
                .url
                .as_ref()
                .ok_or_else(|| anyhow!("database.url is required"))?;
            let store = PgDocumentStore::connect(url.expose_secret(), settings.database.max_connections)
                .await
                .context("connecting to postgres")?;
            store.migrate().await.context("migrating postgres")?;
            info!("using the postgres document store");
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "db-postgres"))]
        DatabaseBackend::Postgres => Err(anyhow!("built without the `db-postgres` feature")),
    }
}

fn cache(settings: &Settings) -> Result<Arc<dyn Cache>> {
    match settings.cache.backend {
        CacheBackend::Memory => Ok(Arc::new(MemoryCache::new())),
        #[cfg(feature = "redis")]
        CacheBackend::Redis => {
            let url = settings
                .cache
                .url
                .as_ref()
                .ok_or_else(|| anyhow!("cache.url is required"))?;
            let cache = RedisCache::connect(url.expose_secret(), settings.cache.namespace.clone())
                .context("creating the redis pool")?;
            info!("using the redis cache");
            Ok(Arc::new(cache))
        }
        #[cfg(not(feature = "redis"))]
        CacheBackend::Redis => Err(anyhow!("built without the `redis` feature")),
    }
}

fn mailer(settings: &Settings) -> Result<Arc<dyn EmailTransport>> {
    match settings.mail.backend {
        MailBackend::Log => Ok(Arc::new(LogMailer::new(settings.mail.from.clone()))),
        #[cfg(feature = "mail-http")]
        MailBackend::Http => {
            let (endpoint, api_key) = settings
                .mail
                .endpoint
                .as_ref()
                .zip(settings.mail.api_key.as_ref())
                .ok_or_else(|| anyhow!("mail.endpoint and mail.api_key are required"))?;
            let mailer = HttpMailer::new(
                endpoint.clone(),
                api_key.expose_secret().to_string(),
                settings.mail.from.clone(),
            )
            .context("creating the mail client")?;
            Ok(Arc::new(mailer))
        }
        #[cfg(not(feature = "mail-http"))]
        MailBackend::Http => Err(anyhow!("built without the `mail-http` feature")),
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
