//! Creates (or promotes) the administrator account in the Postgres store.
//!
//! ```text
//! ASKBOARD_SEED_EMAIL=admin@example.com ASKBOARD_SEED_PASSWORD=... seed
//! ```
//!
//! Database settings come from the usual askboard configuration. An existing
//! account with the same email is promoted to admin and keeps its password.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use secrecy::ExposeSecret;
use tracing::info;
use uuid::Uuid;

use auth_adapters::Argon2Hasher;
use configs::{DatabaseBackend, Settings};
use domains::{
    is_valid_username, username_stem, Collection, DocumentStore, Filter, FindOptions, Patch,
    PasswordHasher, Role, User,
};
use storage_adapters::postgres::PgDocumentStore;

const PASSWORD_MIN: usize = 8;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().context("loading settings")?;
    if settings.database.backend != DatabaseBackend::Postgres {
        bail!("seeding needs database.backend = \"postgres\"");
    }
    let url = settings
        .database
        .url
        .as_ref()
        .context("database.url is required")?;

    let email = std::env::var("ASKBOARD_SEED_EMAIL")
        .context("ASKBOARD_SEED_EMAIL is required")?
        .trim()
        .to_lowercase();
    let password = std::env::var("ASKBOARD_SEED_PASSWORD").context("ASKBOARD_SEED_PASSWORD is required")?;
    let name = std::env::var("ASKBOARD_SEED_NAME").unwrap_or_else(|_| "Administrator".into());
    if password.len() < PASSWORD_MIN {
        bail!("ASKBOARD_SEED_PASSWORD must be at least {PASSWORD_MIN} characters");
    }

    let store = PgDocumentStore::connect(url.expose_secret(), 2)
        .await
        .context("connecting to postgres")?;
    store.migrate().await.context("migrating postgres")?;

    let existing = store
        .find(
            Collection::Users,
            &Filter::new().eq("email", email.as_str()),
            &FindOptions::default().page(0, 1),
        )
        .await?;
    if let Some(doc) = existing.into_iter().next() {
        let user: User = serde_json::from_value(doc)?;
        store
            .update_by_id(
                Collection::Users,
                user.id,
                &Patch::new().set("role", "admin").touch(Utc::now()),
            )
            .await?;
        info!(user_id = %user.id, %email, "existing account promoted to admin");
        return Ok(());
    }

    let username = free_username(&store, &name).await?;
    let now = Utc::now();
    let admin = User {
        id: Uuid::now_v7(),
        name,
        email: email.clone(),
        username,
        password_hash: Some(Argon2Hasher::new().hash(&password)?),
        role: Role::Admin,
        created_at: now,
        updated_at: now,
    };
    store
        .insert(Collection::Users, serde_json::to_value(&admin)?)
        .await?;
    info!(user_id = %admin.id, %email, username = %admin.username, "admin account created");
    Ok(())
}

/// `admin` when free, otherwise the stem of the name with a numeric suffix.
async fn free_username(store: &PgDocumentStore, name: &str) -> Result<String> {
    let stem = username_stem(name);
    let candidates = std::iter::once("admin".to_string())
        .chain(std::iter::once(stem.clone()))
        .chain((1..=50).map(|n| format!("{stem}{n}")));
    for candidate in candidates.filter(|c| is_valid_username(c)) {
        let taken = store
            .count(Collection::Users, &Filter::new().eq("username", candidate.as_str()))
            .await?;
        if taken == 0 {
            return Ok(candidate);
        }
    }
    bail!("no free username derived from {name:?}")
}
