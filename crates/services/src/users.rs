//! Accounts: registration, login and request authentication.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use domains::{
    is_valid_username, username_stem, AppError, Filter, Identity, NotificationKind, Result, Role,
    User, UserProfile,
};

use crate::context::{ensure, required_text, ServiceContext};
use crate::email::EmailSpec;
use crate::fanout::{FanoutPlan, Notice};

pub const NAME_MAX: usize = 100;
pub const PASSWORD_MIN: usize = 8;
const USERNAME_ATTEMPTS: u32 = 50;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Registration {
    pub name: String,
    pub email: String,
    /// Derived from `name` when absent
    pub username: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthSession {
    pub token: String,
    pub user: UserProfile,
}

#[derive(Clone)]
pub struct UserService {
    ctx: Arc<ServiceContext>,
}

impl UserService {
    pub fn new(ctx: Arc<ServiceContext>) -> Self {
        Self { ctx }
    }

    pub async fn register(&self, input: Registration) -> Result<AuthSession> {
        let ctx = &self.ctx;
        let name = required_text("Name", &input.name, NAME_MAX)?;
        let email = normalize_email(&input.email)?;
        ensure(input.password.chars().count() >= PASSWORD_MIN, || {
            AppError::Validation(format!(
                "Password must be at least {PASSWORD_MIN} characters"
            ))
        })?;

        let taken = ctx
            .docs
            .find_one::<User>(&Filter::new().eq("email", email.as_str()))
            .await?;
        ensure(taken.is_none(), || {
            AppError::Conflict("An account with this email already exists".into())
        })?;

        let username = match input.username.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            Some(requested) => {
                let requested = requested.to_lowercase();
                ensure(is_valid_username(&requested), || {
                    AppError::Validation(
                        "Username must be 3-30 characters of letters, digits or underscore".into(),
                    )
                })?;
                ensure(!self.username_taken(&requested).await?, || {
                    AppError::Conflict("This username is taken".into())
                })?;
                requested
            }
            None => self.derive_username(&name).await?,
        };

        let password_hash = self.hash_password(input.password).await?;
        let now = Utc::now();
        let user = User {
            id: Uuid::now_v7(),
            name,
            email,
            username,
            password_hash: Some(password_hash),
            role: Role::User,
            created_at: now,
            updated_at: now,
        };
        let token = ctx.tokens.issue(&identity_of(&user))?;
        // the store's unique keys settle registrations racing past the checks above
        let user = match ctx.docs.insert(&user).await {
            Err(AppError::Conflict(_)) => {
                return Err(AppError::Conflict(
                    "An account with this email or username already exists".into(),
                ))
            }
            inserted => inserted?,
        };
        info!(user_id = %user.id, username = %user.username, "account registered");

        ctx.fanout
            .apply(
                FanoutPlan::new().notify(
                    Notice::new(
                        user.id,
                        NotificationKind::Auth,
                        format!("Welcome to askboard, {}!", user.name),
                    )
                    .with_email(EmailSpec::welcome(ctx.config.public_url.clone())),
                ),
            )
            .await;
        Ok(AuthSession {
            token,
            user: user.profile(),
        })
    }

    /// `identifier` is an email address or a username.
    pub async fn login(&self, identifier: &str, password: &str) -> Result<AuthSession> {
        let ctx = &self.ctx;
        let identifier = identifier.trim().to_lowercase();
        let field = if identifier.contains('@') { "email" } else { "username" };
        let user = ctx
            .docs
            .find_one::<User>(&Filter::new().eq(field, identifier.as_str()))
            .await?
            .ok_or_else(invalid_credentials)?;

        let verified = match &user.password_hash {
            Some(hash) => self.verify_password(password, hash).await?,
            None => false,
        };
        if !verified {
            warn!(user_id = %user.id, "failed login attempt");
            ctx.fanout
                .apply(FanoutPlan::new().notify(Notice::new(
                    user.id,
                    NotificationKind::Auth,
                    "A failed sign-in attempt was made on your account.",
                )))
                .await;
            return Err(invalid_credentials());
        }

        let token = ctx.tokens.issue(&identity_of(&user))?;
        info!(user_id = %user.id, "signed in");
        ctx.fanout
            .apply(FanoutPlan::new().notify(Notice::new(
                user.id,
                NotificationKind::Auth,
                "New sign-in to your account.",
            )))
            .await;
        Ok(AuthSession {
            token,
            user: user.profile(),
        })
    }

    pub async fn me(&self, actor: &Identity) -> Result<UserProfile> {
        let user: User = self.ctx.docs.get(actor.user_id).await?;
        Ok(user.profile())
    }

    /// Verifies a bearer token and reloads the account, so role changes and
    /// removed accounts take effect without waiting for token expiry.
    pub async fn authenticate(&self, token: &str) -> Result<Identity> {
        let claimed = self.ctx.tokens.verify(token)?;
        match self.ctx.docs.get::<User>(claimed.user_id).await {
            Ok(user) => Ok(identity_of(&user)),
            Err(AppError::NotFound { .. }) => {
                Err(AppError::Unauthenticated("Account no longer exists".into()))
            }
            Err(err) => Err(err),
        }
    }

    async fn username_taken(&self, username: &str) -> Result<bool> {
        let found = self
            .ctx
            .docs
            .find_one::<User>(&Filter::new().eq("username", username))
            .await?;
        Ok(found.is_some())
    }

    async fn derive_username(&self, name: &str) -> Result<String> {
        let stem = username_stem(name);
        if !self.username_taken(&stem).await? {
            return Ok(stem);
        }
        for suffix in 1..=USERNAME_ATTEMPTS {
            let candidate = format!("{stem}{suffix}");
            if !self.username_taken(&candidate).await? {
                return Ok(candidate);
            }
        }
        let random = Uuid::new_v4().simple().to_string();
        Ok(format!("{stem}_{}", &random[..5]))
    }

    async fn hash_password(&self, password: String) -> Result<String> {
        let hasher = self.ctx.hasher.clone();
        tokio::task::spawn_blocking(move || hasher.hash(&password))
            .await
            .map_err(AppError::internal)?
    }

    async fn verify_password(&self, password: &str, hash: &str) -> Result<bool> {
        let hasher = self.ctx.hasher.clone();
        let (password, hash) = (password.to_string(), hash.to_string());
        tokio::task::spawn_blocking(move || hasher.verify(&password, &hash))
            .await
            .map_err(AppError::internal)
    }
}

pub(crate) fn identity_of(user: &User) -> Identity {
    Identity {
        user_id: user.id,
        role: user.role,
        username: user.username.clone(),
    }
}

fn invalid_credentials() -> AppError {
    AppError::Unauthenticated("Invalid credentials".into())
}

fn normalize_email(raw: &str) -> Result<String> {
    let email = raw.trim().to_lowercase();
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        }
        None => false,
    };
    ensure(valid && !email.contains(char::is_whitespace), || {
        AppError::Validation("A valid email address is required".into())
    })?;
    Ok(email)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn emails_are_lowercased_and_checked() {
        assert_eq!(normalize_email(" Ada@Example.COM ").unwrap(), "ada@example.com");
        assert!(normalize_email("ada.example.com").is_err());
        assert!(normalize_email("@example.com").is_err());
        assert!(normalize_email("ada@localhost").is_err());
        assert!(normalize_email("a da@example.com").is_err());
    }
}
