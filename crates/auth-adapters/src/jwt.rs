use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use domains::{AppError, Identity, Result, Role, TokenService};

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: Uuid,
    role: Role,
    username: String,
    iat: i64,
    exp: i64,
}

/// HS256 bearer tokens carrying the caller's identity.
pub struct JwtTokenService {
    encoding: EncodingKey,
    decoding: DecodingKey,
    validation: Validation,
    ttl: Duration,
}

impl JwtTokenService {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 30;
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            validation,
            ttl,
        }
    }

    fn issue_at(&self, identity: &Identity, now: DateTime<Utc>) -> Result<String> {
        let claims = Claims {
            sub: identity.user_id,
            role: identity.role,
            username: identity.username.clone(),
            iat: now.timestamp(),
            exp: (now + self.ttl).timestamp(),
        };
        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)
            .map_err(|e| AppError::Internal(format!("token signing failed: {e}")))
    }
}

impl TokenService for JwtTokenService {
    fn issue(&self, identity: &Identity) -> Result<String> {
        self.issue_at(identity, Utc::now())
    }

    fn verify(&self, token: &str) -> Result<Identity> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation).map_err(|e| {
            debug!(error = %e, "token rejected");
            AppError::Unauthenticated("Invalid or expired token".into())
        })?;
        Ok(Identity {
            user_id: data.claims.sub,
            role: data.claims.role,
            username: data.claims.username,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> Identity {
        Identity {
            user_id: Uuid::now_v7(),
            role: Role::Admin,
            username: "ada".into(),
        }
    }

    #[test]
    fn issued_tokens_verify_to_the_same_identity() {
        let tokens = JwtTokenService::new(b"test-secret", Duration::hours(1));
        let who = identity();
        let token = tokens.issue(&who).unwrap();
        assert_eq!(tokens.verify(&token).unwrap(), who);
    }

    #[test]
    fn expired_tokens_are_rejected() {
        let tokens = JwtTokenService::new(b"test-secret", Duration::hours(1));
        let token = tokens
            .issue_at(&identity(), Utc::now() - Duration::hours(2))
            .unwrap();
        assert!(matches!(
            tokens.verify(&token),
            Err(AppError::Unauthenticated(_))
        ));
    }

    #[test]
    fn tokens_signed_with_another_secret_are_rejected() {
        let ours = JwtTokenService::new(b"ours", Duration::hours(1));
        let theirs = JwtTokenService::new(b"theirs", Duration::hours(1));
        let token = theirs.issue(&identity()).unwrap();
        assert!(ours.verify(&token).is_err());
        assert!(ours.verify("not.a.token").is_err());
    }
}
