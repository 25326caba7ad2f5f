//! Registration, login, email verification and password reset.

pub mod password;
pub mod token;

use std::sync::Arc;

use chrono::{Duration as ChronoDuration, Utc};
use gateways::{Email, Mailer};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use store::{DocumentQuery, DocumentStore, WriteBatch};

use crate::user::{Role, User, UserService, UserView, validate_email};
use crate::{DomainError, EntityId, Result};

pub use password::{hash_password, validate_password, verify_password};
pub use token::{AccessClaims, EmailClaims, TokenIssuer};

/// How long a password reset link stays valid.
pub const RESET_TOKEN_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct RegisterInput {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoginUser {
    pub id: EntityId,
    pub email: String,
    pub role: Role,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoginOutput {
    pub access_token: String,
    pub expires_in: i64,
    pub user: LoginUser,
}

/// Hex-encoded SHA-256 of a reset token. Only the digest is stored.
pub fn hash_reset_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[derive(Clone)]
pub struct AuthService<S> {
    users: UserService<S>,
    access: TokenIssuer,
    email_tokens: TokenIssuer,
    mailer: Arc<dyn Mailer>,
    app_url: String,
}

impl<S: DocumentStore + Clone> AuthService<S> {
    pub fn new(
        store: S,
        access: TokenIssuer,
        email_tokens: TokenIssuer,
        mailer: Arc<dyn Mailer>,
        app_url: impl Into<String>,
    ) -> Self {
        Self {
            users: UserService::new(store),
            access,
            email_tokens,
            mailer,
            app_url: app_url.into(),
        }
    }

    async fn require_by_email(&self, email: &str) -> Result<User> {
        self.users
            .find_by_email(email)
            .await?
            .ok_or_else(|| DomainError::not_found("User"))
    }

    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: RegisterInput) -> Result<UserView> {
        validate_email(&input.email)?;
        validate_password(&input.password)?;

        let user = User::new(&input.email, hash_password(&input.password)?, input.name);
        self.users.insert_unique(&user).await?;

        tracing::info!(user_id = %user.id, "user registered");
        Ok(user.view())
    }

    #[tracing::instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutput> {
        let user = self
            .users
            .find_by_email(email)
            .await?
            .ok_or(DomainError::InvalidCredentials)?;

        if !verify_password(password, &user.password_hash) {
            return Err(DomainError::InvalidCredentials);
        }
        if !user.is_verified {
            return Err(DomainError::EmailNotVerified);
        }

        let access_token = self.access.encode(&self.access.access_claims(&user))?;
        Ok(LoginOutput {
            access_token,
            expires_in: self.access.ttl_secs(),
            user: LoginUser {
                id: user.id,
                email: user.email,
                role: user.role,
            },
        })
    }

    /// Validates a bearer token and returns its claims.
    pub fn authenticate(&self, bearer: &str) -> Result<AccessClaims> {
        self.access.decode(bearer)
    }

    #[tracing::instrument(skip(self))]
    pub async fn send_verification_email(&self, email: &str) -> Result<()> {
        let user = self.require_by_email(email).await?;
        if user.is_verified {
            return Err(DomainError::Validation("Email already verified".to_string()));
        }

        let token = self.email_tokens.encode(&self.email_tokens.email_claims(&user))?;
        let link = format!("{}auth/verify-email/{token}", self.app_url);
        self.mailer
            .send(Email {
                to: user.email.clone(),
                subject: "Verify your email".to_string(),
                html: format!(
                    "<p>Welcome! Confirm your email address by following \
                     <a href=\"{link}\">this link</a>.</p>"
                ),
            })
            .await?;

        tracing::info!(user_id = %user.id, "verification email sent");
        Ok(())
    }

    /// Marks the token's user verified. Returns false for any failure.
    #[tracing::instrument(skip(self, token))]
    pub async fn verify_email(&self, token: &str) -> bool {
        match self.try_verify_email(token).await {
            Ok(()) => true,
            Err(e) => {
                tracing::debug!(error = %e, "email verification failed");
                false
            }
        }
    }

    async fn try_verify_email(&self, token: &str) -> Result<()> {
        let claims: EmailClaims = self.email_tokens.decode(token)?;
        let user = self.users.repository().require(claims.sub).await?;
        if user.email != claims.email {
            return Err(DomainError::InvalidToken);
        }
        if user.is_verified {
            return Ok(());
        }

        let batch = WriteBatch::new()
            .set::<User>(user.id, "is_verified", true)?
            .set::<User>(user.id, "updated_at", Utc::now())?;
        self.users.repository().store().commit(batch).await?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    pub async fn forget_password(&self, email: &str) -> Result<()> {
        let user = self.require_by_email(email).await?;

        let token = hex::encode(rand::random::<[u8; 32]>());
        let expires = Utc::now() + ChronoDuration::minutes(RESET_TOKEN_TTL_MINUTES);
        let batch = WriteBatch::new()
            .set::<User>(user.id, "password_reset_token", hash_reset_token(&token))?
            .set::<User>(user.id, "password_reset_expires", expires)?;
        self.users.repository().store().commit(batch).await?;

        let link = format!("{}auth/reset-password/{token}", self.app_url);
        self.mailer
            .send(Email {
                to: user.email.clone(),
                subject: "Reset your password".to_string(),
                html: format!(
                    "<p>Reset your password with <a href=\"{link}\">this link</a>. \
                     It expires in {RESET_TOKEN_TTL_MINUTES} minutes.</p>"
                ),
            })
            .await?;

        tracing::info!(user_id = %user.id, "password reset requested");
        Ok(())
    }

    #[tracing::instrument(skip(self, token, new_password))]
    pub async fn reset_password(&self, token: &str, new_password: &str) -> Result<()> {
        validate_password(new_password)?;

        let query = DocumentQuery::by("password_reset_token", hash_reset_token(token));
        let user = self
            .users
            .repository()
            .find_one(&query)
            .await?
            .filter(|u| u.password_reset_expires.is_some_and(|exp| exp > Utc::now()))
            .ok_or(DomainError::InvalidToken)?;

        let mut updated = user.clone();
        updated.password_hash = hash_password(new_password)?;
        updated.password_reset_token = None;
        updated.password_reset_expires = None;
        updated.updated_at = Utc::now();
        self.users
            .repository()
            .store()
            .commit(WriteBatch::new().patch(&user, &updated)?)
            .await?;

        self.mailer
            .send(Email {
                to: user.email.clone(),
                subject: "Your password was changed".to_string(),
                html: "<p>Your password has been reset. If this wasn't you, \
                       contact support immediately.</p>"
                    .to_string(),
            })
            .await?;

        tracing::info!(user_id = %user.id, "password reset");
        Ok(())
    }
}
