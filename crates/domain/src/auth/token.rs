//! Signed JWTs (HS256).

use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde::de::DeserializeOwned;

use crate::user::{Role, User};
use crate::{DomainError, EntityId, Result};

/// Claims carried by an access token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: EntityId,
    pub email: String,
    pub role: Role,
    pub iat: i64,
    pub exp: i64,
}

/// Claims carried by an email verification token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailClaims {
    pub sub: EntityId,
    pub email: String,
    pub iat: i64,
    pub exp: i64,
}

/// Issues and verifies tokens with one secret and lifetime.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Duration,
}

impl std::fmt::Debug for TokenIssuer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenIssuer")
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret),
            decoding: DecodingKey::from_secret(secret),
            ttl,
        }
    }

    /// Token lifetime in seconds.
    pub fn ttl_secs(&self) -> i64 {
        i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX)
    }

    /// `(iat, exp)` for a token issued now.
    fn window(&self) -> (i64, i64) {
        let iat = Utc::now().timestamp();
        (iat, iat.saturating_add(self.ttl_secs()))
    }

    pub fn access_claims(&self, user: &User) -> AccessClaims {
        let (iat, exp) = self.window();
        AccessClaims {
            sub: user.id,
            email: user.email.clone(),
            role: user.role,
            iat,
            exp,
        }
    }

    pub fn email_claims(&self, user: &User) -> EmailClaims {
        let (iat, exp) = self.window();
        EmailClaims {
            sub: user.id,
            email: user.email.clone(),
            iat,
            exp,
        }
    }

    pub fn encode<C: Serialize>(&self, claims: &C) -> Result<String> {
        jsonwebtoken::encode(&Header::new(Algorithm::HS256), claims, &self.encoding)
            .map_err(|e| DomainError::Internal(format!("token encoding failed: {e}")))
    }

    /// Verifies signature and expiry. Any failure is `InvalidToken`.
    pub fn decode<C: DeserializeOwned>(&self, token: &str) -> Result<C> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;
        jsonwebtoken::decode::<C>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!(error = %e, "token rejected");
                DomainError::InvalidToken
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::user::User;

    fn user() -> User {
        User::new("ada@example.com", "hash".to_string(), None)
    }

    #[test]
    fn access_token_roundtrip() {
        let issuer = TokenIssuer::new(b"secret", Duration::from_secs(3600));
        let u = user();
        let token = issuer.encode(&issuer.access_claims(&u)).unwrap();

        let claims: AccessClaims = issuer.decode(&token).unwrap();
        assert_eq!(claims.sub, u.id);
        assert_eq!(claims.role, Role::Customer);
        assert_eq!(claims.exp - claims.iat, 3600);
    }

    #[test]
    fn other_secret_is_rejected() {
        let issuer = TokenIssuer::new(b"secret", Duration::from_secs(3600));
        let other = TokenIssuer::new(b"other", Duration::from_secs(3600));
        let token = other.encode(&other.email_claims(&user())).unwrap();

        assert!(matches!(
            issuer.decode::<EmailClaims>(&token),
            Err(DomainError::InvalidToken)
        ));
    }

    #[test]
    fn expired_token_is_rejected() {
        let issuer = TokenIssuer::new(b"secret", Duration::from_secs(60));
        let mut claims = issuer.email_claims(&user());
        claims.exp = claims.iat - 10;
        let token = issuer.encode(&claims).unwrap();

        assert!(issuer.decode::<EmailClaims>(&token).is_err());
    }

    #[test]
    fn garbage_is_rejected() {
        let issuer = TokenIssuer::new(b"secret", Duration::from_secs(60));
        assert!(issuer.decode::<AccessClaims>("a.b.c").is_err());
    }
}
