//! Application configuration loaded from environment variables.
//!
//! # Environment Variables
//!
//! ## Required
//! - `JWT_SECRET` - signing secret for access tokens
//! - `JWT_EMAIL_SECRET` - signing secret for email verification tokens
//!
//! ## Optional
//! - `HOST`, `PORT` - bind address (default: `0.0.0.0:3000`)
//! - `RUST_LOG` - tracing filter directive (default: `info`)
//! - `LOG_FORMAT` - `json` for JSON log lines, anything else for text
//! - `DATABASE_URL` - Postgres URL; unset runs on the in-memory store
//! - `DATABASE_MAX_CONNECTIONS` - pool size (default: 10)
//! - `REDIS_URL` - Redis URL for the product cache; unset uses in-process moka
//! - `JWT_EXPIRES_IN_SECS`, `JWT_EMAIL_EXPIRES_IN_SECS` - token lifetimes
//!   (default: 3600, 600)
//! - `APP_URL` - public API base used in emailed links
//! - `FRONTEND_URL` - base for checkout success/cancel redirects
//! - `STRIPE_SECRET_KEY`, `STRIPE_WEBHOOK_SECRET` - both or neither; unset
//!   uses the in-memory payment gateway
//! - `EMAIL_HOST`, `EMAIL_PORT`, `EMAIL_USER`, `EMAIL_PASSWORD`, `EMAIL_FROM` -
//!   SMTP relay; unset host uses the in-memory mailer

use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;
use thiserror::Error;

/// Configuration errors that can occur during loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),
    #[error("Invalid environment variable {0}: {1}")]
    InvalidEnvVar(String, String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Stripe credentials.
///
/// Implements `Debug` manually to redact secret fields.
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: SecretString,
    pub webhook_secret: SecretString,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"[REDACTED]")
            .field("webhook_secret", &"[REDACTED]")
            .finish()
    }
}

/// SMTP relay settings.
#[derive(Clone)]
pub struct EmailConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from: String,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("from", &self.from)
            .finish()
    }
}

/// Server configuration.
#[derive(Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<SecretString>,
    pub database_max_connections: u32,
    pub redis_url: Option<String>,
    pub jwt_secret: SecretString,
    pub jwt_expires_in: Duration,
    pub jwt_email_secret: SecretString,
    pub jwt_email_expires_in: Duration,
    pub app_url: String,
    pub frontend_url: String,
    pub stripe: Option<StripeConfig>,
    pub email: Option<EmailConfig>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("log_level", &self.log_level)
            .field("log_format", &self.log_format)
            .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
            .field("database_max_connections", &self.database_max_connections)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("jwt_expires_in", &self.jwt_expires_in)
            .field("jwt_email_expires_in", &self.jwt_email_expires_in)
            .field("app_url", &self.app_url)
            .field("frontend_url", &self.frontend_url)
            .field("stripe", &self.stripe)
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

/// Reads variables through a lookup function so tests need not touch the
/// process environment.
struct Vars<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.trim().is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key)
            .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
    }

    fn or_default(&self, key: &str, default: &str) -> String {
        self.optional(key).unwrap_or_else(|| default.to_string())
    }

    fn parsed<T>(&self, key: &str, default: T) -> Result<T, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.optional(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map_err(|e: T::Err| ConfigError::InvalidEnvVar(key.to_string(), e.to_string())),
            None => Ok(default),
        }
    }

    fn secret(&self, key: &str) -> Option<SecretString> {
        self.optional(key).map(SecretString::from)
    }
}

impl Config {
    /// Loads configuration from the environment, reading `.env` if present.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required variable is missing or a value
    /// fails to parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars { lookup };

        let log_format = match vars.or_default("LOG_FORMAT", "text").to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        let stripe = match (
            vars.secret("STRIPE_SECRET_KEY"),
            vars.secret("STRIPE_WEBHOOK_SECRET"),
        ) {
            (Some(secret_key), Some(webhook_secret)) => Some(StripeConfig {
                secret_key,
                webhook_secret,
            }),
            (None, None) => None,
            (Some(_), None) => {
                return Err(ConfigError::MissingEnvVar("STRIPE_WEBHOOK_SECRET".to_string()));
            }
            (None, Some(_)) => {
                return Err(ConfigError::MissingEnvVar("STRIPE_SECRET_KEY".to_string()));
            }
        };

        let email = match vars.optional("EMAIL_HOST") {
            Some(host) => Some(EmailConfig {
                host,
                port: vars.parsed("EMAIL_PORT", 587)?,
                username: vars.required("EMAIL_USER")?,
                password: SecretString::from(vars.required("EMAIL_PASSWORD")?),
                from: vars.required("EMAIL_FROM")?,
            }),
            None => None,
        };

        Ok(Self {
            host: vars.or_default("HOST", "0.0.0.0"),
            port: vars.parsed("PORT", 3000)?,
            log_level: vars.or_default("RUST_LOG", "info"),
            log_format,
            database_url: vars.secret("DATABASE_URL"),
            database_max_connections: vars.parsed("DATABASE_MAX_CONNECTIONS", 10)?,
            redis_url: vars.optional("REDIS_URL"),
            jwt_secret: SecretString::from(vars.required("JWT_SECRET")?),
            jwt_expires_in: Duration::from_secs(vars.parsed("JWT_EXPIRES_IN_SECS", 3600)?),
            jwt_email_secret: SecretString::from(vars.required("JWT_EMAIL_SECRET")?),
            jwt_email_expires_in: Duration::from_secs(
                vars.parsed("JWT_EMAIL_EXPIRES_IN_SECS", 600)?,
            ),
            app_url: vars.or_default("APP_URL", "http://localhost:3000/api/v1/"),
            frontend_url: vars.or_default("FRONTEND_URL", "http://localhost:5173"),
            stripe,
            email,
        })
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
