//! Adapters for the services the storefront talks to.
//!
//! Every adapter is a trait with a production implementation and an
//! in-memory one for tests and local runs:
//! - [`PaymentGateway`]: hosted checkout sessions and signed webhooks
//! - [`Mailer`]: transactional email
//! - [`Cache`]: string key/value cache with per-entry expiry

pub mod cache;
pub mod error;
pub mod mail;
pub mod payment;
pub mod stripe;
pub mod webhook;

pub use cache::{Cache, MokaCache, RedisCache};
pub use error::{GatewayError, Result};
pub use mail::{Email, InMemoryMailer, Mailer, SmtpMailer};
pub use payment::{
    CheckoutLineItem, CheckoutRequest, CheckoutSession, CompletedSession, InMemoryPaymentGateway,
    PaymentGateway, WebhookEvent,
};
pub use stripe::StripeGateway;
