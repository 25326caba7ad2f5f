//! Transactional email.

use std::sync::Arc;

use async_trait::async_trait;
use lettre::{
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
    message::header::ContentType, transport::smtp::authentication::Credentials,
};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::RwLock;

use crate::{GatewayError, Result};

/// An outgoing HTML email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub subject: String,
    pub html: String,
}

/// Trait for sending email.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: Email) -> Result<()>;
}

/// SMTP mailer using STARTTLS.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from_address: String,
}

impl SmtpMailer {
    /// Builds the transport. No connection is made until the first send.
    pub fn new(
        host: &str,
        port: u16,
        username: String,
        password: &SecretString,
        from_address: String,
    ) -> Result<Self> {
        let credentials = Credentials::new(username, password.expose_secret().to_string());

        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| GatewayError::Mail(e.to_string()))?
            .port(port)
            .credentials(credentials)
            .build();

        Ok(Self {
            transport,
            from_address,
        })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    #[tracing::instrument(skip(self, email), fields(to = %email.to, subject = %email.subject))]
    async fn send(&self, email: Email) -> Result<()> {
        let message = Message::builder()
            .from(
                self.from_address
                    .parse()
                    .map_err(|_| GatewayError::Mail(format!("invalid from address {}", self.from_address)))?,
            )
            .to(email
                .to
                .parse()
                .map_err(|_| GatewayError::Mail(format!("invalid recipient {}", email.to)))?)
            .subject(email.subject)
            .header(ContentType::TEXT_HTML)
            .body(email.html)
            .map_err(|e| GatewayError::Mail(e.to_string()))?;

        self.transport.send(message).await.map_err(|e| {
            tracing::error!(error = %e, "failed to send email");
            GatewayError::Mail(e.to_string())
        })?;

        tracing::info!("email sent");
        Ok(())
    }
}

#[derive(Debug, Default)]
struct InMemoryMailerState {
    sent: Vec<Email>,
    fail_on_send: bool,
}

/// Mailer that keeps messages in memory and logs them.
#[derive(Debug, Clone, Default)]
pub struct InMemoryMailer {
    state: Arc<RwLock<InMemoryMailerState>>,
}

impl InMemoryMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the mailer to fail on subsequent sends.
    pub async fn set_fail_on_send(&self, fail: bool) {
        self.state.write().await.fail_on_send = fail;
    }

    /// Returns every message sent so far.
    pub async fn sent(&self) -> Vec<Email> {
        self.state.read().await.sent.clone()
    }

    /// Returns the most recent message sent to `to`.
    pub async fn last_to(&self, to: &str) -> Option<Email> {
        self.state
            .read()
            .await
            .sent
            .iter()
            .rev()
            .find(|e| e.to == to)
            .cloned()
    }
}

#[async_trait]
impl Mailer for InMemoryMailer {
    async fn send(&self, email: Email) -> Result<()> {
        let mut state = self.state.write().await;
        if state.fail_on_send {
            return Err(GatewayError::Mail("Could not send email.".to_string()));
        }
        tracing::info!(to = %email.to, subject = %email.subject, "email captured");
        state.sent.push(email);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str, subject: &str) -> Email {
        Email {
            to: to.to_string(),
            subject: subject.to_string(),
            html: "<p>hi</p>".to_string(),
        }
    }

    #[tokio::test]
    async fn records_sent_messages() {
        let mailer = InMemoryMailer::new();
        mailer.send(email("a@x.io", "one")).await.unwrap();
        mailer.send(email("b@x.io", "two")).await.unwrap();
        mailer.send(email("a@x.io", "three")).await.unwrap();

        assert_eq!(mailer.sent().await.len(), 3);
        assert_eq!(mailer.last_to("a@x.io").await.unwrap().subject, "three");
        assert!(mailer.last_to("c@x.io").await.is_none());
    }

    #[tokio::test]
    async fn fail_on_send() {
        let mailer = InMemoryMailer::new();
        mailer.set_fail_on_send(true).await;

        assert!(mailer.send(email("a@x.io", "one")).await.is_err());
        assert!(mailer.sent().await.is_empty());
    }

    #[tokio::test]
    async fn smtp_mailer_builds_without_connecting() {
        let password = SecretString::from("pw".to_string());
        let mailer = SmtpMailer::new(
            "smtp.example.com",
            587,
            "user".to_string(),
            &password,
            "shop@example.com".to_string(),
        );
        assert!(mailer.is_ok());
    }
}
