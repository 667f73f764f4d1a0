//! Alert email delivery via SMTP.
//!
//! [`SmtpMailer`] wraps the `lettre` async SMTP transport. Every call opens
//! a fresh session (connect, optional STARTTLS, authenticate, send, quit) so
//! a broken connection never leaks into the next attempt.

use std::time::Duration;

use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::delivery::{DeliveryConfig, DeliveryError, MailTransport, OutboundMessage};

/// Connection and command timeout for a single SMTP session.
const SMTP_TIMEOUT: Duration = Duration::from_secs(15);

/// Sends alert emails through the configured SMTP relay.
pub struct SmtpMailer {
    config: DeliveryConfig,
}

impl SmtpMailer {
    pub fn new(config: DeliveryConfig) -> Self {
        Self { config }
    }

    /// Assemble the plain-text MIME message for `message`.
    fn build_message(&self, message: &OutboundMessage) -> Result<Message, DeliveryError> {
        let mut builder = Message::builder()
            .from(self.config.sender().parse::<Mailbox>()?)
            .subject(message.title.as_str())
            .header(ContentType::TEXT_PLAIN);

        for recipient in &message.recipients {
            builder = builder.to(recipient.parse::<Mailbox>()?);
        }

        builder
            .body(message.body.clone())
            .map_err(|e| DeliveryError::Build(e.to_string()))
    }

    /// Build a single-use transport for one session.
    fn build_transport(&self) -> Result<AsyncSmtpTransport<Tokio1Executor>, DeliveryError> {
        let host = self.config.host.trim();
        let builder = if self.config.use_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(host)
        };

        Ok(builder
            .port(self.config.port)
            .credentials(Credentials::new(
                self.config.username.trim().to_string(),
                self.config.password.clone(),
            ))
            .timeout(Some(SMTP_TIMEOUT))
            .build())
    }
}

#[async_trait]
impl MailTransport for SmtpMailer {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), DeliveryError> {
        let email = self.build_message(message)?;
        let mailer = self.build_transport()?;
        mailer.send(email).await?;

        tracing::info!(
            title = %message.title,
            recipients = message.recipients.len(),
            "Alert email sent"
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn config() -> DeliveryConfig {
        DeliveryConfig {
            host: "127.0.0.1".into(),
            port: 1,
            username: "alerts@example.com".into(),
            password: "secret".into(),
            use_tls: false,
            to_addresses: vec!["ops@example.com".into()],
            ..Default::default()
        }
    }

    fn message(recipients: &[&str]) -> OutboundMessage {
        OutboundMessage {
            title: "ALERT Hospital H".into(),
            body: "Identified issues:\n- Low pressure: 3.0".into(),
            recipients: recipients.iter().map(|r| r.to_string()).collect(),
        }
    }

    #[test]
    fn builds_message_with_all_recipients() {
        let mailer = SmtpMailer::new(config());
        let email = mailer
            .build_message(&message(&["a@example.com", "b@example.com"]))
            .expect("valid message");
        let rendered = String::from_utf8(email.formatted()).unwrap();
        assert!(rendered.contains("From: alerts@example.com"));
        assert!(rendered.contains("a@example.com"));
        assert!(rendered.contains("b@example.com"));
        assert!(rendered.contains("Subject: ALERT Hospital H"));
    }

    #[test]
    fn invalid_recipient_is_address_error() {
        let mailer = SmtpMailer::new(config());
        assert_matches!(
            mailer.build_message(&message(&["not-an-email"])),
            Err(DeliveryError::Address(_))
        );
    }

    #[test]
    fn invalid_sender_is_address_error() {
        let mailer = SmtpMailer::new(DeliveryConfig {
            username: "not an address".into(),
            ..config()
        });
        assert_matches!(
            mailer.build_message(&message(&["ops@example.com"])),
            Err(DeliveryError::Address(_))
        );
    }

    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let mailer = SmtpMailer::new(config());
        let result = mailer.deliver(&message(&["ops@example.com"])).await;
        assert_matches!(result, Err(DeliveryError::Transport(_)));
    }
}
