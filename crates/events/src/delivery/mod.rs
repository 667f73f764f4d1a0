//! Outbound alert delivery.
//!
//! [`DeliveryService`] is the only entry point used by the alert pipeline.
//! The wire transport sits behind the [`MailTransport`] seam: production
//! uses [`SmtpMailer`], tests use [`RecordingTransport`].

pub mod config;
pub mod mock;
pub mod service;
pub mod smtp;

use std::time::Duration;

use async_trait::async_trait;
use o2watch_core::Alert;

pub use config::{DeliveryConfig, DeliveryConfigError};
pub use mock::RecordingTransport;
pub use service::DeliveryService;
pub use smtp::SmtpMailer;

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

/// Error type for alert delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    /// A required setting is absent; retrying cannot help.
    #[error("Delivery is not configured: missing {0}")]
    NotConfigured(&'static str),

    /// SMTP transport-level failure (connection, TLS, authentication, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The sender or a recipient address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),

    /// A non-SMTP transport refused the message.
    #[error("Transport rejected message: {0}")]
    Rejected(String),

    #[error("Delivery failed after {attempts} attempts: {last_error}")]
    RetriesExhausted { attempts: u32, last_error: String },

    #[error("Delivery exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("Delivery was cancelled")]
    Cancelled,

    #[error("Delivery worker failed: {0}")]
    Worker(String),
}

impl DeliveryError {
    /// Short machine-readable failure reason for structured logs.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::NotConfigured(_) => "not_configured",
            Self::Transport(_) => "transport",
            Self::Address(_) => "address",
            Self::Build(_) => "build",
            Self::Rejected(_) => "rejected",
            Self::RetriesExhausted { .. } => "retries_exhausted",
            Self::Timeout(_) => "timeout",
            Self::Cancelled => "cancelled",
            Self::Worker(_) => "worker",
        }
    }
}

// ---------------------------------------------------------------------------
// OutboundMessage / MailTransport
// ---------------------------------------------------------------------------

/// One message as handed to the notification channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub title: String,
    pub body: String,
    pub recipients: Vec<String>,
}

impl OutboundMessage {
    pub fn from_alert(alert: &Alert, recipients: Vec<String>) -> Self {
        Self {
            title: alert.title.clone(),
            body: alert.body.clone(),
            recipients,
        }
    }
}

/// A channel able to carry one message per call.
///
/// Each call is a single attempt; retry and timeout policy live in
/// [`DeliveryService`].
#[async_trait]
pub trait MailTransport: Send + Sync + 'static {
    async fn deliver(&self, message: &OutboundMessage) -> Result<(), DeliveryError>;
}
