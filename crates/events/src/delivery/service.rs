//! Bounded-time, retrying alert delivery.
//!
//! [`DeliveryService::send`] runs the attempt-and-retry sequence on its own
//! Tokio task and waits at most `send_timeout` for it. When the budget is
//! exceeded the task is cancelled through a [`CancellationToken`], which
//! drops the in-flight attempt, back-off sleep, or queued session wait.
//! A single async mutex keeps at most one transport session open at a time.

use std::sync::Arc;

use o2watch_core::Alert;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::delivery::smtp::SmtpMailer;
use crate::delivery::{DeliveryConfig, DeliveryError, MailTransport, OutboundMessage};

/// Retrying delivery client shared by every alert pipeline task.
///
/// Cheap to clone; clones share the session gate.
#[derive(Clone)]
pub struct DeliveryService {
    inner: Arc<Inner>,
}

struct Inner {
    config: DeliveryConfig,
    transport: Arc<dyn MailTransport>,
    /// Serializes transport sessions system-wide.
    session: Mutex<()>,
}

impl DeliveryService {
    pub fn new(config: DeliveryConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                session: Mutex::new(()),
            }),
        }
    }

    /// Delivery over SMTP using the relay described by `config`.
    pub fn smtp(config: DeliveryConfig) -> Self {
        let transport = Arc::new(SmtpMailer::new(config.clone()));
        Self::new(config, transport)
    }

    pub fn config(&self) -> &DeliveryConfig {
        &self.inner.config
    }

    /// Deliver `alert`, returning whether it went out.
    ///
    /// Never fails: every error is logged with its reason and reported as
    /// `false`.
    pub async fn send(&self, alert: &Alert) -> bool {
        match self.try_send(alert).await {
            Ok(attempts) => {
                tracing::info!(
                    entity = %alert.entity_name,
                    title = %alert.title,
                    attempts,
                    "Alert delivered"
                );
                true
            }
            Err(e) => {
                tracing::error!(
                    entity = %alert.entity_name,
                    title = %alert.title,
                    reason = e.reason(),
                    error = %e,
                    "Alert delivery failed"
                );
                false
            }
        }
    }

    /// Deliver `alert`, returning the number of attempts used on success.
    pub async fn try_send(&self, alert: &Alert) -> Result<u32, DeliveryError> {
        // Misconfiguration fails before any attempt is spent.
        self.inner.config.ensure_deliverable()?;

        let message = OutboundMessage::from_alert(alert, self.inner.config.recipients());
        let budget = self.inner.config.send_timeout();

        let cancel = CancellationToken::new();
        let worker_cancel = cancel.clone();
        // Cancels the worker on every exit path, including this future being dropped.
        let _cancel_on_exit = cancel.drop_guard();

        let inner = Arc::clone(&self.inner);
        let mut worker =
            tokio::spawn(async move { inner.send_with_retries(&message, &worker_cancel).await });

        match tokio::time::timeout(budget, &mut worker).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) => Err(DeliveryError::Worker(join_err.to_string())),
            Err(_elapsed) => {
                tracing::warn!(
                    title = %alert.title,
                    budget_secs = budget.as_secs(),
                    "Delivery budget exceeded, abandoning send"
                );
                Err(DeliveryError::Timeout(budget))
            }
        }
    }
}

impl Inner {
    /// Up to `attempts()` tries separated by `retry_delay`, under the session gate.
    async fn send_with_retries(
        &self,
        message: &OutboundMessage,
        cancel: &CancellationToken,
    ) -> Result<u32, DeliveryError> {
        let _session = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
            guard = self.session.lock() => guard,
        };

        let max_attempts = self.config.attempts();
        let delay = self.config.retry_delay();
        let mut last_error: Option<DeliveryError> = None;

        for attempt in 1..=max_attempts {
            tracing::info!(attempt, max_attempts, title = %message.title, "Sending alert");

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                result = self.transport.deliver(message) => result,
            };

            match result {
                Ok(()) => return Ok(attempt),
                Err(e) => {
                    tracing::warn!(
                        attempt,
                        max_attempts,
                        reason = e.reason(),
                        error = %e,
                        "Alert delivery attempt failed"
                    );
                    last_error = Some(e);
                }
            }

            if attempt < max_attempts {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(DeliveryError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }

        Err(DeliveryError::RetriesExhausted {
            attempts: max_attempts,
            last_error: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
