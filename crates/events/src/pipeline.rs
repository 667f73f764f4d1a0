//! Alert pipeline: rule evaluation, cooldown gating and delivery.
//!
//! [`AlertPipeline`] is shared behind an `Arc` by every alerting task the
//! ingestion gateway spawns. It never returns an error; each outcome is
//! logged and reported as a [`DispatchOutcome`].

use chrono::Utc;
use o2watch_core::cooldown::CooldownStatus;
use o2watch_core::{build_reading_alert, Alert, CooldownGate, Reading, RuleTables};

use crate::delivery::DeliveryService;

/// What happened to one reading or disconnect notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// No rule was violated.
    Healthy,
    /// An alert was built but the entity is cooling down or already sending.
    Suppressed,
    Sent,
    /// Delivery failed; the cooldown window was not consumed.
    Failed,
}

// ---------------------------------------------------------------------------
// AlertPipeline
// ---------------------------------------------------------------------------

pub struct AlertPipeline {
    rules: RuleTables,
    cooldown: CooldownGate,
    delivery: DeliveryService,
}

impl AlertPipeline {
    pub fn new(rules: RuleTables, cooldown: CooldownGate, delivery: DeliveryService) -> Self {
        Self {
            rules,
            cooldown,
            delivery,
        }
    }

    /// Evaluate `reading` and deliver the consolidated alert, if any.
    pub async fn process_reading(&self, reading: &Reading) -> DispatchOutcome {
        match build_reading_alert(&self.rules, reading) {
            Some(alert) => self.dispatch(alert).await,
            None => {
                tracing::debug!(entity = %reading.entity_name, "Reading healthy");
                DispatchOutcome::Healthy
            }
        }
    }

    /// Deliver a device disconnect alert carrying `message` verbatim.
    pub async fn process_disconnect(&self, message: &str) -> DispatchOutcome {
        self.dispatch(Alert::disconnect(message)).await
    }

    /// Send `alert` unless its entity is cooling down.
    ///
    /// The cooldown is consumed only when delivery succeeds.
    pub async fn dispatch(&self, alert: Alert) -> DispatchOutcome {
        let Some(permit) = self.cooldown.try_acquire(&alert.entity_name, Utc::now()) else {
            tracing::info!(
                entity = %alert.entity_name,
                title = %alert.title,
                "Alert suppressed by cooldown"
            );
            return DispatchOutcome::Suppressed;
        };

        if self.delivery.send(&alert).await {
            permit.commit(Utc::now());
            DispatchOutcome::Sent
        } else {
            // Dropping the permit releases the reservation untouched.
            drop(permit);
            tracing::warn!(
                entity = %alert.entity_name,
                "Alert not delivered, cooldown left open"
            );
            DispatchOutcome::Failed
        }
    }

    /// Clear the cooldown of `entity` so its next alert is sent immediately.
    pub fn reset_cooldown(&self, entity: &str) -> bool {
        self.cooldown.reset(entity)
    }

    pub fn cooldown_status(&self, entity: &str) -> CooldownStatus {
        self.cooldown.status(entity, Utc::now())
    }

    pub fn rules(&self) -> &RuleTables {
        &self.rules
    }

    pub fn delivery(&self) -> &DeliveryService {
        &self.delivery
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::delivery::{DeliveryConfig, RecordingTransport};

    fn config() -> DeliveryConfig {
        DeliveryConfig {
            host: "smtp.example.com".into(),
            username: "alerts@example.com".into(),
            password: "secret".into(),
            to_addresses: vec!["ops@example.com".into()],
            retry_delay_seconds: 1,
            ..Default::default()
        }
    }

    fn pipeline(transport: Arc<RecordingTransport>) -> AlertPipeline {
        AlertPipeline::new(
            RuleTables::default(),
            CooldownGate::new(Duration::from_secs(1800)),
            DeliveryService::new(config(), transport),
        )
    }

    fn reading(payload: serde_json::Value) -> Reading {
        Reading::from_value(payload).unwrap()
    }

    #[tokio::test]
    async fn healthy_reading_sends_nothing() {
        let transport = Arc::new(RecordingTransport::new());
        let pipeline = pipeline(transport.clone());

        let outcome = pipeline
            .process_reading(&reading(json!({"Hospital": "H", "Data": {"pressure": 8}})))
            .await;

        assert_eq!(outcome, DispatchOutcome::Healthy);
        assert_eq!(transport.attempts(), 0);
    }

    #[tokio::test]
    async fn second_fault_within_window_is_suppressed() {
        let transport = Arc::new(RecordingTransport::new());
        let pipeline = pipeline(transport.clone());
        let faulty = reading(json!({"Hospital": "H", "Data": {"pressure": 3}}));

        assert_eq!(pipeline.process_reading(&faulty).await, DispatchOutcome::Sent);
        assert_eq!(pipeline.process_reading(&faulty).await, DispatchOutcome::Suppressed);
        assert_eq!(transport.delivered().len(), 1);

        let status = pipeline.cooldown_status("H");
        assert!(status.in_cooldown);
        assert!(!status.can_send_alert);
    }

    #[tokio::test]
    async fn entities_cool_down_independently() {
        let transport = Arc::new(RecordingTransport::new());
        let pipeline = pipeline(transport.clone());

        let a = reading(json!({"Hospital": "A", "Data": {"pressure": 3}}));
        let b = reading(json!({"Hospital": "B", "Data": {"pressure": 3}}));

        assert_eq!(pipeline.process_reading(&a).await, DispatchOutcome::Sent);
        assert_eq!(pipeline.process_reading(&b).await, DispatchOutcome::Sent);
        assert_eq!(transport.delivered().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_delivery_leaves_cooldown_open() {
        let transport = Arc::new(RecordingTransport::failing(3));
        let pipeline = pipeline(transport.clone());
        let faulty = reading(json!({"Hospital": "H", "Data": {"pressure": 3}}));

        assert_eq!(pipeline.process_reading(&faulty).await, DispatchOutcome::Failed);
        assert!(pipeline.cooldown_status("H").can_send_alert);

        assert_eq!(pipeline.process_reading(&faulty).await, DispatchOutcome::Sent);
        assert_eq!(transport.attempts(), 4);
    }

    #[tokio::test]
    async fn reset_reopens_the_window() {
        let transport = Arc::new(RecordingTransport::new());
        let pipeline = pipeline(transport.clone());
        let faulty = reading(json!({"Hospital": "H", "Data": {"pressure": 3}}));

        assert_eq!(pipeline.process_reading(&faulty).await, DispatchOutcome::Sent);
        assert!(pipeline.reset_cooldown("H"));
        assert!(!pipeline.reset_cooldown("H"));
        assert_eq!(pipeline.process_reading(&faulty).await, DispatchOutcome::Sent);
        assert_eq!(transport.delivered().len(), 2);
    }

    #[tokio::test]
    async fn disconnects_share_the_system_cooldown() {
        let transport = Arc::new(RecordingTransport::new());
        let pipeline = pipeline(transport.clone());

        assert_eq!(pipeline.process_disconnect("gw-1 offline").await, DispatchOutcome::Sent);
        assert_eq!(
            pipeline.process_disconnect("gw-2 offline").await,
            DispatchOutcome::Suppressed
        );

        let delivered = transport.delivered();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].title, "ALERT: Device Connection!");
        assert!(delivered[0].body.ends_with("gw-1 offline"));
        assert!(pipeline.cooldown_status("system").in_cooldown);
    }

    #[tokio::test]
    async fn unconfigured_delivery_fails_without_consuming_cooldown() {
        let transport = Arc::new(RecordingTransport::new());
        let pipeline = AlertPipeline::new(
            RuleTables::default(),
            CooldownGate::default(),
            DeliveryService::new(DeliveryConfig::default(), transport.clone()),
        );

        assert_eq!(pipeline.process_disconnect("x").await, DispatchOutcome::Failed);
        assert_eq!(transport.attempts(), 0);
        assert!(pipeline.cooldown_status("system").can_send_alert);
    }
}
