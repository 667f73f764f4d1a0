//! End-to-end tests: transport message in, stored reading and delivered
//! email out, with the in-memory store and the recording transport.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use o2watch_core::{CooldownGate, RuleTables};
use o2watch_events::persistence::StoreError;
use o2watch_events::{
    AlertPipeline, DeliveryConfig, DeliveryService, MemoryStore, ReadingStore, RecordingTransport,
};
use o2watch_ingest::IngestionGateway;
use serde_json::json;

const DISCONNECT_TOPIC: &str = "desconnection/topic";
const READINGS_TOPIC: &str = "oxygen/readings";

fn delivery_config() -> DeliveryConfig {
    DeliveryConfig {
        host: "smtp.example.com".into(),
        username: "alerts@example.com".into(),
        password: "secret".into(),
        to_addresses: vec!["ops@example.com".into()],
        ..Default::default()
    }
}

fn gateway_with(
    store: Arc<dyn ReadingStore>,
    transport: Arc<RecordingTransport>,
    config: DeliveryConfig,
) -> IngestionGateway {
    let pipeline = AlertPipeline::new(
        RuleTables::default(),
        CooldownGate::new(config.cooldown()),
        DeliveryService::new(config, transport),
    );
    IngestionGateway::new(Arc::new(pipeline), store, DISCONNECT_TOPIC)
}

fn payload(value: serde_json::Value) -> Vec<u8> {
    serde_json::to_vec(&value).unwrap()
}

fn low_purity_plant() -> Vec<u8> {
    payload(json!({
        "Hospital": "HospA",
        "tipo": "usina",
        "Data": {"purity": 80, "pressure": 6, "dew_point": -50, "rede": 6, "RST": "OK", "BE": "OK"}
    }))
}

/// Store whose every call fails.
struct BrokenStore;

#[async_trait]
impl ReadingStore for BrokenStore {
    async fn write(&self, _: &str, _: &str, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }

    async fn register_entity(&self, _: &str, _: &str) -> Result<(), StoreError> {
        Err(StoreError::Backend("disk full".into()))
    }
}

/// In-memory store whose first write is slow.
struct SlowFirstWrite {
    inner: MemoryStore,
    first: AtomicBool,
}

#[async_trait]
impl ReadingStore for SlowFirstWrite {
    async fn write(&self, collection: &str, entity: &str, blob: &str) -> Result<(), StoreError> {
        if self.first.swap(false, Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        self.inner.write(collection, entity, blob).await
    }

    async fn register_entity(&self, entity: &str, collection: &str) -> Result<(), StoreError> {
        self.inner.register_entity(entity, collection).await
    }
}

#[tokio::test]
async fn faulty_plant_reading_is_stored_and_alerted() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(store.clone(), transport.clone(), delivery_config());

    gateway.on_message(&low_purity_plant(), READINGS_TOPIC);
    gateway.flush().await;

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].title, "ALERT Oxygen Plant HospA");
    assert_eq!(delivered[0].recipients, ["ops@example.com"]);

    let body = &delivered[0].body;
    assert!(body.starts_with("ALERT: Issues detected in Oxygen Plant HospA\n\nIdentified issues:\n"));
    assert!(body.contains("- Low purity: 80.0\n"));
    assert!(!body.contains("pressure: 6"));
    assert!(body.contains("Full data:\n{\n  \"psa\": {"));

    let stored: serde_json::Value =
        serde_json::from_str(&store.latest("Usina", "HospA").unwrap()).unwrap();
    assert_eq!(stored["purity"], 80);
    assert_eq!(store.entities(), [("HospA".to_string(), "Usina".to_string())]);
}

#[tokio::test]
async fn healthy_hospital_reading_is_stored_without_alert() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(store.clone(), transport.clone(), delivery_config());

    let reading = payload(json!({
        "Hospital": "HospB",
        "Data": {"pressure": "7.5", "rede": 6, "dew_point": -60}
    }));
    gateway.on_message(&reading, READINGS_TOPIC);
    gateway.flush().await;

    assert_eq!(transport.attempts(), 0);
    assert!(store.latest("Central", "HospB").is_some());
    assert_eq!(gateway.pipeline().cooldown_status("HospB").last_alert_time, None);
}

#[tokio::test]
async fn repeat_fault_within_cooldown_makes_no_transport_call() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(store.clone(), transport.clone(), delivery_config());

    gateway.on_message(&low_purity_plant(), READINGS_TOPIC);
    gateway.flush().await;
    gateway.on_message(&low_purity_plant(), READINGS_TOPIC);
    gateway.flush().await;

    assert_eq!(transport.attempts(), 1);
    let status = gateway.pipeline().cooldown_status("HospA");
    assert!(status.in_cooldown);
    assert!(!status.can_send_alert);
    assert!(status.time_remaining > Duration::from_secs(1790));
}

#[tokio::test]
async fn multiple_faults_are_consolidated_in_rule_order() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(store, transport.clone(), delivery_config());

    let reading = payload(json!({
        "Hospital": "HospC",
        "Data": {"pressure": 2, "rede": "bad", "dew_point": -10, "RST": "FAIL", "BE": null}
    }));
    gateway.on_message(&reading, READINGS_TOPIC);
    gateway.flush().await;

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].title, "ALERT Hospital HospC");
    assert!(delivered[0].body.contains(
        "Identified issues:\n- Low pressure: 2.0\n- High dew point: -10.0\n- RST failure detected\n\nFull data:"
    ));
}

#[tokio::test]
async fn disconnect_notification_alerts_with_raw_text() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(store.clone(), transport.clone(), delivery_config());

    gateway.on_message(b"sensor-7", DISCONNECT_TOPIC);
    gateway.flush().await;

    let delivered = transport.delivered();
    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0].title, "ALERT: Device Connection!");
    assert!(delivered[0].body.contains("sensor-7"));
    assert!(store.entities().is_empty());
}

#[tokio::test]
async fn malformed_payload_is_dropped() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(store.clone(), transport.clone(), delivery_config());

    gateway.on_message(b"{not json", READINGS_TOPIC);
    gateway.on_message(&payload(json!({"Data": {"pressure": 1}})), READINGS_TOPIC);
    gateway.on_message(&payload(json!({"Hospital": "H", "Data": "x"})), READINGS_TOPIC);
    assert_eq!(gateway.pending(), 0);
    gateway.flush().await;

    assert_eq!(transport.attempts(), 0);
    assert!(store.entities().is_empty());
}

#[tokio::test]
async fn readings_are_persisted_in_arrival_order() {
    let store = Arc::new(SlowFirstWrite {
        inner: MemoryStore::new(),
        first: AtomicBool::new(true),
    });
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(store.clone(), transport, delivery_config());

    gateway.on_message(&payload(json!({"Hospital": "H", "Data": {"pressure": 1}})), READINGS_TOPIC);
    gateway.on_message(&payload(json!({"Hospital": "H", "Data": {"pressure": 9}})), READINGS_TOPIC);
    gateway.flush().await;

    assert_eq!(
        store.inner.latest("Central", "H").as_deref(),
        Some(r#"{"pressure":9}"#)
    );
    assert_eq!(gateway.pending(), 0);
}

#[tokio::test]
async fn shutdown_persists_queued_readings() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(store.clone(), transport, delivery_config());

    gateway.on_message(&payload(json!({"Hospital": "H", "Data": {"pressure": 8}})), READINGS_TOPIC);
    assert!(gateway.shutdown(Duration::from_secs(5)).await);
    assert!(store.latest("Central", "H").is_some());

    // Readings after shutdown are dropped without panicking.
    gateway.on_message(&payload(json!({"Hospital": "G", "Data": {"pressure": 8}})), READINGS_TOPIC);
    assert_eq!(store.latest("Central", "G"), None);
}

#[tokio::test]
async fn store_failure_does_not_suppress_alert() {
    let transport = Arc::new(RecordingTransport::new());
    let gateway = gateway_with(Arc::new(BrokenStore), transport.clone(), delivery_config());

    gateway.on_message(&low_purity_plant(), READINGS_TOPIC);
    gateway.flush().await;

    assert_eq!(transport.delivered().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn delivery_failure_does_not_block_persistence() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::always_failing());
    let gateway = gateway_with(store.clone(), transport.clone(), delivery_config());

    gateway.on_message(&low_purity_plant(), READINGS_TOPIC);
    gateway.flush().await;

    assert_eq!(transport.attempts(), 3);
    assert!(store.latest("Usina", "HospA").is_some());
    assert!(gateway.pipeline().cooldown_status("HospA").can_send_alert);
}

#[tokio::test(start_paused = true)]
async fn on_message_returns_before_delivery_runs() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new().with_latency(Duration::from_secs(10)));
    let gateway = gateway_with(store, transport.clone(), delivery_config());

    gateway.on_message(&low_purity_plant(), READINGS_TOPIC);
    assert_eq!(gateway.pending(), 2);
    assert!(transport.delivered().is_empty());

    gateway.flush().await;
    assert_eq!(transport.delivered().len(), 1);
    assert_eq!(gateway.pending(), 0);
}

#[tokio::test(start_paused = true)]
async fn shutdown_gives_up_after_grace() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new().with_latency(Duration::from_secs(60)));
    let gateway = gateway_with(store, transport, delivery_config());

    gateway.on_message(b"gateway lost", DISCONNECT_TOPIC);
    assert!(!gateway.shutdown(Duration::from_secs(5)).await);
}

#[tokio::test(start_paused = true)]
async fn shutdown_drains_finished_work() {
    let store = Arc::new(MemoryStore::new());
    let transport = Arc::new(RecordingTransport::new().with_latency(Duration::from_secs(1)));
    let gateway = gateway_with(store, transport.clone(), delivery_config());

    gateway.on_message(b"gateway lost", DISCONNECT_TOPIC);
    assert!(gateway.shutdown(Duration::from_secs(5)).await);
    assert_eq!(transport.delivered().len(), 1);
}
