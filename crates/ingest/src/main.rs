//! `o2watch-ingest` -- oxygen telemetry ingestion daemon.
//!
//! Subscribes to the plant and hospital telemetry topics, stores the latest
//! reading per site, and emails consolidated alerts when a reading breaks
//! the rules, rate limited per site.
//!
//! See [`IngestConfig::from_env`] and [`DeliveryConfig::from_env`] for the
//! environment variables.

use std::sync::Arc;
use std::time::Duration;

use o2watch_core::{CooldownGate, RuleTables};
use o2watch_events::{AlertPipeline, DeliveryConfig, DeliveryService, MemoryStore, ReadingStore, RedisStore};
use o2watch_ingest::{mqtt, IngestConfig, IngestionGateway};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long in-flight persistence and alert tasks may run after shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(35);

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "o2watch_ingest=info,o2watch_events=info,o2watch_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = IngestConfig::from_env().unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid ingest configuration");
        std::process::exit(1);
    });

    let rules = match &config.rules_file {
        Some(path) => RuleTables::from_file(path).unwrap_or_else(|e| {
            tracing::error!(path = %path.display(), error = %e, "Failed to load rules file");
            std::process::exit(1);
        }),
        None => RuleTables::default(),
    };

    let delivery_config = DeliveryConfig::load(&config.email_config_file).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Invalid delivery configuration");
        std::process::exit(1);
    });
    if let Err(e) = delivery_config.ensure_deliverable() {
        tracing::warn!(error = %e, "Alert email delivery is not configured, alerts will fail");
    }

    let store: Arc<dyn ReadingStore> = match &config.redis_url {
        Some(url) => match RedisStore::connect(url).await {
            Ok(store) => Arc::new(store),
            Err(e) => {
                tracing::error!(error = %e, "Failed to connect to Redis");
                std::process::exit(1);
            }
        },
        None => {
            tracing::warn!("REDIS_URL not set, keeping readings in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    tracing::info!(
        cooldown_secs = delivery_config.cooldown_seconds,
        max_retries = delivery_config.attempts(),
        plant_rules = rules.plant.len(),
        hospital_rules = rules.hospital.len(),
        flag_rules = rules.flags.len(),
        "Starting o2watch-ingest"
    );

    let cooldown = CooldownGate::new(delivery_config.cooldown());
    let pipeline = Arc::new(AlertPipeline::new(
        rules,
        cooldown,
        DeliveryService::smtp(delivery_config),
    ));
    let gateway = IngestionGateway::new(pipeline, store, config.mqtt.disconnect_topic.clone());

    let cancel = CancellationToken::new();
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_cancel.cancel();
    });

    mqtt::run(config.mqtt, &gateway, cancel).await;

    tracing::info!("Receive loop stopped, draining in-flight work");
    gateway.shutdown(SHUTDOWN_GRACE).await;
    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT (Ctrl-C) or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
