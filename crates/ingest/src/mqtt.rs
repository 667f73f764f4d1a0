//! MQTT receive loop.
//!
//! Drives the `rumqttc` event loop, (re)subscribes on every ConnAck, and
//! hands each publish to the [`IngestionGateway`]. Connection failures are
//! logged and retried after a fixed delay until the cancellation token
//! fires.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS, Transport};
use tokio_util::sync::CancellationToken;

use crate::config::MqttConfig;
use crate::gateway::IngestionGateway;

/// Reconnection delay after a broker failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Capacity of the client request channel.
const REQUEST_CAPACITY: usize = 64;

/// Build the client options for `config`.
pub fn mqtt_options(config: &MqttConfig) -> MqttOptions {
    let mut options = MqttOptions::new(&config.client_id, &config.broker, config.port);
    options.set_keep_alive(config.keep_alive);

    if let Some(username) = &config.username {
        options.set_credentials(username, config.password.as_deref().unwrap_or_default());
    }
    if config.use_tls {
        options.set_transport(Transport::tls_with_default_config());
    }
    options
}

/// Topics subscribed after every successful connection.
pub fn subscriptions(config: &MqttConfig) -> Vec<&str> {
    let mut topics = vec![config.topic.as_str()];
    if config.disconnect_topic != config.topic {
        topics.push(config.disconnect_topic.as_str());
    }
    topics
}

/// Run the receive loop until `cancel` fires.
pub async fn run(config: MqttConfig, gateway: &IngestionGateway, cancel: CancellationToken) {
    let (client, mut eventloop) = AsyncClient::new(mqtt_options(&config), REQUEST_CAPACITY);

    tracing::info!(
        broker = %config.broker,
        port = config.port,
        tls = config.use_tls,
        client_id = %config.client_id,
        "Connecting to MQTT broker"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("MQTT loop cancelled");
                break;
            }
            keep_going = poll_once(&config, &client, &mut eventloop, gateway) => {
                if keep_going {
                    continue;
                }
                // Wait before the next attempt, respecting cancellation.
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::info!("MQTT loop cancelled");
                        break;
                    }
                    _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                }
            }
        }
    }

    if let Err(e) = client.try_disconnect() {
        tracing::debug!(error = %e, "MQTT disconnect request not queued");
    }
}

/// Process one event. Returns `false` when the connection failed.
async fn poll_once(
    config: &MqttConfig,
    client: &AsyncClient,
    eventloop: &mut EventLoop,
    gateway: &IngestionGateway,
) -> bool {
    match eventloop.poll().await {
        Ok(Event::Incoming(Packet::ConnAck(ack))) => {
            tracing::info!(code = ?ack.code, "Connected to MQTT broker");
            for topic in subscriptions(config) {
                match client.try_subscribe(topic, QoS::AtMostOnce) {
                    Ok(()) => tracing::info!(topic, "Subscribed"),
                    Err(e) => tracing::error!(topic, error = %e, "Failed to subscribe"),
                }
            }
            true
        }
        Ok(Event::Incoming(Packet::Publish(publish))) => {
            gateway.on_message(&publish.payload, &publish.topic);
            true
        }
        Ok(_) => true,
        Err(e) => {
            tracing::error!(
                error = %e,
                retry_secs = RECONNECT_DELAY.as_secs(),
                "MQTT connection error, reconnecting"
            );
            false
        }
    }
}
