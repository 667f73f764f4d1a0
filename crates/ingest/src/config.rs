//! Ingest daemon configuration, read once from the environment at start-up.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use o2watch_core::topics::DISCONNECT_TOPIC;

/// Default MQTT port (TLS).
const DEFAULT_MQTT_PORT: u16 = 8883;

/// MQTT keep-alive interval.
pub const KEEP_ALIVE: Duration = Duration::from_secs(60);

/// Delivery settings file consulted before the `SMTP_*` variables.
const DEFAULT_EMAIL_CONFIG_FILE: &str = "email_config.json";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{0} environment variable is required")]
    Missing(&'static str),

    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// Broker connection and subscription settings.
#[derive(Clone)]
pub struct MqttConfig {
    pub broker: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic carrying JSON readings; may contain wildcards.
    pub topic: String,
    pub disconnect_topic: String,
    pub use_tls: bool,
    pub client_id: String,
    pub keep_alive: Duration,
}

impl std::fmt::Debug for MqttConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttConfig")
            .field("broker", &self.broker)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("topic", &self.topic)
            .field("disconnect_topic", &self.disconnect_topic)
            .field("use_tls", &self.use_tls)
            .field("client_id", &self.client_id)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct IngestConfig {
    pub mqtt: MqttConfig,
    /// Redis URL for the latest-reading store; in-memory when absent.
    pub redis_url: Option<String>,
    /// JSON file replacing the built-in rule tables.
    pub rules_file: Option<PathBuf>,
    pub email_config_file: PathBuf,
}

impl IngestConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var                 | Required | Default                 |
    /// |-------------------------|----------|-------------------------|
    /// | `MQTT_BROKER`           | yes      | --                      |
    /// | `MQTT_PORT`             | no       | `8883`                  |
    /// | `MQTT_USERNAME`         | no       | --                      |
    /// | `MQTT_PASSWORD`         | no       | --                      |
    /// | `MQTT_TOPIC`            | yes      | --                      |
    /// | `MQTT_DISCONNECT_TOPIC` | no       | `desconnection/topic`   |
    /// | `MQTT_USE_TLS`          | no       | `true`                  |
    /// | `MQTT_CLIENT_ID`        | no       | `o2watch-<uuid>`        |
    /// | `REDIS_URL`             | no       | in-memory store         |
    /// | `RULES_FILE`            | no       | built-in rules          |
    /// | `EMAIL_CONFIG_FILE`     | no       | `email_config.json`     |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mqtt = MqttConfig {
            broker: get("MQTT_BROKER").ok_or(ConfigError::Missing("MQTT_BROKER"))?,
            port: parse_or("MQTT_PORT", get("MQTT_PORT"), "a port number", DEFAULT_MQTT_PORT)?,
            username: get("MQTT_USERNAME"),
            password: lookup("MQTT_PASSWORD").filter(|v| !v.is_empty()),
            topic: get("MQTT_TOPIC").ok_or(ConfigError::Missing("MQTT_TOPIC"))?,
            disconnect_topic: get("MQTT_DISCONNECT_TOPIC")
                .unwrap_or_else(|| DISCONNECT_TOPIC.to_string()),
            use_tls: parse_bool("MQTT_USE_TLS", get("MQTT_USE_TLS"), true)?,
            client_id: get("MQTT_CLIENT_ID")
                .unwrap_or_else(|| format!("o2watch-{}", uuid::Uuid::new_v4().simple())),
            keep_alive: KEEP_ALIVE,
        };

        Ok(Self {
            mqtt,
            redis_url: get("REDIS_URL"),
            rules_file: get("RULES_FILE").map(PathBuf::from),
            email_config_file: get("EMAIL_CONFIG_FILE")
                .unwrap_or_else(|| DEFAULT_EMAIL_CONFIG_FILE.to_string())
                .into(),
        })
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    expected: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value: v,
        }),
    }
}

fn parse_bool(key: &'static str, value: Option<String>, default: bool) -> Result<bool, ConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            expected: "true or false",
            value: raw,
        }),
    }
}
