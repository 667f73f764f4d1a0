//! Delivery configuration.
//!
//! Loaded once at start-up, either from a JSON file or from environment
//! variables, and immutable afterwards.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

use crate::delivery::DeliveryError;

/// Default SMTP port (STARTTLS).
const DEFAULT_SMTP_PORT: u16 = 587;

/// Default number of delivery attempts per alert.
const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default pause between two delivery attempts.
const DEFAULT_RETRY_DELAY_SECS: u64 = 5;

/// Default wall-clock budget for one `send` call, retries included.
const DEFAULT_SEND_TIMEOUT_SECS: u64 = 30;

/// Error type for configuration that cannot be used.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryConfigError {
    #[error("Failed to read delivery config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse delivery config file: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("{key} must be {expected}, got {value:?}")]
    Invalid {
        key: &'static str,
        expected: &'static str,
        value: String,
    },
}

/// SMTP settings, recipients, and the retry/cooldown policy.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub use_tls: bool,
    /// RFC 5322 "From" address; falls back to `username` when empty.
    #[serde(alias = "from_email")]
    pub from_address: String,
    #[serde(alias = "to_emails")]
    pub to_addresses: Vec<String>,
    pub cooldown_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub send_timeout_seconds: u64,
}

impl DeliveryConfig {
    /// Load configuration from environment variables.
    ///
    /// Malformed numeric or boolean values are rejected rather than
    /// defaulted.
    ///
    /// | Variable                 | Default |
    /// |--------------------------|---------|
    /// | `SMTP_HOST`              | --      |
    /// | `SMTP_PORT`              | `587`   |
    /// | `SMTP_USER`              | --      |
    /// | `SMTP_PASSWORD`          | --      |
    /// | `SMTP_USE_TLS`           | `true`  |
    /// | `SMTP_FROM`              | user    |
    /// | `SMTP_TO`                | --      |
    /// | `ALERT_COOLDOWN_SECS`    | `1800`  |
    /// | `SMTP_MAX_RETRIES`       | `3`     |
    /// | `SMTP_RETRY_DELAY_SECS`  | `5`     |
    /// | `SMTP_SEND_TIMEOUT_SECS` | `30`    |
    pub fn from_env() -> Result<Self, DeliveryConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, DeliveryConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Ok(Self {
            host: get("SMTP_HOST").unwrap_or_default(),
            port: parse_or("SMTP_PORT", get("SMTP_PORT"), "a port number", defaults.port)?,
            username: get("SMTP_USER").unwrap_or_default(),
            password: lookup("SMTP_PASSWORD").unwrap_or_default(),
            use_tls: parse_bool("SMTP_USE_TLS", get("SMTP_USE_TLS"), defaults.use_tls)?,
            from_address: get("SMTP_FROM").unwrap_or_default(),
            to_addresses: get("SMTP_TO")
                .map(|v| v.split(',').map(str::to_string).collect())
                .unwrap_or_default(),
            cooldown_seconds: parse_or(
                "ALERT_COOLDOWN_SECS",
                get("ALERT_COOLDOWN_SECS"),
                "a number of seconds",
                defaults.cooldown_seconds,
            )?,
            max_retries: parse_or(
                "SMTP_MAX_RETRIES",
                get("SMTP_MAX_RETRIES"),
                "a non-negative integer",
                defaults.max_retries,
            )?,
            retry_delay_seconds: parse_or(
                "SMTP_RETRY_DELAY_SECS",
                get("SMTP_RETRY_DELAY_SECS"),
                "a number of seconds",
                defaults.retry_delay_seconds,
            )?,
            send_timeout_seconds: parse_or(
                "SMTP_SEND_TIMEOUT_SECS",
                get("SMTP_SEND_TIMEOUT_SECS"),
                "a number of seconds",
                defaults.send_timeout_seconds,
            )?,
        })
    }

    /// Parse a JSON configuration document. Absent keys take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, DeliveryConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, DeliveryConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Load from `path` if it exists, otherwise from the environment.
    ///
    /// A file that exists but cannot be parsed is logged and ignored.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeliveryConfigError> {
        let path = path.as_ref();
        if path.exists() {
            match Self::from_file(path) {
                Ok(config) => {
                    tracing::info!(path = %path.display(), "Loaded delivery config from file");
                    return Ok(config);
                }
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Ignoring unusable delivery config file, falling back to environment"
                    );
                }
            }
        }
        Self::from_env()
    }

    /// Address placed in the `From` header.
    pub fn sender(&self) -> &str {
        if self.from_address.trim().is_empty() {
            self.username.trim()
        } else {
            self.from_address.trim()
        }
    }

    /// Trimmed, non-empty recipients in configured order, without duplicates.
    pub fn recipients(&self) -> Vec<String> {
        let mut recipients: Vec<String> = Vec::with_capacity(self.to_addresses.len());
        for address in self.to_addresses.iter().map(|a| a.trim()) {
            if !address.is_empty() && !recipients.iter().any(|r| r == address) {
                recipients.push(address.to_string());
            }
        }
        recipients
    }

    /// Fail fast when a delivery could never succeed.
    pub fn ensure_deliverable(&self) -> Result<(), DeliveryError> {
        if self.host.trim().is_empty() {
            return Err(DeliveryError::NotConfigured("host"));
        }
        if self.username.trim().is_empty() {
            return Err(DeliveryError::NotConfigured("username"));
        }
        if self.password.is_empty() {
            return Err(DeliveryError::NotConfigured("password"));
        }
        if self.recipients().is_empty() {
            return Err(DeliveryError::NotConfigured("recipients"));
        }
        Ok(())
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_secs(self.cooldown_seconds)
    }

    /// Number of attempts per send; never less than one.
    pub fn attempts(&self) -> u32 {
        self.max_retries.max(1)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_seconds)
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_SMTP_PORT,
            username: String::new(),
            password: String::new(),
            use_tls: true,
            from_address: String::new(),
            to_addresses: Vec::new(),
            cooldown_seconds: o2watch_core::cooldown::DEFAULT_COOLDOWN.as_secs(),
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_seconds: DEFAULT_RETRY_DELAY_SECS,
            send_timeout_seconds: DEFAULT_SEND_TIMEOUT_SECS,
        }
    }
}

impl fmt::Debug for DeliveryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("use_tls", &self.use_tls)
            .field("from_address", &self.from_address)
            .field("to_addresses", &self.to_addresses)
            .field("cooldown_seconds", &self.cooldown_seconds)
            .field("max_retries", &self.max_retries)
            .field("retry_delay_seconds", &self.retry_delay_seconds)
            .field("send_timeout_seconds", &self.send_timeout_seconds)
            .finish()
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    value: Option<String>,
    expected: &'static str,
    default: T,
) -> Result<T, DeliveryConfigError> {
    match value {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| DeliveryConfigError::Invalid {
            key,
            expected,
            value: v,
        }),
    }
}

fn parse_bool(
    key: &'static str,
    value: Option<String>,
    default: bool,
) -> Result<bool, DeliveryConfigError> {
    let Some(raw) = value else {
        return Ok(default);
    };
    match raw.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(DeliveryConfigError::Invalid {
            key,
            expected: "true or false",
            value: raw,
        }),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
