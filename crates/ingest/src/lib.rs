//! `o2watch-ingest` library crate.
//!
//! Re-exports internal modules for integration testing. The binary
//! entrypoint lives in `main.rs`.

pub mod config;
pub mod gateway;
pub mod mqtt;

pub use config::{ConfigError, IngestConfig, MqttConfig};
pub use gateway::IngestionGateway;
