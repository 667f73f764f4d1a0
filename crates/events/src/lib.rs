//! Outbound side of the o2watch telemetry pipeline.
//!
//! - [`AlertPipeline`] evaluates readings, consults the cooldown gate and
//!   hands consolidated alerts to delivery.
//! - [`delivery`] sends alert emails with bounded retries and a wall-clock
//!   budget.
//! - [`persistence`] keeps the latest reading per entity for the dashboard.

pub mod delivery;
pub mod persistence;
pub mod pipeline;

pub use delivery::{DeliveryConfig, DeliveryError, DeliveryService, MailTransport, RecordingTransport};
pub use persistence::{MemoryStore, ReadingStore, RedisStore, StoreError};
pub use pipeline::{AlertPipeline, DispatchOutcome};
