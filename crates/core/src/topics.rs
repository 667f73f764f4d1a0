//! Well-known transport topic and store collection names.
//!
//! The collection names must match the keys the dashboard reads, and the
//! disconnect topic is the one the field gateways publish to when a device
//! drops off the broker.

/// Default MQTT topic carrying plain-text device disconnect notifications.
pub const DISCONNECT_TOPIC: &str = "desconnection/topic";

/// Store collection holding the latest oxygen plant reading per entity.
pub const COLLECTION_PLANT: &str = "Usina";

/// Store collection holding the latest hospital central reading per entity.
pub const COLLECTION_HOSPITAL: &str = "Central";

/// Reverse index mapping every known entity to its collection.
pub const ENTITY_INDEX: &str = "Entities";

/// Cooldown key shared by all disconnect alerts.
///
/// Disconnect notifications carry no entity name, so they are rate limited
/// as a single system-wide entity.
pub const SYSTEM_ENTITY: &str = "system";
