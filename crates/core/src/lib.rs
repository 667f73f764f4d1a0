//! o2watch domain logic.
//!
//! Pure building blocks of the telemetry alerting pipeline, with no I/O:
//!
//! - [`reading`]: decoding of device telemetry payloads.
//! - [`rules`]: declarative threshold rules and their interpreter.
//! - [`alert`]: consolidation of rule violations into a single alert.
//! - [`cooldown`]: per-entity alert rate limiting.

pub mod alert;
pub mod cooldown;
pub mod error;
pub mod reading;
pub mod rules;
pub mod topics;
pub mod types;

pub use alert::{build_alert, build_reading_alert, Alert};
pub use cooldown::{CooldownGate, CooldownPermit, CooldownStatus};
pub use error::{DecodeError, RuleFileError};
pub use reading::{EntityClass, Reading};
pub use rules::{Fault, RuleTables};
