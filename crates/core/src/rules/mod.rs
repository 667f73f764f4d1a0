//! Threshold rule evaluation for device readings.
//!
//! All logic in this module is pure (no I/O) so it can be tested in
//! isolation. The caller decodes the reading and passes in its fields.

pub mod engine;
pub mod tables;

pub use engine::{evaluate, Comparator, Fault, Rule, RuleSet, Threshold};
pub use tables::RuleTables;
