//! Built-in rule tables per device class.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::RuleFileError;
use crate::reading::EntityClass;
use crate::rules::engine::{Comparator, Rule, RuleSet};

/// Nominal-value floor shared by the pressure gauges (bar).
const MIN_PRESSURE: f64 = 5.0;

/// Minimum acceptable oxygen purity (%).
const MIN_PURITY: f64 = 90.0;

/// Maximum acceptable dew point (°C).
const MAX_DEW_POINT: f64 = -45.0;

/// Healthy value reported by the binary fault flags.
const FLAG_OK: &str = "OK";

/// The rule tables consulted for every reading.
///
/// Class rules run first, then the shared `flags` table, so class faults
/// always precede flag faults in an alert body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleTables {
    pub plant: RuleSet,
    pub hospital: RuleSet,
    pub flags: RuleSet,
}

impl RuleTables {
    /// The class-specific table for `class`.
    pub fn for_class(&self, class: EntityClass) -> &RuleSet {
        match class {
            EntityClass::Plant => &self.plant,
            EntityClass::Hospital => &self.hospital,
        }
    }

    /// Parse a replacement table set from JSON.
    pub fn from_json_str(json: &str) -> Result<Self, RuleFileError> {
        let tables: Self = serde_json::from_str(json)?;
        tables.validate()?;
        Ok(tables)
    }

    /// Load a replacement table set from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, RuleFileError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    fn validate(&self) -> Result<(), RuleFileError> {
        let all = self
            .plant
            .iter()
            .chain(self.hospital.iter())
            .chain(self.flags.iter());
        for rule in all {
            if rule.field.trim().is_empty() {
                return Err(RuleFileError::Invalid("rule with empty field name".into()));
            }
            if rule.message.trim().is_empty() {
                return Err(RuleFileError::Invalid(format!(
                    "rule for field {} has an empty message",
                    rule.field
                )));
            }
        }
        Ok(())
    }
}

impl Default for RuleTables {
    fn default() -> Self {
        Self {
            plant: RuleSet::new(vec![
                Rule::new("purity", Comparator::Lt, MIN_PURITY, "Low purity: {value}"),
                Rule::new(
                    "product_pressure",
                    Comparator::Lt,
                    MIN_PRESSURE,
                    "Low product pressure: {value}",
                ),
                Rule::new(
                    "pressure",
                    Comparator::Lt,
                    MIN_PRESSURE,
                    "Low central pressure: {value}",
                ),
                Rule::new("dew_point", Comparator::Gt, MAX_DEW_POINT, "High dew point: {value}"),
                Rule::new("rede", Comparator::Lt, MIN_PRESSURE, "Low network pressure: {value}"),
            ]),
            hospital: RuleSet::new(vec![
                Rule::new("pressure", Comparator::Lt, MIN_PRESSURE, "Low pressure: {value}"),
                Rule::new("rede", Comparator::Lt, MIN_PRESSURE, "Low network pressure: {value}"),
                Rule::new("dew_point", Comparator::Gt, MAX_DEW_POINT, "High dew point: {value}"),
            ]),
            flags: RuleSet::new(vec![
                Rule::new("RST", Comparator::Ne, FLAG_OK, "RST failure detected"),
                Rule::new("BE", Comparator::Ne, FLAG_OK, "Emergency button activated"),
            ]),
        }
    }
}
