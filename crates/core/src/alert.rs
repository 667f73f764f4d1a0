//! Consolidated alerts built from rule violations.
//!
//! One reading yields at most one [`Alert`], listing every fault found
//! across the class rules and the shared flag rules.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::reading::{EntityClass, Reading};
use crate::rules::{evaluate, Fault, RuleTables};
use crate::topics::SYSTEM_ENTITY;

/// Title prefix carried by every alert.
pub const ALERT_PREFIX: &str = "ALERT";

/// Fixed title of device disconnect alerts.
pub const DISCONNECT_TITLE: &str = "ALERT: Device Connection!";

/// A user-facing notification ready for delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub title: String,
    pub body: String,
    /// Cooldown key; [`SYSTEM_ENTITY`] for disconnect alerts.
    pub entity_name: String,
}

impl Alert {
    /// Build the alert for a transport-level disconnect notification.
    ///
    /// Skips rule evaluation entirely and always produces an alert.
    pub fn disconnect(message: &str) -> Self {
        Self {
            title: DISCONNECT_TITLE.to_string(),
            body: format!("Device disconnected:\n\n{message}"),
            entity_name: SYSTEM_ENTITY.to_string(),
        }
    }
}

/// Run the class rules, then the flag rules, and consolidate any faults.
///
/// Returns `None` for a healthy reading.
pub fn build_alert(
    tables: &RuleTables,
    entity_class: EntityClass,
    entity_name: &str,
    fields: &Map<String, Value>,
    extra_context: Option<&Value>,
) -> Option<Alert> {
    let mut faults = evaluate(fields, tables.for_class(entity_class));
    faults.extend(evaluate(fields, &tables.flags));

    if faults.is_empty() {
        return None;
    }

    let label = entity_class.label();
    tracing::debug!(
        entity = entity_name,
        class = label,
        fault_count = faults.len(),
        "Rule violations detected"
    );

    Some(Alert {
        title: format!("{ALERT_PREFIX} {label} {entity_name}"),
        body: render_body(label, entity_name, &faults, extra_context),
        entity_name: entity_name.to_string(),
    })
}

/// [`build_alert`] for a decoded reading, with its diagnostic dump.
pub fn build_reading_alert(tables: &RuleTables, reading: &Reading) -> Option<Alert> {
    build_alert(
        tables,
        reading.entity_class,
        &reading.entity_name,
        &reading.fields,
        Some(&reading.extra_context()),
    )
}

fn render_body(
    label: &str,
    entity_name: &str,
    faults: &[Fault],
    extra_context: Option<&Value>,
) -> String {
    let issues: Vec<String> = faults.iter().map(|f| format!("- {}", f.message)).collect();
    let mut body = format!(
        "{ALERT_PREFIX}: Issues detected in {label} {entity_name}\n\nIdentified issues:\n{}",
        issues.join("\n")
    );

    if let Some(context) = extra_context {
        let dump = serde_json::to_string_pretty(context).unwrap_or_else(|_| context.to_string());
        body.push_str("\n\nFull data:\n");
        body.push_str(&dump);
    }

    body
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn reading(value: Value) -> Reading {
        Reading::from_value(value).expect("valid reading")
    }

    #[test]
    fn healthy_plant_reading_has_no_alert() {
        let r = reading(json!({
            "Hospital": "HospA", "tipo": "usina",
            "Data": {"purity": 95, "product_pressure": 6, "pressure": 6,
                     "dew_point": -60, "rede": 6, "RST": "OK", "BE": "OK"}
        }));
        assert!(build_reading_alert(&RuleTables::default(), &r).is_none());
    }

    #[test]
    fn low_purity_yields_single_fault_alert() {
        let r = reading(json!({
            "Hospital": "HospA", "tipo": "usina",
            "Data": {"purity": 80, "pressure": 6, "dew_point": -50,
                     "rede": 6, "RST": "OK", "BE": "OK"}
        }));
        let alert = build_reading_alert(&RuleTables::default(), &r).expect("purity fault");
        assert_eq!(alert.title, "ALERT Oxygen Plant HospA");
        assert_eq!(alert.entity_name, "HospA");
        assert!(alert
            .body
            .starts_with("ALERT: Issues detected in Oxygen Plant HospA\n\nIdentified issues:\n- Low purity: 80.0\n\nFull data:\n"));
        assert_eq!(alert.body.matches("\n- ").count(), 1);
        assert!(alert.body.contains("\"psa\": {"));
    }

    #[test]
    fn class_faults_precede_flag_faults() {
        let r = reading(json!({
            "Hospital": "Central Norte",
            "Data": {"pressure": 3, "rede": "4.5", "dew_point": -30,
                     "RST": "FAIL", "BE": "ON"}
        }));
        let alert = build_reading_alert(&RuleTables::default(), &r).unwrap();
        assert_eq!(alert.title, "ALERT Hospital Central Norte");

        let issues: Vec<&str> = alert
            .body
            .lines()
            .filter(|l| l.starts_with("- "))
            .collect();
        assert_eq!(
            issues,
            [
                "- Low pressure: 3.0",
                "- Low network pressure: 4.5",
                "- High dew point: -30.0",
                "- RST failure detected",
                "- Emergency button activated",
            ]
        );
    }

    #[test]
    fn body_without_extra_context_has_no_dump() {
        let fields = json!({"pressure": 1}).as_object().cloned().unwrap();
        let alert = build_alert(
            &RuleTables::default(),
            EntityClass::Hospital,
            "H",
            &fields,
            None,
        )
        .unwrap();
        assert!(!alert.body.contains("Full data"));
    }

    #[test]
    fn same_input_same_alert() {
        let value = json!({"Hospital": "H", "Data": {"pressure": 1, "RST": "X"}});
        let tables = RuleTables::default();
        let a = build_reading_alert(&tables, &reading(value.clone()));
        let b = build_reading_alert(&tables, &reading(value));
        assert_eq!(a, b);
    }

    #[test]
    fn disconnect_alert_has_fixed_title() {
        let alert = Alert::disconnect("sensor-7");
        assert_eq!(alert.title, "ALERT: Device Connection!");
        assert!(alert.body.contains("sensor-7"));
        assert_eq!(alert.entity_name, SYSTEM_ENTITY);
    }
}
