//! Declarative threshold rule interpreter.
//!
//! Pure logic with no side effects. A [`RuleSet`] is an ordered table of
//! `(field, comparator, threshold, message)` rows; [`evaluate`] walks the
//! table in declaration order and returns one [`Fault`] per violated row.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Comparator / Threshold
// ---------------------------------------------------------------------------

/// Binary comparison applied as `comparator(value, threshold)`.
///
/// The rule is violated when the comparison holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl Comparator {
    /// Apply the comparison to a coerced value and its threshold.
    pub fn holds<T: PartialOrd + ?Sized>(self, value: &T, threshold: &T) -> bool {
        match self {
            Self::Lt => value < threshold,
            Self::Le => value <= threshold,
            Self::Gt => value > threshold,
            Self::Ge => value >= threshold,
            Self::Eq => value == threshold,
            Self::Ne => value != threshold,
        }
    }
}

/// Reference value of a rule.
///
/// The threshold doubles as the fallback for an absent or unreadable field,
/// so a missing field can never violate its own rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Threshold {
    Number(f64),
    Text(String),
}

impl From<f64> for Threshold {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Threshold {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

// ---------------------------------------------------------------------------
// Coercion
// ---------------------------------------------------------------------------

/// A field value after coercion to the threshold's type.
#[derive(Debug, Clone, PartialEq)]
pub enum CoercedValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for CoercedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => f.write_str(&format_number(*n)),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Shortest round-trip rendering with a trailing `.0` on integral values
/// (`80` -> `80.0`) and a signed, two-digit exponent outside
/// `[1e-4, 1e16)` (`1e16` -> `1e+16`, `1e-5` -> `1e-05`).
pub fn format_number(n: f64) -> String {
    let rendered = format!("{n:?}");
    let Some((mantissa, exponent)) = rendered.split_once('e') else {
        return rendered;
    };
    let (sign, digits) = match exponent.strip_prefix('-') {
        Some(digits) => ('-', digits),
        None => ('+', exponent),
    };
    format!("{mantissa}e{sign}{digits:0>2}")
}

/// Coerce a raw field to a float, falling back to `fallback` when the field
/// is absent, `null`, structured, or not a finite number.
pub fn coerce_number(value: Option<&Value>, fallback: f64) -> f64 {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(Value::Bool(b)) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    };
    parsed.filter(|n| n.is_finite()).unwrap_or(fallback)
}

/// Coerce a raw field to text, falling back to `fallback` when the field is
/// absent, `null`, or structured.
pub fn coerce_text(value: Option<&Value>, fallback: &str) -> String {
    match value {
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => fallback.to_string(),
    }
}

// ---------------------------------------------------------------------------
// Rule / Fault
// ---------------------------------------------------------------------------

/// Placeholder replaced by the coerced value in a rule's message.
const VALUE_PLACEHOLDER: &str = "{value}";

/// One threshold check against a named reading field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub field: String,
    pub comparator: Comparator,
    pub threshold: Threshold,
    /// Message template; `{value}` is replaced by the coerced value.
    pub message: String,
}

impl Rule {
    pub fn new(
        field: impl Into<String>,
        comparator: Comparator,
        threshold: impl Into<Threshold>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: field.into(),
            comparator,
            threshold: threshold.into(),
            message: message.into(),
        }
    }

    /// Evaluate this rule against a reading's fields.
    pub fn check(&self, fields: &Map<String, Value>) -> Option<Fault> {
        let raw = fields.get(&self.field);
        let (violated, value) = match &self.threshold {
            Threshold::Number(limit) => {
                let value = coerce_number(raw, *limit);
                (
                    self.comparator.holds(&value, limit),
                    CoercedValue::Number(value),
                )
            }
            Threshold::Text(limit) => {
                let value = coerce_text(raw, limit);
                (
                    self.comparator.holds(value.as_str(), limit.as_str()),
                    CoercedValue::Text(value),
                )
            }
        };

        violated.then(|| Fault {
            field: self.field.clone(),
            message: self
                .message
                .replace(VALUE_PLACEHOLDER, &value.to_string()),
        })
    }
}

/// A single rule violation derived from a reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fault {
    /// The field whose rule was violated.
    pub field: String,
    /// The formatted, operator-facing message.
    pub message: String,
}

// ---------------------------------------------------------------------------
// RuleSet
// ---------------------------------------------------------------------------

/// Ordered rule table for one device class (or the shared flag table).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rule> {
        self.rules.iter()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// Evaluate every rule in declaration order and collect the violations.
///
/// Never fails: missing, `null` and unparseable fields are coerced to the
/// rule's threshold.
pub fn evaluate(fields: &Map<String, Value>, rules: &RuleSet) -> Vec<Fault> {
    rules.iter().filter_map(|rule| rule.check(fields)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
